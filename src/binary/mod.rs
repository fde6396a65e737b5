//! Binary format primitives: LEB128, the input cursor, instructions and sinks.

pub mod input;
pub mod leb128;
pub mod opcode;
pub mod output;

pub use input::InputStream;
pub use opcode::Opcode;
pub use output::{write_section, InMemoryOutputWriter, IoOutputWriter, OutputWriter};
