//! wasm-transformer: binary-to-binary rewrites of WebAssembly modules
//!
//! Some embedders can only pass 32-bit integers across the host boundary.
//! This crate rewrites a module so that imported functions whose signatures
//! mention `i64` are imported with `i32` in their place, and every internal
//! call or table entry goes through a small trampoline that wraps the
//! arguments before forwarding.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           wasm-transformer              │
//! │                                         │
//! │  transform - i64 import lowering        │
//! │  reader    - read-only section access   │
//! │                                         │
//! ├─────────────────────────────────────────┤
//! │  binary    - LEB128, cursor, opcodes,   │
//! │              output sinks               │
//! │  module    - section ids, value types,  │
//! │              signatures                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! let wasm = wat::parse_str(r#"
//!     (module
//!         (type (func (param i64)))
//!         (import "env" "f" (func (type 0))))
//! "#).unwrap();
//!
//! let lowered = wasm_transformer::lower_i64_imports(&wasm).unwrap();
//! assert!(lowered.len() > wasm.len());
//! ```

pub mod binary;
pub mod error;
pub mod module;
pub mod reader;
pub mod transform;

pub use binary::{InMemoryOutputWriter, InputStream, IoOutputWriter, OutputWriter};
pub use error::{Error, Result};
pub use module::{FuncSignature, SectionType, ValueType};
pub use reader::{ModuleReader, ModuleSection};
pub use transform::I64Transformer;

/// Lowers every i64-bearing function import of `wasm` and returns the new
/// module.
pub fn lower_i64_imports(wasm: &[u8]) -> Result<Vec<u8>> {
    let mut input = InputStream::new(wasm);
    let mut output = InMemoryOutputWriter::with_capacity(wasm.len());
    I64Transformer::new().transform(&mut input, &mut output)?;
    Ok(output.into_bytes())
}
