//! Error types for module transformation and inspection.

use thiserror::Error;

use crate::module::{ConstOpcode, ExternalKind, SectionType};

/// Errors that can occur while reading, rewriting or writing a module.
///
/// Every variant is fatal to the current call; no partial output is valid.
#[derive(Debug, Error)]
pub enum Error {
    /// The first four bytes are not `\0asm`.
    #[error("invalid magic number")]
    InvalidMagic,

    /// The version field is not `1`.
    #[error("unsupported binary version")]
    InvalidVersion,

    /// A read ran past the end of the input.
    #[error("unexpected end of input at offset {offset}: need {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },

    /// A LEB128 value kept its continuation bit past the declared width.
    #[error("LEB128 value at offset {offset} exceeds {width} bits")]
    InvalidLeb128 { offset: usize, width: u32 },

    #[error("invalid value type: 0x{0:02x}")]
    InvalidValueType(u8),

    /// A type section entry did not start with the `0x60` func form.
    #[error("invalid type form: 0x{0:02x}")]
    InvalidFormType(u8),

    #[error("expected a constant expression opcode, found 0x{0:02x}")]
    ExpectConstOpcode(u8),

    /// Only `i32.const` offsets are supported in initializer expressions.
    #[error("expected i32.const, found {0:?}")]
    ExpectI32Const(ConstOpcode),

    #[error("expected end of constant expression")]
    ExpectEnd,

    #[error("unexpected opcode: 0x{0:02x}")]
    UnexpectedOpcode(u8),

    #[error("invalid external kind: 0x{0:02x}")]
    InvalidExternalKind(u8),

    /// Exception imports are not supported yet.
    #[error("unsupported external kind: {0:?}")]
    UnsupportedExternalKind(ExternalKind),

    /// An import refers to a type index the type section does not define.
    #[error("unknown type index: {0}")]
    UnknownType(u32),

    /// A section that needs scanned signatures came before type/import.
    #[error("expected type or import section, found {0:?}")]
    ExpectTypeOrImportSection(SectionType),

    /// An element or code section came before the function section.
    #[error("expected function section before element or code section")]
    ExpectFunctionSection,

    #[error("unexpected section id: {0}")]
    UnexpectedSection(u8),

    /// A section's declared size disagrees with the bytes its entries use.
    #[error("section {id} declares {declared} bytes but its contents use {consumed}")]
    SectionSizeMismatch {
        id: u8,
        declared: usize,
        consumed: usize,
    },

    /// Adding trampolines would push function indices past `u32::MAX`.
    #[error("function index space overflows u32")]
    FunctionIndexOverflow,

    /// The output sink failed.
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
