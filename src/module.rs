//! Module data model: section ids, value types, external kinds and signatures.

use std::ops::Range;

/// `\0asm`
pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// Binary format version 1.
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Leading byte of a function type in the type section.
pub const FUNC_FORM: u8 = 0x60;

/// Block type byte for a block that yields nothing.
pub const EMPTY_BLOCK_TYPE: u8 = 0x40;

/// Bit 0 of a limits flags byte: a maximum follows the minimum.
pub const LIMITS_HAS_MAX_FLAG: u8 = 0x01;

/// Byte range of a section that is copied through unchanged.
pub type RawSection = Range<usize>;

/// Top-level section ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Elem = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Custom),
            1 => Some(Self::Type),
            2 => Some(Self::Import),
            3 => Some(Self::Function),
            4 => Some(Self::Table),
            5 => Some(Self::Memory),
            6 => Some(Self::Global),
            7 => Some(Self::Export),
            8 => Some(Self::Start),
            9 => Some(Self::Elem),
            10 => Some(Self::Code),
            11 => Some(Self::Data),
            12 => Some(Self::DataCount),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// Primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32 = 0x7F,
    I64 = 0x7E,
    F32 = 0x7D,
    F64 = 0x7C,
}

impl ValueType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x7F => Some(Self::I32),
            0x7E => Some(Self::I64),
            0x7D => Some(Self::F32),
            0x7C => Some(Self::F64),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// Import descriptor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Func = 0,
    Table = 1,
    Memory = 2,
    Global = 3,
    Except = 4,
}

impl ExternalKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Func),
            1 => Some(Self::Table),
            2 => Some(Self::Memory),
            3 => Some(Self::Global),
            4 => Some(Self::Except),
            _ => None,
        }
    }
}

/// Opcodes that may start a constant expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstOpcode {
    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
}

impl ConstOpcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x41 => Some(Self::I32Const),
            0x42 => Some(Self::I64Const),
            0x43 => Some(Self::F32Const),
            0x44 => Some(Self::F64Const),
            _ => None,
        }
    }
}

/// A function signature from the type section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSignature {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
    /// Whether any param or result is `i64`.
    pub has_i64: bool,
}

impl FuncSignature {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        let has_i64 = params
            .iter()
            .chain(results.iter())
            .any(|ty| *ty == ValueType::I64);
        Self {
            params,
            results,
            has_i64,
        }
    }

    /// Returns this signature with every `i64` replaced by `i32`.
    pub fn lowered(&self) -> Self {
        let lower = |types: &[ValueType]| -> Vec<ValueType> {
            types
                .iter()
                .map(|ty| match ty {
                    ValueType::I64 => ValueType::I32,
                    other => *other,
                })
                .collect()
        };
        Self {
            params: lower(&self.params),
            results: lower(&self.results),
            has_i64: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowered_keeps_arity_and_order() {
        use ValueType::*;
        let sig = FuncSignature::new(vec![I64, F32, I32, I64], vec![F64, I64]);
        assert!(sig.has_i64);

        let lowered = sig.lowered();
        assert_eq!(lowered.params, vec![I32, F32, I32, I32]);
        assert_eq!(lowered.results, vec![F64, I32]);
        assert!(!lowered.has_i64);
    }

    #[test]
    fn test_has_i64_only_for_i64() {
        use ValueType::*;
        assert!(!FuncSignature::new(vec![I32, F32, F64], vec![I32]).has_i64);
        assert!(FuncSignature::new(vec![], vec![I64]).has_i64);
    }

    #[test]
    fn test_section_type_bytes() {
        for byte in 0..=12u8 {
            let section = SectionType::from_byte(byte).unwrap();
            assert_eq!(section.byte(), byte);
        }
        assert_eq!(SectionType::from_byte(13), None);
    }

    #[test]
    fn test_value_type_bytes() {
        assert_eq!(ValueType::from_byte(0x7E), Some(ValueType::I64));
        assert_eq!(ValueType::I32.byte(), 0x7F);
        assert_eq!(ValueType::from_byte(0x7B), None);
    }
}
