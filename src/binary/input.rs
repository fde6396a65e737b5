//! Forward-only cursor over a module's bytes.
//!
//! The `consume_*` methods each walk past one grammar production and return
//! the exact bytes they walked, so callers can copy a structure into the
//! output without re-encoding it.

use super::leb128::{decode_signed, decode_unsigned};
use super::opcode::Opcode;
use crate::error::{Error, Result};
use crate::module::{ConstOpcode, ValueType, EMPTY_BLOCK_TYPE, LIMITS_HAS_MAX_FLAG};

/// A read position into an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct InputStream<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> InputStream<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// The whole underlying buffer, independent of the read position.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    /// Bytes left after the read position.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    /// Bytes between `start` and the current position.
    fn since(&self, start: usize) -> &'a [u8] {
        &self.bytes[start..self.offset]
    }

    pub fn read(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            return Err(Error::UnexpectedEof {
                offset: self.offset,
                needed: len - (self.bytes.len() - self.offset.min(self.bytes.len())),
            });
        };
        let start = self.offset;
        self.offset = end;
        Ok(&self.bytes[start..end])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.bytes
            .get(self.offset)
            .copied()
            .ok_or(Error::UnexpectedEof {
                offset: self.offset,
                needed: 1,
            })
    }

    fn read_unsigned(&mut self, width: u32) -> Result<u64> {
        let rest = self.bytes.get(self.offset..).unwrap_or_default();
        let (value, advanced) =
            decode_unsigned(rest, width).map_err(|err| relocate(err, self.offset))?;
        self.offset += advanced;
        Ok(value)
    }

    fn read_signed(&mut self, width: u32) -> Result<i64> {
        let rest = self.bytes.get(self.offset..).unwrap_or_default();
        let (value, advanced) =
            decode_signed(rest, width).map_err(|err| relocate(err, self.offset))?;
        self.offset += advanced;
        Ok(value)
    }

    pub fn read_var_u32(&mut self) -> Result<u32> {
        Ok(self.read_unsigned(32)? as u32)
    }

    pub fn read_var_i32(&mut self) -> Result<i32> {
        Ok(self.read_signed(32)? as i32)
    }

    pub fn read_var_i64(&mut self) -> Result<i64> {
        self.read_signed(64)
    }

    /// Reads a fixed-width little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a length-prefixed name as ASCII text.
    ///
    /// Bytes outside the ASCII range become U+FFFD.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_var_u32()? as usize;
        let bytes = self.read(len)?;
        Ok(bytes
            .iter()
            .map(|&byte| {
                if byte.is_ascii() {
                    char::from(byte)
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect())
    }

    /// https://webassembly.github.io/spec/core/binary/types.html#result-types
    ///
    /// Also reports whether any listed type is `i64`.
    pub fn read_result_types(&mut self) -> Result<(Vec<ValueType>, bool)> {
        let count = self.read_var_u32()?;
        let mut types = Vec::with_capacity((count as usize).min(self.remaining()));
        let mut has_i64 = false;
        for _ in 0..count {
            let raw = self.read_u8()?;
            let ty = ValueType::from_byte(raw).ok_or(Error::InvalidValueType(raw))?;
            has_i64 |= ty == ValueType::I64;
            types.push(ty);
        }
        Ok((types, has_i64))
    }

    pub fn consume_string(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        let len = self.read_var_u32()? as usize;
        self.read(len)?;
        Ok(self.since(start))
    }

    /// https://webassembly.github.io/spec/core/binary/types.html#limits
    fn consume_limits(&mut self) -> Result<()> {
        let flags = self.read_u8()?;
        self.read_var_u32()?; // initial
        if flags & LIMITS_HAS_MAX_FLAG != 0 {
            self.read_var_u32()?; // maximum
        }
        Ok(())
    }

    /// https://webassembly.github.io/spec/core/binary/types.html#table-types
    pub fn consume_table(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        self.read_u8()?; // element type
        self.consume_limits()?;
        Ok(self.since(start))
    }

    /// https://webassembly.github.io/spec/core/binary/types.html#memory-types
    pub fn consume_memory(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        self.consume_limits()?;
        Ok(self.since(start))
    }

    /// https://webassembly.github.io/spec/core/binary/types.html#global-types
    pub fn consume_global_header(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        self.read_u8()?; // value type
        self.read_u8()?; // mutability
        Ok(self.since(start))
    }

    /// Walks an initializer that must be `i32.const <n> end`.
    pub fn consume_i32_init_expr(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        let code = self.read_u8()?;
        match ConstOpcode::from_byte(code) {
            Some(ConstOpcode::I32Const) => {
                self.read_var_i32()?;
            }
            Some(other) => return Err(Error::ExpectI32Const(other)),
            None => return Err(Error::ExpectConstOpcode(code)),
        }
        if self.read_opcode()? != Opcode::End {
            return Err(Error::ExpectEnd);
        }
        Ok(self.since(start))
    }

    /// https://webassembly.github.io/spec/core/binary/modules.html#binary-local
    pub fn consume_local_entry(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        self.read_var_u32()?; // count
        self.read_u8()?; // type
        Ok(self.since(start))
    }

    /// Walks the whole locals vector at the head of a function body.
    pub fn consume_locals(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        let groups = self.read_var_u32()?;
        for _ in 0..groups {
            self.consume_local_entry()?;
        }
        Ok(self.since(start))
    }

    /// https://webassembly.github.io/spec/core/binary/instructions.html#control-instructions
    pub fn consume_block_type(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        let head = self.peek_u8()?;
        if head == EMPTY_BLOCK_TYPE || ValueType::from_byte(head).is_some() {
            self.read_u8()?;
        } else {
            self.read_signed(33)?; // type index
        }
        Ok(self.since(start))
    }

    pub fn consume_br_table(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        let count = self.read_var_u32()?;
        for _ in 0..count {
            self.read_var_u32()?;
        }
        self.read_var_u32()?; // default
        Ok(self.since(start))
    }

    pub fn consume_memory_arg(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        self.read_var_u32()?; // align
        self.read_var_u32()?; // offset
        Ok(self.since(start))
    }

    /// Immediates following the `0xFC` prefix.
    fn consume_prefixed(&mut self) -> Result<()> {
        match self.read_var_u32()? {
            // saturating truncation
            0..=7 => {}
            // memory.init
            8 => {
                self.read_var_u32()?;
                self.read_u8()?;
            }
            // data.drop, elem.drop, table.grow, table.size, table.fill
            9 | 13 | 15 | 16 | 17 => {
                self.read_var_u32()?;
            }
            // memory.copy
            10 => {
                self.read_u8()?;
                self.read_u8()?;
            }
            // memory.fill
            11 => {
                self.read_u8()?;
            }
            // table.init, table.copy
            12 | 14 => {
                self.read_var_u32()?;
                self.read_var_u32()?;
            }
            _ => return Err(Error::UnexpectedOpcode(0xFC)),
        }
        Ok(())
    }

    /// Decodes one instruction.
    ///
    /// https://webassembly.github.io/spec/core/binary/instructions.html
    pub fn read_opcode(&mut self) -> Result<Opcode<'a>> {
        let start = self.offset;
        let raw = self.read_u8()?;
        match raw {
            // control
            0x00 | 0x01 => {}
            0x02..=0x04 => {
                self.consume_block_type()?;
            }
            0x05 => {}
            0x0B => return Ok(Opcode::End),
            0x0C | 0x0D => {
                self.read_var_u32()?; // label index
            }
            0x0E => {
                self.consume_br_table()?;
            }
            0x0F => {}
            0x10 => return Ok(Opcode::Call(self.read_var_u32()?)),
            0x11 => {
                self.read_var_u32()?; // type index
                self.read_u8()?; // 0x00
            }

            // parametric
            0x1A | 0x1B => {}

            // variable
            0x20 => return Ok(Opcode::LocalGet(self.read_var_u32()?)),
            0x21..=0x24 => {
                self.read_var_u32()?;
            }

            // memory
            0x28..=0x3E => {
                self.consume_memory_arg()?;
            }
            0x3F | 0x40 => {
                self.read_u8()?; // 0x00
            }

            // numeric
            0x41 => {
                self.read_var_i32()?;
            }
            0x42 => {
                self.read_var_i64()?;
            }
            0x43 => {
                self.read(4)?;
            }
            0x44 => {
                self.read(8)?;
            }
            0x45..=0xA6 => {}
            0xA7 => return Ok(Opcode::I32WrapI64),
            0xA8..=0xC4 => {}
            0xFC => self.consume_prefixed()?,

            _ => return Err(Error::UnexpectedOpcode(raw)),
        }
        Ok(Opcode::Unknown(self.since(start)))
    }
}

/// Rebases an error from a sub-slice decode onto this stream's offsets.
fn relocate(err: Error, base: usize) -> Error {
    match err {
        Error::UnexpectedEof { offset, needed } => Error::UnexpectedEof {
            offset: base + offset,
            needed,
        },
        Error::InvalidLeb128 { offset, width } => Error::InvalidLeb128 {
            offset: base + offset,
            width,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Opcode<'_>> {
        let mut input = InputStream::new(bytes);
        let mut ops = Vec::new();
        while !input.is_eof() {
            ops.push(input.read_opcode().unwrap());
        }
        ops
    }

    #[test]
    fn test_primitive_reads() {
        let bytes = [0x2A, 0xE5, 0x8E, 0x26, 0x78, 0x56, 0x34, 0x12];
        let mut input = InputStream::new(&bytes);
        assert_eq!(input.read_u8().unwrap(), 0x2A);
        assert_eq!(input.read_var_u32().unwrap(), 624_485);
        assert_eq!(input.read_u32().unwrap(), 0x1234_5678);
        assert!(input.is_eof());
        assert!(matches!(
            input.read_u8(),
            Err(Error::UnexpectedEof { offset: 8, needed: 1 })
        ));
    }

    #[test]
    fn test_read_string_as_ascii() {
        let bytes = [0x03, b'e', b'n', b'v', 0x02, b'a', 0xFF];
        let mut input = InputStream::new(&bytes);
        assert_eq!(input.read_string().unwrap(), "env");
        assert_eq!(input.read_string().unwrap(), "a\u{FFFD}");
    }

    #[test]
    fn test_read_result_types_flags_i64() {
        let bytes = [0x02, 0x7F, 0x7E, 0x01, 0x7D, 0x01, 0x70];
        let mut input = InputStream::new(&bytes);
        assert_eq!(
            input.read_result_types().unwrap(),
            (vec![ValueType::I32, ValueType::I64], true)
        );
        assert_eq!(input.read_result_types().unwrap(), (vec![ValueType::F32], false));
        assert!(matches!(
            input.read_result_types(),
            Err(Error::InvalidValueType(0x70))
        ));
    }

    #[test]
    fn test_consumers_return_exact_spans() {
        let bytes = [
            0x70, 0x01, 0x01, 0x0A, // table: funcref, min 1, max 10
            0x00, 0x02, // memory: min 2
            0x7E, 0x01, // global: mut i64
            0x03, b'a', b'b', b'c', // string
        ];
        let mut input = InputStream::new(&bytes);
        assert_eq!(input.consume_table().unwrap(), &bytes[0..4]);
        assert_eq!(input.consume_memory().unwrap(), &bytes[4..6]);
        assert_eq!(input.consume_global_header().unwrap(), &bytes[6..8]);
        assert_eq!(input.consume_string().unwrap(), &bytes[8..12]);
        assert!(input.is_eof());
    }

    #[test]
    fn test_i32_init_expr() {
        let bytes = [0x41, 0x80, 0x01, 0x0B];
        let mut input = InputStream::new(&bytes);
        assert_eq!(input.consume_i32_init_expr().unwrap(), &bytes[..]);

        let mut input = InputStream::new(&[0x42, 0x00, 0x0B]);
        assert!(matches!(
            input.consume_i32_init_expr(),
            Err(Error::ExpectI32Const(ConstOpcode::I64Const))
        ));

        let mut input = InputStream::new(&[0x23, 0x00, 0x0B]);
        assert!(matches!(
            input.consume_i32_init_expr(),
            Err(Error::ExpectConstOpcode(0x23))
        ));

        let mut input = InputStream::new(&[0x41, 0x00, 0x01]);
        assert!(matches!(input.consume_i32_init_expr(), Err(Error::ExpectEnd)));
    }

    #[test]
    fn test_consume_locals_vector() {
        let bytes = [0x02, 0x01, 0x7F, 0x03, 0x7E, 0x0B];
        let mut input = InputStream::new(&bytes);
        assert_eq!(input.consume_locals().unwrap(), &bytes[..5]);
        assert_eq!(input.read_opcode().unwrap(), Opcode::End);
    }

    #[test]
    fn test_block_types() {
        // empty, value type, type index 5
        let bytes = [0x02, 0x40, 0x03, 0x7F, 0x04, 0x05, 0x0B];
        let ops = decode_all(&bytes);
        assert_eq!(
            ops,
            vec![
                Opcode::Unknown(&bytes[0..2]),
                Opcode::Unknown(&bytes[2..4]),
                Opcode::Unknown(&bytes[4..6]),
                Opcode::End,
            ]
        );
    }

    #[test]
    fn test_significant_opcodes() {
        let bytes = [0x20, 0x02, 0xA7, 0x10, 0xAC, 0x02, 0x0B];
        assert_eq!(
            decode_all(&bytes),
            vec![
                Opcode::LocalGet(2),
                Opcode::I32WrapI64,
                Opcode::Call(300),
                Opcode::End,
            ]
        );
    }

    #[test]
    fn test_immediate_widths() {
        let bytes = [
            0x41, 0x7F, // i32.const -1
            0x42, 0x80, 0x80, 0x80, 0x80, 0x10, // i64.const 2^32
            0x43, 0x00, 0x00, 0x80, 0x3F, // f32.const 1.0
            0x44, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F, // f64.const 1.0
            0x0E, 0x02, 0x00, 0x01, 0x00, // br_table 0 1 0
            0x11, 0x01, 0x00, // call_indirect type 1
            0x28, 0x02, 0x08, // i32.load align=2 offset=8
            0x40, 0x00, // memory.grow
            0xFC, 0x00, // i32.trunc_sat_f32_s
            0xFC, 0x0A, 0x00, 0x00, // memory.copy
        ];
        let spans: Vec<usize> = decode_all(&bytes)
            .into_iter()
            .map(|op| match op {
                Opcode::Unknown(raw) => raw.len(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(spans, vec![2, 6, 5, 9, 5, 3, 3, 2, 2, 4]);
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        let mut input = InputStream::new(&[0x06]);
        assert!(matches!(
            input.read_opcode(),
            Err(Error::UnexpectedOpcode(0x06))
        ));
        let mut input = InputStream::new(&[0xFD, 0x00]);
        assert!(matches!(
            input.read_opcode(),
            Err(Error::UnexpectedOpcode(0xFD))
        ));
    }

    #[test]
    fn test_huge_result_count_hits_eof() {
        let mut input = InputStream::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x7F]);
        assert!(matches!(
            input.read_result_types(),
            Err(Error::UnexpectedEof { offset: 6, .. })
        ));
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_var_u32_rejects_bits_past_32() {
        let mut input = InputStream::new(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        input.read_u8().unwrap();
        assert!(matches!(
            input.read_var_u32(),
            Err(Error::InvalidLeb128 { offset: 5, width: 32 })
        ));
    }

    #[test]
    fn test_leb_errors_use_stream_offsets() {
        let mut input = InputStream::new(&[0x00, 0x00, 0x80]);
        input.read(2).unwrap();
        assert!(matches!(
            input.read_var_u32(),
            Err(Error::UnexpectedEof { offset: 3, .. })
        ));
    }
}
