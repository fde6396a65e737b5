//! Decoded instructions.

use super::leb128::encode_unsigned;

pub const OP_END: u8 = 0x0B;
pub const OP_CALL: u8 = 0x10;
pub const OP_LOCAL_GET: u8 = 0x20;
pub const OP_I32_WRAP_I64: u8 = 0xA7;

/// One instruction from a function body.
///
/// Only the instructions the i64 lowering acts on get their own variant.
/// Everything else is `Unknown` and keeps the exact bytes it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode<'a> {
    End,
    Call(u32),
    LocalGet(u32),
    I32WrapI64,
    Unknown(&'a [u8]),
}

impl Opcode<'_> {
    /// Appends the binary encoding of this instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Opcode::End => out.push(OP_END),
            Opcode::Call(func_index) => {
                out.push(OP_CALL);
                out.extend_from_slice(&encode_unsigned(u64::from(*func_index)));
            }
            Opcode::LocalGet(local_index) => {
                out.push(OP_LOCAL_GET);
                out.extend_from_slice(&encode_unsigned(u64::from(*local_index)));
            }
            Opcode::I32WrapI64 => out.push(OP_I32_WRAP_I64),
            Opcode::Unknown(bytes) => out.extend_from_slice(bytes),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}
