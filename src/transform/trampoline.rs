//! Trampolines adapting i64 signatures to lowered imports.

use std::collections::HashMap;

use crate::binary::{Opcode, OutputWriter};
use crate::error::{Error, Result};
use crate::module::{FuncSignature, ValueType};

/// A synthesized function with the original i64 signature that wraps its
/// arguments to i32 and calls the lowered import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trampoline {
    pub from_signature: FuncSignature,
    pub to_signature: FuncSignature,
    pub from_signature_index: u32,
    /// Function index of the import being wrapped.
    pub original_func_index: u32,
}

impl Trampoline {
    /// The function body without its size prefix.
    pub fn body(&self) -> Vec<u8> {
        let mut body = vec![0x00]; // local decl count
        for (index, param) in self.from_signature.params.iter().enumerate() {
            Opcode::LocalGet(index as u32).encode(&mut body);
            if *param == ValueType::I64 {
                Opcode::I32WrapI64.encode(&mut body);
            }
        }
        Opcode::Call(self.original_func_index).encode(&mut body);
        Opcode::End.encode(&mut body);
        body
    }

    /// Writes the size-prefixed body as a code section entry.
    pub fn write<W: OutputWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let body = self.body();
        writer.write_var_u32(body.len() as u32)?;
        writer.write_bytes(&body)
    }
}

/// Trampolines in emission order, indexed by the import they wrap.
#[derive(Debug, Default)]
pub struct Trampolines {
    by_base_func_index: HashMap<u32, usize>,
    trampolines: Vec<Trampoline>,
}

impl Trampolines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trampolines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trampolines.is_empty()
    }

    pub fn add(
        &mut self,
        import_index: u32,
        from: FuncSignature,
        from_index: u32,
        to: FuncSignature,
    ) {
        let position = self.trampolines.len();
        self.trampolines.push(Trampoline {
            from_signature: from,
            to_signature: to,
            from_signature_index: from_index,
            original_func_index: import_index,
        });
        self.by_base_func_index.insert(import_index, position);
    }

    /// Looks up the trampoline wrapping function `index` and its position
    /// among all trampolines.
    pub fn by_base_func_index(&self, index: u32) -> Option<(&Trampoline, usize)> {
        let position = *self.by_base_func_index.get(&index)?;
        Some((&self.trampolines[position], position))
    }

    /// Function index `index` should be called through once trampolines are
    /// appended after `original_func_count` functions.
    pub fn relocate(&self, index: u32, original_func_count: u32) -> Result<Option<u32>> {
        self.by_base_func_index
            .get(&index)
            .map(|position| offset_by(original_func_count, *position))
            .transpose()
    }

    /// Number of functions once trampolines follow `count` existing ones.
    pub fn total_func_count(&self, count: u32) -> Result<u32> {
        offset_by(count, self.trampolines.len())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trampoline> {
        self.trampolines.iter()
    }
}

fn offset_by(base: u32, extra: usize) -> Result<u32> {
    u32::try_from(extra)
        .ok()
        .and_then(|extra| base.checked_add(extra))
        .ok_or(Error::FunctionIndexOverflow)
}

impl<'a> IntoIterator for &'a Trampolines {
    type Item = &'a Trampoline;
    type IntoIter = std::slice::Iter<'a, Trampoline>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
