//! Per-section rewrites used by the i64 lowering.

use tracing::{debug, trace};

use super::trampoline::Trampolines;
use crate::binary::{write_section, InputStream, Opcode, OutputWriter};
use crate::error::{Error, Result};
use crate::module::{ExternalKind, FuncSignature, SectionType, ValueType, FUNC_FORM};

/// The type section, kept in memory so lowered signatures can be appended.
#[derive(Debug, Default)]
pub struct TypeSection {
    signatures: Vec<FuncSignature>,
}

impl TypeSection {
    pub fn signatures(&self) -> &[FuncSignature] {
        &self.signatures
    }

    /// Appends a signature and returns its type index.
    pub fn append(&mut self, signature: FuncSignature) -> u32 {
        self.signatures.push(signature);
        self.signatures.len() as u32 - 1
    }

    pub fn get(&self, index: u32) -> Result<&FuncSignature> {
        self.signatures
            .get(index as usize)
            .ok_or(Error::UnknownType(index))
    }

    /// Reads every signature of a type section body.
    pub fn scan(&mut self, input: &mut InputStream<'_>) -> Result<()> {
        let count = input.read_var_u32()?;
        for _ in 0..count {
            let form = input.read_u8()?;
            if form != FUNC_FORM {
                return Err(Error::InvalidFormType(form));
            }
            let (params, _) = input.read_result_types()?;
            let (results, _) = input.read_result_types()?;
            self.append(FuncSignature::new(params, results));
        }
        Ok(())
    }

    pub fn write<W: OutputWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_section(SectionType::Type, writer, |buffer| {
            buffer.write_var_u32(self.signatures.len() as u32)?;
            for signature in &self.signatures {
                buffer.write_byte(FUNC_FORM)?;
                write_result_types(&signature.params, buffer)?;
                write_result_types(&signature.results, buffer)?;
            }
            Ok(())
        })
    }
}

/// https://webassembly.github.io/spec/core/binary/types.html#result-types
fn write_result_types<W: OutputWriter + ?Sized>(types: &[ValueType], writer: &mut W) -> Result<()> {
    writer.write_var_u32(types.len() as u32)?;
    for ty in types {
        writer.write_byte(ty.byte())?;
    }
    Ok(())
}

/// Import at position `index` must now use type `to_type_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportFuncReplacement {
    pub index: u32,
    pub to_type_index: u32,
}

/// The original import section bytes plus the type replacements found by
/// [`ImportSection::scan`].
#[derive(Debug)]
pub struct ImportSection<'a> {
    input: InputStream<'a>,
    replacements: Vec<ImportFuncReplacement>,
}

impl<'a> ImportSection<'a> {
    /// `section` spans the whole section, id byte and size included.
    pub fn new(section: &'a [u8]) -> Self {
        Self {
            input: InputStream::new(section),
            replacements: Vec::new(),
        }
    }

    pub fn replacements(&self) -> &[ImportFuncReplacement] {
        &self.replacements
    }

    /// Walks an import section body, lowering every i64-bearing function
    /// import. Returns the number of imported functions.
    pub fn scan(
        &mut self,
        input: &mut InputStream<'_>,
        types: &mut TypeSection,
        trampolines: &mut Trampolines,
    ) -> Result<u32> {
        let count = input.read_var_u32()?;
        let mut import_func_count = 0u32;
        for index in 0..count {
            input.consume_string()?; // module name
            input.consume_string()?; // field name
            let raw_kind = input.read_u8()?;
            match ExternalKind::from_byte(raw_kind) {
                Some(ExternalKind::Func) => {
                    let signature_index = input.read_var_u32()?;
                    let func_index = import_func_count;
                    import_func_count += 1;

                    let signature = types.get(signature_index)?;
                    if !signature.has_i64 {
                        continue;
                    }
                    let signature = signature.clone();
                    let lowered = signature.lowered();
                    let to_type_index = types.append(lowered.clone());
                    self.replacements.push(ImportFuncReplacement {
                        index,
                        to_type_index,
                    });
                    trace!(
                        import = index,
                        func = func_index,
                        from_type = signature_index,
                        to_type = to_type_index,
                        "lowering imported function"
                    );
                    trampolines.add(func_index, signature, signature_index, lowered);
                }
                Some(ExternalKind::Table) => {
                    input.consume_table()?;
                }
                Some(ExternalKind::Memory) => {
                    input.consume_memory()?;
                }
                Some(ExternalKind::Global) => {
                    input.consume_global_header()?;
                }
                Some(kind @ ExternalKind::Except) => {
                    return Err(Error::UnsupportedExternalKind(kind));
                }
                None => return Err(Error::InvalidExternalKind(raw_kind)),
            }
        }
        Ok(import_func_count)
    }

    /// Re-emits the section with replaced function type indices. Everything
    /// else is copied byte for byte.
    pub fn write<W: OutputWriter + ?Sized>(&mut self, writer: &mut W) -> Result<()> {
        let input = &mut self.input;
        let id = input.read_u8()?;
        input.read_var_u32()?; // old size
        let section = SectionType::from_byte(id).ok_or(Error::UnexpectedSection(id))?;

        write_section(section, writer, |buffer| {
            let count = input.read_var_u32()?;
            buffer.write_var_u32(count)?;
            for index in 0..count {
                buffer.write_bytes(input.consume_string()?)?; // module name
                buffer.write_bytes(input.consume_string()?)?; // field name
                let raw_kind = input.read_u8()?;
                buffer.write_byte(raw_kind)?;
                match ExternalKind::from_byte(raw_kind) {
                    Some(ExternalKind::Func) => {
                        let old_type_index = input.read_var_u32()?;
                        let new_type_index = self
                            .replacements
                            .iter()
                            .find(|replacement| replacement.index == index)
                            .map_or(old_type_index, |replacement| replacement.to_type_index);
                        buffer.write_var_u32(new_type_index)?;
                    }
                    Some(ExternalKind::Table) => buffer.write_bytes(input.consume_table()?)?,
                    Some(ExternalKind::Memory) => buffer.write_bytes(input.consume_memory()?)?,
                    Some(ExternalKind::Global) => {
                        buffer.write_bytes(input.consume_global_header()?)?
                    }
                    Some(kind @ ExternalKind::Except) => {
                        return Err(Error::UnsupportedExternalKind(kind));
                    }
                    None => return Err(Error::InvalidExternalKind(raw_kind)),
                }
            }
            Ok(())
        })
    }
}

/// Copies the function section and appends one entry per trampoline, typed
/// with the original (unlowered) signature. Returns the number of functions
/// the section originally declared.
pub fn transform_function_section<W: OutputWriter + ?Sized>(
    input: &mut InputStream<'_>,
    writer: &mut W,
    trampolines: &Trampolines,
) -> Result<u32> {
    write_section(SectionType::Function, writer, |buffer| {
        let count = input.read_var_u32()?;
        buffer.write_var_u32(trampolines.total_func_count(count)?)?;
        for _ in 0..count {
            buffer.write_var_u32(input.read_var_u32()?)?;
        }
        for trampoline in trampolines {
            buffer.write_var_u32(trampoline.from_signature_index)?;
        }
        debug!(
            functions = count,
            trampolines = trampolines.len(),
            "rewrote function section"
        );
        Ok(count)
    })
}

/// Points table entries that named a lowered import at its trampoline.
pub fn transform_elem_section<W: OutputWriter + ?Sized>(
    input: &mut InputStream<'_>,
    writer: &mut W,
    trampolines: &Trampolines,
    original_func_count: u32,
) -> Result<()> {
    write_section(SectionType::Elem, writer, |buffer| {
        let count = input.read_var_u32()?;
        buffer.write_var_u32(count)?;
        let mut relocated = 0usize;
        for _ in 0..count {
            buffer.write_var_u32(input.read_var_u32()?)?; // table index
            buffer.write_bytes(input.consume_i32_init_expr()?)?;
            let func_count = input.read_var_u32()?;
            buffer.write_var_u32(func_count)?;
            for _ in 0..func_count {
                let func_index = input.read_var_u32()?;
                match trampolines.relocate(func_index, original_func_count)? {
                    Some(target) => {
                        relocated += 1;
                        buffer.write_var_u32(target)?;
                    }
                    None => buffer.write_var_u32(func_index)?,
                }
            }
        }
        debug!(segments = count, relocated, "rewrote element section");
        Ok(())
    })
}

/// Redirects calls to lowered imports through their trampolines, then
/// appends the trampoline bodies.
pub fn transform_code_section<W: OutputWriter + ?Sized>(
    input: &mut InputStream<'_>,
    writer: &mut W,
    trampolines: &Trampolines,
    original_func_count: u32,
) -> Result<()> {
    write_section(SectionType::Code, writer, |buffer| {
        let count = input.read_var_u32()?;
        buffer.write_var_u32(trampolines.total_func_count(count)?)?;
        let mut relocated = 0usize;
        for _ in 0..count {
            let old_size = input.read_var_u32()? as usize;
            let body_end = input.offset() + old_size;
            let mut body = Vec::with_capacity(old_size.min(input.remaining()));

            body.extend_from_slice(input.consume_locals()?);
            while input.offset() < body_end {
                let start = input.offset();
                let opcode = input.read_opcode()?;
                let target = match opcode {
                    Opcode::Call(func_index) => trampolines
                        .relocate(func_index, original_func_count)?
                        .map(|target| (func_index, target)),
                    _ => None,
                };
                match target {
                    Some((from, to)) => {
                        trace!(from, to, "relocated call");
                        relocated += 1;
                        Opcode::Call(to).encode(&mut body);
                    }
                    None => body.extend_from_slice(&input.bytes()[start..input.offset()]),
                }
            }
            if input.offset() != body_end {
                return Err(Error::UnexpectedEof {
                    offset: body_end,
                    needed: input.offset() - body_end,
                });
            }
            buffer.write_var_u32(body.len() as u32)?;
            buffer.write_bytes(&body)?;
        }

        for trampoline in trampolines {
            trampoline.write(buffer)?;
        }
        debug!(
            bodies = count,
            relocated,
            trampolines = trampolines.len(),
            "rewrote code section"
        );
        Ok(())
    })
}
