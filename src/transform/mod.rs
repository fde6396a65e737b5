//! i64 import lowering.
//!
//! Embedders that only pass 32-bit integers across the host boundary cannot
//! call imports whose signatures mention `i64`. This transform lowers those
//! imports to i32 signatures and routes every internal use through a
//! trampoline that keeps the original signature.
//!
//! # How It Works
//!
//! 1. **Scan** the type and import sections. Each function import with an i64
//!    in its signature gets a lowered signature appended to the type section
//!    and a trampoline registered in import order.
//! 2. **Emit** the grown type section, the rewritten import section and any
//!    custom sections seen so far.
//! 3. **Rewrite** the function section (trampoline declarations), element
//!    segments and call instructions in code bodies so they target
//!    trampolines, then append trampoline bodies to the code section.
//! 4. **Copy** every other section unchanged.
//!
//! Trampoline positions are only known once the whole import section has
//! been scanned, so the transform always makes two passes.
//!
//! Exports of a lowered import are not redirected to its trampoline and keep
//! exposing the lowered signature.

mod sections;
mod trampoline;

pub use sections::{ImportFuncReplacement, ImportSection, TypeSection};
pub use trampoline::{Trampoline, Trampolines};

use tracing::{debug, warn};

use crate::binary::{InputStream, OutputWriter};
use crate::error::{Error, Result};
use crate::module::{RawSection, SectionType, MAGIC, VERSION};
use sections::{transform_code_section, transform_elem_section, transform_function_section};

/// Header of one top-level section.
struct SectionHeader {
    id: u8,
    /// Offset of the id byte.
    start: usize,
    /// Offset of the first content byte.
    content_start: usize,
    size: usize,
}

impl SectionHeader {
    fn read(input: &mut InputStream<'_>) -> Result<Self> {
        let start = input.offset();
        let id = input.read_u8()?;
        let size = input.read_var_u32()? as usize;
        Ok(Self {
            id,
            start,
            content_start: input.offset(),
            size,
        })
    }

    fn end(&self) -> usize {
        self.content_start + self.size
    }

    fn span(&self) -> RawSection {
        self.start..self.end()
    }

    /// Checks that parsing the contents stopped exactly at the section end.
    fn finish(&self, input: &InputStream<'_>) -> Result<()> {
        if input.offset() != self.end() {
            return Err(Error::SectionSizeMismatch {
                id: self.id,
                declared: self.size,
                consumed: input.offset() - self.content_start,
            });
        }
        Ok(())
    }
}

/// Rewrites i64-bearing function imports to i32 signatures behind
/// trampolines.
///
/// # Example
///
/// ```
/// use wasm_transformer::binary::{InMemoryOutputWriter, InputStream};
/// use wasm_transformer::I64Transformer;
///
/// let wasm = wat::parse_str(r#"
///     (module
///         (type $t (func (param i64)))
///         (import "env" "f" (func $f (type $t)))
///         (func (export "run") i64.const 1 call $f))
/// "#).unwrap();
///
/// let mut input = InputStream::new(&wasm);
/// let mut output = InMemoryOutputWriter::new();
/// I64Transformer::new().transform(&mut input, &mut output).unwrap();
/// assert_ne!(output.bytes(), &wasm[..]);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct I64Transformer;

impl I64Transformer {
    pub fn new() -> Self {
        Self
    }

    /// Reads a whole module from `input` and writes the lowered module to
    /// `writer`.
    ///
    /// # Errors
    ///
    /// Fails on a bad header, a section out of order, an unsupported import
    /// kind or initializer, an unknown opcode, or truncated input. Whatever
    /// was written to `writer` before the error is not a valid module.
    pub fn transform<W: OutputWriter + ?Sized>(
        &self,
        input: &mut InputStream<'_>,
        writer: &mut W,
    ) -> Result<()> {
        if input.read(4)? != MAGIC {
            return Err(Error::InvalidMagic);
        }
        writer.write_bytes(&MAGIC)?;
        if input.read(4)? != VERSION {
            return Err(Error::InvalidVersion);
        }
        writer.write_bytes(&VERSION)?;

        let mut trampolines = Trampolines::new();
        let imported_func_count = self.prescan(input, writer, &mut trampolines)?;
        self.rewrite(input, writer, &trampolines, imported_func_count)
    }

    /// Scans type and import sections, then writes them along with custom
    /// sections found on the way. Returns the number of imported functions.
    fn prescan<W: OutputWriter + ?Sized>(
        &self,
        input: &mut InputStream<'_>,
        writer: &mut W,
        trampolines: &mut Trampolines,
    ) -> Result<u32> {
        let bytes = input.bytes();
        let mut raw_sections: Vec<RawSection> = Vec::new();
        let mut type_section = TypeSection::default();
        let mut import_section = None;
        let mut imported_func_count = 0;

        while !input.is_eof() {
            let header = SectionHeader::read(input)?;
            match SectionType::from_byte(header.id) {
                Some(SectionType::Type) => {
                    type_section.scan(input)?;
                    debug!(
                        signatures = type_section.signatures().len(),
                        "scanned type section"
                    );
                }
                Some(SectionType::Import) => {
                    let mut section = ImportSection::new(
                        bytes.get(header.span()).ok_or(Error::UnexpectedEof {
                            offset: header.content_start,
                            needed: header.size,
                        })?,
                    );
                    imported_func_count =
                        section.scan(input, &mut type_section, trampolines)?;
                    debug!(
                        functions = imported_func_count,
                        lowered = trampolines.len(),
                        "scanned import section"
                    );
                    import_section = Some(section);
                    header.finish(input)?;
                    break;
                }
                Some(SectionType::Custom) => {
                    raw_sections.push(header.span());
                    input.read(header.size)?;
                }
                Some(other) => return Err(Error::ExpectTypeOrImportSection(other)),
                None => return Err(Error::UnexpectedSection(header.id)),
            }
            header.finish(input)?;
        }

        type_section.write(writer)?;
        if let Some(section) = import_section.as_mut() {
            section.write(writer)?;
        }
        for raw_section in &raw_sections {
            writer.write_bytes(&bytes[raw_section.clone()])?;
        }
        if !raw_sections.is_empty() {
            debug!(count = raw_sections.len(), "replayed custom sections");
        }
        Ok(imported_func_count)
    }

    /// Second pass over everything after the import section.
    fn rewrite<W: OutputWriter + ?Sized>(
        &self,
        input: &mut InputStream<'_>,
        writer: &mut W,
        trampolines: &Trampolines,
        imported_func_count: u32,
    ) -> Result<()> {
        let bytes = input.bytes();
        let mut original_func_count: Option<u32> = None;

        while !input.is_eof() {
            let header = SectionHeader::read(input)?;
            match SectionType::from_byte(header.id) {
                Some(SectionType::Type | SectionType::Import) => {
                    return Err(Error::UnexpectedSection(header.id));
                }
                Some(SectionType::Function) => {
                    let defined = transform_function_section(input, writer, trampolines)?;
                    original_func_count = Some(
                        defined
                            .checked_add(imported_func_count)
                            .ok_or(Error::FunctionIndexOverflow)?,
                    );
                }
                Some(SectionType::Elem) => {
                    let count = original_func_count.ok_or(Error::ExpectFunctionSection)?;
                    transform_elem_section(input, writer, trampolines, count)?;
                }
                Some(SectionType::Code) => {
                    let count = original_func_count.ok_or(Error::ExpectFunctionSection)?;
                    transform_code_section(input, writer, trampolines, count)?;
                }
                Some(section) => {
                    if section == SectionType::Export && !trampolines.is_empty() {
                        warn!("exports of lowered imports keep their i32 signature");
                    }
                    input.read(header.size)?;
                    let span = header.span();
                    writer.write_bytes(&bytes[span])?;
                }
                None => return Err(Error::UnexpectedSection(header.id)),
            }
            header.finish(input)?;
        }
        Ok(())
    }
}
