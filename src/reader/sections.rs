//! Lazy readers for the entries of individual sections.

use crate::binary::InputStream;
use crate::error::{Error, Result};
use crate::module::{ExternalKind, FuncSignature, FUNC_FORM};

/// Iterates the entries of one vector-shaped section body.
///
/// Iteration stops after the declared count, or after the first error.
pub struct SectionReader<'a, T> {
    input: InputStream<'a>,
    count: u32,
    remaining: u32,
    read_entry: fn(&mut InputStream<'a>) -> Result<T>,
}

impl<'a, T> SectionReader<'a, T> {
    fn new(content: &'a [u8], read_entry: fn(&mut InputStream<'a>) -> Result<T>) -> Result<Self> {
        let mut input = InputStream::new(content);
        let count = input.read_var_u32()?;
        Ok(Self {
            input,
            count,
            remaining: count,
            read_entry,
        })
    }

    /// Number of entries the section declares.
    pub fn get_count(&self) -> u32 {
        self.count
    }
}

impl<T> std::fmt::Debug for SectionReader<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionReader")
            .field("count", &self.count)
            .field("remaining", &self.remaining)
            .field("offset", &self.input.offset())
            .finish()
    }
}

impl<T> Iterator for SectionReader<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = (self.read_entry)(&mut self.input);
        self.remaining = if entry.is_ok() { self.remaining - 1 } else { 0 };
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

pub type TypeSectionReader<'a> = SectionReader<'a, FuncSignature>;
pub type ImportSectionReader<'a> = SectionReader<'a, Import<'a>>;
pub type FunctionSectionReader<'a> = SectionReader<'a, u32>;
pub type ElementSectionReader<'a> = SectionReader<'a, ElementSegment>;

/// An import entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import<'a> {
    pub module: String,
    pub field: String,
    pub descriptor: ImportDescriptor<'a>,
}

/// What an import provides. Non-function descriptors keep their raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDescriptor<'a> {
    Function { type_index: u32 },
    Table(&'a [u8]),
    Memory(&'a [u8]),
    Global(&'a [u8]),
}

/// An active element segment with an `i32.const` offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub table_index: u32,
    pub offset: i32,
    pub function_indices: Vec<u32>,
}

fn read_signature(input: &mut InputStream<'_>) -> Result<FuncSignature> {
    let form = input.read_u8()?;
    if form != FUNC_FORM {
        return Err(Error::InvalidFormType(form));
    }
    let (params, _) = input.read_result_types()?;
    let (results, _) = input.read_result_types()?;
    Ok(FuncSignature::new(params, results))
}

fn read_import<'a>(input: &mut InputStream<'a>) -> Result<Import<'a>> {
    let module = input.read_string()?;
    let field = input.read_string()?;
    let raw_kind = input.read_u8()?;
    let descriptor = match ExternalKind::from_byte(raw_kind) {
        Some(ExternalKind::Func) => ImportDescriptor::Function {
            type_index: input.read_var_u32()?,
        },
        Some(ExternalKind::Table) => ImportDescriptor::Table(input.consume_table()?),
        Some(ExternalKind::Memory) => ImportDescriptor::Memory(input.consume_memory()?),
        Some(ExternalKind::Global) => ImportDescriptor::Global(input.consume_global_header()?),
        Some(kind @ ExternalKind::Except) => return Err(Error::UnsupportedExternalKind(kind)),
        None => return Err(Error::InvalidExternalKind(raw_kind)),
    };
    Ok(Import {
        module,
        field,
        descriptor,
    })
}

fn read_type_index(input: &mut InputStream<'_>) -> Result<u32> {
    input.read_var_u32()
}

fn read_element_segment(input: &mut InputStream<'_>) -> Result<ElementSegment> {
    let table_index = input.read_var_u32()?;
    let expr = input.consume_i32_init_expr()?;
    let offset = InputStream::new(&expr[1..]).read_var_i32()?;
    let count = input.read_var_u32()?;
    let function_indices = (0..count)
        .map(|_| input.read_var_u32())
        .collect::<Result<Vec<_>>>()?;
    Ok(ElementSegment {
        table_index,
        offset,
        function_indices,
    })
}

pub(super) fn type_section(content: &[u8]) -> Result<TypeSectionReader<'_>> {
    SectionReader::new(content, read_signature)
}

pub(super) fn import_section(content: &[u8]) -> Result<ImportSectionReader<'_>> {
    SectionReader::new(content, read_import)
}

pub(super) fn function_section(content: &[u8]) -> Result<FunctionSectionReader<'_>> {
    SectionReader::new(content, read_type_index)
}

pub(super) fn element_section(content: &[u8]) -> Result<ElementSectionReader<'_>> {
    SectionReader::new(content, read_element_segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ValueType;

    #[test]
    fn test_type_entries() {
        let content = [0x02, 0x60, 0x01, 0x7E, 0x00, 0x60, 0x00, 0x01, 0x7C];
        let reader = type_section(&content).unwrap();
        assert_eq!(reader.get_count(), 2);
        let signatures: Vec<_> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(
            signatures,
            vec![
                FuncSignature::new(vec![ValueType::I64], vec![]),
                FuncSignature::new(vec![], vec![ValueType::F64]),
            ]
        );
    }

    #[test]
    fn test_import_entries() {
        let content = [
            0x02, //
            0x03, b'e', b'n', b'v', 0x01, b'f', 0x00, 0x02, //
            0x03, b'e', b'n', b'v', 0x01, b'g', 0x03, 0x7F, 0x00,
        ];
        let imports: Vec<_> = import_section(&content)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(imports[0].module, "env");
        assert_eq!(imports[0].field, "f");
        assert_eq!(
            imports[0].descriptor,
            ImportDescriptor::Function { type_index: 2 }
        );
        assert_eq!(imports[1].descriptor, ImportDescriptor::Global(&[0x7F, 0x00]));
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let content = [0x03, 0x60, 0x00, 0x00, 0x5F, 0x60, 0x00, 0x00];
        let mut reader = type_section(&content).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next(),
            Some(Err(Error::InvalidFormType(0x5F)))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_element_entries() {
        let content = [0x01, 0x00, 0x41, 0x7F, 0x0B, 0x03, 0x00, 0x02, 0x01];
        let segments: Vec<_> = element_section(&content)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            segments,
            vec![ElementSegment {
                table_index: 0,
                offset: -1,
                function_indices: vec![0, 2, 1],
            }]
        );
    }

    #[test]
    fn test_function_entries() {
        let content = [0x03, 0x00, 0x01, 0x00];
        let indices: Vec<u32> = function_section(&content)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(indices, vec![0, 1, 0]);
    }
}
