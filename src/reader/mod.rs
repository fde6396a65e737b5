//! Read-only, single-pass view over a module's sections.
//!
//! Type, import, function and element sections are decoded lazily through
//! per-section readers; every other section is handed back as raw content.
//! Nothing here is used by the transform itself.
//!
//! ```
//! use wasm_transformer::reader::{ModuleReader, ModuleSection};
//!
//! let wasm = wat::parse_str(r#"(module (func (param i64)))"#).unwrap();
//! let mut reader = ModuleReader::new(&wasm);
//! reader.read_header().unwrap();
//! while let Some(section) = reader.read_section().unwrap() {
//!     if let ModuleSection::Type(types) = section {
//!         assert_eq!(types.get_count(), 1);
//!     }
//! }
//! ```

mod sections;

pub use sections::{
    ElementSectionReader, ElementSegment, FunctionSectionReader, Import, ImportDescriptor,
    ImportSectionReader, SectionReader, TypeSectionReader,
};

use crate::binary::InputStream;
use crate::error::{Error, Result};
use crate::module::{SectionType, MAGIC, VERSION};

/// One top-level section.
#[derive(Debug)]
pub enum ModuleSection<'a> {
    Type(TypeSectionReader<'a>),
    Import(ImportSectionReader<'a>),
    Function(FunctionSectionReader<'a>),
    Element(ElementSectionReader<'a>),
    Raw {
        section_type: SectionType,
        content: &'a [u8],
    },
}

impl ModuleSection<'_> {
    pub fn section_type(&self) -> SectionType {
        match self {
            ModuleSection::Type(_) => SectionType::Type,
            ModuleSection::Import(_) => SectionType::Import,
            ModuleSection::Function(_) => SectionType::Function,
            ModuleSection::Element(_) => SectionType::Elem,
            ModuleSection::Raw { section_type, .. } => *section_type,
        }
    }
}

/// Walks a module one section at a time.
#[derive(Debug, Clone)]
pub struct ModuleReader<'a> {
    input: InputStream<'a>,
}

impl<'a> ModuleReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            input: InputStream::new(bytes),
        }
    }

    /// Reads and checks the magic number and version, returning all 8 bytes.
    pub fn read_header(&mut self) -> Result<&'a [u8]> {
        let header = self.input.read(8)?;
        if header[..4] != MAGIC {
            return Err(Error::InvalidMagic);
        }
        if header[4..] != VERSION {
            return Err(Error::InvalidVersion);
        }
        Ok(header)
    }

    /// Reads the next section, or `None` at the end of input.
    pub fn read_section(&mut self) -> Result<Option<ModuleSection<'a>>> {
        if self.input.is_eof() {
            return Ok(None);
        }
        let id = self.input.read_u8()?;
        let size = self.input.read_var_u32()? as usize;
        let content = self.input.read(size)?;
        let section_type = SectionType::from_byte(id).ok_or(Error::UnexpectedSection(id))?;
        let section = match section_type {
            SectionType::Type => ModuleSection::Type(sections::type_section(content)?),
            SectionType::Import => ModuleSection::Import(sections::import_section(content)?),
            SectionType::Function => {
                ModuleSection::Function(sections::function_section(content)?)
            }
            SectionType::Elem => ModuleSection::Element(sections::element_section(content)?),
            section_type => ModuleSection::Raw {
                section_type,
                content,
            },
        };
        Ok(Some(section))
    }
}
