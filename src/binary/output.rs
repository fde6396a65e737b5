//! Byte sinks and section framing.

use std::io::Write;

use super::leb128::encode_unsigned;
use crate::error::Result;
use crate::module::SectionType;

/// Destination for emitted module bytes. Writes only ever append.
pub trait OutputWriter {
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Writes `value` as unsigned LEB128.
    fn write_var_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&encode_unsigned(u64::from(value)))
    }
}

impl OutputWriter for Vec<u8> {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.push(byte);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Collects output in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutputWriter {
    bytes: Vec<u8>,
}

impl InMemoryOutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl OutputWriter for InMemoryOutputWriter {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.bytes.push(byte);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

/// Streams output into any [`std::io::Write`], such as a file.
#[derive(Debug)]
pub struct IoOutputWriter<W> {
    inner: W,
}

impl<W: Write> IoOutputWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> OutputWriter for IoOutputWriter<W> {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.inner.write_all(&[byte])?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}

/// Writes one section: the id byte, then the LEB128 size of whatever `body`
/// wrote, then the body itself.
pub fn write_section<W, T, F>(section: SectionType, writer: &mut W, body: F) -> Result<T>
where
    W: OutputWriter + ?Sized,
    F: FnOnce(&mut InMemoryOutputWriter) -> Result<T>,
{
    writer.write_byte(section.byte())?;
    let mut buffer = InMemoryOutputWriter::new();
    let result = body(&mut buffer)?;
    writer.write_var_u32(buffer.len() as u32)?;
    writer.write_bytes(buffer.bytes())?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_section_prefixes_body_length() {
        let mut out = Vec::new();
        let returned = write_section(SectionType::Function, &mut out, |body| {
            body.write_var_u32(2)?;
            body.write_bytes(&[0x00, 0x01])?;
            Ok(42)
        })
        .unwrap();
        assert_eq!(returned, 42);
        assert_eq!(out, vec![0x03, 0x03, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn test_write_section_multi_byte_length() {
        let mut out = InMemoryOutputWriter::with_capacity(256);
        write_section(SectionType::Custom, &mut out, |body| {
            body.write_bytes(&[0xAA; 200])
        })
        .unwrap();
        assert_eq!(&out.bytes()[..3], &[0x00, 0xC8, 0x01]);
        assert_eq!(out.len(), 203);
    }

    #[test]
    fn test_io_writer_forwards_bytes() {
        let mut writer = IoOutputWriter::new(Vec::new());
        writer.write_byte(0x01).unwrap();
        writer.write_bytes(&[0x02, 0x03]).unwrap();
        writer.write_var_u32(128).unwrap();
        assert_eq!(writer.into_inner(), vec![0x01, 0x02, 0x03, 0x80, 0x01]);
    }
}
