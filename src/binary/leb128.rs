//! LEB128 variable-length integers.
//!
//! Each byte carries seven data bits, low group first; a set high bit means
//! another byte follows. Decoding stops at the first byte with the high bit
//! clear and never reads more bytes than `width` bits need.
//!
//! Offsets in returned errors are relative to the start of `bytes`.

use crate::error::{Error, Result};

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;
const SIGN: u8 = 0x40;

fn max_len(width: u32) -> usize {
    width.div_ceil(7) as usize
}

fn truncated(bytes: &[u8], width: u32) -> Error {
    if bytes.len() < max_len(width) {
        Error::UnexpectedEof {
            offset: bytes.len(),
            needed: 1,
        }
    } else {
        Error::InvalidLeb128 { offset: 0, width }
    }
}

/// Decodes an unsigned value of at most `width` bits.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_unsigned(bytes: &[u8], width: u32) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (index, &byte) in bytes.iter().take(max_len(width)).enumerate() {
        let bits_left = width - shift;
        // The last byte may only carry the bits left in `width`.
        if bits_left < 7 && (byte & PAYLOAD) >> bits_left != 0 {
            return Err(Error::InvalidLeb128 {
                offset: index,
                width,
            });
        }
        value |= u64::from(byte & PAYLOAD) << shift;
        if byte & CONTINUATION == 0 {
            return Ok((value, index + 1));
        }
        shift += 7;
    }
    Err(truncated(bytes, width))
}

/// Decodes a two's complement signed value of at most `width` bits.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_signed(bytes: &[u8], width: u32) -> Result<(i64, usize)> {
    let mut value = 0i64;
    let mut shift = 0u32;
    for (index, &byte) in bytes.iter().take(max_len(width)).enumerate() {
        let bits_left = width - shift;
        // Bits of the last byte past `width` must repeat its sign bit.
        if bits_left < 7 {
            let extension = (byte & PAYLOAD) >> (bits_left - 1);
            let sign_extended = extension == 0 || extension == PAYLOAD >> (bits_left - 1);
            if byte & CONTINUATION != 0 || !sign_extended {
                return Err(Error::InvalidLeb128 {
                    offset: index,
                    width,
                });
            }
        }
        value |= i64::from(byte & PAYLOAD) << shift;
        shift += 7;
        if byte & CONTINUATION == 0 {
            if shift < 64 && byte & SIGN != 0 {
                value |= -1i64 << shift;
            }
            return Ok((value, index + 1));
        }
    }
    Err(truncated(bytes, width))
}

/// Encodes `value` in the fewest bytes possible.
pub fn encode_unsigned(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    loop {
        let mut byte = (value as u8) & PAYLOAD;
        value >>= 7;
        if value != 0 {
            byte |= CONTINUATION;
        }
        bytes.push(byte);
        if value == 0 {
            return bytes;
        }
    }
}

/// Encodes `value` in the fewest bytes possible.
pub fn encode_signed(mut value: i64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    loop {
        let byte = (value as u8) & PAYLOAD;
        value >>= 7;
        let done = (value == 0 && byte & SIGN == 0) || (value == -1 && byte & SIGN != 0);
        if done {
            bytes.push(byte);
            return bytes;
        }
        bytes.push(byte | CONTINUATION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_known_encodings() {
        assert_eq!(encode_unsigned(0), vec![0x00]);
        assert_eq!(encode_unsigned(127), vec![0x7F]);
        assert_eq!(encode_unsigned(128), vec![0x80, 0x01]);
        assert_eq!(encode_unsigned(624_485), vec![0xE5, 0x8E, 0x26]);
        assert_eq!(
            encode_unsigned(u32::MAX as u64),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
        );
    }

    #[test]
    fn test_unsigned_roundtrip_is_minimal() {
        let samples = [0u64, 1, 63, 64, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152];
        for value in samples
            .into_iter()
            .chain([268_435_455, 268_435_456, u32::MAX as u64])
        {
            let bytes = encode_unsigned(value);
            let bits = 64 - value.leading_zeros().min(63);
            assert_eq!(bytes.len(), bits.div_ceil(7).max(1) as usize, "value {value}");
            assert_eq!(decode_unsigned(&bytes, 32).unwrap(), (value, bytes.len()));
        }
    }

    #[test]
    fn test_decode_stops_at_first_terminal_byte() {
        let bytes = [0xE5, 0x8E, 0x26, 0xFF, 0xFF];
        assert_eq!(decode_unsigned(&bytes, 32).unwrap(), (624_485, 3));
    }

    #[test]
    fn test_decode_accepts_padded_encoding() {
        // Linkers pad section sizes to five bytes.
        let bytes = [0x84, 0x80, 0x80, 0x80, 0x00];
        assert_eq!(decode_unsigned(&bytes, 32).unwrap(), (4, 5));
    }

    #[test]
    fn test_decode_rejects_overlong_value() {
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            decode_unsigned(&bytes, 32),
            Err(Error::InvalidLeb128 { width: 32, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bits_past_width() {
        assert_eq!(
            decode_unsigned(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], 32).unwrap(),
            (u64::from(u32::MAX), 5)
        );
        assert!(matches!(
            decode_unsigned(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F], 32),
            Err(Error::InvalidLeb128 { offset: 4, width: 32 })
        ));
        assert!(matches!(
            decode_unsigned(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02], 64),
            Err(Error::InvalidLeb128 { offset: 9, width: 64 })
        ));

        assert_eq!(
            decode_signed(&[0x80, 0x80, 0x80, 0x80, 0x78], 32).unwrap(),
            (i64::from(i32::MIN), 5)
        );
        assert!(matches!(
            decode_signed(&[0xFF, 0xFF, 0xFF, 0xFF, 0x4F], 32),
            Err(Error::InvalidLeb128 { offset: 4, width: 32 })
        ));
    }

    #[test]
    fn test_decode_reports_truncation() {
        assert!(matches!(
            decode_unsigned(&[0x80, 0x80], 32),
            Err(Error::UnexpectedEof { offset: 2, .. })
        ));
        assert!(matches!(
            decode_signed(&[], 64),
            Err(Error::UnexpectedEof { offset: 0, .. })
        ));
    }

    #[test]
    fn test_signed_known_encodings() {
        assert_eq!(decode_signed(&[0x7F], 32).unwrap(), (-1, 1));
        assert_eq!(decode_signed(&[0x3F], 32).unwrap(), (63, 1));
        assert_eq!(decode_signed(&[0xC0, 0x00], 32).unwrap(), (64, 2));
        assert_eq!(decode_signed(&[0xC0, 0xBB, 0x78], 32).unwrap(), (-123_456, 3));
        assert_eq!(encode_signed(-123_456), vec![0xC0, 0xBB, 0x78]);
        assert_eq!(encode_signed(64), vec![0xC0, 0x00]);
    }

    #[test]
    fn test_signed_roundtrip_extremes() {
        for value in [i64::MIN, i64::MAX, i32::MIN as i64, i32::MAX as i64, -64, -65, 0] {
            let bytes = encode_signed(value);
            assert_eq!(decode_signed(&bytes, 64).unwrap(), (value, bytes.len()));
        }
    }
}
