//! XZ variable-length integers.
//!
//! Each byte contributes seven bits, least significant group first; the
//! high bit says whether another byte follows. At most nine bytes (63
//! bits) are allowed, and a trailing zero byte after the first is a
//! non-minimal encoding and rejected.

use super::super::{DecompressError, Result};

/// Longest valid encoding.
pub const VLI_BYTES_MAX: u32 = 9;

/// Incremental VLI decoder that can resume across input buffers.
#[derive(Debug, Clone, Default)]
pub struct VliDecoder {
    value: u64,
    shift: u32,
}

impl VliDecoder {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consume bytes from `input[*in_pos..]` until the integer ends.
    /// Returns `None` if the input ran out first.
    pub fn decode(&mut self, input: &[u8], in_pos: &mut usize) -> Result<Option<u64>> {
        while let Some(&byte) = input.get(*in_pos) {
            *in_pos += 1;
            self.value |= u64::from(byte & 0x7F) << self.shift;

            if byte & 0x80 == 0 {
                if byte == 0 && self.shift != 0 {
                    return Err(DecompressError::Corrupt("non-minimal variable-length integer"));
                }
                let value = self.value;
                self.reset();
                return Ok(Some(value));
            }

            self.shift += 7;
            if self.shift == 7 * VLI_BYTES_MAX {
                return Err(DecompressError::Corrupt("variable-length integer too long"));
            }
        }
        Ok(None)
    }
}

/// Read one complete VLI from a fully buffered field such as a block
/// header. Returns the value and the bytes consumed.
#[inline]
pub fn read_vli(data: &[u8]) -> Result<(u64, usize)> {
    let mut decoder = VliDecoder::default();
    let mut pos = 0;
    match decoder.decode(data, &mut pos)? {
        Some(value) => Ok((value, pos)),
        None => Err(DecompressError::Corrupt("truncated variable-length integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_vli() {
        assert_eq!(read_vli(&[0x00]), Ok((0, 1)));
        assert_eq!(read_vli(&[0x7F]), Ok((127, 1)));
    }

    #[test]
    fn test_multi_byte_vli() {
        assert_eq!(read_vli(&[0x80, 0x01]), Ok((128, 2)));
        assert_eq!(read_vli(&[0xFF, 0x01, 0xAA]), Ok((255, 2)));
        assert_eq!(read_vli(&[0x80, 0x80, 0x01]), Ok((16384, 3)));
    }

    #[test]
    fn test_largest_vli() {
        let mut data = [0xFFu8; 9];
        data[8] = 0x7F;
        assert_eq!(read_vli(&data), Ok((u64::MAX >> 1, 9)));
    }

    #[test]
    fn test_vli_too_long() {
        assert!(read_vli(&[0x80; 10]).is_err());
    }

    #[test]
    fn test_non_minimal_vli() {
        // 0 encoded in two bytes.
        assert!(read_vli(&[0x80, 0x00]).is_err());
    }

    #[test]
    fn test_truncated_vli() {
        assert!(read_vli(&[0x80]).is_err());
        assert!(read_vli(&[]).is_err());
    }

    #[test]
    fn test_resume_across_buffers() {
        let mut decoder = VliDecoder::default();
        let mut pos = 0;
        assert_eq!(decoder.decode(&[0x80], &mut pos), Ok(None));
        assert_eq!(pos, 1);
        let mut pos = 0;
        assert_eq!(decoder.decode(&[0x80, 0x01, 0x05], &mut pos), Ok(Some(16384)));
        assert_eq!(pos, 2);
        assert_eq!(decoder.decode(&[0x80, 0x01, 0x05], &mut pos), Ok(Some(5)));
    }
}
