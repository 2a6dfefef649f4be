//! Bit reader for DEFLATE streams.
//!
//! Reads bits LSB first (RFC 1951 convention) through a 64-bit
//! accumulator that is refilled 32 bits at a time, so that at least 15
//! bits are available before every symbol decode unless the input has run
//! out.

use super::{DecompressError, Result};

/// Bits guaranteed by [`BitReader::refill`] while input remains.
pub const MIN_BITS: u32 = 15;

/// Bit reader that reads from a byte slice.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Next unread byte of `data`.
    pos: usize,
    /// Bit accumulator; the next bit to consume is bit 0.
    val: u64,
    /// Valid bits in `val`.
    bits: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            val: 0,
            bits: 0,
        }
    }

    /// Top up the accumulator to at least [`MIN_BITS`] bits.
    ///
    /// Loads four bytes at once; near the end of the input it takes what
    /// is left. Running short is only an error once a caller consumes
    /// bits that are not there.
    #[inline]
    pub fn refill(&mut self) {
        if self.bits >= MIN_BITS {
            return;
        }
        if let Some(chunk) = self.data.get(self.pos..self.pos + 4) {
            let next = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.val |= u64::from(next) << self.bits;
            self.bits += 32;
            self.pos += 4;
            return;
        }
        while self.bits < MIN_BITS {
            let Some(&byte) = self.data.get(self.pos) else {
                break;
            };
            self.val |= u64::from(byte) << self.bits;
            self.bits += 8;
            self.pos += 1;
        }
    }

    /// Peek at the next `n` bits without consuming them. Bits past the end
    /// of the input read as zero.
    #[inline]
    pub fn peek_bits(&self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        (self.val & ((1u64 << n) - 1)) as u32
    }

    /// Drop `n` bits.
    #[inline]
    pub fn consume(&mut self, n: u32) -> Result<()> {
        if n > self.bits {
            return Err(DecompressError::UnexpectedEof);
        }
        self.val >>= n;
        self.bits -= n;
        Ok(())
    }

    /// Read `n` bits (at most 16) and advance.
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= 16);
        self.refill();
        let value = self.peek_bits(n);
        self.consume(n)?;
        Ok(value)
    }

    /// Discard the partial byte in the accumulator and hand any whole
    /// bytes still buffered back to the input.
    pub fn align_to_byte(&mut self) {
        self.pos -= (self.bits / 8) as usize;
        self.val = 0;
        self.bits = 0;
    }

    /// Take `n` raw bytes. Only meaningful right after
    /// [`align_to_byte`](Self::align_to_byte).
    pub fn read_aligned(&mut self, n: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.bits, 0);
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or(DecompressError::UnexpectedEof)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Get the current byte position (bytes consumed from stream).
    pub fn byte_position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_lsb_first() {
        let data = [0b1011_0100, 0b1100_1010];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bits(4).unwrap(), 0b0100);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1011);
        assert_eq!(reader.read_bits(8).unwrap(), 0b1100_1010);
    }

    #[test]
    fn test_refill_takes_four_bytes() {
        let data = [1, 2, 3, 4, 5, 6];
        let mut reader = BitReader::new(&data);
        reader.refill();
        assert_eq!(reader.bits, 32);
        assert_eq!(reader.byte_position(), 4);
        assert_eq!(reader.peek_bits(16), 0x0201);
    }

    #[test]
    fn test_refill_tail_bytewise() {
        let data = [0xAA, 0xBB];
        let mut reader = BitReader::new(&data);
        reader.refill();
        assert_eq!(reader.bits, 16);
        assert_eq!(reader.byte_position(), data.len());
    }

    #[test]
    fn test_eof() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bits(1), Err(DecompressError::UnexpectedEof));
    }

    #[test]
    fn test_align_returns_unused_bytes() {
        let data = [0x05, 0x11, 0x22, 0x33, 0x44];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        reader.align_to_byte();
        assert_eq!(reader.byte_position(), 1);
        assert_eq!(reader.read_aligned(2).unwrap(), &[0x11, 0x22]);
        assert_eq!(reader.read_aligned(3), Err(DecompressError::UnexpectedEof));
    }
}
