//! LZMA sliding-window dictionary.
//!
//! A circular buffer of the block's declared dictionary size. Decoded bytes
//! land here first and are then flushed to the caller's output.
//!
//! These always hold:
//!
//! - `start <= pos <= full <= size`
//! - `pos <= limit <= size`
//! - `size <= size_max`
//!
//! The backing buffer grows on demand up to `size`, so a block that
//! declares a huge dictionary but decodes little data stays small.

use super::super::buffer::try_grow;
use super::super::stream::InOutBuffer;
use super::super::{DecompressError, Result};

/// Initial allocation once a dictionary is first written to.
const MIN_ALLOCATION: usize = 64 << 10;

#[derive(Debug)]
pub struct Dictionary {
    buf: Vec<u8>,
    /// Bytes before this position have already been flushed.
    start: usize,
    /// Write cursor.
    pos: usize,
    /// High-water mark; bounds valid match distances.
    full: usize,
    /// Writes stop here for the current call.
    limit: usize,
    /// Window size declared by the block header.
    size: usize,
    size_max: u32,
}

impl Dictionary {
    pub fn new(size_max: u32) -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            pos: 0,
            full: 0,
            limit: 0,
            size: 0,
            size_max,
        }
    }

    /// Set the window size for a new block, checked against the ceiling.
    pub fn set_size(&mut self, size: u32) -> Result<()> {
        if size > self.size_max {
            return Err(DecompressError::DictionaryTooLarge {
                size: u64::from(size),
                max: u64::from(self.size_max),
            });
        }
        self.size = size as usize;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn reset(&mut self) {
        self.start = 0;
        self.pos = 0;
        self.limit = 0;
        self.full = 0;
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Make sure bytes below `upto` can be written.
    fn reserve(&mut self, upto: usize) -> Result<()> {
        if upto <= self.buf.len() {
            return Ok(());
        }
        let target = upto
            .max(self.buf.len().saturating_mul(2))
            .max(MIN_ALLOCATION)
            .min(self.size);
        let additional = target - self.buf.len();
        try_grow(&mut self.buf, additional)
    }

    /// Allow at most `out_max` more bytes to be decoded in this call.
    pub fn set_limit(&mut self, out_max: usize) -> Result<()> {
        self.limit = if self.size - self.pos <= out_max {
            self.size
        } else {
            self.pos + out_max
        };
        self.reserve(self.limit)
    }

    #[inline]
    pub fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    /// Byte `dist + 1` positions back, or 0 while the dictionary is empty.
    #[inline]
    pub fn get(&self, dist: u32) -> u8 {
        if self.full == 0 {
            return 0;
        }
        let dist = dist as usize;
        let offset = if dist >= self.pos {
            (self.pos + self.size).wrapping_sub(dist + 1)
        } else {
            self.pos - dist - 1
        };
        self.buf.get(offset).copied().unwrap_or(0)
    }

    /// Append one byte. The caller checks [`has_space`](Self::has_space).
    #[inline]
    pub fn put(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
        if self.full < self.pos {
            self.full = self.pos;
        }
    }

    /// Copy up to `*len` bytes from `dist + 1` bytes back, stopping at the
    /// write limit. `*len` is reduced by the amount copied so the rest can
    /// be finished on the next call.
    pub fn repeat(&mut self, len: &mut u32, dist: u32) -> Result<()> {
        let dist = dist as usize;
        if dist >= self.full || dist >= self.size {
            return Err(DecompressError::InvalidBackReference {
                distance: dist + 1,
                available: self.full,
            });
        }

        let left = (self.limit - self.pos).min(*len as usize);
        *len -= left as u32;

        let mut back = if dist >= self.pos {
            self.pos + self.size - dist - 1
        } else {
            self.pos - dist - 1
        };

        if back + left <= self.pos {
            self.buf.copy_within(back..back + left, self.pos);
            self.pos += left;
        } else {
            for _ in 0..left {
                self.buf[self.pos] = self.buf[back];
                self.pos += 1;
                back += 1;
                if back == self.size {
                    back = 0;
                }
            }
        }

        if self.full < self.pos {
            self.full = self.pos;
        }
        Ok(())
    }

    /// Copy an uncompressed LZMA2 chunk straight through, keeping the
    /// dictionary in sync. `left` counts the chunk bytes still to copy.
    pub fn uncompressed(&mut self, b: &mut InOutBuffer, left: &mut u32) -> Result<()> {
        while *left > 0 && b.in_pos < b.input.len() && b.out_pos < b.output.len() {
            let copy = b
                .in_remaining()
                .min(b.out_remaining())
                .min(self.size - self.pos)
                .min(*left as usize);
            *left -= copy as u32;

            self.reserve(self.pos + copy)?;
            let src = &b.input[b.in_pos..b.in_pos + copy];
            self.buf[self.pos..self.pos + copy].copy_from_slice(src);
            self.pos += copy;
            if self.full < self.pos {
                self.full = self.pos;
            }
            if self.pos == self.size {
                self.pos = 0;
            }

            b.output[b.out_pos..b.out_pos + copy].copy_from_slice(src);
            self.start = self.pos;
            b.out_pos += copy;
            b.in_pos += copy;
        }
        Ok(())
    }

    /// Move bytes decoded since the last flush into `b.output`. Returns the
    /// number of bytes moved.
    pub fn flush(&mut self, b: &mut InOutBuffer) -> Result<usize> {
        let copy = self.pos - self.start;
        let dest = b
            .output
            .get_mut(b.out_pos..b.out_pos + copy)
            .ok_or(DecompressError::BufferOverflow)?;
        dest.copy_from_slice(&self.buf[self.start..self.pos]);
        if self.pos == self.size {
            self.pos = 0;
        }
        self.start = self.pos;
        b.out_pos += copy;
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(size: u32) -> Dictionary {
        let mut dict = Dictionary::new(u32::MAX);
        dict.set_size(size).unwrap();
        dict.reset();
        dict
    }

    #[test]
    fn test_size_max() {
        let mut dict = Dictionary::new(4096);
        assert!(dict.set_size(4096).is_ok());
        assert!(matches!(
            dict.set_size(8192),
            Err(DecompressError::DictionaryTooLarge { size: 8192, max: 4096 })
        ));
    }

    #[test]
    fn test_get_on_empty_is_zero() {
        let dict = dict(16);
        assert_eq!(dict.get(0), 0);
    }

    #[test]
    fn test_put_repeat_flush() {
        let mut dict = dict(64);
        dict.set_limit(10).unwrap();
        dict.put(b'a');
        dict.put(b'b');
        let mut len = 20;
        dict.repeat(&mut len, 1).unwrap();
        // Only 8 more bytes fit under the limit.
        assert_eq!(len, 12);
        assert!(!dict.has_space());

        let mut out = [0u8; 10];
        let mut b = InOutBuffer::new(&[], &mut out);
        assert_eq!(dict.flush(&mut b).unwrap(), 10);
        assert_eq!(b.written(), b"ababababab");
    }

    #[test]
    fn test_repeat_beyond_full() {
        let mut dict = dict(64);
        dict.set_limit(10).unwrap();
        dict.put(b'x');
        let mut len = 2;
        assert!(matches!(
            dict.repeat(&mut len, 1),
            Err(DecompressError::InvalidBackReference { distance: 2, available: 1 })
        ));
    }

    #[test]
    fn test_wraparound() {
        let mut dict = dict(4);
        let mut out = [0u8; 16];
        let mut b = InOutBuffer::new(&[], &mut out);

        dict.set_limit(4).unwrap();
        for &byte in b"wxyz" {
            dict.put(byte);
        }
        dict.flush(&mut b).unwrap();
        assert_eq!(dict.pos(), 0);

        // Distance 3 from position 0 reaches back across the wrap.
        dict.set_limit(2).unwrap();
        assert_eq!(dict.get(3), b'w');
        let mut len = 2;
        dict.repeat(&mut len, 3).unwrap();
        dict.flush(&mut b).unwrap();
        assert_eq!(b.written(), b"wxyzwx");
    }

    fn assert_invariant(dict: &Dictionary) {
        assert!(dict.start <= dict.pos, "start {} > pos {}", dict.start, dict.pos);
        assert!(dict.pos <= dict.full, "pos {} > full {}", dict.pos, dict.full);
        assert!(dict.full <= dict.size, "full {} > size {}", dict.full, dict.size);
        assert!(dict.pos <= dict.limit && dict.limit <= dict.size);
    }

    #[test]
    fn test_invariant_across_wraparound() {
        // xorshift keeps the operation mix reproducible.
        let mut state = 0x2545_f491_u32;
        let mut next = move |bound: u32| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state % bound
        };

        for size in [1u32, 2, 3, 7, 64, 4096] {
            let mut dict = dict(size);
            let mut out = vec![0u8; 1 << 16];
            let mut b = InOutBuffer::new(&[], &mut out);
            let mut written = Vec::new();

            for _ in 0..3000 {
                if b.out_remaining() < size as usize + 16 {
                    b.out_pos = 0;
                }
                dict.set_limit(next(size + 4) as usize).unwrap();
                assert_invariant(&dict);

                while dict.has_space() {
                    if dict.full == 0 || next(3) == 0 {
                        let byte = next(256) as u8;
                        dict.put(byte);
                        written.push(byte);
                    } else {
                        let dist = next(dict.full as u32);
                        let mut len = next(20) + 1;
                        let before = dict.pos;
                        let expected = dict.get(dist);
                        dict.repeat(&mut len, dist).unwrap();
                        assert!(dict.pos > before);
                        assert_eq!(dict.buf[before], expected);
                    }
                    assert_invariant(&dict);
                }

                let pos = b.out_pos;
                let moved = dict.flush(&mut b).unwrap();
                assert_eq!(b.out_pos - pos, moved);
                assert_eq!(dict.start, dict.pos);
                assert_invariant(&dict);
            }
            assert!(!written.is_empty());
        }
    }

    #[test]
    fn test_uncompressed_copy() {
        let mut dict = dict(8);
        let mut out = [0u8; 8];
        let input = *b"hello";
        let mut b = InOutBuffer::new(&input, &mut out);
        let mut left = 5;
        dict.uncompressed(&mut b, &mut left).unwrap();
        assert_eq!(left, 0);
        assert_eq!(b.written(), b"hello");
        assert_eq!(dict.get(0), b'o');
    }
}
