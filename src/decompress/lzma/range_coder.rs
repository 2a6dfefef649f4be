//! LZMA range decoder.
//!
//! Binary adaptive arithmetic decoding over a shrinking `[0, range)`
//! interval. Probabilities are 11-bit values; each decoded bit nudges its
//! probability 1/32 of the way toward the observed value.

/// Normalize when `range` drops below this.
const TOP_VALUE: u32 = 1 << 24;
const SHIFT_BITS: u32 = 8;

pub const BIT_MODEL_TOTAL_BITS: u32 = 11;
pub const BIT_MODEL_TOTAL: u16 = 1 << BIT_MODEL_TOTAL_BITS;
const MOVE_BITS: u32 = 5;

/// Initial value of every probability (0.5).
pub const PROB_INIT: u16 = BIT_MODEL_TOTAL / 2;

/// The first five bytes of every LZMA chunk seed `code`. The first of
/// them is always zero and is shifted out.
pub const RC_INIT_BYTES: u32 = 5;

/// Range decoder state that persists between calls.
#[derive(Debug, Clone)]
pub struct RangeDecoder {
    range: u32,
    code: u32,
    init_bytes_left: u32,
}

impl Default for RangeDecoder {
    fn default() -> Self {
        Self {
            range: u32::MAX,
            code: 0,
            init_bytes_left: RC_INIT_BYTES,
        }
    }
}

impl RangeDecoder {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consume the chunk's initial bytes from `input`. Returns `false` if
    /// the input ran out first; the call can be repeated with more input.
    pub fn read_init(&mut self, input: &[u8], in_pos: &mut usize) -> bool {
        while self.init_bytes_left > 0 {
            let Some(&byte) = input.get(*in_pos) else {
                return false;
            };
            *in_pos += 1;
            self.code = (self.code << 8) | u32::from(byte);
            self.init_bytes_left -= 1;
        }
        true
    }

    /// A chunk may end only when `code` has returned to zero.
    pub fn is_finished(&self) -> bool {
        self.code == 0
    }

    /// Attach an input window for a decoding pass.
    ///
    /// The caller promises that reading up to 20 bytes past `limit` stays
    /// inside `buf`; reads beyond `buf` yield zero and show up as the
    /// position overrunning, which the caller treats as corruption.
    pub fn reader<'a>(&'a mut self, buf: &'a [u8], pos: usize, limit: usize) -> RangeReader<'a> {
        RangeReader {
            rc: self,
            buf,
            pos,
            limit,
        }
    }
}

/// A [`RangeDecoder`] bound to an input window for one decoding pass.
pub struct RangeReader<'a> {
    rc: &'a mut RangeDecoder,
    buf: &'a [u8],
    pos: usize,
    limit: usize,
}

impl RangeReader<'_> {
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// True once there may not be enough input for another symbol.
    #[inline]
    pub fn limit_exceeded(&self) -> bool {
        self.pos > self.limit
    }

    #[inline]
    pub fn normalize(&mut self) {
        if self.rc.range < TOP_VALUE {
            let byte = self.buf.get(self.pos).copied().unwrap_or(0);
            self.pos += 1;
            self.rc.range <<= SHIFT_BITS;
            self.rc.code = (self.rc.code << SHIFT_BITS) | u32::from(byte);
        }
    }

    /// Decode one bit with an adaptive probability.
    #[inline]
    pub fn bit(&mut self, prob: &mut u16) -> bool {
        self.normalize();
        let bound = (self.rc.range >> BIT_MODEL_TOTAL_BITS) * u32::from(*prob);
        if self.rc.code < bound {
            self.rc.range = bound;
            *prob += (BIT_MODEL_TOTAL - *prob) >> MOVE_BITS;
            false
        } else {
            self.rc.range -= bound;
            self.rc.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            true
        }
    }

    /// Decode a bit tree MSB first. Returns the symbol with the leading 1
    /// still attached, so the result is in `limit..2 * limit`.
    #[inline]
    pub fn bittree(&mut self, probs: &mut [u16], limit: u32) -> u32 {
        let mut symbol = 1u32;
        while symbol < limit {
            let bit = self.bit(&mut probs[symbol as usize]);
            symbol = (symbol << 1) | u32::from(bit);
        }
        symbol
    }

    /// Decode `bits` bits of a bit tree LSB first, adding them to `dest`.
    #[inline]
    pub fn bittree_reverse(&mut self, probs: &mut [u16], dest: &mut u32, bits: u32) {
        let mut symbol = 1usize;
        for i in 0..bits {
            let bit = self.bit(&mut probs[symbol]);
            symbol = (symbol << 1) | usize::from(bit);
            *dest += u32::from(bit) << i;
        }
    }

    /// Decode `count` bits with fixed 50/50 probability, appending them to
    /// `dest`.
    #[inline]
    pub fn direct(&mut self, dest: &mut u32, count: u32) {
        for _ in 0..count {
            self.normalize();
            self.rc.range >>= 1;
            self.rc.code = self.rc.code.wrapping_sub(self.rc.range);
            // All ones if the subtraction went negative (bit is 0).
            let mask = 0u32.wrapping_sub(self.rc.code >> 31);
            self.rc.code = self.rc.code.wrapping_add(self.rc.range & mask);
            *dest = (*dest << 1).wrapping_add(mask.wrapping_add(1));
        }
    }
}
