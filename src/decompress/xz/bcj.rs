//! Branch/call/jump (BCJ) filters.
//!
//! Executable code compresses better when relative branch targets are
//! rewritten as absolute addresses. These filters undo that rewrite after
//! LZMA2 decoding. Each one works on whole instructions, so a few trailing
//! bytes may have to wait for the next call; [`BcjDecoder`] keeps them in
//! a small buffer of its own.
//!
//! | Id | Architecture | Instruction window |
//! |----|--------------|--------------------|
//! | 4 | x86 / x86-64 | 5 bytes (`E8`/`E9` + rel32) |
//! | 5 | PowerPC (big endian) | 4 bytes |
//! | 6 | IA-64 | 16-byte bundles |
//! | 7 | ARM (little endian) | 4 bytes |
//! | 8 | ARM Thumb | 4 bytes at 2-byte alignment |
//! | 9 | SPARC | 4 bytes |

use super::super::lzma::Lzma2Decoder;
use super::super::stream::{InOutBuffer, XzStatus};
use super::super::{DecompressError, Result};

/// Unfiltered bytes that may be held back between calls.
const TEMP_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BcjFilter {
    X86 = 4,
    PowerPc = 5,
    Ia64 = 6,
    Arm = 7,
    ArmThumb = 8,
    Sparc = 9,
}

impl BcjFilter {
    /// Map an XZ filter id to a supported BCJ filter.
    pub fn from_id(id: u64) -> Result<Self> {
        Ok(match id {
            4 => Self::X86,
            5 => Self::PowerPc,
            6 => Self::Ia64,
            7 => Self::Arm,
            8 => Self::ArmThumb,
            9 => Self::Sparc,
            _ => return Err(DecompressError::UnsupportedFilter(id)),
        })
    }
}

/// Filter position and carried state. `pos` counts bytes filtered since
/// the start of the block; only its low 32 bits matter.
#[derive(Debug, Clone)]
pub struct BcjState {
    filter: BcjFilter,
    pos: u32,
    x86_prev_mask: u32,
}

impl BcjState {
    pub fn new(filter: BcjFilter) -> Self {
        Self {
            filter,
            pos: 0,
            x86_prev_mask: 0,
        }
    }

    /// Filter a prefix of `buf` in place. Returns how many bytes are final;
    /// the rest must be offered again together with the bytes that follow.
    pub fn apply(&mut self, buf: &mut [u8]) -> usize {
        let filtered = match self.filter {
            BcjFilter::X86 => x86(self.pos, &mut self.x86_prev_mask, buf),
            BcjFilter::PowerPc => powerpc(self.pos, buf),
            BcjFilter::Ia64 => ia64(self.pos, buf),
            BcjFilter::Arm => arm(self.pos, buf),
            BcjFilter::ArmThumb => armthumb(self.pos, buf),
            BcjFilter::Sparc => sparc(self.pos, buf),
        };
        self.pos = self.pos.wrapping_add(filtered as u32);
        filtered
    }
}

#[inline]
fn x86_test_msbyte(b: u8) -> bool {
    b == 0x00 || b == 0xFF
}

fn x86(pos: u32, prev_mask_state: &mut u32, buf: &mut [u8]) -> usize {
    const MASK_TO_ALLOWED_STATUS: [bool; 8] = [true, true, true, false, true, false, false, false];
    const MASK_TO_BIT_NUM: [u32; 8] = [0, 1, 2, 2, 3, 3, 3, 3];

    if buf.len() <= 4 {
        return 0;
    }
    let size = buf.len() - 4;
    let mut prev_pos = usize::MAX;
    let mut prev_mask = *prev_mask_state;

    let mut i = 0;
    while i < size {
        if buf[i] & 0xFE != 0xE8 {
            i += 1;
            continue;
        }

        let gap = i.wrapping_sub(prev_pos);
        if gap > 3 {
            prev_mask = 0;
        } else {
            prev_mask = (prev_mask << (gap - 1)) & 7;
            if prev_mask != 0 {
                let b = buf[i + 4 - MASK_TO_BIT_NUM[prev_mask as usize] as usize];
                if !MASK_TO_ALLOWED_STATUS[prev_mask as usize] || x86_test_msbyte(b) {
                    prev_pos = i;
                    prev_mask = (prev_mask << 1) | 1;
                    i += 1;
                    continue;
                }
            }
        }
        prev_pos = i;

        if x86_test_msbyte(buf[i + 4]) {
            let mut src = u32::from_le_bytes([buf[i + 1], buf[i + 2], buf[i + 3], buf[i + 4]]);
            let mut dest;
            loop {
                dest = src.wrapping_sub(pos.wrapping_add(i as u32).wrapping_add(5));
                if prev_mask == 0 {
                    break;
                }
                let j = MASK_TO_BIT_NUM[prev_mask as usize] * 8;
                if !x86_test_msbyte((dest >> (24 - j)) as u8) {
                    break;
                }
                src = dest ^ ((1u32 << (32 - j)) - 1);
            }
            dest &= 0x01FF_FFFF;
            dest |= 0u32.wrapping_sub(dest & 0x0100_0000);
            buf[i + 1..i + 5].copy_from_slice(&dest.to_le_bytes());
            i += 5;
        } else {
            prev_mask = (prev_mask << 1) | 1;
            i += 1;
        }
    }

    let gap = i.wrapping_sub(prev_pos);
    *prev_mask_state = if gap > 3 { 0 } else { prev_mask << (gap - 1) };
    i
}

fn powerpc(pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        let mut instr = u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        if instr & 0xFC00_0003 == 0x4800_0001 {
            instr &= 0x03FF_FFFC;
            instr = instr.wrapping_sub(pos.wrapping_add(i as u32));
            instr &= 0x03FF_FFFC;
            instr |= 0x4800_0001;
            buf[i..i + 4].copy_from_slice(&instr.to_be_bytes());
        }
        i += 4;
    }
    i
}

fn ia64(pos: u32, buf: &mut [u8]) -> usize {
    // Which of the three 41-bit slots hold branches, by bundle template.
    const BRANCH_TABLE: [u32; 32] = [
        0, 0, 0, 0, 0, 0, 0, 0, //
        0, 0, 0, 0, 0, 0, 0, 0, //
        4, 4, 6, 6, 0, 0, 7, 7, //
        4, 4, 0, 0, 4, 4, 0, 0,
    ];

    let mut i = 0;
    while i + 16 <= buf.len() {
        let mask = BRANCH_TABLE[(buf[i] & 0x1F) as usize];
        let mut bit_pos = 5u32;
        for slot in 0..3 {
            if (mask >> slot) & 1 != 0 {
                let byte_pos = i + (bit_pos >> 3) as usize;
                let bit_res = bit_pos & 7;

                let mut instr = 0u64;
                for j in 0..6 {
                    instr |= u64::from(buf[byte_pos + j]) << (8 * j);
                }
                let mut norm = instr >> bit_res;

                if ((norm >> 37) & 0x0F) == 0x05 && ((norm >> 9) & 0x07) == 0 {
                    let mut addr = ((norm >> 13) & 0x0F_FFFF) as u32;
                    addr |= (((norm >> 36) & 1) as u32) << 20;
                    addr <<= 4;
                    addr = addr.wrapping_sub(pos.wrapping_add(i as u32));
                    addr >>= 4;

                    norm &= !(0x8F_FFFFu64 << 13);
                    norm |= u64::from(addr & 0x0F_FFFF) << 13;
                    norm |= u64::from(addr & 0x10_0000) << (36 - 20);

                    instr &= (1u64 << bit_res) - 1;
                    instr |= norm << bit_res;

                    for j in 0..6 {
                        buf[byte_pos + j] = (instr >> (8 * j)) as u8;
                    }
                }
            }
            bit_pos += 41;
        }
        i += 16;
    }
    i
}

fn arm(pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        // BL with the "always" condition.
        if buf[i + 3] == 0xEB {
            let mut addr = u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], 0]);
            addr <<= 2;
            addr = addr.wrapping_sub(pos.wrapping_add(i as u32).wrapping_add(8));
            addr >>= 2;
            buf[i..i + 3].copy_from_slice(&addr.to_le_bytes()[..3]);
        }
        i += 4;
    }
    i
}

fn armthumb(pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        if (buf[i + 1] & 0xF8) == 0xF0 && (buf[i + 3] & 0xF8) == 0xF8 {
            let mut addr = (u32::from(buf[i + 1] & 0x07) << 19)
                | (u32::from(buf[i]) << 11)
                | (u32::from(buf[i + 3] & 0x07) << 8)
                | u32::from(buf[i + 2]);
            addr <<= 1;
            addr = addr.wrapping_sub(pos.wrapping_add(i as u32).wrapping_add(4));
            addr >>= 1;
            buf[i + 1] = 0xF0 | ((addr >> 19) & 0x07) as u8;
            buf[i] = (addr >> 11) as u8;
            buf[i + 3] = 0xF8 | ((addr >> 8) & 0x07) as u8;
            buf[i + 2] = addr as u8;
            i += 2;
        }
        i += 2;
    }
    i
}

fn sparc(pos: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while i + 4 <= buf.len() {
        let mut instr = u32::from_be_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        if (instr >> 22) == 0x100 || (instr >> 22) == 0x1FF {
            instr <<= 2;
            instr = instr.wrapping_sub(pos.wrapping_add(i as u32));
            instr >>= 2;
            instr = 0x4000_0000u32.wrapping_sub(instr & 0x0040_0000)
                | 0x4000_0000
                | (instr & 0x003F_FFFF);
            buf[i..i + 4].copy_from_slice(&instr.to_be_bytes());
        }
        i += 4;
    }
    i
}

/// BCJ filter stacked on an LZMA2 decoder.
///
/// `temp` holds `size` bytes, of which the first `filtered` are final and
/// waiting for output space; the rest still need filtering.
#[derive(Debug)]
pub struct BcjDecoder {
    state: BcjState,
    /// Last status from the LZMA2 decoder. Once it reports the end of the
    /// payload it must not be called again.
    ret: XzStatus,
    temp: [u8; TEMP_SIZE],
    filtered: usize,
    size: usize,
}

impl BcjDecoder {
    pub fn new(filter: BcjFilter) -> Self {
        Self {
            state: BcjState::new(filter),
            ret: XzStatus::NeedMore,
            temp: [0; TEMP_SIZE],
            filtered: 0,
            size: 0,
        }
    }

    /// Move filtered bytes from `temp` to the output.
    fn flush(&mut self, b: &mut InOutBuffer) {
        let copy = self.filtered.min(b.out_remaining());
        b.output[b.out_pos..b.out_pos + copy].copy_from_slice(&self.temp[..copy]);
        b.out_pos += copy;

        self.filtered -= copy;
        self.size -= copy;
        self.temp.copy_within(copy..copy + self.size, 0);
    }

    pub fn run(&mut self, lzma2: &mut Lzma2Decoder, b: &mut InOutBuffer) -> Result<XzStatus> {
        if self.filtered > 0 {
            self.flush(b);
            if self.filtered > 0 {
                return Ok(XzStatus::NeedMore);
            }
            if self.ret == XzStatus::StreamEnd {
                return Ok(XzStatus::StreamEnd);
            }
        }

        // Decode straight into the output when it has room beyond what is
        // pending. With nothing pending this also runs on a full output so
        // a payload end without further data is still noticed.
        if self.size < b.out_remaining() || self.size == 0 {
            let out_start = b.out_pos;
            b.output[out_start..out_start + self.size].copy_from_slice(&self.temp[..self.size]);
            b.out_pos += self.size;

            self.ret = lzma2.run(b)?;
            let filtered = self.state.apply(&mut b.output[out_start..b.out_pos]);

            // The last few bytes of a payload are left unfiltered.
            if self.ret == XzStatus::StreamEnd {
                return Ok(XzStatus::StreamEnd);
            }

            self.size = b.out_pos - out_start - filtered;
            b.out_pos -= self.size;
            self.temp[..self.size].copy_from_slice(&b.output[b.out_pos..b.out_pos + self.size]);

            if b.out_pos + self.size < b.output.len() {
                return Ok(XzStatus::NeedMore);
            }
        }

        // The output is nearly full: decode a little more into `temp` so
        // the held-back bytes can be completed and flushed.
        if b.out_pos < b.output.len() {
            let mut tb = InOutBuffer {
                input: b.input,
                in_pos: b.in_pos,
                output: &mut self.temp[..],
                out_pos: self.size,
            };
            let ret = lzma2.run(&mut tb);
            b.in_pos = tb.in_pos;
            self.size = tb.out_pos;
            self.ret = ret?;

            self.filtered += self.state.apply(&mut self.temp[self.filtered..self.size]);
            if self.ret == XzStatus::StreamEnd {
                self.filtered = self.size;
            }

            self.flush(b);
            if self.filtered > 0 {
                return Ok(XzStatus::NeedMore);
            }
        }

        Ok(self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_ids() {
        assert_eq!(BcjFilter::from_id(4), Ok(BcjFilter::X86));
        assert_eq!(BcjFilter::from_id(9), Ok(BcjFilter::Sparc));
        assert_eq!(
            BcjFilter::from_id(3),
            Err(DecompressError::UnsupportedFilter(3))
        );
        assert_eq!(
            BcjFilter::from_id(0x21),
            Err(DecompressError::UnsupportedFilter(0x21))
        );
    }

    #[test]
    fn test_x86_call() {
        // CALL to absolute 5 from offset 0 is relative 0.
        let mut buf = [0xE8, 0x05, 0x00, 0x00, 0x00, 0x90, 0x90, 0x90];
        let mut state = BcjState::new(BcjFilter::X86);
        assert_eq!(state.apply(&mut buf), 5);
        assert_eq!(buf, [0xE8, 0x00, 0x00, 0x00, 0x00, 0x90, 0x90, 0x90]);
    }

    #[test]
    fn test_x86_leaves_tail() {
        let mut buf = [0x90; 4];
        let mut state = BcjState::new(BcjFilter::X86);
        assert_eq!(state.apply(&mut buf), 0);
    }

    #[test]
    fn test_x86_non_address_operand() {
        // Top byte 0x12 is not a plausible near-call target.
        let mut buf = [0xE8, 0x05, 0x00, 0x00, 0x12, 0x90, 0x90, 0x90, 0x90, 0x90];
        let original = buf;
        let mut state = BcjState::new(BcjFilter::X86);
        state.apply(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_arm_bl() {
        let mut buf = [0x02, 0x00, 0x00, 0xEB];
        let mut state = BcjState::new(BcjFilter::Arm);
        assert_eq!(state.apply(&mut buf), 4);
        assert_eq!(buf, [0x00, 0x00, 0x00, 0xEB]);
    }

    #[test]
    fn test_armthumb_bl() {
        let mut buf = [0x00, 0xF0, 0x04, 0xF8];
        let mut state = BcjState::new(BcjFilter::ArmThumb);
        assert_eq!(state.apply(&mut buf), 4);
        assert_eq!(buf, [0x00, 0xF0, 0x02, 0xF8]);
    }

    #[test]
    fn test_powerpc_position_carries() {
        let mut state = BcjState::new(BcjFilter::PowerPc);
        let mut first = [0x60, 0x00, 0x00, 0x00];
        assert_eq!(state.apply(&mut first), 4);
        // "bl" at block offset 4 with absolute target 0x104.
        let mut second = [0x48, 0x00, 0x01, 0x05];
        state.apply(&mut second);
        assert_eq!(second, [0x48, 0x00, 0x01, 0x01]);
    }

    #[test]
    fn test_sparc_call() {
        let mut buf = [0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x10];
        let mut state = BcjState::new(BcjFilter::Sparc);
        assert_eq!(state.apply(&mut buf), 8);
        assert_eq!(&buf[4..], &[0x40, 0x00, 0x00, 0x0F]);
    }

    #[test]
    fn test_ia64_needs_full_bundle() {
        let mut buf = [0u8; 15];
        let mut state = BcjState::new(BcjFilter::Ia64);
        assert_eq!(state.apply(&mut buf), 0);
        let mut buf = [0u8; 32];
        assert_eq!(state.apply(&mut buf), 32);
    }

    /// x86 code in an uncompressed LZMA2 chunk.
    fn x86_payload() -> Vec<u8> {
        let mut code = vec![0xE8, 0x05, 0x00, 0x00, 0x00];
        code.extend_from_slice(&[0x90; 27]);
        let mut payload = vec![0x01, 0x00, (code.len() - 1) as u8];
        payload.extend_from_slice(&code);
        payload.push(0x00);
        payload
    }

    fn expected() -> Vec<u8> {
        let mut code = vec![0xE8, 0x00, 0x00, 0x00, 0x00];
        code.extend_from_slice(&[0x90; 27]);
        code
    }

    #[test]
    fn test_bcj_over_lzma2() {
        let input = x86_payload();
        let mut lzma2 = Lzma2Decoder::new(u32::MAX).unwrap();
        lzma2.reset(0).unwrap();
        let mut bcj = BcjDecoder::new(BcjFilter::X86);
        let mut out = [0u8; 64];
        let mut b = InOutBuffer::new(&input, &mut out);
        assert_eq!(bcj.run(&mut lzma2, &mut b).unwrap(), XzStatus::StreamEnd);
        assert_eq!(b.written(), expected().as_slice());
    }

    #[test]
    fn test_bcj_one_output_byte_at_a_time() {
        let input = x86_payload();
        let mut lzma2 = Lzma2Decoder::new(u32::MAX).unwrap();
        lzma2.reset(0).unwrap();
        let mut bcj = BcjDecoder::new(BcjFilter::X86);

        let mut out = [0u8; 64];
        let mut in_pos = 0;
        let mut out_pos = 0;
        let mut done = false;
        for _ in 0..200 {
            let end = (out_pos + 1).min(out.len());
            let mut b = InOutBuffer::new(&input, &mut out[..end]);
            b.in_pos = in_pos;
            b.out_pos = out_pos;
            let status = bcj.run(&mut lzma2, &mut b).unwrap();
            in_pos = b.in_pos;
            out_pos = b.out_pos;
            if status == XzStatus::StreamEnd {
                done = true;
                break;
            }
        }
        assert!(done);
        assert_eq!(&out[..out_pos], expected().as_slice());
    }
}
