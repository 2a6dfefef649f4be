//! LZMA2 chunk layer.
//!
//! An LZMA2 payload is a sequence of chunks, each introduced by a control
//! byte:
//!
//! | Control | Meaning |
//! |---------|---------|
//! | `0x00` | End of payload |
//! | `0x01` | Dictionary reset, then an uncompressed chunk |
//! | `0x02` | Uncompressed chunk |
//! | `0x80..=0x9F` | LZMA chunk, no reset |
//! | `0xA0..=0xBF` | LZMA chunk, state reset |
//! | `0xC0..=0xDF` | LZMA chunk, new properties and state reset |
//! | `0xE0..=0xFF` | LZMA chunk, dictionary reset plus the above |
//!
//! LZMA chunks carry 21-bit uncompressed and 16-bit compressed sizes; the
//! low five bits of the control byte are bits 16-20 of the former.
//!
//! The range decoder may read up to [`LZMA_IN_REQUIRED`] bytes ahead while
//! decoding one symbol, so input that ends close to the caller's buffer end
//! is first staged in a small temporary buffer.

use log::{debug, trace};

use super::super::stream::{InOutBuffer, XzStatus};
use super::super::{DecompressError, Result};
use super::decoder::LzmaDecoder;
use super::dict::Dictionary;
use super::range_coder::{RangeDecoder, RC_INIT_BYTES};

/// Worst-case input consumed while decoding a single LZMA symbol.
pub const LZMA_IN_REQUIRED: usize = 21;
const TEMP_SIZE: usize = 3 * LZMA_IN_REQUIRED;

/// Largest dictionary property: 3 GiB.
const DICT_PROPS_MAX: u8 = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Control,
    Uncompressed1,
    Uncompressed2,
    Compressed0,
    Compressed1,
    Properties,
    LzmaPrepare,
    LzmaRun,
    Copy,
}

/// Streaming LZMA2 decoder.
#[derive(Debug)]
pub struct Lzma2Decoder {
    rc: RangeDecoder,
    dict: Dictionary,
    lzma: LzmaDecoder,

    sequence: Sequence,
    /// Where to go after the compressed size has been read.
    next_sequence: Sequence,
    /// Uncompressed bytes left in the current chunk.
    uncompressed: u32,
    /// Compressed bytes left in the current chunk.
    compressed: u32,
    need_dict_reset: bool,
    need_props: bool,

    temp: [u8; TEMP_SIZE],
    temp_size: usize,
}

impl Lzma2Decoder {
    /// A decoder that refuses dictionaries larger than `dict_size_max`.
    pub fn new(dict_size_max: u32) -> Result<Self> {
        Ok(Self {
            rc: RangeDecoder::default(),
            dict: Dictionary::new(dict_size_max),
            lzma: LzmaDecoder::new()?,
            sequence: Sequence::Control,
            next_sequence: Sequence::Control,
            uncompressed: 0,
            compressed: 0,
            need_dict_reset: true,
            need_props: true,
            temp: [0; TEMP_SIZE],
            temp_size: 0,
        })
    }

    /// Prepare for a new payload whose dictionary size is encoded as
    /// `props` (the LZMA2 filter property byte).
    pub fn reset(&mut self, props: u8) -> Result<()> {
        if props > DICT_PROPS_MAX {
            return Err(DecompressError::UnsupportedDictionary(props));
        }
        let size = (2 + u32::from(props & 1)) << (u32::from(props >> 1) + 11);
        self.dict.set_size(size)?;
        debug!("LZMA2 dictionary size {} bytes", size);

        self.rc.reset();
        self.lzma.reset();
        self.sequence = Sequence::Control;
        self.need_dict_reset = true;
        self.temp_size = 0;
        Ok(())
    }

    /// Decode as much as `b` allows. Returns [`XzStatus::StreamEnd`] after
    /// the end-of-payload control byte.
    pub fn run(&mut self, b: &mut InOutBuffer) -> Result<XzStatus> {
        // Properties fall straight through to chunk setup, which may still
        // have work to do without further input.
        while b.in_pos < b.input.len()
            || matches!(self.sequence, Sequence::LzmaPrepare | Sequence::LzmaRun)
        {
            match self.sequence {
                Sequence::Control => {
                    let control = b.input[b.in_pos];
                    b.in_pos += 1;
                    trace!("LZMA2 control byte {:#04x}", control);
                    self.control(control)?;
                    if control == 0x00 {
                        return Ok(XzStatus::StreamEnd);
                    }
                }
                Sequence::Uncompressed1 => {
                    self.uncompressed += u32::from(b.input[b.in_pos]) << 8;
                    b.in_pos += 1;
                    self.sequence = Sequence::Uncompressed2;
                }
                Sequence::Uncompressed2 => {
                    self.uncompressed += u32::from(b.input[b.in_pos]) + 1;
                    b.in_pos += 1;
                    self.sequence = Sequence::Compressed0;
                }
                Sequence::Compressed0 => {
                    self.compressed = u32::from(b.input[b.in_pos]) << 8;
                    b.in_pos += 1;
                    self.sequence = Sequence::Compressed1;
                }
                Sequence::Compressed1 => {
                    self.compressed += u32::from(b.input[b.in_pos]) + 1;
                    b.in_pos += 1;
                    self.sequence = self.next_sequence;
                }
                Sequence::Properties => {
                    self.lzma.set_properties(b.input[b.in_pos])?;
                    b.in_pos += 1;
                    self.sequence = Sequence::LzmaPrepare;
                }
                Sequence::LzmaPrepare => {
                    if self.compressed < RC_INIT_BYTES {
                        return Err(DecompressError::Corrupt(
                            "LZMA chunk too short for range coder init",
                        ));
                    }
                    if !self.rc.read_init(b.input, &mut b.in_pos) {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.compressed -= RC_INIT_BYTES;
                    self.sequence = Sequence::LzmaRun;
                }
                Sequence::LzmaRun => {
                    let out_max = b.out_remaining().min(self.uncompressed as usize);
                    self.dict.set_limit(out_max)?;
                    self.decode_lzma(b)?;
                    self.uncompressed -= self.dict.flush(b)? as u32;

                    if self.uncompressed == 0 {
                        if self.compressed > 0
                            || self.lzma.pending_len() > 0
                            || !self.rc.is_finished()
                        {
                            return Err(DecompressError::Corrupt(
                                "LZMA chunk sizes disagree with its data",
                            ));
                        }
                        self.rc.reset();
                        self.sequence = Sequence::Control;
                    } else if b.out_pos == b.output.len()
                        || (b.in_pos == b.input.len() && self.temp_size < self.compressed as usize)
                    {
                        return Ok(XzStatus::NeedMore);
                    }
                }
                Sequence::Copy => {
                    self.dict.uncompressed(b, &mut self.compressed)?;
                    if self.compressed > 0 {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.sequence = Sequence::Control;
                }
            }
        }
        Ok(XzStatus::NeedMore)
    }

    fn control(&mut self, control: u8) -> Result<()> {
        if control == 0x00 {
            return Ok(());
        }

        if control >= 0xE0 || control == 0x01 {
            self.need_props = true;
            self.need_dict_reset = false;
            self.dict.reset();
        } else if self.need_dict_reset {
            return Err(DecompressError::Corrupt(
                "LZMA2 payload does not start with a dictionary reset",
            ));
        }

        if control >= 0x80 {
            self.uncompressed = u32::from(control & 0x1F) << 16;
            self.sequence = Sequence::Uncompressed1;
            if control >= 0xC0 {
                // State is reset once the properties byte arrives.
                self.need_props = false;
                self.next_sequence = Sequence::Properties;
            } else if self.need_props {
                return Err(DecompressError::Corrupt(
                    "first LZMA chunk does not set properties",
                ));
            } else {
                self.next_sequence = Sequence::LzmaPrepare;
                if control >= 0xA0 {
                    self.lzma.reset();
                }
            }
        } else {
            if control > 0x02 {
                return Err(DecompressError::Corrupt("invalid LZMA2 control byte"));
            }
            // Uncompressed chunks store their size in the compressed field.
            self.sequence = Sequence::Compressed0;
            self.next_sequence = Sequence::Copy;
        }
        Ok(())
    }

    /// Decode LZMA data of the current chunk into the dictionary, staging
    /// input through `temp` whenever fewer than [`LZMA_IN_REQUIRED`] bytes
    /// are directly available.
    fn decode_lzma(&mut self, b: &mut InOutBuffer) -> Result<()> {
        if self.temp_size > 0 || self.compressed == 0 {
            let compressed = self.compressed as usize;
            let take = (2 * LZMA_IN_REQUIRED - self.temp_size)
                .min(compressed.saturating_sub(self.temp_size))
                .min(b.in_remaining());
            let end = self.temp_size + take;
            self.temp[self.temp_size..end].copy_from_slice(&b.input[b.in_pos..b.in_pos + take]);

            let limit = if end == compressed {
                self.temp[end..].fill(0);
                end
            } else if end < LZMA_IN_REQUIRED {
                self.temp_size = end;
                b.in_pos += take;
                return Ok(());
            } else {
                end - LZMA_IN_REQUIRED
            };

            let used = {
                let mut rc = self.rc.reader(&self.temp, 0, limit);
                self.lzma.decode(&mut rc, &mut self.dict)?;
                rc.position()
            };
            if used > end {
                return Err(DecompressError::Corrupt(
                    "LZMA chunk overruns its compressed size",
                ));
            }
            self.compressed -= used as u32;

            if used < self.temp_size {
                self.temp.copy_within(used..self.temp_size, 0);
                self.temp_size -= used;
                return Ok(());
            }
            b.in_pos += used - self.temp_size;
            self.temp_size = 0;
        }

        let in_avail = b.in_remaining();
        if in_avail >= LZMA_IN_REQUIRED {
            let start = b.in_pos;
            let limit = if in_avail >= self.compressed as usize + LZMA_IN_REQUIRED {
                start + self.compressed as usize
            } else {
                b.input.len() - LZMA_IN_REQUIRED
            };

            let end = {
                let mut rc = self.rc.reader(b.input, start, limit);
                self.lzma.decode(&mut rc, &mut self.dict)?;
                rc.position()
            };
            let used = end - start;
            if used > self.compressed as usize {
                return Err(DecompressError::Corrupt(
                    "LZMA chunk overruns its compressed size",
                ));
            }
            self.compressed -= used as u32;
            b.in_pos = end;
        }

        let in_avail = b.in_remaining();
        if in_avail < LZMA_IN_REQUIRED {
            let copy = in_avail.min(self.compressed as usize);
            self.temp[..copy].copy_from_slice(&b.input[b.in_pos..b.in_pos + copy]);
            self.temp_size = copy;
            b.in_pos += copy;
        }
        Ok(())
    }
}
