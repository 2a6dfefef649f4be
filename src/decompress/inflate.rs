//! zlib / DEFLATE decoder (RFC 1950, RFC 1951).
//!
//! The whole output size is known up front (every container that carries
//! DEFLATE data records it), so decoding writes straight into one buffer
//! and back-references are resolved against it without a separate window.
//!
//! Several complete zlib streams may be concatenated; each one carries its
//! own Adler-32 trailer, and together they must fill the output exactly.

use log::{debug, trace};

use super::adler32::adler32;
use super::bit_reader::BitReader;
use super::buffer::try_zeroed;
use super::huffman::{decode_symbol, HuffmanTable, FIXED_DISTANCE_TABLE, FIXED_LITERAL_TABLE};
use super::{DecompressError, Result};
use crate::error::ChecksumKind;

/// Two header bytes, one empty fixed block, four trailer bytes.
pub const MIN_ZLIB_STREAM: usize = 7;

const MAX_LITERAL_CODES: usize = 286;
const MAX_DISTANCE_CODES: usize = 30;
const CODE_LENGTH_CODES: usize = 19;

/// Order in which code-length code lengths are transmitted.
const CODE_LENGTH_ORDER: [usize; CODE_LENGTH_CODES] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// DEFLATE block type from the 2-bit BTYPE field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    Stored,
    Fixed,
    Dynamic,
}

impl BlockType {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(Self::Stored),
            1 => Ok(Self::Fixed),
            2 => Ok(Self::Dynamic),
            _ => Err(DecompressError::InvalidBlockType),
        }
    }
}

/// Validate the two-byte zlib header (CMF, FLG).
pub fn check_zlib_header(cmf: u8, flg: u8) -> Result<()> {
    let method = cmf & 0x0f;
    if method != 8 {
        return Err(DecompressError::UnsupportedMethod(method));
    }
    let cinfo = cmf >> 4;
    if cinfo > 7 {
        return Err(DecompressError::WindowTooLarge(cinfo));
    }
    if flg & 0x20 != 0 {
        return Err(DecompressError::PresetDictionary);
    }
    if ((u16::from(cmf) << 8) | u16::from(flg)) % 31 != 0 {
        return Err(DecompressError::HeaderCheck);
    }
    Ok(())
}

/// Inflate one or more concatenated zlib streams that decode to exactly
/// `out_len` bytes.
///
/// Each stream's Adler-32 trailer covers only that stream's own output.
///
/// ```rust
/// use debugsect::decompress::inflate_zlib;
///
/// // zlib stream of a stored block holding "AB"
/// let data = [0x78, 0x01, 0x01, 0x02, 0x00, 0xfd, 0xff, 0x41, 0x42, 0x00, 0xc6, 0x00, 0x84];
/// assert_eq!(inflate_zlib(&data, 2).unwrap(), b"AB");
/// ```
pub fn inflate_zlib(data: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut out = try_zeroed(out_len)?;
    inflate_zlib_into(data, &mut out)?;
    Ok(out)
}

/// Like [`inflate_zlib`], writing into a caller-provided buffer that must
/// be filled exactly.
pub fn inflate_zlib_into(data: &[u8], out: &mut [u8]) -> Result<()> {
    if data.len() < MIN_ZLIB_STREAM {
        return Err(DecompressError::TooShort {
            needed: MIN_ZLIB_STREAM,
            have: data.len(),
        });
    }

    let expected = out.len();
    let mut window = OutputWindow::new(out);
    let mut inflater = Inflater::default();
    let mut pos = 0;
    let mut streams = 0usize;

    // Up to four stray bytes after the last trailer are ignored.
    while data.len() - pos > 4 {
        pos += inflater.inflate_stream(&data[pos..], &mut window)?;
        streams += 1;
    }

    if window.pos != expected {
        return Err(DecompressError::SizeMismatch {
            expected: expected as u64,
            actual: window.pos as u64,
        });
    }

    debug!("inflated {} zlib stream(s) into {} bytes", streams, expected);
    Ok(())
}

/// Destination buffer plus write cursor. Back-references may reach any
/// byte written so far, including bytes from earlier concatenated streams.
struct OutputWindow<'o> {
    buf: &'o mut [u8],
    pos: usize,
}

impl<'o> OutputWindow<'o> {
    fn new(buf: &'o mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn push(&mut self, byte: u8) -> Result<()> {
        let slot = self
            .buf
            .get_mut(self.pos)
            .ok_or(DecompressError::BufferOverflow)?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        let dest = self
            .buf
            .get_mut(self.pos..self.pos + bytes.len())
            .ok_or(DecompressError::BufferOverflow)?;
        dest.copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    #[inline]
    fn space(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Copy `len` bytes from `distance` bytes back.
    #[inline]
    fn copy_match(&mut self, distance: usize, len: usize) -> Result<()> {
        if distance > self.pos || distance == 0 {
            return Err(DecompressError::InvalidBackReference {
                distance,
                available: self.pos,
            });
        }
        if len > self.space() {
            return Err(DecompressError::BufferOverflow);
        }

        let start = self.pos;
        if distance == 1 {
            let byte = self.buf[start - 1];
            self.buf[start..start + len].fill(byte);
        } else if distance >= len {
            self.buf.copy_within(start - distance..start - distance + len, start);
        } else {
            // Overlapping: the source grows as we write, one period at a time.
            let mut done = 0;
            while done < len {
                let chunk = (len - done).min(distance);
                let from = start + done - distance;
                self.buf.copy_within(from..from + chunk, start + done);
                done += chunk;
            }
        }
        self.pos += len;
        Ok(())
    }
}

/// Reusable Huffman tables for dynamic blocks.
#[derive(Default)]
struct Inflater {
    literal: HuffmanTable,
    distance: HuffmanTable,
    code_length: HuffmanTable,
}

impl Inflater {
    /// Decode one zlib stream from the start of `data`, returning the bytes
    /// consumed including the Adler-32 trailer.
    fn inflate_stream(&mut self, data: &[u8], window: &mut OutputWindow) -> Result<usize> {
        let header = data.get(..2).ok_or(DecompressError::TooShort {
            needed: 2,
            have: data.len(),
        })?;
        check_zlib_header(header[0], header[1])?;

        let stream_start = window.pos;
        let mut reader = BitReader::new(&data[2..]);

        loop {
            let last = reader.read_bits(1)? == 1;
            let block_type = BlockType::from_bits(reader.read_bits(2)?)?;
            trace!("deflate block {:?} (last: {})", block_type, last);

            match block_type {
                BlockType::Stored => read_stored_block(&mut reader, window)?,
                BlockType::Fixed => {
                    inflate_block(&mut reader, &FIXED_LITERAL_TABLE, &FIXED_DISTANCE_TABLE, window)?
                }
                BlockType::Dynamic => {
                    self.read_dynamic_tables(&mut reader)?;
                    inflate_block(
                        &mut reader,
                        self.literal.entries(),
                        self.distance.entries(),
                        window,
                    )?
                }
            }

            if last {
                break;
            }
        }

        reader.align_to_byte();
        let trailer = reader.read_aligned(4)?;
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = adler32(&window.buf[stream_start..window.pos]);
        if expected != actual {
            return Err(DecompressError::ChecksumMismatch {
                kind: ChecksumKind::Adler32,
                expected: u64::from(expected),
                actual: u64::from(actual),
            });
        }

        Ok(2 + reader.byte_position())
    }

    /// Read the code-length code and the literal/length and distance code
    /// lengths of a dynamic block, and build both decoding tables.
    fn read_dynamic_tables(&mut self, reader: &mut BitReader) -> Result<()> {
        let nlit = reader.read_bits(5)? + 257;
        let ndist = reader.read_bits(5)? + 1;
        let nclen = reader.read_bits(4)? as usize + 4;
        if nlit as usize > MAX_LITERAL_CODES || ndist as usize > MAX_DISTANCE_CODES {
            return Err(DecompressError::InvalidCodeCounts { nlit, ndist });
        }

        let mut code_bits = [0u8; CODE_LENGTH_CODES];
        for &symbol in &CODE_LENGTH_ORDER[..nclen] {
            code_bits[symbol] = reader.read_bits(3)? as u8;
        }
        self.code_length.build(&code_bits)?;

        let nlit = nlit as usize;
        let total = nlit + ndist as usize;
        let mut lengths = [0u8; MAX_LITERAL_CODES + MAX_DISTANCE_CODES];
        let mut i = 0;

        while i < total {
            let symbol = decode_symbol(self.code_length.entries(), reader)?;
            let (value, repeat) = match symbol {
                0..=15 => (symbol as u8, 1),
                16 => {
                    let previous = *i
                        .checked_sub(1)
                        .and_then(|p| lengths.get(p))
                        .ok_or(DecompressError::InvalidCodeLength(symbol))?;
                    (previous, 3 + reader.read_bits(2)? as usize)
                }
                17 => (0, 3 + reader.read_bits(3)? as usize),
                18 => (0, 11 + reader.read_bits(7)? as usize),
                _ => return Err(DecompressError::InvalidCodeLength(symbol)),
            };
            if repeat > total - i {
                return Err(DecompressError::InvalidCodeLength(symbol));
            }
            lengths[i..i + repeat].fill(value);
            i += repeat;
        }

        if lengths[256] == 0 {
            return Err(DecompressError::MissingEndOfBlock);
        }

        self.literal.build(&lengths[..nlit])?;
        self.distance.build(&lengths[nlit..total])?;
        Ok(())
    }
}

fn read_stored_block(reader: &mut BitReader, window: &mut OutputWindow) -> Result<()> {
    reader.align_to_byte();
    let header = reader.read_aligned(4)?;
    let len = u16::from_le_bytes([header[0], header[1]]);
    let nlen = u16::from_le_bytes([header[2], header[3]]);
    if len != !nlen {
        return Err(DecompressError::StoredLengthMismatch { len, nlen });
    }
    let bytes = reader.read_aligned(usize::from(len))?;
    window.extend(bytes)
}

/// Length for a literal/length symbol in 257..=285 (RFC 1951 3.2.5).
#[inline]
fn decode_length(symbol: u16, reader: &mut BitReader) -> Result<usize> {
    match symbol {
        257..=264 => Ok(usize::from(symbol) - 254),
        265..=284 => {
            let code = u32::from(symbol) - 265;
            let extra = (code >> 2) + 1;
            let base = ((code & 3) << extra) + 11 + (((1 << (extra - 1)) - 1) << 3);
            Ok((base + reader.read_bits(extra)?) as usize)
        }
        285 => Ok(258),
        _ => Err(DecompressError::InvalidLengthSymbol(symbol)),
    }
}

/// Distance for a distance symbol in 1..=29; symbol 0 is handled by the
/// caller.
#[inline]
fn decode_distance(symbol: u16, reader: &mut BitReader) -> Result<usize> {
    match symbol {
        1..=3 => Ok(usize::from(symbol) + 1),
        4..=29 => {
            let code = u32::from(symbol) - 4;
            let extra = (code >> 1) + 1;
            let base = ((code & 1) << extra) + 5 + (((1 << (extra - 1)) - 1) << 2);
            Ok((base + reader.read_bits(extra)?) as usize)
        }
        _ => Err(DecompressError::InvalidDistanceSymbol(symbol)),
    }
}

/// Decode symbols until end-of-block.
fn inflate_block(
    reader: &mut BitReader,
    literal: &[u16],
    distance: &[u16],
    window: &mut OutputWindow,
) -> Result<()> {
    loop {
        let symbol = decode_symbol(literal, reader)?;
        if symbol < 256 {
            window.push(symbol as u8)?;
            continue;
        }
        if symbol == 256 {
            return Ok(());
        }

        let len = decode_length(symbol, reader)?;
        let dist_symbol = decode_symbol(distance, reader)?;
        let dist = if dist_symbol == 0 {
            1
        } else {
            decode_distance(dist_symbol, reader)?
        };
        window.copy_match(dist, len)?;
    }
}
