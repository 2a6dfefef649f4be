//! XZ container state machine.
//!
//! ```text
//! Stream Header | Block ... | Index | Stream Footer
//!
//! Block:  Header (CRC32) | Compressed Data | Padding | Check
//! Index:  0x00 | count | {unpadded, uncompressed} ... | Padding | CRC32
//! ```
//!
//! The index repeats every block's sizes. Both sides are folded into a
//! running hash and compared, so a block that decodes to a different
//! length than the index claims is rejected.

use log::{debug, trace};

use super::super::lzma::Lzma2Decoder;
use super::super::stream::{InOutBuffer, XzStatus};
use super::super::{DecompressError, Result};
use super::bcj::{BcjDecoder, BcjFilter};
use super::vli::{read_vli, VliDecoder};
use crate::crc32::{crc32, crc32_update};
use crate::crc64::crc64_update;
use crate::error::ChecksumKind;

pub const HEADER_MAGIC: &[u8; 6] = b"\xFD7zXZ\x00";
pub const FOOTER_MAGIC: &[u8; 2] = b"YZ";
/// Stream header and stream footer are both 12 bytes.
pub const STREAM_HEADER_SIZE: usize = 12;

/// `(0xFF + 1) * 4`.
const BLOCK_HEADER_SIZE_MAX: usize = 1024;
const FILTER_ID_LZMA2: u8 = 0x21;

const BLOCK_FLAGS_RESERVED: u8 = 0x3E;
const BLOCK_FLAGS_BCJ: u8 = 0x01;
const BLOCK_FLAGS_COMPRESSED_SIZE: u8 = 0x40;
const BLOCK_FLAGS_UNCOMPRESSED_SIZE: u8 = 0x80;

/// Supported integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Crc32,
    Crc64,
}

impl Check {
    /// Check id from the stream flags. None (0) and SHA-256 (10) are
    /// valid XZ but not supported here.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Self::Crc32),
            4 => Ok(Self::Crc64),
            _ => Err(DecompressError::UnsupportedCheck(id)),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Crc32 => 1,
            Self::Crc64 => 4,
        }
    }

    /// Size of the check field in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Crc32 => 4,
            Self::Crc64 => 8,
        }
    }

    fn kind(self) -> ChecksumKind {
        match self {
            Self::Crc32 => ChecksumKind::Crc32,
            Self::Crc64 => ChecksumKind::Crc64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    StreamHeader,
    BlockStart,
    BlockHeader,
    BlockUncompress,
    BlockPadding,
    BlockCheck,
    Index,
    IndexPadding,
    IndexCrc32,
    StreamFooter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum IndexSequence {
    #[default]
    Count,
    Unpadded,
    Uncompressed,
}

/// Running sums of block sizes plus a CRC32 over their history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RecordHash {
    unpadded: u64,
    uncompressed: u64,
    crc32: u32,
}

impl RecordHash {
    /// Fold the current sums into the CRC after a record is complete.
    fn commit(&mut self) {
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(&self.unpadded.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.uncompressed.to_le_bytes());
        bytes[16..].copy_from_slice(&self.crc32.to_le_bytes());
        self.crc32 = crc32_update(self.crc32, &bytes);
    }
}

/// Sizes declared by the current block header.
#[derive(Debug, Clone, Default)]
struct BlockHeader {
    size: u64,
    compressed: Option<u64>,
    uncompressed: Option<u64>,
}

/// Sizes observed while decoding blocks.
#[derive(Debug, Clone, Default)]
struct BlockProgress {
    compressed: u64,
    uncompressed: u64,
    count: u64,
    hash: RecordHash,
}

#[derive(Debug, Clone, Default)]
struct IndexProgress {
    sequence: IndexSequence,
    /// Index bytes seen so far, excluding its CRC32.
    size: u64,
    /// Records still to read.
    count: u64,
    hash: RecordHash,
}

/// Streaming XZ decoder.
///
/// Feed it input and output windows through [`run`](Self::run) until it
/// returns [`XzStatus::StreamEnd`]. Two consecutive calls that neither
/// consume input nor produce output fail with
/// [`DecompressError::NoProgress`].
///
/// ```rust
/// use debugsect::decompress::{InOutBuffer, XzDecoder, XzStatus};
///
/// // An XZ stream with no blocks.
/// let empty = [
///     0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, 0x00, 0x01, 0x69, 0x22, 0xde, 0x36,
///     0x00, 0x00, 0x00, 0x00, 0x1c, 0xdf, 0x44, 0x21,
///     0x90, 0x42, 0x99, 0x0d, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5a,
/// ];
/// let mut decoder = XzDecoder::new(u32::MAX).unwrap();
/// let mut out = [0u8; 16];
/// let mut b = InOutBuffer::new(&empty, &mut out);
/// assert_eq!(decoder.run(&mut b).unwrap(), XzStatus::StreamEnd);
/// assert_eq!(b.out_pos, 0);
/// ```
#[derive(Debug)]
pub struct XzDecoder {
    sequence: Sequence,
    check: Check,
    /// Running check over block output or index input.
    crc: u64,
    /// Stored check value and bits of it read so far.
    stored: u64,
    stored_bits: u32,

    vli: VliDecoder,
    /// Input position at the start of this call or of the index.
    in_start: usize,
    /// The previous call made no progress.
    stalled: bool,

    block_header: BlockHeader,
    block: BlockProgress,
    index: IndexProgress,

    lzma2: Lzma2Decoder,
    bcj: Option<BcjDecoder>,

    temp: [u8; BLOCK_HEADER_SIZE_MAX],
    temp_pos: usize,
    temp_size: usize,
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl XzDecoder {
    /// A decoder that rejects blocks asking for a dictionary larger than
    /// `dict_size_max` bytes.
    pub fn new(dict_size_max: u32) -> Result<Self> {
        Ok(Self {
            sequence: Sequence::StreamHeader,
            check: Check::Crc32,
            crc: 0,
            stored: 0,
            stored_bits: 0,
            vli: VliDecoder::default(),
            in_start: 0,
            stalled: false,
            block_header: BlockHeader::default(),
            block: BlockProgress::default(),
            index: IndexProgress::default(),
            lzma2: Lzma2Decoder::new(dict_size_max)?,
            bcj: None,
            temp: [0; BLOCK_HEADER_SIZE_MAX],
            temp_pos: 0,
            temp_size: STREAM_HEADER_SIZE,
        })
    }

    /// Start over at a new stream header. The dictionary allocation is
    /// kept for reuse.
    pub fn reset(&mut self) {
        self.sequence = Sequence::StreamHeader;
        self.check = Check::Crc32;
        self.crc = 0;
        self.stored = 0;
        self.stored_bits = 0;
        self.vli.reset();
        self.stalled = false;
        self.block_header = BlockHeader::default();
        self.block = BlockProgress::default();
        self.index = IndexProgress::default();
        self.bcj = None;
        self.temp_pos = 0;
        self.temp_size = STREAM_HEADER_SIZE;
    }

    /// Decode as much as the buffers allow.
    pub fn run(&mut self, b: &mut InOutBuffer) -> Result<XzStatus> {
        let in_start = b.in_pos;
        let out_start = b.out_pos;
        let status = self.run_main(b)?;

        if status == XzStatus::NeedMore && in_start == b.in_pos && out_start == b.out_pos {
            if self.stalled {
                return Err(DecompressError::NoProgress);
            }
            self.stalled = true;
        } else {
            self.stalled = false;
        }
        Ok(status)
    }

    fn run_main(&mut self, b: &mut InOutBuffer) -> Result<XzStatus> {
        self.in_start = b.in_pos;

        loop {
            match self.sequence {
                Sequence::StreamHeader => {
                    if !self.fill_temp(b) {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.sequence = Sequence::BlockStart;
                    self.decode_stream_header()?;
                }
                Sequence::BlockStart => {
                    let Some(&byte) = b.input.get(b.in_pos) else {
                        return Ok(XzStatus::NeedMore);
                    };
                    // A zero header size byte is the index indicator.
                    if byte == 0 {
                        self.in_start = b.in_pos;
                        b.in_pos += 1;
                        self.sequence = Sequence::Index;
                        continue;
                    }
                    self.block_header.size = (u64::from(byte) + 1) * 4;
                    self.temp_size = (usize::from(byte) + 1) * 4;
                    self.temp_pos = 0;
                    self.sequence = Sequence::BlockHeader;
                }
                Sequence::BlockHeader => {
                    if !self.fill_temp(b) {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.decode_block_header()?;
                    self.sequence = Sequence::BlockUncompress;
                }
                Sequence::BlockUncompress => {
                    if self.decode_block(b)? != XzStatus::StreamEnd {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.sequence = Sequence::BlockPadding;
                }
                Sequence::BlockPadding => {
                    // Compressed Data + Block Padding is a multiple of four.
                    while self.block.compressed & 3 != 0 {
                        let Some(&byte) = b.input.get(b.in_pos) else {
                            return Ok(XzStatus::NeedMore);
                        };
                        b.in_pos += 1;
                        if byte != 0 {
                            return Err(DecompressError::Corrupt("nonzero XZ block padding"));
                        }
                        self.block.compressed += 1;
                    }
                    self.sequence = Sequence::BlockCheck;
                }
                Sequence::BlockCheck => {
                    if !self.validate_check(b, self.check.size() as u32 * 8, self.check.kind())? {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.sequence = Sequence::BlockStart;
                }
                Sequence::Index => {
                    if !self.decode_index(b)? {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.sequence = Sequence::IndexPadding;
                }
                Sequence::IndexPadding => {
                    while (self.index.size + (b.in_pos - self.in_start) as u64) & 3 != 0 {
                        let Some(&byte) = b.input.get(b.in_pos) else {
                            self.index_update(b);
                            return Ok(XzStatus::NeedMore);
                        };
                        b.in_pos += 1;
                        if byte != 0 {
                            return Err(DecompressError::Corrupt("nonzero XZ index padding"));
                        }
                    }
                    self.index_update(b);

                    if self.block.hash != self.index.hash {
                        return Err(DecompressError::ChecksumMismatch {
                            kind: ChecksumKind::IndexHash,
                            expected: u64::from(self.index.hash.crc32),
                            actual: u64::from(self.block.hash.crc32),
                        });
                    }
                    self.sequence = Sequence::IndexCrc32;
                }
                Sequence::IndexCrc32 => {
                    if !self.validate_check(b, 32, ChecksumKind::Crc32)? {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.temp_size = STREAM_HEADER_SIZE;
                    self.temp_pos = 0;
                    self.sequence = Sequence::StreamFooter;
                }
                Sequence::StreamFooter => {
                    if !self.fill_temp(b) {
                        return Ok(XzStatus::NeedMore);
                    }
                    self.decode_stream_footer()?;
                    debug!(
                        "XZ stream end: {} blocks, {} bytes",
                        self.block.count, self.block.hash.uncompressed
                    );
                    return Ok(XzStatus::StreamEnd);
                }
            }
        }
    }

    /// Copy input into `temp` until `temp_size` bytes are buffered.
    fn fill_temp(&mut self, b: &mut InOutBuffer) -> bool {
        let copy = b.in_remaining().min(self.temp_size - self.temp_pos);
        self.temp[self.temp_pos..self.temp_pos + copy]
            .copy_from_slice(&b.input[b.in_pos..b.in_pos + copy]);
        b.in_pos += copy;
        self.temp_pos += copy;

        if self.temp_pos == self.temp_size {
            self.temp_pos = 0;
            true
        } else {
            false
        }
    }

    fn decode_stream_header(&mut self) -> Result<()> {
        let header = &self.temp[..STREAM_HEADER_SIZE];
        if &header[..6] != HEADER_MAGIC {
            return Err(DecompressError::BadMagic("xz"));
        }

        let expected = le32(&header[8..12]);
        let actual = crc32(&header[6..8]);
        if expected != actual {
            return Err(DecompressError::ChecksumMismatch {
                kind: ChecksumKind::Crc32,
                expected: u64::from(expected),
                actual: u64::from(actual),
            });
        }

        if header[6] != 0 {
            return Err(DecompressError::UnsupportedStreamFlags(header[6]));
        }
        self.check = Check::from_id(header[7])?;
        debug!("XZ stream header: check {:?}", self.check);
        Ok(())
    }

    fn decode_stream_footer(&self) -> Result<()> {
        let footer = &self.temp[..STREAM_HEADER_SIZE];
        if &footer[10..12] != FOOTER_MAGIC {
            return Err(DecompressError::Corrupt("bad XZ stream footer magic"));
        }

        let expected = le32(&footer[..4]);
        let actual = crc32(&footer[4..10]);
        if expected != actual {
            return Err(DecompressError::ChecksumMismatch {
                kind: ChecksumKind::Crc32,
                expected: u64::from(expected),
                actual: u64::from(actual),
            });
        }

        // The index CRC32 is not counted in `index.size`, so this is
        // index.size / 4 rather than (index.size + 4) / 4 - 1.
        if self.index.size >> 2 != u64::from(le32(&footer[4..8])) {
            return Err(DecompressError::Corrupt("XZ backward size does not match the index"));
        }
        if footer[8] != 0 || footer[9] != self.check.id() {
            return Err(DecompressError::Corrupt("XZ stream footer flags differ from header"));
        }
        Ok(())
    }

    fn decode_block_header(&mut self) -> Result<()> {
        // Header minus its trailing CRC32; header sizes start at 8.
        let size = self.temp_size - 4;
        let header = &self.temp[..self.temp_size];

        let expected = le32(&header[size..]);
        let actual = crc32(&header[..size]);
        if expected != actual {
            return Err(DecompressError::ChecksumMismatch {
                kind: ChecksumKind::Crc32,
                expected: u64::from(expected),
                actual: u64::from(actual),
            });
        }

        let fields = &header[..size];
        let flags = fields[1];
        // Reserved bits, and more than two filters, are both caught here.
        if flags & BLOCK_FLAGS_RESERVED != 0 {
            return Err(DecompressError::UnsupportedBlockFlags(flags));
        }

        let mut pos = 2;
        self.block_header.compressed = if flags & BLOCK_FLAGS_COMPRESSED_SIZE != 0 {
            let (value, used) = read_vli(&fields[pos..])?;
            pos += used;
            Some(value)
        } else {
            None
        };
        self.block_header.uncompressed = if flags & BLOCK_FLAGS_UNCOMPRESSED_SIZE != 0 {
            let (value, used) = read_vli(&fields[pos..])?;
            pos += used;
            Some(value)
        } else {
            None
        };

        // With two filters the first must be BCJ, without a start offset.
        self.bcj = if flags & BLOCK_FLAGS_BCJ != 0 {
            if size - pos < 2 {
                return Err(DecompressError::UnsupportedFilterProperties);
            }
            let filter = BcjFilter::from_id(u64::from(fields[pos]))?;
            if fields[pos + 1] != 0x00 {
                return Err(DecompressError::UnsupportedFilterProperties);
            }
            pos += 2;
            Some(BcjDecoder::new(filter))
        } else {
            None
        };

        if size - pos < 2 {
            return Err(DecompressError::Corrupt("XZ block header too short for filter flags"));
        }
        if fields[pos] != FILTER_ID_LZMA2 {
            return Err(DecompressError::UnsupportedFilter(u64::from(fields[pos])));
        }
        if fields[pos + 1] != 0x01 {
            return Err(DecompressError::UnsupportedFilterProperties);
        }
        pos += 2;

        let Some(&dict_props) = fields.get(pos) else {
            return Err(DecompressError::Corrupt("XZ block header too short for filter flags"));
        };
        self.lzma2.reset(dict_props)?;
        pos += 1;

        if fields[pos..].iter().any(|&byte| byte != 0) {
            return Err(DecompressError::UnsupportedFilterProperties);
        }

        trace!(
            "XZ block header: {} bytes, compressed {:?}, uncompressed {:?}, bcj {}",
            self.block_header.size,
            self.block_header.compressed,
            self.block_header.uncompressed,
            self.bcj.is_some()
        );

        self.block.compressed = 0;
        self.block.uncompressed = 0;
        Ok(())
    }

    fn decode_block(&mut self, b: &mut InOutBuffer) -> Result<XzStatus> {
        let in_start = b.in_pos;
        let out_start = b.out_pos;

        let status = match &mut self.bcj {
            Some(bcj) => bcj.run(&mut self.lzma2, b)?,
            None => self.lzma2.run(b)?,
        };

        self.block.compressed += (b.in_pos - in_start) as u64;
        self.block.uncompressed += (b.out_pos - out_start) as u64;

        if let Some(declared) = self.block_header.compressed {
            if self.block.compressed > declared {
                return Err(DecompressError::SizeMismatch {
                    expected: declared,
                    actual: self.block.compressed,
                });
            }
        }
        if let Some(declared) = self.block_header.uncompressed {
            if self.block.uncompressed > declared {
                return Err(DecompressError::SizeMismatch {
                    expected: declared,
                    actual: self.block.uncompressed,
                });
            }
        }

        let out = &b.output[out_start..b.out_pos];
        self.crc = match self.check {
            Check::Crc32 => u64::from(crc32_update(self.crc as u32, out)),
            Check::Crc64 => crc64_update(self.crc, out),
        };

        if status == XzStatus::StreamEnd {
            if let Some(declared) = self.block_header.compressed {
                if declared != self.block.compressed {
                    return Err(DecompressError::SizeMismatch {
                        expected: declared,
                        actual: self.block.compressed,
                    });
                }
            }
            if let Some(declared) = self.block_header.uncompressed {
                if declared != self.block.uncompressed {
                    return Err(DecompressError::SizeMismatch {
                        expected: declared,
                        actual: self.block.uncompressed,
                    });
                }
            }

            let unpadded =
                self.block_header.size + self.block.compressed + self.check.size() as u64;
            let hash = &mut self.block.hash;
            hash.unpadded = hash.unpadded.wrapping_add(unpadded);
            hash.uncompressed = hash.uncompressed.wrapping_add(self.block.uncompressed);
            hash.commit();
            self.block.count += 1;

            debug!(
                "XZ block {}: {} -> {} bytes",
                self.block.count, self.block.compressed, self.block.uncompressed
            );
        }
        Ok(status)
    }

    /// Fold index bytes consumed since `in_start` into its size and CRC32.
    fn index_update(&mut self, b: &InOutBuffer) {
        let used = &b.input[self.in_start..b.in_pos];
        self.index.size += used.len() as u64;
        self.crc = u64::from(crc32_update(self.crc as u32, used));
    }

    /// Read the record count and records. Padding and CRC32 follow
    /// separately. Returns `false` if more input is needed.
    fn decode_index(&mut self, b: &mut InOutBuffer) -> Result<bool> {
        loop {
            let Some(value) = self.vli.decode(b.input, &mut b.in_pos)? else {
                self.index_update(b);
                return Ok(false);
            };

            match self.index.sequence {
                IndexSequence::Count => {
                    if value != self.block.count {
                        return Err(DecompressError::Corrupt(
                            "XZ index record count differs from block count",
                        ));
                    }
                    self.index.count = value;
                    self.index.sequence = IndexSequence::Unpadded;
                }
                IndexSequence::Unpadded => {
                    self.index.hash.unpadded = self.index.hash.unpadded.wrapping_add(value);
                    self.index.sequence = IndexSequence::Uncompressed;
                }
                IndexSequence::Uncompressed => {
                    self.index.hash.uncompressed =
                        self.index.hash.uncompressed.wrapping_add(value);
                    self.index.hash.commit();
                    self.index.count -= 1;
                    self.index.sequence = IndexSequence::Unpadded;
                }
            }

            if self.index.count == 0 {
                return Ok(true);
            }
        }
    }

    /// Compare the next `bits / 8` little-endian input bytes with `crc`.
    /// Returns `false` if more input is needed.
    fn validate_check(
        &mut self,
        b: &mut InOutBuffer,
        bits: u32,
        kind: ChecksumKind,
    ) -> Result<bool> {
        while self.stored_bits < bits {
            let Some(&byte) = b.input.get(b.in_pos) else {
                return Ok(false);
            };
            b.in_pos += 1;
            self.stored |= u64::from(byte) << self.stored_bits;
            self.stored_bits += 8;
        }

        let (expected, actual) = (self.stored, self.crc);
        self.crc = 0;
        self.stored = 0;
        self.stored_bits = 0;
        if expected != actual {
            return Err(DecompressError::ChecksumMismatch {
                kind,
                expected,
                actual,
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: [u8; 32] = [
        0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, 0x00, 0x01, 0x69, 0x22, 0xde, 0x36, //
        0x00, 0x00, 0x00, 0x00, 0x1c, 0xdf, 0x44, 0x21, //
        0x90, 0x42, 0x99, 0x0d, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5a,
    ];

    fn stream_header(check: u8) -> Vec<u8> {
        let mut header = HEADER_MAGIC.to_vec();
        header.extend_from_slice(&[0, check]);
        header.extend_from_slice(&crc32(&[0, check]).to_le_bytes());
        header
    }

    fn run_all(input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = XzDecoder::new(u32::MAX)?;
        let mut out = vec![0u8; 256];
        let mut b = InOutBuffer::new(input, &mut out);
        match decoder.run(&mut b)? {
            XzStatus::StreamEnd => Ok(b.written().to_vec()),
            XzStatus::NeedMore => Err(DecompressError::UnexpectedEof),
        }
    }

    /// One block holding `data` as an uncompressed LZMA2 chunk.
    fn single_block_stream(data: &[u8]) -> Vec<u8> {
        let mut xz = stream_header(1);

        // Header size byte, flags (one filter, no sizes), LZMA2 filter
        // flags, then padding to a multiple of four before the CRC32.
        let mut block_header = vec![0x02, 0x00, 0x21, 0x01, 0x00, 0x00, 0x00, 0x00];
        let crc = crc32(&block_header);
        block_header.extend_from_slice(&crc.to_le_bytes());
        let header_len = block_header.len() as u64;
        xz.extend_from_slice(&block_header);

        let mut chunk = vec![0x01, 0x00, (data.len() - 1) as u8];
        chunk.extend_from_slice(data);
        chunk.push(0x00);
        let compressed = chunk.len() as u64;
        xz.extend_from_slice(&chunk);
        while (xz.len() - STREAM_HEADER_SIZE) % 4 != 0 {
            xz.push(0);
        }
        xz.extend_from_slice(&crc32(data).to_le_bytes());

        let unpadded = header_len + compressed + 4;
        let mut index = vec![0x00, 0x01];
        index.push(unpadded as u8);
        index.push(data.len() as u8);
        while index.len() % 4 != 0 {
            index.push(0);
        }
        let index_crc = crc32(&index);
        // Backward size counts the index with its CRC32, in units of four,
        // minus one.
        let backward = (index.len() / 4) as u32;
        xz.extend_from_slice(&index);
        xz.extend_from_slice(&index_crc.to_le_bytes());

        let mut footer_fields = backward.to_le_bytes().to_vec();
        footer_fields.extend_from_slice(&[0x00, 0x01]);
        xz.extend_from_slice(&crc32(&footer_fields).to_le_bytes());
        xz.extend_from_slice(&footer_fields);
        xz.extend_from_slice(FOOTER_MAGIC);
        xz
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(run_all(&EMPTY), Ok(Vec::new()));
    }

    #[test]
    fn test_handmade_block() {
        let xz = single_block_stream(b"debug info");
        assert_eq!(run_all(&xz), Ok(b"debug info".to_vec()));
    }

    #[test]
    fn test_handmade_block_one_byte_at_a_time() {
        let xz = single_block_stream(b"debug info");
        let mut decoder = XzDecoder::new(u32::MAX).unwrap();
        let mut out = [0u8; 64];
        let mut out_pos = 0;
        let mut status = XzStatus::NeedMore;
        for i in 0..xz.len() {
            let mut b = InOutBuffer::new(&xz[i..=i], &mut out[..]);
            b.out_pos = out_pos;
            status = decoder.run(&mut b).unwrap();
            assert_eq!(b.in_pos, 1, "byte {i} not consumed");
            out_pos = b.out_pos;
        }
        assert_eq!(status, XzStatus::StreamEnd);
        assert_eq!(&out[..out_pos], b"debug info");
    }

    #[test]
    fn test_bad_magic() {
        let mut xz = EMPTY;
        xz[1] = b'8';
        assert_eq!(run_all(&xz), Err(DecompressError::BadMagic("xz")));
    }

    #[test]
    fn test_header_crc() {
        let mut xz = EMPTY;
        xz[8] ^= 1;
        assert!(matches!(
            run_all(&xz),
            Err(DecompressError::ChecksumMismatch { kind: ChecksumKind::Crc32, .. })
        ));
    }

    #[test]
    fn test_unsupported_checks() {
        for id in [0u8, 10] {
            let mut xz = stream_header(id);
            xz.extend_from_slice(&EMPTY[12..]);
            let err = run_all(&xz).unwrap_err();
            assert_eq!(err, DecompressError::UnsupportedCheck(id));
            assert_eq!(err.kind(), crate::ErrorKind::Options);
        }
    }

    #[test]
    fn test_unsupported_stream_flags() {
        let mut xz = HEADER_MAGIC.to_vec();
        xz.extend_from_slice(&[1, 1]);
        xz.extend_from_slice(&crc32(&[1, 1]).to_le_bytes());
        assert_eq!(run_all(&xz), Err(DecompressError::UnsupportedStreamFlags(1)));
    }

    #[test]
    fn test_block_check_corrupt() {
        let mut xz = single_block_stream(b"debug info");
        // The block check sits right before the index indicator.
        let index_start = xz.len() - 12 - 8;
        xz[index_start - 1] ^= 0x80;
        assert!(matches!(
            run_all(&xz),
            Err(DecompressError::ChecksumMismatch { kind: ChecksumKind::Crc32, .. })
        ));
    }

    #[test]
    fn test_block_header_crc_corrupt() {
        let mut xz = single_block_stream(b"debug info");
        xz[12 + 2] = 0x22;
        assert!(matches!(
            run_all(&xz),
            Err(DecompressError::ChecksumMismatch { kind: ChecksumKind::Crc32, .. })
        ));
    }

    #[test]
    fn test_index_hash_mismatch() {
        // Index claims 11 uncompressed bytes for a 10-byte block; the index
        // CRC is recomputed so only the hash comparison can catch it.
        let mut xz = single_block_stream(b"debug info");
        let index_start = xz.len() - 12 - 8;
        xz[index_start + 3] = 11;
        let crc = crc32(&xz[index_start..index_start + 4]);
        xz[index_start + 4..index_start + 8].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            run_all(&xz),
            Err(DecompressError::ChecksumMismatch { kind: ChecksumKind::IndexHash, .. })
        ));
    }

    #[test]
    fn test_truncated_stream_stalls() {
        let xz = single_block_stream(b"debug info");
        let truncated = &xz[..xz.len() - 5];
        let mut decoder = XzDecoder::new(u32::MAX).unwrap();
        let mut out = [0u8; 64];
        let mut b = InOutBuffer::new(truncated, &mut out);
        assert_eq!(decoder.run(&mut b).unwrap(), XzStatus::NeedMore);
        assert_eq!(decoder.run(&mut b).unwrap(), XzStatus::NeedMore);
        assert_eq!(decoder.run(&mut b), Err(DecompressError::NoProgress));
    }

    #[test]
    fn test_reset_reuses_decoder() {
        let xz = single_block_stream(b"again");
        let mut decoder = XzDecoder::new(u32::MAX).unwrap();
        for _ in 0..2 {
            let mut out = [0u8; 16];
            let mut b = InOutBuffer::new(&xz, &mut out);
            assert_eq!(decoder.run(&mut b).unwrap(), XzStatus::StreamEnd);
            assert_eq!(b.written(), b"again");
            decoder.reset();
        }
    }
}
