//! Error types for debug-section decompression.
//!
//! Every decoder in this crate reports failures through [`DecompressError`].
//! Each variant belongs to one coarse [`ErrorKind`], which is what the
//! best-effort section layer hands to the embedding application.
//!
//! ## Error Categories
//!
//! | Kind | Meaning | Examples |
//! |------|---------|----------|
//! | [`Format`] | Input is not the claimed format at all | [`BadMagic`], [`TooShort`] |
//! | [`Options`] | Well-formed, but uses an unsupported feature | [`UnsupportedCheck`], [`UnsupportedFilter`] |
//! | [`Data`] | Internal inconsistency in the stream | [`ChecksumMismatch`], [`InvalidHuffmanTable`] |
//! | [`Memory`] | An allocation failed or a limit was hit | [`OutOfMemory`], [`DictionaryTooLarge`] |
//! | [`Buffer`] | Two consecutive calls made no progress | [`NoProgress`] |
//!
//! ## Example
//!
//! ```rust
//! use debugsect::{decompress, DecompressOptions, ErrorKind};
//!
//! let err = decompress::uncompress_xz(&[], &DecompressOptions::default()).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Format);
//! ```
//!
//! [`Format`]: ErrorKind::Format
//! [`Options`]: ErrorKind::Options
//! [`Data`]: ErrorKind::Data
//! [`Memory`]: ErrorKind::Memory
//! [`Buffer`]: ErrorKind::Buffer
//! [`BadMagic`]: DecompressError::BadMagic
//! [`TooShort`]: DecompressError::TooShort
//! [`UnsupportedCheck`]: DecompressError::UnsupportedCheck
//! [`UnsupportedFilter`]: DecompressError::UnsupportedFilter
//! [`ChecksumMismatch`]: DecompressError::ChecksumMismatch
//! [`InvalidHuffmanTable`]: DecompressError::InvalidHuffmanTable
//! [`OutOfMemory`]: DecompressError::OutOfMemory
//! [`DictionaryTooLarge`]: DecompressError::DictionaryTooLarge
//! [`NoProgress`]: DecompressError::NoProgress

use thiserror::Error;

/// `errno` value reported for memory exhaustion.
pub const ENOMEM: i32 = 12;
/// `errno` value reported for every other decoding failure.
pub const EINVAL: i32 = 22;

/// Coarse classification of a [`DecompressError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad magic or a payload too short to hold any valid header.
    Format,
    /// Recognised, but asks for a feature this decoder does not provide.
    Options,
    /// Corrupt data: length, CRC or table inconsistencies.
    Data,
    /// Allocation failure or a configured memory ceiling was exceeded.
    Memory,
    /// The decoder stopped making progress (truncated or stalled input).
    Buffer,
}

/// Which integrity value failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Adler32,
    Crc32,
    Crc64,
    /// The combined block-size hash compared against the XZ index.
    IndexHash,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Adler32 => "Adler-32",
            Self::Crc32 => "CRC32",
            Self::Crc64 => "CRC64",
            Self::IndexHash => "index hash",
        };
        f.write_str(name)
    }
}

/// Decompression errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecompressError {
    #[error("input too short: need {needed} bytes, have {have}")]
    TooShort { needed: usize, have: usize },

    #[error("bad magic bytes for {0}")]
    BadMagic(&'static str),

    /// zlib CMF names a compression method other than deflate.
    #[error("unsupported zlib compression method: {0}")]
    UnsupportedMethod(u8),

    #[error("zlib window size too large (CINFO {0})")]
    WindowTooLarge(u8),

    #[error("zlib stream requires a preset dictionary")]
    PresetDictionary,

    #[error("zlib header check failed")]
    HeaderCheck,

    #[error("unsupported ELF compression type: {0}")]
    UnsupportedCompressionType(u32),

    #[error("declared uncompressed size {declared} exceeds limit {limit}")]
    DeclaredSizeTooLarge { declared: u64, limit: u64 },

    #[error("invalid deflate block type 3")]
    InvalidBlockType,

    #[error("stored block length {len:#06x} does not match complement {nlen:#06x}")]
    StoredLengthMismatch { len: u16, nlen: u16 },

    #[error("dynamic block header out of range: {nlit} literal codes, {ndist} distance codes")]
    InvalidCodeCounts { nlit: u32, ndist: u32 },

    #[error("invalid Huffman table")]
    InvalidHuffmanTable,

    #[error("invalid Huffman code")]
    InvalidHuffmanCode,

    #[error("invalid code length symbol: {0}")]
    InvalidCodeLength(u16),

    #[error("end-of-block code has no length")]
    MissingEndOfBlock,

    #[error("invalid length symbol: {0}")]
    InvalidLengthSymbol(u16),

    #[error("invalid distance symbol: {0}")]
    InvalidDistanceSymbol(u16),

    #[error("invalid back reference: distance {distance} exceeds {available} available bytes")]
    InvalidBackReference { distance: usize, available: usize },

    #[error("output buffer overflow")]
    BufferOverflow,

    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("decoded {actual} bytes but {expected} were declared")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("{kind} mismatch: expected {expected:#x}, computed {actual:#x}")]
    ChecksumMismatch {
        kind: ChecksumKind,
        expected: u64,
        actual: u64,
    },

    #[error("unsupported XZ stream flags: {0:#04x}")]
    UnsupportedStreamFlags(u8),

    #[error("unsupported XZ integrity check: {0}")]
    UnsupportedCheck(u8),

    #[error("unsupported XZ block flags: {0:#04x}")]
    UnsupportedBlockFlags(u8),

    #[error("unsupported XZ filter id: {0:#x}")]
    UnsupportedFilter(u64),

    #[error("unsupported filter properties")]
    UnsupportedFilterProperties,

    #[error("unsupported LZMA2 dictionary property: {0}")]
    UnsupportedDictionary(u8),

    #[error("LZMA2 dictionary of {size} bytes exceeds limit {max}")]
    DictionaryTooLarge { size: u64, max: u64 },

    #[error("invalid LZMA properties byte: {0:#04x}")]
    InvalidLzmaProperties(u8),

    #[error("corrupt data: {0}")]
    Corrupt(&'static str),

    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("decoded output exceeds limit {limit}")]
    OutputLimitExceeded { limit: u64 },

    #[error("no progress after two consecutive calls")]
    NoProgress,
}

impl DecompressError {
    /// Coarse classification used by the best-effort section layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooShort { .. } | Self::BadMagic(_) | Self::UnsupportedMethod(_) => {
                ErrorKind::Format
            }
            Self::WindowTooLarge(_)
            | Self::PresetDictionary
            | Self::UnsupportedCompressionType(_)
            | Self::UnsupportedStreamFlags(_)
            | Self::UnsupportedCheck(_)
            | Self::UnsupportedBlockFlags(_)
            | Self::UnsupportedFilter(_)
            | Self::UnsupportedFilterProperties
            | Self::UnsupportedDictionary(_) => ErrorKind::Options,
            Self::OutOfMemory { .. }
            | Self::DictionaryTooLarge { .. }
            | Self::OutputLimitExceeded { .. } => ErrorKind::Memory,
            Self::NoProgress => ErrorKind::Buffer,
            Self::HeaderCheck
            | Self::DeclaredSizeTooLarge { .. }
            | Self::InvalidBlockType
            | Self::StoredLengthMismatch { .. }
            | Self::InvalidCodeCounts { .. }
            | Self::InvalidHuffmanTable
            | Self::InvalidHuffmanCode
            | Self::InvalidCodeLength(_)
            | Self::MissingEndOfBlock
            | Self::InvalidLengthSymbol(_)
            | Self::InvalidDistanceSymbol(_)
            | Self::InvalidBackReference { .. }
            | Self::BufferOverflow
            | Self::UnexpectedEof
            | Self::SizeMismatch { .. }
            | Self::ChecksumMismatch { .. }
            | Self::InvalidLzmaProperties(_)
            | Self::Corrupt(_) => ErrorKind::Data,
        }
    }

    /// Numeric code handed to an [`ErrorCallback`](crate::sections::ErrorCallback).
    pub fn errno(&self) -> i32 {
        match self.kind() {
            ErrorKind::Memory => ENOMEM,
            _ => EINVAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecompressError>;
