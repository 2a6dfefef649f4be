//! Debug-section decompression algorithms.
//!
//! This module decodes the three ways a toolchain may compress debug data
//! inside an object file. Locating the sections is the caller's job; every
//! function here takes the raw section bytes.
//!
//! ## Containers
//!
//! | Container | Entry point | Payload | Output size |
//! |-----------|-------------|---------|-------------|
//! | `.zdebug_*` | [`uncompress_zdebug`] | zlib | big-endian u64 in header |
//! | `SHF_COMPRESSED` | [`uncompress_chdr`] | zlib | `ch_size` in `ElfN_Chdr` |
//! | `.gnu_debugdata` | [`uncompress_xz`] | XZ (LZMA2, optional BCJ) | unknown, grown on demand |
//!
//! [`decompress`] dispatches on a [`CompressedFormat`] tag.
//!
//! ## XZ Filters
//!
//! | Filter | ID | Description |
//! |--------|----|-------------|
//! | LZMA2 | `0x21` | Always last in the chain |
//! | x86 | `0x04` | CALL/JMP rel32 conversion |
//! | PowerPC | `0x05` | `bl` branch conversion (big-endian) |
//! | IA-64 | `0x06` | Bundle slot branch conversion |
//! | ARM | `0x07` | `BL` conversion |
//! | ARM-Thumb | `0x08` | `BL` pair conversion |
//! | SPARC | `0x09` | `call` conversion |
//!
//! ## Example
//!
//! ```rust
//! use debugsect::decompress::{decompress, CompressedFormat};
//! use debugsect::DecompressOptions;
//!
//! // "ZLIB", size 0, then an empty zlib stream.
//! let section = b"ZLIB\0\0\0\0\0\0\0\0\x78\x9c\x03\x00\x00\x00\x00\x01";
//! let out = decompress(CompressedFormat::Zdebug, section, &DecompressOptions::default())?;
//! assert!(out.is_empty());
//! # Ok::<(), debugsect::DecompressError>(())
//! ```
//!
//! ## Architecture
//!
//! The two decoding pipelines:
//!
//! ```text
//!   zlib payload                    XZ stream
//!       ↓                               ↓
//! ┌─────────────┐               ┌─────────────┐
//! │ BitReader   │               │ XzDecoder   │ ← headers, index, checks
//! └─────────────┘               └─────────────┘
//!       ↓                               ↓
//! ┌─────────────┐               ┌─────────────┐
//! │ Huffman     │               │ BcjDecoder  │ ← optional branch filter
//! └─────────────┘               └─────────────┘
//!       ↓                               ↓
//! ┌─────────────┐               ┌─────────────┐
//! │ Inflate     │ ← LZ77        │ Lzma2       │ ← chunks, resets
//! └─────────────┘               └─────────────┘
//!       ↓                               ↓
//! ┌─────────────┐               ┌─────────────┐
//! │ Adler-32    │               │ LZMA + RC   │ ← literals, matches
//! └─────────────┘               └─────────────┘
//!       ↓                               ↓
//! Uncompressed Data             Uncompressed Data
//! ```
//!
//! ## Memory Notes
//!
//! - Every buffer sized from input goes through `try_reserve_exact`, so a
//!   hostile size yields [`DecompressError::OutOfMemory`] rather than an abort
//! - The LZMA2 dictionary grows with the data instead of being allocated at
//!   its declared size up front

mod adler32;
mod bit_reader;
mod buffer;
pub mod huffman;
pub mod inflate;
pub mod lzma;
pub mod stream;
pub mod xz;
pub mod zdebug;


pub use crate::error::{DecompressError, Result};
pub use crate::formats::CompressedFormat;
pub use huffman::HuffmanTable;
pub use inflate::{inflate_zlib, inflate_zlib_into};
pub use lzma::{Dictionary, Lzma2Decoder};
pub use stream::{InOutBuffer, XzStatus};
pub use xz::{uncompress_xz, BcjFilter, Check, XzDecoder};
pub use zdebug::{uncompress_chdr, uncompress_zdebug, CompressionHeader, ElfClass, Endian};

use log::debug;

use crate::options::DecompressOptions;

/// Decompress one section body according to its declared format.
pub fn decompress(
    format: CompressedFormat,
    data: &[u8],
    opts: &DecompressOptions,
) -> Result<Vec<u8>> {
    debug!("decompressing {} bytes as {:?}", data.len(), format);
    match format {
        CompressedFormat::Zdebug => uncompress_zdebug(data, opts),
        CompressedFormat::Chdr { class, endian } => uncompress_chdr(data, class, endian, opts),
        CompressedFormat::Xz => uncompress_xz(data, opts),
        CompressedFormat::Zlib { size } => {
            let out_len = opts.check_declared_size(size as u64, data.len())?;
            inflate_zlib(data, out_len)
        }
    }
}
