//! Decompression engine for compressed ELF debug sections.
//!
//! Symbolizers read DWARF from object files whose debug sections are often
//! compressed. This crate turns those section bodies back into plain bytes;
//! finding the sections and interpreting DWARF is left to the caller.
//!
//! Supports the legacy `.zdebug_*` container (`zlib-gnu`), `SHF_COMPRESSED`
//! sections with an `ElfN_Chdr` (`zlib-gabi`), and XZ-compressed
//! `.gnu_debugdata` (MiniDebugInfo) with optional BCJ filters.
//!
//! ## Features
//! - Core library depends only on `thiserror` and `log`
//! - `parallel` - Decompress independent DWARF sections on the rayon pool
//!
//! ## Example
//!
//! ```rust
//! use debugsect::decompress::{decompress, CompressedFormat};
//! use debugsect::DecompressOptions;
//!
//! let section = b"ZLIB\0\0\0\0\0\0\0\x02\x78\x01\x01\x02\x00\xfd\xff\x41\x42\x00\xc6\x00\x84";
//! let format = CompressedFormat::detect(section).unwrap();
//! let out = decompress(format, section, &DecompressOptions::default())?;
//! assert_eq!(out, b"AB");
//! # Ok::<(), debugsect::DecompressError>(())
//! ```

mod crc32;
mod crc64;
pub mod decompress;
pub mod error;
pub mod formats;
mod options;
pub mod sections;

pub use crc32::{crc32, crc32_update};
pub use crc64::{crc64, crc64_update};
pub use error::{ChecksumKind, DecompressError, ErrorKind, Result};
pub use options::{DecompressOptions, DEFLATE_MAX_RATIO};
pub use sections::{DebugSections, DwarfSection, ErrorCallback, SectionInput};
