//! Compressed debug-section containers that wrap a zlib stream.
//!
//! Two conventions exist:
//!
//! | Container | Header | Size field |
//! |-----------|--------|------------|
//! | Legacy `.zdebug_*` | `"ZLIB"` + 8 bytes | big-endian u64 |
//! | `SHF_COMPRESSED` section | `Elf32_Chdr` / `Elf64_Chdr` | target-endian `ch_size` |
//!
//! Both hand the rest of the payload to [`inflate_zlib`] with the declared
//! size, after checking that size against [`DecompressOptions`].

use log::debug;

use super::inflate::inflate_zlib;
use super::{DecompressError, Result};
use crate::options::DecompressOptions;

/// Magic at the start of a legacy `.zdebug_*` section.
pub const ZDEBUG_MAGIC: &[u8; 4] = b"ZLIB";
/// Magic plus the 8-byte size.
pub const ZDEBUG_HEADER_SIZE: usize = 12;

/// `ch_type` for zlib.
pub const ELFCOMPRESS_ZLIB: u32 = 1;

/// ELF file class, which selects the compression header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    /// Size of `ElfN_Chdr`.
    pub fn chdr_size(self) -> usize {
        match self {
            Self::Elf32 => 12,
            Self::Elf64 => 24,
        }
    }
}

/// Byte order of the ELF image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        }
    }

    fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        match self {
            Self::Little => u64::from_le_bytes(raw),
            Self::Big => u64::from_be_bytes(raw),
        }
    }
}

/// Decoded ELF compression header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionHeader {
    pub ch_type: u32,
    pub ch_size: u64,
    pub ch_addralign: u64,
}

impl CompressionHeader {
    pub fn parse(data: &[u8], class: ElfClass, endian: Endian) -> Result<Self> {
        let needed = class.chdr_size();
        if data.len() < needed {
            return Err(DecompressError::TooShort {
                needed,
                have: data.len(),
            });
        }
        Ok(match class {
            ElfClass::Elf32 => Self {
                ch_type: endian.read_u32(&data[0..4]),
                ch_size: u64::from(endian.read_u32(&data[4..8])),
                ch_addralign: u64::from(endian.read_u32(&data[8..12])),
            },
            // ch_reserved sits at 4..8.
            ElfClass::Elf64 => Self {
                ch_type: endian.read_u32(&data[0..4]),
                ch_size: endian.read_u64(&data[8..16]),
                ch_addralign: endian.read_u64(&data[16..24]),
            },
        })
    }
}

/// Decode a legacy `"ZLIB"` + big-endian size + zlib stream payload.
pub fn uncompress_zdebug(data: &[u8], opts: &DecompressOptions) -> Result<Vec<u8>> {
    if data.len() < ZDEBUG_HEADER_SIZE {
        return Err(DecompressError::TooShort {
            needed: ZDEBUG_HEADER_SIZE,
            have: data.len(),
        });
    }
    if &data[..4] != ZDEBUG_MAGIC {
        return Err(DecompressError::BadMagic("zdebug"));
    }

    let mut size = [0u8; 8];
    size.copy_from_slice(&data[4..12]);
    let declared = u64::from_be_bytes(size);
    let payload = &data[ZDEBUG_HEADER_SIZE..];
    let out_len = opts.check_declared_size(declared, payload.len())?;

    debug!(
        "zdebug section: {} compressed bytes, {} declared",
        payload.len(),
        declared
    );
    inflate_zlib(payload, out_len)
}

/// Decode an `SHF_COMPRESSED` section body (compression header + zlib).
pub fn uncompress_chdr(
    data: &[u8],
    class: ElfClass,
    endian: Endian,
    opts: &DecompressOptions,
) -> Result<Vec<u8>> {
    let header = CompressionHeader::parse(data, class, endian)?;
    if header.ch_type != ELFCOMPRESS_ZLIB {
        return Err(DecompressError::UnsupportedCompressionType(header.ch_type));
    }

    let payload = &data[class.chdr_size()..];
    let out_len = opts.check_declared_size(header.ch_size, payload.len())?;

    debug!(
        "{:?} compressed section: {} compressed bytes, {} declared",
        class,
        payload.len(),
        header.ch_size
    );
    inflate_zlib(payload, out_len)
}
