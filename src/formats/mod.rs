//! Compressed payload signatures.
//!
//! A section body only says what it is through its first few bytes, or
//! through metadata the caller read from the section header. [`Signature`]
//! covers the former; [`CompressedFormat`] is the full tag handed to
//! [`decompress`](crate::decompress::decompress).

use crate::decompress::inflate::check_zlib_header;
use crate::decompress::zdebug::{ElfClass, Endian, ZDEBUG_MAGIC};

/// Payload signature detected from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Legacy `.zdebug_*`: `"ZLIB"` + big-endian size.
    Zdebug,
    /// XZ stream (`.gnu_debugdata`).
    Xz,
    /// Bare zlib stream with no size prefix.
    Zlib,
}

impl Signature {
    pub const ZDEBUG: &[u8; 4] = ZDEBUG_MAGIC;
    pub const XZ: &[u8; 6] = b"\xFD7zXZ\x00";

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(Self::XZ) {
            Some(Self::Xz)
        } else if data.starts_with(Self::ZDEBUG) {
            Some(Self::Zdebug)
        } else if is_zlib_header(data) {
            Some(Self::Zlib)
        } else {
            None
        }
    }
}

/// True if `data` opens with a zlib header the inflater accepts.
pub fn is_zlib_header(data: &[u8]) -> bool {
    matches!(*data, [cmf, flg, ..] if check_zlib_header(cmf, flg).is_ok())
}

/// How a section body is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedFormat {
    /// `"ZLIB"` header with the size in the payload.
    Zdebug,
    /// `SHF_COMPRESSED` section with an `ElfN_Chdr`.
    Chdr { class: ElfClass, endian: Endian },
    /// XZ stream of unknown output size.
    Xz,
    /// Bare zlib stream whose output size is known from elsewhere.
    Zlib { size: usize },
}

impl CompressedFormat {
    /// Detect formats that describe themselves.
    ///
    /// `Chdr` depends on the section flags and `Zlib` needs a size from
    /// outside the payload, so neither is ever returned here.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match Signature::from_bytes(data)? {
            Signature::Zdebug => Some(Self::Zdebug),
            Signature::Xz => Some(Self::Xz),
            Signature::Zlib => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_detection() {
        assert_eq!(
            Signature::from_bytes(b"\xFD7zXZ\x00\x00\x01"),
            Some(Signature::Xz)
        );
        assert_eq!(
            Signature::from_bytes(b"ZLIB\x00\x00\x00\x00\x00\x00\x00\x10"),
            Some(Signature::Zdebug)
        );
        assert_eq!(Signature::from_bytes(&[0x78, 0x9C, 0x00]), Some(Signature::Zlib));
        assert_eq!(Signature::from_bytes(&[0x78, 0x01]), Some(Signature::Zlib));
        assert_eq!(Signature::from_bytes(b"\x7FELF"), None);
        assert_eq!(Signature::from_bytes(&[]), None);
    }

    #[test]
    fn test_zlib_header_checks() {
        // FCHECK off by one.
        assert!(!is_zlib_header(&[0x78, 0x9D]));
        // Method 7 is not deflate.
        assert!(!is_zlib_header(&[0x77, 0x9C]));
        // CINFO 8 is out of range even with a valid FCHECK.
        assert!(!is_zlib_header(&[0x88, 0x1C]));
        // Preset dictionaries are never used for debug sections.
        assert!(!is_zlib_header(&[0x78, 0xBB]));
        assert!(!is_zlib_header(&[0x78]));
    }

    #[test]
    fn test_detect_self_describing_only() {
        assert_eq!(
            CompressedFormat::detect(b"ZLIB\x00\x00\x00\x00\x00\x00\x00\x10"),
            Some(CompressedFormat::Zdebug)
        );
        assert_eq!(
            CompressedFormat::detect(b"\xFD7zXZ\x00\x00\x04"),
            Some(CompressedFormat::Xz)
        );
        assert_eq!(CompressedFormat::detect(&[0x78, 0x9C]), None);
    }
}
