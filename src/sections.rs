//! Best-effort decompression of a file's DWARF sections.
//!
//! The caller locates the sections (by name, in whatever object format it
//! parses) and hands them over as [`SectionInput`]s. Each section is decoded
//! independently: a failure is reported through an [`ErrorCallback`] and the
//! section is left out, but every other section is still produced.
//!
//! ```rust
//! use debugsect::sections::{CollectErrors, DebugSections, DwarfSection, SectionInput};
//! use debugsect::DecompressOptions;
//!
//! let inputs = [(DwarfSection::Str, SectionInput::Plain(b"main\0"))];
//! let mut errors = CollectErrors::default();
//! let sections = DebugSections::uncompress(&inputs, &DecompressOptions::default(), &mut errors);
//! assert_eq!(sections.get(DwarfSection::Str), Some(&b"main\0"[..]));
//! assert!(errors.errors.is_empty());
//! ```

use std::borrow::Cow;

use log::{debug, warn};

use crate::crc32::crc32;
use crate::decompress::{uncompress_chdr, uncompress_xz, uncompress_zdebug, ElfClass, Endian};
use crate::error::{ErrorKind, Result};
use crate::options::DecompressOptions;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Number of DWARF sections tracked.
pub const DWARF_SECTION_COUNT: usize = 9;

/// The DWARF sections a symbolizer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DwarfSection {
    Info,
    Line,
    Abbrev,
    Ranges,
    Str,
    Addr,
    StrOffsets,
    LineStr,
    Rnglists,
}

const SECTION_NAMES: [&str; DWARF_SECTION_COUNT] = [
    ".debug_info",
    ".debug_line",
    ".debug_abbrev",
    ".debug_ranges",
    ".debug_str",
    ".debug_addr",
    ".debug_str_offsets",
    ".debug_line_str",
    ".debug_rnglists",
];

impl DwarfSection {
    pub const ALL: [Self; DWARF_SECTION_COUNT] = [
        Self::Info,
        Self::Line,
        Self::Abbrev,
        Self::Ranges,
        Self::Str,
        Self::Addr,
        Self::StrOffsets,
        Self::LineStr,
        Self::Rnglists,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Section name, e.g. `.debug_info`.
    pub fn name(self) -> &'static str {
        SECTION_NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Look up a legacy `.zdebug_*` name, e.g. `.zdebug_info`.
    pub fn from_zdebug_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(".z")?;
        Self::ALL.into_iter().find(|s| &s.name()[1..] == rest)
    }
}

/// One located section body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionInput<'a> {
    /// `.debug_*` stored uncompressed.
    Plain(&'a [u8]),
    /// `.debug_*` with `SHF_COMPRESSED` set.
    Chdr {
        data: &'a [u8],
        class: ElfClass,
        endian: Endian,
    },
    /// `.zdebug_*` legacy section.
    Zdebug(&'a [u8]),
}

impl<'a> SectionInput<'a> {
    fn is_legacy(&self) -> bool {
        matches!(self, Self::Zdebug(_))
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Plain(data) | Self::Zdebug(data) | Self::Chdr { data, .. } => data.is_empty(),
        }
    }

    fn decode(&self, opts: &DecompressOptions) -> Result<Cow<'a, [u8]>> {
        match *self {
            Self::Plain(data) => Ok(Cow::Borrowed(data)),
            Self::Chdr { data, class, endian } => {
                uncompress_chdr(data, class, endian, opts).map(Cow::Owned)
            }
            Self::Zdebug(data) => uncompress_zdebug(data, opts).map(Cow::Owned),
        }
    }
}

/// Receives diagnostics from best-effort decoding: a message and an errno
/// value (`ENOMEM` or `EINVAL`).
pub trait ErrorCallback {
    fn report(&mut self, msg: &str, errnum: i32);
}

impl<F: FnMut(&str, i32)> ErrorCallback for F {
    fn report(&mut self, msg: &str, errnum: i32) {
        self(msg, errnum)
    }
}

/// Records every reported error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectErrors {
    pub errors: Vec<(String, i32)>,
}

impl ErrorCallback for CollectErrors {
    fn report(&mut self, msg: &str, errnum: i32) {
        self.errors.push((msg.to_string(), errnum));
    }
}

/// Decoded DWARF sections. Uncompressed inputs are borrowed, not copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugSections<'a> {
    sections: [Option<Cow<'a, [u8]>>; DWARF_SECTION_COUNT],
}

impl<'a> DebugSections<'a> {
    /// Decode every section in `inputs`.
    ///
    /// When a section appears both as `.debug_X` and `.zdebug_X`, the
    /// `.debug_X` copy wins unless it is empty. Within one kind, the last
    /// input wins.
    pub fn uncompress<C>(
        inputs: &[(DwarfSection, SectionInput<'a>)],
        opts: &DecompressOptions,
        callback: &mut C,
    ) -> Self
    where
        C: ErrorCallback + ?Sized,
    {
        let mut primary: [Option<SectionInput<'a>>; DWARF_SECTION_COUNT] = Default::default();
        let mut legacy: [Option<SectionInput<'a>>; DWARF_SECTION_COUNT] = Default::default();
        for &(section, input) in inputs {
            let slot = if input.is_legacy() {
                &mut legacy[section.index()]
            } else {
                &mut primary[section.index()]
            };
            *slot = Some(input);
        }

        let selected: Vec<(DwarfSection, SectionInput<'a>)> = DwarfSection::ALL
            .into_iter()
            .filter_map(|section| {
                let i = section.index();
                let input = match (primary[i], legacy[i]) {
                    (Some(p), Some(z)) if p.is_empty() => z,
                    (Some(p), _) => p,
                    (None, z) => z?,
                };
                Some((section, input))
            })
            .collect();

        let mut out = Self::default();
        for (section, result) in decode_all(&selected, opts) {
            match result {
                Ok(data) => {
                    debug!("{}: {} bytes", section.name(), data.len());
                    out.sections[section.index()] = Some(data);
                }
                Err(err) => {
                    warn!("skipping {}: {}", section.name(), err);
                    callback.report(&format!("{}: {}", section.name(), err), err.errno());
                }
            }
        }
        out
    }

    pub fn get(&self, section: DwarfSection) -> Option<&[u8]> {
        self.sections[section.index()].as_deref()
    }

    pub fn contains(&self, section: DwarfSection) -> bool {
        self.sections[section.index()].is_some()
    }

    /// Present sections in [`DwarfSection::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (DwarfSection, &[u8])> + '_ {
        DwarfSection::ALL
            .into_iter()
            .filter_map(|s| self.get(s).map(|data| (s, data)))
    }

    pub fn len(&self) -> usize {
        self.sections.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(feature = "parallel")]
fn decode_all<'a>(
    selected: &[(DwarfSection, SectionInput<'a>)],
    opts: &DecompressOptions,
) -> Vec<(DwarfSection, Result<Cow<'a, [u8]>>)> {
    selected
        .par_iter()
        .map(|(section, input)| (*section, input.decode(opts)))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn decode_all<'a>(
    selected: &[(DwarfSection, SectionInput<'a>)],
    opts: &DecompressOptions,
) -> Vec<(DwarfSection, Result<Cow<'a, [u8]>>)> {
    selected
        .iter()
        .map(|(section, input)| (*section, input.decode(opts)))
        .collect()
}

/// Decode a `.gnu_debugdata` (MiniDebugInfo) section.
///
/// Returns `None` after reporting the failure through `callback`.
pub fn uncompress_gnu_debugdata<C>(
    data: &[u8],
    opts: &DecompressOptions,
    callback: &mut C,
) -> Option<Vec<u8>>
where
    C: ErrorCallback + ?Sized,
{
    match uncompress_xz(data, opts) {
        Ok(out) => {
            debug!(".gnu_debugdata: {} -> {} bytes", data.len(), out.len());
            Some(out)
        }
        Err(err) => {
            warn!(".gnu_debugdata: {}", err);
            let msg = match err.kind() {
                ErrorKind::Memory => "XZ decompressor ran out of memory",
                ErrorKind::Format => "Input is not in the XZ format (wrong magic bytes)",
                ErrorKind::Options => {
                    "Input was encoded with settings that are not supported by this XZ decoder"
                }
                ErrorKind::Data | ErrorKind::Buffer => "XZ-compressed data is corrupt",
            };
            callback.report(msg, err.errno());
            None
        }
    }
}

/// Compare a separate debug file's CRC-32 with the `.gnu_debuglink` value.
/// An expected value of zero means no CRC was recorded and always matches.
pub fn debuglink_crc_matches(file: &[u8], expected: u32) -> bool {
    if expected == 0 {
        return true;
    }
    let actual = crc32(file);
    if actual != expected {
        debug!(
            "debuglink CRC mismatch: expected {:#010x}, got {:#010x}",
            expected, actual
        );
    }
    actual == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EINVAL, ENOMEM};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zdebug(data: &[u8]) -> Vec<u8> {
        let mut out = b"ZLIB".to_vec();
        out.extend_from_slice(&(data.len() as u64).to_be_bytes());
        out.extend_from_slice(&zlib(data));
        out
    }

    fn chdr64(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(&1u64.to_le_bytes());
        out.extend_from_slice(&zlib(data));
        out
    }

    fn chdr_input(data: &[u8]) -> SectionInput<'_> {
        SectionInput::Chdr {
            data,
            class: ElfClass::Elf64,
            endian: Endian::Little,
        }
    }

    #[test]
    fn test_section_names() {
        for section in DwarfSection::ALL {
            assert_eq!(DwarfSection::from_name(section.name()), Some(section));
            let zname = format!(".z{}", &section.name()[1..]);
            assert_eq!(DwarfSection::from_zdebug_name(&zname), Some(section));
        }
        assert_eq!(DwarfSection::Info.name(), ".debug_info");
        assert_eq!(
            DwarfSection::from_zdebug_name(".zdebug_str_offsets"),
            Some(DwarfSection::StrOffsets)
        );
        assert_eq!(DwarfSection::from_name(".debug_frame"), None);
        assert_eq!(DwarfSection::from_name(".zdebug_info"), None);
        assert_eq!(DwarfSection::from_zdebug_name(".debug_info"), None);
    }

    #[test]
    fn test_mixed_inputs() {
        let info = b"info section contents ".repeat(40);
        let line = b"line program".repeat(10);
        let chdr = chdr64(&info);
        let zd = zdebug(&line);
        let inputs = [
            (DwarfSection::Info, chdr_input(&chdr)),
            (DwarfSection::Line, SectionInput::Zdebug(&zd)),
            (DwarfSection::Str, SectionInput::Plain(b"main\0")),
        ];

        let mut errors = CollectErrors::default();
        let sections = DebugSections::uncompress(&inputs, &DecompressOptions::default(), &mut errors);

        assert!(errors.errors.is_empty());
        assert_eq!(sections.len(), 3);
        assert_eq!(sections.get(DwarfSection::Info), Some(&info[..]));
        assert_eq!(sections.get(DwarfSection::Line), Some(&line[..]));
        assert_eq!(sections.get(DwarfSection::Str), Some(&b"main\0"[..]));
        assert!(!sections.contains(DwarfSection::Abbrev));

        let order: Vec<_> = sections.iter().map(|(s, _)| s).collect();
        assert_eq!(order, [DwarfSection::Info, DwarfSection::Line, DwarfSection::Str]);
    }

    #[test]
    fn test_plain_is_borrowed() {
        let body = b"abbrev";
        let inputs = [(DwarfSection::Abbrev, SectionInput::Plain(body))];
        let mut errors = CollectErrors::default();
        let sections = DebugSections::uncompress(&inputs, &DecompressOptions::default(), &mut errors);
        assert!(matches!(
            sections.sections[DwarfSection::Abbrev.index()],
            Some(Cow::Borrowed(_))
        ));
    }

    #[test]
    fn test_debug_wins_over_zdebug() {
        // The zdebug copy is corrupt; it must be ignored, not reported.
        let inputs = [
            (DwarfSection::Info, SectionInput::Zdebug(b"ZLIB\0\0\0\0\0\0\0\x05garbage")),
            (DwarfSection::Info, SectionInput::Plain(b"real")),
        ];
        let mut errors = CollectErrors::default();
        let sections = DebugSections::uncompress(&inputs, &DecompressOptions::default(), &mut errors);
        assert!(errors.errors.is_empty());
        assert_eq!(sections.get(DwarfSection::Info), Some(&b"real"[..]));
    }

    #[test]
    fn test_empty_debug_falls_back_to_zdebug() {
        let zd = zdebug(b"from zdebug");
        let inputs = [
            (DwarfSection::Ranges, SectionInput::Plain(b"")),
            (DwarfSection::Ranges, SectionInput::Zdebug(&zd)),
        ];
        let mut errors = CollectErrors::default();
        let sections = DebugSections::uncompress(&inputs, &DecompressOptions::default(), &mut errors);
        assert_eq!(sections.get(DwarfSection::Ranges), Some(&b"from zdebug"[..]));
    }

    #[test]
    fn test_failure_is_isolated() {
        let good = chdr64(b"good line data");
        let mut bad = chdr64(b"bad info data that will not survive");
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let inputs = [
            (DwarfSection::Info, chdr_input(&bad)),
            (DwarfSection::Line, chdr_input(&good)),
        ];

        let mut errors = CollectErrors::default();
        let sections = DebugSections::uncompress(&inputs, &DecompressOptions::default(), &mut errors);

        assert!(!sections.contains(DwarfSection::Info));
        assert_eq!(sections.get(DwarfSection::Line), Some(&b"good line data"[..]));
        assert_eq!(errors.errors.len(), 1);
        let (msg, errnum) = &errors.errors[0];
        assert!(msg.starts_with(".debug_info: "));
        assert_eq!(*errnum, EINVAL);
    }

    #[test]
    fn test_closure_callback() {
        let mut seen = Vec::new();
        let inputs = [(DwarfSection::Addr, SectionInput::Zdebug(b"ZLIB"))];
        let sections = DebugSections::uncompress(
            &inputs,
            &DecompressOptions::default(),
            &mut |msg: &str, errnum: i32| seen.push((msg.to_string(), errnum)),
        );
        assert!(sections.is_empty());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, EINVAL);
    }

    const EMPTY_XZ: [u8; 32] = [
        0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, 0x00, 0x01, 0x69, 0x22, 0xde, 0x36, //
        0x00, 0x00, 0x00, 0x00, 0x1c, 0xdf, 0x44, 0x21, //
        0x90, 0x42, 0x99, 0x0d, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5a,
    ];

    #[test]
    fn test_gnu_debugdata_ok() {
        let mut errors = CollectErrors::default();
        let out = uncompress_gnu_debugdata(&EMPTY_XZ, &DecompressOptions::default(), &mut errors);
        assert_eq!(out, Some(Vec::new()));
        assert!(errors.errors.is_empty());
    }

    #[test]
    fn test_gnu_debugdata_messages() {
        let cases: [(&[u8], DecompressOptions, &str, i32); 4] = [
            (
                b"not an xz stream at all",
                DecompressOptions::default(),
                "Input is not in the XZ format (wrong magic bytes)",
                EINVAL,
            ),
            (
                include_bytes!("../__fixtures__/compressed/lorem_sha256.xz"),
                DecompressOptions::default(),
                "Input was encoded with settings that are not supported by this XZ decoder",
                EINVAL,
            ),
            (
                &EMPTY_XZ[..24],
                DecompressOptions::default(),
                "XZ-compressed data is corrupt",
                EINVAL,
            ),
            (
                include_bytes!("../__fixtures__/compressed/lorem_crc32.xz"),
                DecompressOptions::default().with_dict_size_max(4095),
                "XZ decompressor ran out of memory",
                ENOMEM,
            ),
        ];

        for (data, opts, msg, errnum) in cases {
            let mut errors = CollectErrors::default();
            assert_eq!(uncompress_gnu_debugdata(data, &opts, &mut errors), None);
            assert_eq!(errors.errors, [(msg.to_string(), errnum)]);
        }
    }

    #[test]
    fn test_debuglink_crc() {
        assert!(debuglink_crc_matches(b"123456789", 0xCBF43926));
        assert!(!debuglink_crc_matches(b"123456789", 0xCBF43927));
        assert!(debuglink_crc_matches(b"anything", 0));
    }
}
