//! XZ container decoding (`.gnu_debugdata` MiniDebugInfo).
//!
//! Only the subset needed for debug data is supported: CRC32 or CRC64
//! integrity checks, and an optional BCJ filter in front of a single
//! LZMA2 filter.

pub mod bcj;
pub mod decoder;
pub mod vli;

use log::{debug, trace};

pub use bcj::{BcjDecoder, BcjFilter};
pub use decoder::{Check, XzDecoder, STREAM_HEADER_SIZE};

use super::buffer::{try_grow, try_zeroed};
use super::stream::{InOutBuffer, XzStatus};
use super::{DecompressError, Result};
use crate::options::DecompressOptions;

/// Decode a complete in-memory XZ stream.
///
/// The final size is unknown up front, so output starts at
/// `data.len() * xz_grow_factor` bytes and grows by that much whenever it
/// fills, subject to `max_output`.
pub fn uncompress_xz(data: &[u8], opts: &DecompressOptions) -> Result<Vec<u8>> {
    if data.len() < STREAM_HEADER_SIZE {
        return Err(DecompressError::TooShort {
            needed: STREAM_HEADER_SIZE,
            have: data.len(),
        });
    }

    let step = data.len().saturating_mul(opts.xz_grow_factor.max(1));
    let initial = opts.max_output.map_or(step, |max| step.min(max));
    let mut out = try_zeroed(initial)?;
    let mut decoder = XzDecoder::new(opts.dict_size_max)?;

    let mut in_pos = 0;
    let mut out_pos = 0;
    loop {
        let mut b = InOutBuffer {
            input: data,
            in_pos,
            output: &mut out,
            out_pos,
        };
        let status = decoder.run(&mut b)?;
        in_pos = b.in_pos;
        out_pos = b.out_pos;

        match status {
            XzStatus::StreamEnd => break,
            XzStatus::NeedMore if out_pos == out.len() => {
                let target = match opts.max_output {
                    Some(max) if out.len() >= max => {
                        return Err(DecompressError::OutputLimitExceeded { limit: max as u64 });
                    }
                    Some(max) => out.len().saturating_add(step).min(max),
                    None => out.len().saturating_add(step),
                };
                let additional = target - out.len();
                try_grow(&mut out, additional)?;
                trace!("XZ output grown to {} bytes", out.len());
            }
            // Out of input: the next call either progresses or reports
            // NoProgress.
            XzStatus::NeedMore => {}
        }
    }

    if in_pos < data.len() {
        debug!("ignoring {} bytes after XZ stream", data.len() - in_pos);
    }
    out.truncate(out_pos);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: [u8; 32] = [
        0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, 0x00, 0x01, 0x69, 0x22, 0xde, 0x36, //
        0x00, 0x00, 0x00, 0x00, 0x1c, 0xdf, 0x44, 0x21, //
        0x90, 0x42, 0x99, 0x0d, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x59, 0x5a,
    ];

    #[test]
    fn test_too_short() {
        for len in [0, 11] {
            let err = uncompress_xz(&EMPTY[..len], &DecompressOptions::default()).unwrap_err();
            assert_eq!(err, DecompressError::TooShort { needed: 12, have: len });
            assert_eq!(err.kind(), crate::ErrorKind::Format);
        }
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(uncompress_xz(&EMPTY, &DecompressOptions::default()), Ok(Vec::new()));
    }

    #[test]
    fn test_truncated_is_no_progress() {
        let err = uncompress_xz(&EMPTY[..20], &DecompressOptions::default()).unwrap_err();
        assert_eq!(err, DecompressError::NoProgress);
        assert_eq!(err.kind(), crate::ErrorKind::Buffer);
    }
}
