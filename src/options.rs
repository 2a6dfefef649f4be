//! Decoder configuration.

use crate::error::{DecompressError, Result};

/// Largest expansion a DEFLATE stream can achieve (258-byte matches coded
/// in two bits).
pub const DEFLATE_MAX_RATIO: u64 = 1032;

/// Tunable limits applied by every decoder entry point.
///
/// ```rust
/// use debugsect::DecompressOptions;
///
/// let opts = DecompressOptions::default()
///     .with_dict_size_max(64 << 20)
///     .with_max_output(Some(256 << 20));
/// assert_eq!(opts.dict_size_max, 64 << 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressOptions {
    /// Ceiling on the LZMA2 dictionary a block header may request.
    pub dict_size_max: u32,
    /// Declared DEFLATE output may be at most `compressed * ratio + 258`
    /// bytes. `None` trusts the container header.
    pub max_expansion: Option<u64>,
    /// Absolute cap on any single output buffer.
    pub max_output: Option<usize>,
    /// XZ output grows by `compressed_len * xz_grow_factor` bytes at a time.
    pub xz_grow_factor: usize,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            dict_size_max: u32::MAX,
            max_expansion: Some(DEFLATE_MAX_RATIO),
            max_output: None,
            xz_grow_factor: 2,
        }
    }
}

impl DecompressOptions {
    pub fn with_dict_size_max(mut self, max: u32) -> Self {
        self.dict_size_max = max;
        self
    }

    pub fn with_max_expansion(mut self, ratio: Option<u64>) -> Self {
        self.max_expansion = ratio;
        self
    }

    pub fn with_max_output(mut self, max: Option<usize>) -> Self {
        self.max_output = max;
        self
    }

    pub fn with_xz_grow_factor(mut self, factor: usize) -> Self {
        self.xz_grow_factor = factor.max(1);
        self
    }

    /// Validate a size declared by a zlib container header against the
    /// configured ceilings and convert it to `usize`.
    pub fn check_declared_size(&self, declared: u64, compressed_len: usize) -> Result<usize> {
        if let Some(ratio) = self.max_expansion {
            let limit = (compressed_len as u64).saturating_mul(ratio).saturating_add(258);
            if declared > limit {
                return Err(DecompressError::DeclaredSizeTooLarge { declared, limit });
            }
        }
        let size = usize::try_from(declared).map_err(|_| DecompressError::OutOfMemory {
            requested: usize::MAX,
        })?;
        self.check_output(size)?;
        Ok(size)
    }

    /// Reject an output buffer larger than `max_output`.
    pub fn check_output(&self, size: usize) -> Result<()> {
        match self.max_output {
            Some(max) if size > max => Err(DecompressError::DeclaredSizeTooLarge {
                declared: size as u64,
                limit: max as u64,
            }),
            _ => Ok(()),
        }
    }
}
