//! Fallible buffer allocation.
//!
//! Decoders may run while the host is already in trouble (a crash handler
//! symbolizing its own stack), so every input-sized allocation goes
//! through `try_reserve_exact` and comes back as
//! [`DecompressError::OutOfMemory`] instead of aborting.

use super::{DecompressError, Result};

/// Allocate `len` copies of `value`.
pub fn try_filled<T: Copy>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| DecompressError::OutOfMemory {
            requested: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Allocate a zeroed byte buffer.
pub fn try_zeroed(len: usize) -> Result<Vec<u8>> {
    try_filled(len, 0u8)
}

/// Extend `buf` by `additional` zero bytes.
pub fn try_grow(buf: &mut Vec<u8>, additional: usize) -> Result<()> {
    let new_len = buf
        .len()
        .checked_add(additional)
        .ok_or(DecompressError::OutOfMemory { requested: usize::MAX })?;
    buf.try_reserve_exact(additional)
        .map_err(|_| DecompressError::OutOfMemory { requested: new_len })?;
    buf.resize(new_len, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_zeroed() {
        let buf = try_zeroed(16).unwrap();
        assert_eq!(buf, vec![0u8; 16]);
    }

    #[test]
    fn test_impossible_allocation() {
        assert!(matches!(
            try_zeroed(usize::MAX),
            Err(DecompressError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_try_grow() {
        let mut buf = vec![1u8, 2];
        try_grow(&mut buf, 3).unwrap();
        assert_eq!(buf, [1, 2, 0, 0, 0]);
        assert!(try_grow(&mut buf, usize::MAX).is_err());
    }
}
