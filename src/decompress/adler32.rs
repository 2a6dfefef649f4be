//! Adler-32 checksum used by the zlib trailer.

const MOD_ADLER: u32 = 65521;

/// Largest n such that 255 * n * (n + 1) / 2 + (n + 1) * (MOD_ADLER - 1)
/// fits in a u32, so reductions can be deferred that long.
const NMAX: usize = 5552;

/// Adler-32 of `data`, starting from the standard seed.
pub fn adler32(data: &[u8]) -> u32 {
    let mut s1: u32 = 1;
    let mut s2: u32 = 0;

    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            s1 += u32::from(byte);
            s2 += s1;
        }
        s1 %= MOD_ADLER;
        s2 %= MOD_ADLER;
    }

    (s2 << 16) | s1
}
