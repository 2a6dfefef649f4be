//! CRC32 (zlib/gzip polynomial) used for XZ headers and `.gnu_debuglink`.

/// CRC32 lookup table (polynomial 0xEDB88320, reflected)
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Continue a CRC32 from `seed` (the value returned by a previous call,
/// or 0 to start).
pub fn crc32_update(seed: u32, data: &[u8]) -> u32 {
    let mut crc = !seed;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// Calculate CRC32 of data.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}
