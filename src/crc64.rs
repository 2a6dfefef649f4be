//! CRC64 (ECMA-182 reflected, as used by the XZ container).

const CRC64_TABLE: [u64; 256] = {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xC96C5795D7870F42;
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

/// Continue a CRC64 from `seed`.
pub fn crc64_update(seed: u64, data: &[u8]) -> u64 {
    let mut crc = !seed;
    for &byte in data {
        let index = ((crc ^ byte as u64) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC64_TABLE[index];
    }
    !crc
}

pub fn crc64(data: &[u8]) -> u64 {
    crc64_update(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_prefix() {
        assert_eq!(CRC64_TABLE[0], 0);
        assert_eq!(CRC64_TABLE[1], 0xb32e4cbe03a75f6f);
        assert_eq!(CRC64_TABLE[255], 0xe0ada17364673f59);
    }

    #[test]
    fn test_crc64() {
        assert_eq!(crc64(b""), 0);
        assert_eq!(crc64(b"123456789"), 0x995DC9BBDF1939FA);
    }

    #[test]
    fn test_crc64_incremental() {
        let split = crc64_update(crc64(b"1234"), b"56789");
        assert_eq!(split, crc64(b"123456789"));
    }
}
