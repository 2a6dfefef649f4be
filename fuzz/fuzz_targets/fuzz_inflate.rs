#![no_main]
use debugsect::decompress::inflate_zlib;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // First 4 bytes: output size (capped to 16MB to avoid OOM)
    let out_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) % (16 * 1024 * 1024);

    let _ = inflate_zlib(&data[4..], out_len as usize);
});
