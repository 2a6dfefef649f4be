#![no_main]
use debugsect::decompress::uncompress_xz;
use debugsect::DecompressOptions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cap dictionary and output to keep memory bounded
    let opts = DecompressOptions::default()
        .with_dict_size_max(16 * 1024 * 1024)
        .with_max_output(Some(16 * 1024 * 1024));
    let _ = uncompress_xz(data, &opts);
});
