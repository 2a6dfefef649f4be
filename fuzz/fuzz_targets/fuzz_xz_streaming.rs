#![no_main]
use debugsect::decompress::{uncompress_xz, InOutBuffer, XzDecoder, XzStatus};
use debugsect::DecompressOptions;
use libfuzzer_sys::fuzz_target;

const LIMIT: usize = 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let opts = DecompressOptions::default()
        .with_dict_size_max(LIMIT as u32)
        .with_max_output(Some(LIMIT));
    let whole = uncompress_xz(data, &opts);

    // Feed one input byte at a time into a buffer of the same cap
    let Ok(mut decoder) = XzDecoder::new(LIMIT as u32) else {
        return;
    };
    let mut out = vec![0u8; LIMIT];
    let mut in_pos = 0;
    let mut out_pos = 0;
    let streamed = loop {
        let end = (in_pos + 1).min(data.len());
        let mut b = InOutBuffer::new(&data[..end], &mut out);
        b.in_pos = in_pos;
        b.out_pos = out_pos;
        let status = decoder.run(&mut b);
        in_pos = b.in_pos;
        out_pos = b.out_pos;
        match status {
            Ok(XzStatus::StreamEnd) => break Ok(out[..out_pos].to_vec()),
            Ok(XzStatus::NeedMore) => {}
            Err(e) => break Err(e),
        }
    };

    // Only successful decodes must agree; failures may be detected at
    // different points.
    if let (Ok(a), Ok(b)) = (&whole, &streamed) {
        assert_eq!(a, b);
    }
});
