#![no_main]
use debugsect::decompress::{decompress, CompressedFormat, ElfClass, Endian};
use debugsect::DecompressOptions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, section)) = data.split_first() else {
        return;
    };

    let format = match selector % 5 {
        0 => CompressedFormat::Zdebug,
        1 => CompressedFormat::Chdr { class: ElfClass::Elf32, endian: Endian::Little },
        2 => CompressedFormat::Chdr { class: ElfClass::Elf32, endian: Endian::Big },
        3 => CompressedFormat::Chdr { class: ElfClass::Elf64, endian: Endian::Little },
        _ => CompressedFormat::Chdr { class: ElfClass::Elf64, endian: Endian::Big },
    };

    let opts = DecompressOptions::default().with_max_output(Some(16 * 1024 * 1024));
    let _ = decompress(format, section, &opts);
});
