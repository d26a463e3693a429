#![no_main]

use libfuzzer_sys::fuzz_target;
use zenheif::{Brand, FileType, check_heif, mimetype};

fuzz_target!(|data: &[u8]| {
    let kind = check_heif(data);
    let brand = Brand::detect(data);
    if kind == FileType::No {
        assert_eq!(mimetype(data), "");
    } else {
        assert_eq!(mimetype(data), brand.mimetype());
    }
    let _ = zenheif::read_magic(&mut std::io::Cursor::new(data));
});
