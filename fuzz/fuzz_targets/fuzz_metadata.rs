#![no_main]

use libfuzzer_sys::fuzz_target;
use zenheif::metadata::{self, MetadataBlock};

fuzz_target!(|data: &[u8]| {
    let block = MetadataBlock::from_native("Exif", "", data.to_vec());
    let mut exif = block.data().to_vec();
    let before = metadata::read_orientation(&exif);
    let reset = metadata::reset_exif_orientation(&mut exif);
    assert_eq!(before, reset);
    if reset.is_some() {
        assert_eq!(metadata::read_orientation(&exif), Some(1));
    }

    let mut xmp = data.to_vec();
    let before = metadata::xmp_orientation(&xmp);
    assert_eq!(metadata::reset_xmp_orientation(&mut xmp), before);
});
