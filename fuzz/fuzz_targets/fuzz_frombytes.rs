#![no_main]

use libfuzzer_sys::fuzz_target;
use zenheif::{HeifFile, Mode};

const MODES: &[&str] = &["L", "RGB", "RGBA", "BGR", "BGRA", "RGB;10", "RGBA;12", "BGR;16", "L;16"];

fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }
    let Ok(mode) = MODES[data[0] as usize % MODES.len()].parse::<Mode>() else {
        return;
    };
    let width = u32::from(data[1] % 64);
    let height = u32::from(data[2] % 64);
    let stride = match data[3] {
        0 => None,
        s => Some(s as usize * 4),
    };
    let Ok(mut file) = HeifFile::from_bytes(mode, (width, height), &data[4..], stride) else {
        return;
    };
    let image = file.get(0).unwrap();
    assert_eq!(image.data().unwrap().len(), image.stride().unwrap() * height as usize);
    let _ = file.get_mut(0).unwrap().convert_to(mode.encodable(data[4] & 1 == 1));
    file.add_thumbnails(&[u32::from(data[5])]);
});
