//! Round trips through libheif
//!
//! Needs libheif with an HEVC encoder (x265, 8/10/12-bit) and decoder (libde265).

#![cfg(feature = "libheif")]

use zenheif::{
    ColorPrimaries, ColorProfile, ErrorCode, HeifFile, MatrixCoefficients, MetadataBlock, Mode,
    NclxProfile, Options, SaveOptions, TransferCharacteristics, open_heif,
};

/// Smooth pattern with `channels` 8-bit samples per pixel
fn gradient(width: u32, height: u32, channels: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * channels);
    for y in 0..height {
        for x in 0..width {
            let px = [(x * 2) as u8, (y * 2) as u8, 128, 255 - x as u8];
            data.extend_from_slice(&px[..channels]);
        }
    }
    data
}

/// Smooth pattern of little-endian samples below `1 << depth`
fn gradient_wide(width: u32, height: u32, depth: u8) -> Vec<u8> {
    let max = (1u32 << depth) - 1;
    let mut data = Vec::new();
    for y in 0..height {
        for x in 0..width {
            for v in [x * max / width, y * max / height, max / 2] {
                data.extend_from_slice(&(v as u16).to_le_bytes());
            }
        }
    }
    data
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    let sum: u64 = a.iter().zip(b).map(|(x, y)| x.abs_diff(*y) as u64).sum();
    sum as f64 / a.len() as f64
}

fn mean_abs_diff_wide(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    let samples = |d: &[u8]| -> Vec<u16> {
        d.chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect()
    };
    let (a, b) = (samples(a), samples(b));
    let sum: u64 = a.iter().zip(&b).map(|(x, y)| x.abs_diff(*y) as u64).sum();
    sum as f64 / a.len() as f64
}

fn encode(file: &HeifFile, save_options: &SaveOptions, options: &Options) -> Vec<u8> {
    let mut encoded = Vec::new();
    file.save_with(&mut encoded, save_options, options).unwrap();
    assert!(zenheif::is_supported(&encoded));
    encoded
}

#[test]
fn rgb_roundtrip() {
    let src = gradient(128, 128, 3);
    let file = HeifFile::from_bytes(Mode::RGB, (128, 128), &src, None).unwrap();
    let encoded = encode(&file, &SaveOptions::new().quality(90), &Options::new());

    let decoded = open_heif(encoded).unwrap();
    assert_eq!(decoded.len(), 1);
    let image = decoded.primary().unwrap();
    assert_eq!(image.size(), (128, 128));
    assert_eq!(image.mode(), Mode::RGB);
    assert_eq!(image.bit_depth(), 8);
    assert!(!image.has_alpha());
    assert!(image.stride().unwrap() >= 384);
    assert_eq!(image.data().unwrap().len(), image.stride().unwrap() * 128);
    let diff = mean_abs_diff(&image.to_packed().unwrap(), &src);
    assert!(diff < 4.0, "mean difference {diff}");
}

#[test]
fn rgba_roundtrip() {
    let src = gradient(96, 64, 4);
    let file = HeifFile::from_bytes(Mode::RGBA, (96, 64), &src, None).unwrap();
    let encoded = encode(&file, &SaveOptions::new().quality(90), &Options::new());

    let decoded = open_heif(encoded).unwrap();
    let image = decoded.primary().unwrap();
    assert_eq!(image.mode(), Mode::RGBA);
    assert!(image.has_alpha());
    let diff = mean_abs_diff(&image.to_packed().unwrap(), &src);
    assert!(diff < 4.0, "mean difference {diff}");
}

#[test]
fn luma_roundtrip() {
    let src = gradient(64, 64, 1);
    let file = HeifFile::from_bytes(Mode::L, (64, 64), &src, None).unwrap();
    let encoded = encode(&file, &SaveOptions::new().quality(90), &Options::new());

    let decoded = open_heif(encoded).unwrap();
    let image = decoded.primary().unwrap();
    assert!(!image.has_alpha());
    // Monochrome items decode to RGB with equal channels
    assert_eq!(image.mode(), Mode::RGB);
    let red: Vec<u8> = image
        .to_packed()
        .unwrap()
        .chunks_exact(3)
        .map(|px| px[0])
        .collect();
    let diff = mean_abs_diff(&red, &src);
    assert!(diff < 4.0, "mean difference {diff}");
}

#[test]
fn high_bit_depth_roundtrip() {
    let keep_depth = Options::new().convert_hdr_to_8bit(false);
    for depth in [10u8, 12] {
        let mode: Mode = format!("RGB;{depth}").parse().unwrap();
        let src = gradient_wide(64, 48, depth);
        let file = HeifFile::from_bytes(mode, (64, 48), &src, None).unwrap();
        let encoded = encode(&file, &SaveOptions::new().quality(95), &keep_depth);

        let decoded = HeifFile::open(encoded.clone(), &keep_depth).unwrap();
        let image = decoded.primary().unwrap();
        assert_eq!(image.original_bit_depth(), depth);
        assert_eq!(image.mode(), mode);
        let diff = mean_abs_diff_wide(&image.to_packed().unwrap(), &src);
        let tolerance = f64::from(1u32 << (depth - 6));
        assert!(diff < tolerance, "{depth}-bit mean difference {diff}");

        let eight = open_heif(encoded).unwrap();
        assert_eq!(eight.primary().unwrap().mode(), Mode::RGB);
        assert_eq!(eight.primary().unwrap().original_bit_depth(), depth);
    }
}

#[test]
fn thumbnails_survive() {
    let mut file = HeifFile::from_bytes(Mode::RGB, (128, 96), &gradient(128, 96, 3), None).unwrap();
    file.add_thumbnails(&[64, 32]);
    let encoded = encode(&file, &SaveOptions::new(), &Options::new());

    let decoded = open_heif(encoded).unwrap();
    let image = decoded.primary().unwrap();
    let mut sizes: Vec<_> = image.thumbnails().iter().map(|t| t.size()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![(32, 24), (64, 48)]);
    for thumb in image.thumbnails() {
        assert_eq!(thumb.image_id(), image.id());
        assert!(!thumb.is_pending());
        let expected = thumb.width() as usize * thumb.height() as usize * 3;
        assert_eq!(thumb.to_packed().unwrap().len(), expected);
    }

    let encoded = encode(&file, &SaveOptions::new(), &Options::new());
    let without = HeifFile::open(encoded, &Options::new().thumbnails(false)).unwrap();
    assert!(without.primary().unwrap().thumbnails().is_empty());
}

#[test]
fn metadata_survives() {
    // Little-endian TIFF with an empty IFD0
    let exif = b"II*\0\x08\0\0\0\0\0\0\0\0\0".to_vec();
    let xmp = b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>".to_vec();
    let generic = MetadataBlock::from_native("mime", "application/json", b"{\"k\":1}".to_vec());

    let mut file = HeifFile::from_bytes(Mode::RGB, (64, 64), &gradient(64, 64, 3), None).unwrap();
    let info = file.primary_mut().unwrap().info_mut();
    info.exif = Some(exif.clone());
    info.xmp = Some(xmp.clone());
    info.metadata.push(generic.clone());

    let decoded = open_heif(encode(&file, &SaveOptions::new(), &Options::new())).unwrap();
    let info = decoded.primary().unwrap().info();
    assert_eq!(info.exif.as_deref(), Some(&exif[..]));
    assert_eq!(info.xmp.as_deref(), Some(&xmp[..]));
    assert_eq!(info.metadata, vec![generic]);
}

#[test]
fn malformed_metadata_type_is_rejected() {
    let mut file = HeifFile::from_bytes(Mode::RGB, (16, 16), &gradient(16, 16, 3), None).unwrap();
    let block = MetadataBlock::from_native("uri", "", b"urn:x".to_vec());
    file.primary_mut().unwrap().info_mut().metadata.push(block);
    let err = file
        .save_to_vec(&SaveOptions::new(), &Options::new())
        .unwrap_err()
        .into_inner();
    assert_eq!(err.code(), Some(ErrorCode::UsageError));
}

#[test]
fn nclx_profile_survives() {
    let nclx = NclxProfile {
        color_primaries: ColorPrimaries::BT2020,
        transfer_characteristics: TransferCharacteristics::BT709,
        matrix_coefficients: MatrixCoefficients::BT2020_NCL,
        full_range: false,
        ..NclxProfile::default()
    };
    let mut file = HeifFile::from_bytes(Mode::RGB, (64, 64), &gradient(64, 64, 3), None).unwrap();
    file.primary_mut().unwrap().info_mut().color_profile = ColorProfile::Nclx(nclx);

    let decoded = open_heif(encode(&file, &SaveOptions::new(), &Options::new())).unwrap();
    let read = decoded.primary().unwrap().info().nclx_profile().copied().unwrap();
    assert_eq!(read.color_primaries, nclx.color_primaries);
    assert_eq!(read.transfer_characteristics, nclx.transfer_characteristics);
    assert_eq!(read.matrix_coefficients, nclx.matrix_coefficients);
    assert!(!read.full_range);
    // BT.2020 red primary
    assert!((read.chromaticities.red.0 - 0.708).abs() < 1e-3);
    assert!((read.chromaticities.red.1 - 0.292).abs() < 1e-3);
}

#[test]
fn icc_profile_survives() {
    let icc = vec![0x42; 128];
    let mut file = HeifFile::from_bytes(Mode::RGB, (32, 32), &gradient(32, 32, 3), None).unwrap();
    file.primary_mut().unwrap().info_mut().color_profile = ColorProfile::IccFull(icc.clone());

    let decoded = open_heif(encode(&file, &SaveOptions::new(), &Options::new())).unwrap();
    let info = decoded.primary().unwrap().info();
    assert_eq!(info.icc_profile(), Some(&icc[..]));
    assert_eq!(info.icc_profile_type(), Some("prof"));
}

#[test]
fn corrupt_and_truncated_input() {
    let err = open_heif(b"definitely not an image".to_vec())
        .unwrap_err()
        .into_inner();
    assert_eq!(err.code(), Some(ErrorCode::InvalidInput));

    let file = HeifFile::from_bytes(Mode::RGB, (64, 64), &gradient(64, 64, 3), None).unwrap();
    let mut encoded = encode(&file, &SaveOptions::new(), &Options::new());
    encoded.truncate(encoded.len() / 2);
    // libheif may accept the header and fail on decode instead
    let code = match open_heif(encoded) {
        Err(e) => e.into_inner().code(),
        Ok(file) => file.primary().unwrap().data().unwrap_err().into_inner().code(),
    };
    assert!(
        matches!(code, Some(ErrorCode::InvalidInput | ErrorCode::DecoderPluginError)),
        "{code:?}"
    );
}
