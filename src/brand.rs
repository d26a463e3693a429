//! `ftyp` brand sniffing and MIME types

use std::io::{Read, Seek, SeekFrom};

/// Compression format of the coded images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionFormat {
    /// H.265 (HEIC)
    #[default]
    Hevc,
    /// AV1 (AVIF)
    Av1,
}

/// Major brand of a HEIF-family file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Brand {
    #[default]
    Unknown,
    Heic,
    Heix,
    Hevc,
    Hevx,
    Heim,
    Heis,
    Hevm,
    Hevs,
    Mif1,
    Msf1,
    Avif,
    Avis,
}

/// Result of [`check_heif`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Not a HEIF-family file
    No,
    /// A brand the codec reads
    YesSupported,
    /// An ISOBMFF file with a brand the codec does not read
    YesUnsupported,
    /// Generic HEIF brand; readability depends on the coded format
    Maybe,
}

const ALL_BRANDS: [(&[u8; 4], Brand); 12] = [
    (b"heic", Brand::Heic),
    (b"heix", Brand::Heix),
    (b"hevc", Brand::Hevc),
    (b"hevx", Brand::Hevx),
    (b"heim", Brand::Heim),
    (b"heis", Brand::Heis),
    (b"hevm", Brand::Hevm),
    (b"hevs", Brand::Hevs),
    (b"mif1", Brand::Mif1),
    (b"msf1", Brand::Msf1),
    (b"avif", Brand::Avif),
    (b"avis", Brand::Avis),
];

/// Bytes needed to read the major brand
pub const MAGIC_LEN: usize = 12;

impl Brand {
    /// Look up a brand by its four-cc
    pub fn from_fourcc(fourcc: &[u8]) -> Brand {
        ALL_BRANDS
            .iter()
            .find(|(cc, _)| &cc[..] == fourcc)
            .map_or(Brand::Unknown, |&(_, brand)| brand)
    }

    /// Major brand from the first bytes of a file
    pub fn detect(magic: &[u8]) -> Brand {
        match magic.get(4..8) {
            Some(b"ftyp") if magic.len() >= MAGIC_LEN => Brand::from_fourcc(&magic[8..12]),
            _ => Brand::Unknown,
        }
    }

    /// The four-cc, or `None` for [`Brand::Unknown`]
    pub fn fourcc(self) -> Option<&'static [u8; 4]> {
        ALL_BRANDS
            .iter()
            .find(|(_, brand)| *brand == self)
            .map(|(cc, _)| *cc)
    }

    /// Whether the brand describes an image sequence
    pub fn is_sequence(self) -> bool {
        matches!(
            self,
            Brand::Hevc | Brand::Hevx | Brand::Hevm | Brand::Hevs | Brand::Msf1 | Brand::Avis
        )
    }

    /// Coded format implied by the brand, `None` for the generic brands
    pub fn compression(self) -> Option<CompressionFormat> {
        match self {
            Brand::Avif | Brand::Avis => Some(CompressionFormat::Av1),
            Brand::Mif1 | Brand::Msf1 | Brand::Unknown => None,
            _ => Some(CompressionFormat::Hevc),
        }
    }

    /// MIME type for files with this major brand
    pub fn mimetype(self) -> &'static str {
        match self {
            Brand::Heic | Brand::Heix | Brand::Heim | Brand::Heis => "image/heic",
            Brand::Hevc | Brand::Hevx | Brand::Hevm | Brand::Hevs => "image/heic-sequence",
            Brand::Mif1 | Brand::Unknown => "image/heif",
            Brand::Msf1 => "image/heif-sequence",
            Brand::Avif => "image/avif",
            Brand::Avis => "image/avif-sequence",
        }
    }

    /// `true` for brands the HEIF opener claims
    pub fn is_heif(self) -> bool {
        !matches!(self, Brand::Avif | Brand::Avis | Brand::Unknown)
    }

    /// `true` for brands the AVIF opener claims
    pub fn is_avif(self) -> bool {
        matches!(self, Brand::Avif | Brand::Avis)
    }
}

/// Classify the first bytes of a file
///
/// Fewer than 12 bytes, or no `ftyp` box at offset 4, is [`FileType::No`].
pub fn check_heif(magic: &[u8]) -> FileType {
    if magic.len() < MAGIC_LEN || &magic[4..8] != b"ftyp" {
        return FileType::No;
    }
    match Brand::detect(magic) {
        Brand::Unknown => FileType::YesUnsupported,
        Brand::Mif1 | Brand::Msf1 => FileType::Maybe,
        _ => FileType::YesSupported,
    }
}

/// `true` when [`check_heif`] says the codec can (probably) read the file
pub fn is_supported(magic: &[u8]) -> bool {
    matches!(check_heif(magic), FileType::YesSupported | FileType::Maybe)
}

/// MIME type for a file's first bytes, empty when it is not HEIF-family
pub fn mimetype(magic: &[u8]) -> &'static str {
    match check_heif(magic) {
        FileType::No => "",
        _ => Brand::detect(magic).mimetype(),
    }
}

/// Read the first [`MAGIC_LEN`] bytes and restore the stream position
pub fn read_magic<R: Read + Seek>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let start = reader.stream_position()?;
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    reader.by_ref().take(MAGIC_LEN as u64).read_to_end(&mut magic)?;
    reader.seek(SeekFrom::Start(start))?;
    Ok(magic)
}
