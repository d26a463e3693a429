//! Exif, XMP and generic metadata blocks
//!
//! Exif payloads are exposed starting at the TIFF header. Container Exif
//! items begin with a 4-byte big-endian offset, sometimes followed by the
//! `Exif\0\0` APP1 marker; both are stripped on read.

use whereat::at;

use crate::error::{Error, HeifError, Result, subcode};

/// APP1 marker some writers leave in front of the TIFF header
pub const EXIF_MARKER: &[u8; 6] = b"Exif\0\0";

/// Content type of XMP `mime` items
pub const XMP_CONTENT_TYPE: &str = "application/rdf+xml";

const ORIENTATION_TAG: u16 = 0x0112;

/// A metadata item attached to an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataBlock {
    /// Exif payload starting at the TIFF header
    Exif(Vec<u8>),
    /// XMP packet
    Xmp(Vec<u8>),
    /// Any other item, kept verbatim
    Generic {
        /// Item type four-cc, such as `"mime"` or `"uri "`
        item_type: String,
        /// Content type for `mime` items, empty otherwise
        content_type: String,
        /// Raw payload
        data: Vec<u8>,
    },
}

impl MetadataBlock {
    /// Classify a block as read from the container
    pub fn from_native(item_type: &str, content_type: &str, data: Vec<u8>) -> Self {
        match item_type {
            "Exif" => MetadataBlock::Exif(strip_exif_header(&data).to_vec()),
            "mime" if content_type == XMP_CONTENT_TYPE => MetadataBlock::Xmp(data),
            _ => MetadataBlock::Generic {
                item_type: item_type.to_string(),
                content_type: content_type.to_string(),
                data,
            },
        }
    }

    /// Item type four-cc
    pub fn item_type(&self) -> &str {
        match self {
            MetadataBlock::Exif(_) => "Exif",
            MetadataBlock::Xmp(_) => "mime",
            MetadataBlock::Generic { item_type, .. } => item_type,
        }
    }

    /// Content type, empty when the item has none
    pub fn content_type(&self) -> &str {
        match self {
            MetadataBlock::Exif(_) => "",
            MetadataBlock::Xmp(_) => XMP_CONTENT_TYPE,
            MetadataBlock::Generic { content_type, .. } => content_type,
        }
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        match self {
            MetadataBlock::Exif(d) | MetadataBlock::Xmp(d) => d,
            MetadataBlock::Generic { data, .. } => data,
        }
    }

    /// Item type as the four bytes written to the container
    ///
    /// Fails with a usage error unless the type is exactly 4 bytes.
    pub fn four_cc(&self) -> Result<[u8; 4]> {
        let item_type = self.item_type();
        <[u8; 4]>::try_from(item_type.as_bytes()).map_err(|_| {
            at(Error::from(HeifError::usage(
                subcode::INVALID_PARAMETER_VALUE,
                format!("Metadata item type {item_type:?} is not a four-cc"),
            )))
        })
    }
}

/// Strip the container offset and the optional `Exif\0\0` marker
///
/// Payloads shorter than the 4-byte offset are returned unchanged.
pub fn strip_exif_header(raw: &[u8]) -> &[u8] {
    let Some(rest) = raw.get(4..) else {
        return raw;
    };
    rest.strip_prefix(&EXIF_MARKER[..]).unwrap_or(rest)
}

/// Pull the first Exif and first XMP block out of a block list
///
/// Returns `(exif, xmp, remaining)`. Every Exif block leaves the list; only
/// the first XMP block does.
pub fn split_exif_xmp(
    blocks: Vec<MetadataBlock>,
) -> (Option<Vec<u8>>, Option<Vec<u8>>, Vec<MetadataBlock>) {
    let mut exif = None;
    let mut xmp = None;
    let mut rest = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            MetadataBlock::Exif(data) => {
                if exif.is_none() {
                    exif = Some(data);
                }
            }
            MetadataBlock::Xmp(data) if xmp.is_none() => xmp = Some(data),
            other => rest.push(other),
        }
    }
    (exif, xmp, rest)
}

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8], at: usize) -> Option<u16> {
        let bytes: [u8; 2] = b.get(at..at.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    fn u32(self, b: &[u8], at: usize) -> Option<u32> {
        let bytes: [u8; 4] = b.get(at..at.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    fn encode_u16(self, v: u16) -> [u8; 2] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }
}

/// Locate the orientation value in IFD0: `(offset into exif, endian)`
fn find_orientation(exif: &[u8]) -> Option<(usize, Endian)> {
    let tiff = exif.strip_prefix(&EXIF_MARKER[..]).unwrap_or(exif);
    let base = exif.len() - tiff.len();
    let endian = match tiff.get(0..2)? {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        _ => return None,
    };
    let ifd = endian.u32(tiff, 4)? as usize;
    let count = endian.u16(tiff, ifd)? as usize;
    for n in 0..count {
        let entry = ifd.checked_add(2 + 12 * n)?;
        if endian.u16(tiff, entry)? == ORIENTATION_TAG {
            let value = entry.checked_add(8)?;
            endian.u16(tiff, value)?;
            return Some((base + value, endian));
        }
    }
    None
}

/// Orientation tag from an Exif payload, if it can be parsed
pub fn read_orientation(exif: &[u8]) -> Option<u16> {
    let (offset, endian) = find_orientation(exif)?;
    endian.u16(exif, offset)
}

/// Rewrite the Exif orientation to 1, returning the previous value
pub fn reset_exif_orientation(exif: &mut [u8]) -> Option<u16> {
    let (offset, endian) = find_orientation(exif)?;
    let value = endian.u16(exif, offset)?;
    if value != 1 {
        exif[offset..offset + 2].copy_from_slice(&endian.encode_u16(1));
    }
    Some(value)
}

/// Byte offset of the orientation digit in an XMP packet
fn find_xmp_orientation(xmp: &[u8]) -> Option<usize> {
    const ATTR: &[u8] = b"tiff:Orientation=\"";
    const ELEMENT: &[u8] = b"<tiff:Orientation>";
    let find = |needle: &[u8]| {
        xmp.windows(needle.len())
            .position(|w| w == needle)
            .map(|p| p + needle.len())
    };
    let at = find(ATTR).or_else(|| find(ELEMENT))?;
    let digit = *xmp.get(at)?;
    let terminated = matches!(xmp.get(at + 1), Some(b'"') | Some(b'<'));
    (digit.is_ascii_digit() && terminated).then_some(at)
}

/// Orientation from an XMP packet (`tiff:Orientation`), if present
pub fn xmp_orientation(xmp: &[u8]) -> Option<u16> {
    let at = find_xmp_orientation(xmp)?;
    Some((xmp[at] - b'0') as u16)
}

/// Rewrite the XMP orientation to 1, returning the previous value
pub fn reset_xmp_orientation(xmp: &mut [u8]) -> Option<u16> {
    let at = find_xmp_orientation(xmp)?;
    let value = (xmp[at] - b'0') as u16;
    xmp[at] = b'1';
    Some(value)
}
