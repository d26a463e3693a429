//! # zenheif
//!
//! HEIF and AVIF container reading and writing on top of a native codec
//! library.
//!
//! The codec itself lives behind the [`native::Backend`] trait; with the
//! **`libheif`** feature the crate ships a backend built on libheif. On top
//! of it this crate provides a typed model of a file: an ordered list of
//! lazily decoded images with their thumbnails and metadata, which can be
//! edited and written back.
//!
//! ## Quick Start
//!
//! ```no_run
//! let data = std::fs::read("image.heic").unwrap();
//! let file = zenheif::open_heif(data).unwrap();
//!
//! let primary = file.primary().unwrap();
//! println!("{}x{} {}", primary.width(), primary.height(), primary.mode());
//!
//! // first pixel access decodes
//! let stride = primary.stride().unwrap();
//! let rows = primary.data().unwrap().chunks(stride);
//! # drop(rows);
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use zenheif::{HeifFile, Mode, SaveOptions};
//!
//! let pixels = vec![0u8; 64 * 64 * 3];
//! let mut file = HeifFile::from_bytes(Mode::RGB, (64, 64), &pixels, None).unwrap();
//! file.add_thumbnails(&[32]);
//! file.save(
//!     std::fs::File::create("out.heic").unwrap(),
//!     &SaveOptions::new().quality(80),
//! )
//! .unwrap();
//! ```
//!
//! ## Features
//!
//! - **`libheif`**: native backend using libheif through `libheif-rs`.
//!   Without it, opening fails with `DecoderPluginError` and saving with
//!   `EncodingError` unless a backend is supplied through
//!   [`Options::backend`].
//!
//! ## Options
//!
//! Functions without an explicit [`Options`] use the process-wide value from
//! [`options::global`], read once per call:
//!
//! ```no_run
//! zenheif::options::update_global(|o| *o = o.clone().quality(Some(90)));
//! ```

mod brand;
mod color;
mod container;
mod convert;
mod error;
mod image;
pub mod marshal;
pub mod metadata;
mod mode;
pub mod native;
pub mod options;
mod pixels;
pub mod plugin;
mod save;

pub use brand::{Brand, CompressionFormat, FileType, check_heif, is_supported, mimetype, read_magic};
pub use color::{
    Chromaticities, ColorPrimaries, ColorProfile, MatrixCoefficients, NclxProfile,
    TransferCharacteristics,
};
pub use container::HeifFile;
pub use convert::can_convert;
pub use error::{Error, ErrorCode, HeifError, Result, subcode};
pub use image::{HeifImage, HeifThumbnail, ImageInfo, Pixels, reset_orientation};
pub use marshal::PlaneBuf;
pub use metadata::MetadataBlock;
pub use mode::{Chroma, Colorspace, Layout, Mode};
pub use options::{Options, PreferredEncoders};
pub use pixels::PixelData;
pub use save::{ImageSelection, MetadataOverride, SaveOptions};

/// Open a file held in memory with the process-wide [`Options`]
///
/// Images are listed but not decoded.
///
/// # Example
///
/// ```no_run
/// let file = zenheif::open_heif(std::fs::read("image.heic").unwrap()).unwrap();
/// assert!(!file.is_empty());
/// ```
pub fn open_heif(data: impl Into<Vec<u8>>) -> Result<HeifFile> {
    HeifFile::open(data, &options::global())
}

/// Open a file and decode every image
pub fn read_heif(data: impl Into<Vec<u8>>) -> Result<HeifFile> {
    let file = open_heif(data)?;
    file.load(true)?;
    Ok(file)
}

/// A container with one image built from caller pixels
///
/// `stride` of `None` means packed rows.
pub fn from_bytes(mode: Mode, size: (u32, u32), data: &[u8], stride: Option<usize>) -> Result<HeifFile> {
    HeifFile::from_bytes(mode, size, data, stride)
}
