//! Native codec seam
//!
//! Everything that touches the HEIF bitstream goes through these traits.
//! The `libheif` module (behind the `libheif` feature) implements them on
//! top of libheif; tests use an in-memory fake.

use core::fmt;
use std::sync::Arc;

use crate::brand::CompressionFormat;
use crate::color::ColorProfile;
use crate::error::Result;
use crate::marshal::PlaneBuf;
use crate::metadata::MetadataBlock;
use crate::mode::Mode;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "libheif")]
pub mod libheif;

/// Item id inside a HEIF file
pub type ItemId = u32;

/// What a native image handle reports without decoding
#[derive(Debug, Clone, PartialEq)]
pub struct HandleInfo {
    /// Item id
    pub id: ItemId,
    /// Width from the header
    pub width: u32,
    /// Height from the header
    pub height: u32,
    /// Whether the image has an alpha plane
    pub has_alpha: bool,
    /// Luma bit depth of the coded image
    pub luma_bits: u8,
    /// Thumbnail item ids, in file order
    pub thumbnail_ids: Vec<ItemId>,
    /// Metadata blocks, in file order
    pub metadata: Vec<MetadataBlock>,
    /// Color profile of the handle
    pub color_profile: ColorProfile,
}

/// A decodable item inside an open context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    /// A top-level image
    Image(ItemId),
    /// A thumbnail of a top-level image
    Thumbnail {
        /// Owning image
        image: ItemId,
        /// Thumbnail item
        thumbnail: ItemId,
    },
}

impl ItemRef {
    /// The item id of the referenced image or thumbnail
    pub fn id(self) -> ItemId {
        match self {
            ItemRef::Image(id) => id,
            ItemRef::Thumbnail { thumbnail, .. } => thumbnail,
        }
    }
}

/// Settings applied when a context is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSettings {
    /// Decoder thread limit
    pub threads: u32,
    /// Let the codec drop HDR data to 8 bit
    pub convert_hdr_to_8bit: bool,
}

/// Settings for a write session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    /// Target compression format
    pub format: CompressionFormat,
    /// `-1` lossless, `0..=100` lossy, `None` encoder default
    pub quality: Option<i32>,
    /// Preferred encoder id
    pub encoder_id: Option<String>,
    /// Extra encoder parameters (`name`, `value`)
    pub params: Vec<(String, String)>,
}

/// Pixels handed to the encoder
///
/// `mode` is already encodable: RGB order and 8, 10 or 12 bits.
#[derive(Debug, Clone, Copy)]
pub struct EncodableImage<'a> {
    /// Pixel mode of `plane`
    pub mode: Mode,
    /// Pixel data
    pub plane: &'a PlaneBuf,
    /// Profile to attach
    pub color_profile: &'a ColorProfile,
}

/// A native codec library
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Parse a file held in memory
    fn open(&self, data: Vec<u8>, settings: &DecodeSettings) -> Result<Arc<dyn NativeContext>>;

    /// Start a write session
    fn writer(&self, settings: &EncodeSettings) -> Result<Box<dyn NativeWriter>>;

    /// Whether an encoder exists for `format`
    fn has_encoder(&self, format: CompressionFormat) -> bool;
}

/// An opened file
///
/// Implementations serialize access to the native context internally.
pub trait NativeContext: Send + Sync {
    /// Top-level image ids in file order
    fn top_level_image_ids(&self) -> Result<Vec<ItemId>>;

    /// Id of the primary image
    fn primary_image_id(&self) -> Result<ItemId>;

    /// Header information for an image or thumbnail
    fn handle_info(&self, item: ItemRef) -> Result<HandleInfo>;

    /// Decode an item into `mode`
    fn decode(&self, item: ItemRef, mode: Mode) -> Result<PlaneBuf>;
}

/// A write session producing one file
pub trait NativeWriter {
    /// Encode a top-level image, returning its item id
    fn encode_image(&mut self, image: &EncodableImage<'_>) -> Result<ItemId>;

    /// Encode a thumbnail of `master` fitting in `bbox`; `None` when the
    /// codec decides no thumbnail is needed
    fn encode_thumbnail(
        &mut self,
        image: &EncodableImage<'_>,
        master: ItemId,
        bbox: u32,
    ) -> Result<Option<ItemId>>;

    /// Mark an encoded image as primary
    fn set_primary(&mut self, id: ItemId) -> Result<()>;

    /// Attach a metadata block to an encoded image
    fn add_metadata(&mut self, id: ItemId, block: &MetadataBlock) -> Result<()>;

    /// Serialize the file
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

/// The backend compiled into this build, if any
pub fn default_backend() -> Option<Arc<dyn Backend>> {
    #[cfg(feature = "libheif")]
    {
        Some(Arc::new(libheif::LibHeifBackend::new()))
    }
    #[cfg(not(feature = "libheif"))]
    {
        None
    }
}
