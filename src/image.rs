//! Images and thumbnails with lazy pixel decoding
//!
//! Pixels are decoded on first access and published once; concurrent first
//! accesses perform a single decode. Size, mode, stride and data are always
//! read from the same published [`Pixels`] value.

use core::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use log::{debug, trace, warn};
use whereat::at;

use crate::brand::Brand;
use crate::color::{ColorProfile, NclxProfile};
use crate::convert;
use crate::error::{Error, ErrorCode, HeifError, Result, subcode};
use crate::marshal::PlaneBuf;
use crate::metadata::{self, MetadataBlock};
use crate::mode::{Chroma, Colorspace, Mode};
use crate::native::{ItemId, ItemRef, NativeContext};
use crate::options::Options;
use crate::pixels::PixelData;

/// Per-image metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInfo {
    /// Item id inside the file; `0` for images not yet part of a file
    pub img_id: ItemId,
    /// Major brand of the source file
    pub brand: Brand,
    /// Whether this is the primary image
    pub primary: bool,
    /// Exif payload starting at the TIFF header
    pub exif: Option<Vec<u8>>,
    /// XMP packet
    pub xmp: Option<Vec<u8>>,
    /// Remaining metadata blocks
    pub metadata: Vec<MetadataBlock>,
    /// Color profile
    pub color_profile: ColorProfile,
    /// Orientation before [`reset_orientation`] rewrote it
    pub original_orientation: Option<u16>,
}

impl ImageInfo {
    /// ICC bytes, when the profile is ICC
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.color_profile.icc()
    }

    /// `"rICC"` or `"prof"` for ICC profiles
    pub fn icc_profile_type(&self) -> Option<&'static str> {
        self.color_profile.icc_type()
    }

    /// NCLX description, when present
    pub fn nclx_profile(&self) -> Option<&NclxProfile> {
        self.color_profile.nclx()
    }
}

/// Set the orientation in `info` to 1, returning the original value
///
/// Exif takes precedence over XMP; both are rewritten when present. The
/// original value is kept in [`ImageInfo::original_orientation`]. Unparseable
/// metadata counts as no orientation.
pub fn reset_orientation(info: &mut ImageInfo) -> Option<u16> {
    let from_exif = info
        .exif
        .as_deref_mut()
        .and_then(metadata::reset_exif_orientation);
    let from_xmp = info
        .xmp
        .as_deref_mut()
        .and_then(metadata::reset_xmp_orientation);
    let original = from_exif.or(from_xmp);
    if info.original_orientation.is_none() {
        info.original_orientation = original;
    }
    original
}

/// Decoded pixels with their mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixels {
    plane: PlaneBuf,
    mode: Mode,
}

impl Pixels {
    /// Pixel mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Pixel plane
    pub fn plane(&self) -> &PlaneBuf {
        &self.plane
    }
}

enum Source {
    /// Decodable through a context owned by the container
    Native {
        context: Weak<dyn NativeContext>,
        item: ItemRef,
    },
    /// Pixels supplied by the caller
    Memory,
    /// Planned thumbnail, produced by the encoder on save
    Pending,
    Closed,
}

struct LazyPixels {
    source: Source,
    header_size: (u32, u32),
    mode: Mode,
    allow_incorrect_headers: bool,
    cell: OnceLock<Arc<Pixels>>,
    lock: Mutex<()>,
}

impl LazyPixels {
    fn native(
        context: &Arc<dyn NativeContext>,
        item: ItemRef,
        header_size: (u32, u32),
        mode: Mode,
        allow_incorrect_headers: bool,
    ) -> Self {
        Self {
            source: Source::Native {
                context: Arc::downgrade(context),
                item,
            },
            header_size,
            mode,
            allow_incorrect_headers,
            cell: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    fn memory(pixels: Arc<Pixels>) -> Self {
        Self {
            source: Source::Memory,
            header_size: pixels.plane.size(),
            mode: pixels.mode,
            allow_incorrect_headers: false,
            cell: OnceLock::from(pixels),
            lock: Mutex::new(()),
        }
    }

    fn pending(size: (u32, u32), mode: Mode) -> Self {
        Self {
            source: Source::Pending,
            header_size: size,
            mode,
            allow_incorrect_headers: false,
            cell: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    fn size(&self) -> (u32, u32) {
        self.cell
            .get()
            .map_or(self.header_size, |p| p.plane.size())
    }

    fn mode(&self) -> Mode {
        self.cell.get().map_or(self.mode, |p| p.mode)
    }

    fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    fn is_closed(&self) -> bool {
        matches!(self.source, Source::Closed)
    }

    fn is_pending(&self) -> bool {
        matches!(self.source, Source::Pending)
    }

    fn get(&self) -> Result<&Arc<Pixels>> {
        if self.is_closed() {
            return Err(at(Error::Closed));
        }
        if let Some(pixels) = self.cell.get() {
            return Ok(pixels);
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pixels) = self.cell.get() {
            return Ok(pixels);
        }
        let pixels = self.decode()?;
        Ok(self.cell.get_or_init(|| Arc::new(pixels)))
    }

    fn decode(&self) -> Result<Pixels> {
        let (context, item) = match &self.source {
            Source::Native { context, item } => (context, *item),
            Source::Pending => {
                let (width, height) = self.header_size;
                return Err(at(Error::NotDecoded { width, height }));
            }
            Source::Memory | Source::Closed => return Err(at(Error::Closed)),
        };
        let context = context.upgrade().ok_or_else(|| at(Error::Closed))?;
        let plane = context.decode(item, self.mode)?;
        if plane.bytes_per_pixel() != self.mode.bytes_per_pixel() {
            return Err(at(Error::from(HeifError::new(
                ErrorCode::DecoderPluginError,
                subcode::UNSPECIFIED,
                format!("Decoder returned {} bytes per pixel for {}", plane.bytes_per_pixel(), self.mode),
            ))));
        }
        if plane.size() != self.header_size {
            let (hw, hh) = self.header_size;
            let (dw, dh) = plane.size();
            if !self.allow_incorrect_headers {
                return Err(at(Error::from(HeifError::invalid_input(
                    subcode::INVALID_IMAGE_SIZE,
                    format!("Corrupted image: header says {hw}x{hh}, decoded {dw}x{dh}"),
                ))));
            }
            debug!("item {}: adopting decoded size {dw}x{dh} over header {hw}x{hh}", item.id());
        }
        trace!("item {}: decoded {}x{} {}", item.id(), plane.width(), plane.height(), self.mode);
        Ok(Pixels {
            plane,
            mode: self.mode,
        })
    }

    fn unload(&mut self) {
        if matches!(self.source, Source::Native { .. }) {
            self.cell.take();
        }
    }

    fn close(&mut self) {
        self.cell.take();
        self.source = Source::Closed;
    }

    fn replace(&mut self, pixels: Arc<Pixels>) {
        *self = Self::memory(pixels);
    }
}

impl fmt::Debug for LazyPixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.source {
            Source::Closed => "closed",
            Source::Pending => "pending",
            _ if self.is_loaded() => "loaded",
            _ => "unloaded",
        };
        f.debug_struct("LazyPixels")
            .field("state", &state)
            .field("size", &self.size())
            .field("mode", &self.mode())
            .finish()
    }
}

macro_rules! pixel_access {
    () => {
        /// `(width, height)`; once loaded, the size of the decoded plane
        pub fn size(&self) -> (u32, u32) {
            self.pixels.size()
        }

        /// Width in pixels
        pub fn width(&self) -> u32 {
            self.size().0
        }

        /// Height in pixels
        pub fn height(&self) -> u32 {
            self.size().1
        }

        /// Pixel mode
        pub fn mode(&self) -> Mode {
            self.pixels.mode()
        }

        /// Bits per channel of the pixel data
        pub fn bit_depth(&self) -> u8 {
            self.mode().bit_depth()
        }

        /// Whether the pixels carry alpha
        pub fn has_alpha(&self) -> bool {
            self.mode().has_alpha()
        }

        /// Codec colorspace of the pixel data
        pub fn colorspace(&self) -> Colorspace {
            self.mode().colorspace()
        }

        /// Codec chroma layout of the pixel data
        pub fn chroma(&self) -> Chroma {
            self.mode().chroma()
        }

        /// Whether pixels are decoded
        pub fn is_loaded(&self) -> bool {
            self.pixels.is_loaded()
        }

        /// Whether [`close`](Self::close) was called
        pub fn is_closed(&self) -> bool {
            self.pixels.is_closed()
        }

        /// Decoded pixels, decoding on first call
        pub fn pixels(&self) -> Result<&Pixels> {
            Ok(self.pixels.get()?.as_ref())
        }

        /// Decoded plane
        pub fn plane(&self) -> Result<&PlaneBuf> {
            Ok(&self.pixels()?.plane)
        }

        /// Raw pixel bytes, `stride * height` long
        pub fn data(&self) -> Result<&[u8]> {
            Ok(self.plane()?.data())
        }

        /// Bytes between row starts
        pub fn stride(&self) -> Result<usize> {
            Ok(self.plane()?.stride())
        }

        /// Tightly packed copy of the pixels
        pub fn to_packed(&self) -> Result<Vec<u8>> {
            Ok(self.plane()?.to_packed())
        }

        /// Typed copy of the pixels, 10/12-bit data widened to 16 bit
        pub fn to_pixel_data(&self) -> Result<PixelData> {
            let pixels = self.pixels()?;
            PixelData::from_plane(&pixels.plane, pixels.mode)
        }
    };
}

/// A thumbnail of a top-level image
#[derive(Debug)]
pub struct HeifThumbnail {
    thumb_id: ItemId,
    image_id: ItemId,
    pixels: LazyPixels,
}

impl HeifThumbnail {
    pub(crate) fn from_context(
        context: &Arc<dyn NativeContext>,
        image_id: ItemId,
        thumb_id: ItemId,
        mode_depth: Option<u8>,
        options: &Options,
    ) -> Result<Self> {
        let item = ItemRef::Thumbnail {
            image: image_id,
            thumbnail: thumb_id,
        };
        let info = context.handle_info(item)?;
        let depth = mode_depth.unwrap_or(info.luma_bits);
        let mode = Mode::for_decode(info.has_alpha, depth);
        Ok(Self {
            thumb_id,
            image_id,
            pixels: LazyPixels::native(
                context,
                item,
                (info.width, info.height),
                mode,
                options.allow_incorrect_headers,
            ),
        })
    }

    fn pending(image_id: ItemId, size: (u32, u32), mode: Mode) -> Self {
        Self {
            thumb_id: 0,
            image_id,
            pixels: LazyPixels::pending(size, mode),
        }
    }

    fn copied(&self, image_id: ItemId, thumb_id: ItemId) -> Result<Self> {
        let pixels = if self.pixels.is_pending() {
            LazyPixels::pending(self.size(), self.mode())
        } else {
            LazyPixels::memory(Arc::clone(self.pixels.get()?))
        };
        Ok(Self {
            thumb_id,
            image_id,
            pixels,
        })
    }

    /// Item id of the thumbnail; `0` for thumbnails not yet saved
    pub fn thumb_id(&self) -> ItemId {
        self.thumb_id
    }

    /// Item id of the owning image
    pub fn image_id(&self) -> ItemId {
        self.image_id
    }

    /// The larger dimension, used as the thumbnail box on save
    pub fn box_size(&self) -> u32 {
        let (w, h) = self.size();
        w.max(h)
    }

    /// Whether this thumbnail is only planned and gets pixels on save
    pub fn is_pending(&self) -> bool {
        self.pixels.is_pending()
    }

    pixel_access!();

    /// Drop decoded pixels; the next access decodes again
    ///
    /// No-op for caller-created pixels, which cannot be decoded again.
    pub fn unload(&mut self) {
        self.pixels.unload();
    }

    /// Release pixels and the context reference; pixel access then fails
    /// with [`Error::Closed`]
    pub fn close(&mut self) {
        self.pixels.close();
    }
}

/// A top-level image
#[derive(Debug)]
pub struct HeifImage {
    info: ImageInfo,
    original_bit_depth: u8,
    thumbnails: Vec<HeifThumbnail>,
    pixels: LazyPixels,
}

impl HeifImage {
    pub(crate) fn from_context(
        context: &Arc<dyn NativeContext>,
        id: ItemId,
        primary: bool,
        brand: Brand,
        options: &Options,
    ) -> Result<Self> {
        let handle = context.handle_info(ItemRef::Image(id))?;
        let depth = if options.convert_hdr_to_8bit {
            8
        } else {
            handle.luma_bits
        };
        let mode = Mode::for_decode(handle.has_alpha, depth);
        let (exif, xmp, metadata) = metadata::split_exif_xmp(handle.metadata);

        let mut thumbnails = Vec::new();
        if options.thumbnails {
            let thumb_depth = options.convert_hdr_to_8bit.then_some(8);
            for &thumb_id in &handle.thumbnail_ids {
                match HeifThumbnail::from_context(context, id, thumb_id, thumb_depth, options) {
                    Ok(thumb) => thumbnails.push(thumb),
                    Err(e) => warn!(
                        "image {id}: skipping unreadable thumbnail {thumb_id}: {}",
                        e.into_inner()
                    ),
                }
            }
        }

        Ok(Self {
            info: ImageInfo {
                img_id: id,
                brand,
                primary,
                exif,
                xmp,
                metadata,
                color_profile: handle.color_profile,
                original_orientation: None,
            },
            original_bit_depth: handle.luma_bits,
            thumbnails,
            pixels: LazyPixels::native(
                context,
                ItemRef::Image(id),
                (handle.width, handle.height),
                mode,
                options.allow_incorrect_headers,
            ),
        })
    }

    /// An image from caller pixels
    ///
    /// `stride` of `None` means packed rows. The pixels are copied.
    pub fn from_bytes(mode: Mode, size: (u32, u32), data: &[u8], stride: Option<usize>) -> Result<Self> {
        let (width, height) = size;
        let plane = PlaneBuf::from_caller(data, stride, width, height, mode.bytes_per_pixel())?;
        Ok(Self::from_plane(plane, mode))
    }

    /// An image from typed pixels
    pub fn from_pixel_data(pixels: &PixelData) -> Result<Self> {
        let (plane, mode) = pixels.to_plane()?;
        Ok(Self::from_plane(plane, mode))
    }

    fn from_plane(plane: PlaneBuf, mode: Mode) -> Self {
        Self {
            info: ImageInfo::default(),
            original_bit_depth: mode.bit_depth(),
            thumbnails: Vec::new(),
            pixels: LazyPixels::memory(Arc::new(Pixels { plane, mode })),
        }
    }

    /// Copy of this image detached from any context, with new ids
    ///
    /// Decodes the source if needed; decoded pixels are shared, not copied.
    /// `primary` is cleared.
    pub(crate) fn copied(&self, mut next_id: impl FnMut() -> ItemId) -> Result<Self> {
        let pixels = Arc::clone(self.pixels.get()?);
        let img_id = next_id();
        let thumbnails = self
            .thumbnails
            .iter()
            .map(|t| t.copied(img_id, if t.is_pending() { 0 } else { next_id() }))
            .collect::<Result<Vec<_>>>()?;
        let mut info = self.info.clone();
        info.img_id = img_id;
        info.primary = false;
        Ok(Self {
            info,
            original_bit_depth: self.original_bit_depth,
            thumbnails,
            pixels: LazyPixels::memory(pixels),
        })
    }

    /// Metadata
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Mutable metadata
    pub fn info_mut(&mut self) -> &mut ImageInfo {
        &mut self.info
    }

    /// Item id
    pub fn id(&self) -> ItemId {
        self.info.img_id
    }

    /// Whether this is the primary image
    pub fn is_primary(&self) -> bool {
        self.info.primary
    }

    /// Luma bit depth stored in the file
    pub fn original_bit_depth(&self) -> u8 {
        self.original_bit_depth
    }

    /// Thumbnails in file order, followed by planned ones
    pub fn thumbnails(&self) -> &[HeifThumbnail] {
        &self.thumbnails
    }

    /// Mutable thumbnails
    pub fn thumbnails_mut(&mut self) -> &mut Vec<HeifThumbnail> {
        &mut self.thumbnails
    }

    pixel_access!();

    /// Decode this image and its decodable thumbnails
    pub fn load(&self) -> Result<&Self> {
        self.pixels()?;
        for thumb in self.thumbnails.iter().filter(|t| !t.is_pending()) {
            thumb.pixels()?;
        }
        Ok(self)
    }

    /// Drop decoded pixels of the image and its thumbnails
    ///
    /// The next access decodes again. Caller-created pixels are kept.
    pub fn unload(&mut self) {
        self.pixels.unload();
        for thumb in &mut self.thumbnails {
            thumb.unload();
        }
    }

    /// Release pixels of the image and its thumbnails; pixel access then
    /// fails with [`Error::Closed`]
    pub fn close(&mut self) {
        self.pixels.close();
        for thumb in &mut self.thumbnails {
            thumb.close();
        }
    }

    /// Convert the pixels to `mode` in place
    ///
    /// The image no longer decodes from its file afterwards.
    pub fn convert_to(&mut self, mode: Mode) -> Result<()> {
        let current = self.pixels()?;
        if current.mode == mode {
            return Ok(());
        }
        let plane = convert::convert_plane(&current.plane, current.mode, mode)?;
        self.pixels.replace(Arc::new(Pixels { plane, mode }));
        Ok(())
    }

    /// Resize the pixels to `width` x `height` with nearest-neighbor sampling
    ///
    /// Decodes first if needed. Like [`convert_to`](Self::convert_to), the
    /// image no longer decodes from its file afterwards.
    pub fn scale(&mut self, width: u32, height: u32) -> Result<()> {
        let current = self.pixels()?;
        if current.plane.size() == (width, height) {
            return Ok(());
        }
        let plane = convert::scale_plane(&current.plane, width, height)?;
        let mode = current.mode;
        debug!("image {}: scaled to {width}x{height}", self.id());
        self.pixels.replace(Arc::new(Pixels { plane, mode }));
        Ok(())
    }

    /// Plan thumbnails fitting each box; pixels are produced on save
    ///
    /// Boxes of 3 or less and boxes the image already fits in are skipped.
    /// Dimensions keep the aspect ratio and are rounded down to even. A box
    /// whose result matches the larger dimension of an existing thumbnail is
    /// skipped.
    pub fn add_thumbnails(&mut self, boxes: &[u32]) {
        let (w, h) = self.size();
        for &bbox in boxes {
            if bbox <= 3 || (w <= bbox && h <= bbox) {
                continue;
            }
            let (tw, th) = if w > h {
                (bbox, (h as u64 * bbox as u64 / w as u64) as u32)
            } else {
                ((w as u64 * bbox as u64 / h as u64) as u32, bbox)
            };
            let (tw, th) = (tw & !1, th & !1);
            if tw == 0 || th == 0 {
                continue;
            }
            let largest = tw.max(th);
            if self.thumbnails.iter().any(|t| t.box_size() == largest) {
                continue;
            }
            debug!("image {}: planned {tw}x{th} thumbnail", self.id());
            self.thumbnails
                .push(HeifThumbnail::pending(self.id(), (tw, th), self.mode()));
        }
    }

    /// Set the orientation to 1, returning the original value
    pub fn reset_orientation(&mut self) -> Option<u16> {
        reset_orientation(&mut self.info)
    }

    pub(crate) fn set_primary(&mut self, primary: bool) {
        self.info.primary = primary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::tiff_with_orientation;
    use crate::native::fake::{FakeBackend, FakeFile, FakeItem};
    use crate::native::{Backend, DecodeSettings};
    use std::time::Duration;

    fn settings() -> DecodeSettings {
        DecodeSettings {
            threads: 1,
            convert_hdr_to_8bit: true,
        }
    }

    fn rgb_plane(w: u32, h: u32) -> PlaneBuf {
        let data: Vec<u8> = (0..w * h * 3).map(|i| (i % 256) as u8).collect();
        PlaneBuf::from_caller(&data, None, w, h, 3).unwrap()
    }

    fn open_single(backend: &FakeBackend, item: FakeItem) -> Arc<dyn NativeContext> {
        let primary = item.info.id;
        let bytes = backend.store(FakeFile {
            brand: *b"heic",
            items: vec![item],
            primary,
        });
        backend.open(bytes, &settings()).unwrap()
    }

    #[test]
    fn decode_is_lazy_and_cached() {
        let backend = FakeBackend::new();
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(8, 4)));
        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        assert!(!image.is_loaded());
        assert_eq!(image.size(), (8, 4));
        assert_eq!(backend.decode_count(), 0);

        let stride = image.stride().unwrap();
        assert!(stride >= 24);
        assert_eq!(image.data().unwrap().len(), stride * 4);
        assert_eq!(image.to_packed().unwrap(), rgb_plane(8, 4).to_packed());
        image.load().unwrap();
        assert_eq!(backend.decode_count(), 1);
    }

    #[test]
    fn concurrent_first_access_decodes_once() {
        let backend = FakeBackend::with_delay(Duration::from_millis(20));
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(16, 16)));
        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let data = image.data().unwrap();
                    assert_eq!(data.len(), image.stride().unwrap() * 16);
                });
            }
        });
        assert_eq!(backend.decode_count(), 1);
    }

    #[test]
    fn unload_then_reload() {
        let backend = FakeBackend::new();
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(4, 4)));
        let mut image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        image.load().unwrap();
        image.unload();
        image.unload();
        assert!(!image.is_loaded());
        image.data().unwrap();
        assert_eq!(backend.decode_count(), 2);
    }

    #[test]
    fn close_is_terminal() {
        let backend = FakeBackend::new();
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(4, 4)));
        let mut image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        image.load().unwrap();
        image.close();
        assert!(image.is_closed());
        assert!(matches!(image.data().unwrap_err().into_inner(), Error::Closed));
        assert_eq!(image.size(), (4, 4));
        assert_eq!(image.mode(), Mode::RGB);
    }

    #[test]
    fn dropped_context_means_closed() {
        let backend = FakeBackend::new();
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(4, 4)));
        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        drop(ctx);
        assert!(matches!(image.data().unwrap_err().into_inner(), Error::Closed));
    }

    #[test]
    fn incorrect_header_fails_unless_allowed() {
        let backend = FakeBackend::with_decoded_size((6, 4));
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(8, 4)));

        let strict = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        let err = strict.data().unwrap_err().into_inner();
        assert_eq!(err.code(), Some(ErrorCode::InvalidInput));

        let options = Options::new().allow_incorrect_headers(true);
        let lenient = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &options).unwrap();
        assert_eq!(lenient.size(), (8, 4));
        lenient.load().unwrap();
        assert_eq!(lenient.size(), (6, 4));
    }

    #[test]
    fn hdr_decodes_to_8_bit_by_default() {
        let mode10: Mode = "RGB;10".parse().unwrap();
        let samples: Vec<u8> = [1023u16, 512, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let plane = PlaneBuf::from_caller(&samples, None, 1, 1, 6).unwrap();
        let backend = FakeBackend::new();
        let ctx = open_single(&backend, FakeItem::new(1, mode10, plane));

        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        assert_eq!(image.mode(), Mode::RGB);
        assert_eq!(image.original_bit_depth(), 10);
        assert_eq!(&image.data().unwrap()[..3], &[255, 128, 0]);

        let options = Options::new().convert_hdr_to_8bit(false);
        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &options).unwrap();
        assert_eq!(image.mode(), mode10);
        assert_eq!(image.stride().unwrap() % 16, 0);
    }

    #[test]
    fn thumbnails_follow_options() {
        let backend = FakeBackend::new();
        let item = FakeItem::new(1, Mode::RGB, rgb_plane(8, 8))
            .with_thumbnail(FakeItem::new(2, Mode::RGB, rgb_plane(4, 4)));
        let ctx = open_single(&backend, item);

        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        assert_eq!(image.thumbnails().len(), 1);
        let thumb = &image.thumbnails()[0];
        assert_eq!((thumb.thumb_id(), thumb.image_id()), (2, 1));
        assert_eq!(thumb.size(), (4, 4));
        image.load().unwrap();
        assert!(thumb.is_loaded());

        let options = Options::new().thumbnails(false);
        let image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &options).unwrap();
        assert!(image.thumbnails().is_empty());
    }

    #[test]
    fn unload_releases_thumbnails() {
        let backend = FakeBackend::new();
        let item = FakeItem::new(1, Mode::RGB, rgb_plane(8, 8))
            .with_thumbnail(FakeItem::new(2, Mode::RGB, rgb_plane(4, 4)));
        let ctx = open_single(&backend, item);
        let mut image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        image.load().unwrap();
        assert_eq!(backend.decode_count(), 2);

        image.unload();
        assert!(!image.is_loaded());
        assert!(!image.thumbnails()[0].is_loaded());

        image.load().unwrap();
        assert!(image.thumbnails()[0].is_loaded());
        assert_eq!(backend.decode_count(), 4);

        image.thumbnails_mut()[0].unload();
        assert!(image.is_loaded());
        assert!(!image.thumbnails()[0].is_loaded());
    }

    #[test]
    fn exif_and_xmp_are_lifted_out_of_metadata() {
        let backend = FakeBackend::new();
        let mut raw = vec![0, 0, 0, 0];
        raw.extend_from_slice(&tiff_with_orientation(6, false));
        let item = FakeItem::new(1, Mode::RGB, rgb_plane(2, 2))
            .with_metadata(MetadataBlock::from_native("Exif", "", raw))
            .with_metadata(MetadataBlock::Xmp(b"<x/>".to_vec()))
            .with_metadata(MetadataBlock::from_native("uri ", "", b"urn:x".to_vec()));
        let ctx = open_single(&backend, item);
        let mut image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        assert!(image.info().exif.as_deref().unwrap().starts_with(b"II*\0"));
        assert_eq!(image.info().xmp.as_deref(), Some(&b"<x/>"[..]));
        assert_eq!(image.info().metadata.len(), 1);

        assert_eq!(image.reset_orientation(), Some(6));
        assert_eq!(image.info().original_orientation, Some(6));
        assert_eq!(
            metadata::read_orientation(image.info().exif.as_deref().unwrap()),
            Some(1)
        );
    }

    #[test]
    fn caller_image_validation() {
        let err = HeifImage::from_bytes(Mode::RGB, (0, 4), &[], None)
            .unwrap_err()
            .into_inner();
        assert!(matches!(err, Error::InvalidDimensions { .. }));
        let err = HeifImage::from_bytes(Mode::RGBA, (2, 2), &[0; 15], None)
            .unwrap_err()
            .into_inner();
        assert!(matches!(err, Error::InsufficientData { needed: 16, actual: 15 }));

        let mut image = HeifImage::from_bytes(Mode::RGB, (2, 1), &[1, 2, 3, 4, 5, 6], None).unwrap();
        assert!(image.is_loaded());
        image.unload();
        assert_eq!(image.data().unwrap(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn convert_in_place() {
        let mut image = HeifImage::from_bytes(Mode::BGR, (1, 1), &[1, 2, 3], None).unwrap();
        image.convert_to(Mode::RGB).unwrap();
        assert_eq!(image.mode(), Mode::RGB);
        assert_eq!(image.data().unwrap(), &[3, 2, 1]);
    }

    #[test]
    fn scale_replaces_pixels() {
        let backend = FakeBackend::new();
        let ctx = open_single(&backend, FakeItem::new(1, Mode::RGB, rgb_plane(4, 2)));
        let mut image = HeifImage::from_context(&ctx, 1, true, Brand::Heic, &Options::new()).unwrap();
        image.scale(2, 1).unwrap();
        assert_eq!(backend.decode_count(), 1);
        assert_eq!(image.size(), (2, 1));
        assert_eq!(image.mode(), Mode::RGB);
        // source pixels (0, 0) and (2, 0)
        assert_eq!(image.to_packed().unwrap(), vec![0, 1, 2, 6, 7, 8]);

        image.unload();
        assert_eq!(image.size(), (2, 1));
        assert_eq!(backend.decode_count(), 1);

        let err = image.scale(0, 1).unwrap_err().into_inner();
        assert!(matches!(err, Error::InvalidDimensions { .. }));
        assert_eq!(image.size(), (2, 1));
    }

    #[test]
    fn planned_thumbnails() {
        let mut image = HeifImage::from_bytes(Mode::RGB, (400, 300), &vec![0; 400 * 300 * 3], None).unwrap();
        image.add_thumbnails(&[3, 100, 100, 500, 64, 75]);
        let sizes: Vec<_> = image.thumbnails().iter().map(|t| t.size()).collect();
        // 75 -> 75x56 rounds to 74x56; 100 -> 100x75 rounds to 100x74
        assert_eq!(sizes, vec![(100, 74), (64, 48), (74, 56)]);
        let thumb = &image.thumbnails()[0];
        assert!(thumb.is_pending());
        assert!(matches!(
            thumb.data().unwrap_err().into_inner(),
            Error::NotDecoded { width: 100, height: 74 }
        ));
    }

    #[test]
    fn planned_thumbnails_portrait() {
        let mut image = HeifImage::from_bytes(Mode::RGB, (30, 61), &vec![0; 30 * 61 * 3], None).unwrap();
        image.add_thumbnails(&[20]);
        // 30 * 20 / 61 = 9, rounded down to even
        assert_eq!(image.thumbnails()[0].size(), (8, 20));
    }
}
