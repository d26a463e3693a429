//! Backend on top of libheif, through `libheif-rs`

use std::io::Cursor;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use libheif_rs::{
    Channel, ColorProfile as _, ColorProfileNCLX, ColorProfileRaw, ColorSpace, DecodingOptions,
    EncoderParameterValue, EncoderQuality, HeifContext, Image, ImageHandle, LibHeif, RgbChroma,
    StreamReader, color_profile_types,
};
use libheif_sys as lh;
use log::trace;
use whereat::at;

use super::{
    Backend, DecodeSettings, EncodableImage, EncodeSettings, HandleInfo, ItemId, ItemRef,
    NativeContext, NativeWriter,
};
use crate::brand::CompressionFormat;
use crate::color::{
    Chromaticities, ColorPrimaries, ColorProfile, MatrixCoefficients, NclxProfile, TransferCharacteristics,
};
use crate::error::{Error, ErrorCode, HeifError, Result, subcode};
use crate::marshal::{self, PlaneBuf};
use crate::metadata::MetadataBlock;
use crate::mode::{Layout, Mode};

static LIB: LazyLock<LibHeif> = LazyLock::new(LibHeif::new);

fn map_err(e: libheif_rs::HeifError) -> whereat::At<Error> {
    let code = ErrorCode::from_raw(e.code as i32).unwrap_or(ErrorCode::DecoderPluginError);
    at(Error::from(HeifError::new(code, e.sub_code as i32, e.message)))
}

fn native_format(format: CompressionFormat) -> libheif_rs::CompressionFormat {
    match format {
        CompressionFormat::Hevc => libheif_rs::CompressionFormat::Hevc,
        CompressionFormat::Av1 => libheif_rs::CompressionFormat::Av1,
    }
}

fn colorspace(mode: Mode) -> ColorSpace {
    match (mode.layout(), mode.bit_depth()) {
        (Layout::L, _) => ColorSpace::Monochrome,
        (layout, 8) if layout.has_alpha() => ColorSpace::Rgb(RgbChroma::Rgba),
        (_, 8) => ColorSpace::Rgb(RgbChroma::Rgb),
        (layout, _) if layout.has_alpha() => ColorSpace::Rgb(RgbChroma::HdrRgbaLe),
        _ => ColorSpace::Rgb(RgbChroma::HdrRgbLe),
    }
}

fn channel(mode: Mode) -> Channel {
    match mode.layout() {
        Layout::L => Channel::Y,
        _ => Channel::Interleaved,
    }
}

/// The libheif codec library
#[derive(Debug, Default, Clone, Copy)]
pub struct LibHeifBackend;

impl LibHeifBackend {
    /// Initialize libheif on first use
    pub fn new() -> Self {
        LazyLock::force(&LIB);
        Self
    }
}

impl Backend for LibHeifBackend {
    fn name(&self) -> &str {
        "libheif"
    }

    fn open(&self, data: Vec<u8>, settings: &DecodeSettings) -> Result<Arc<dyn NativeContext>> {
        let len = data.len() as u64;
        let reader = StreamReader::new(Cursor::new(data), len);
        let mut context = HeifContext::read_from_reader(Box::new(reader)).map_err(map_err)?;
        context.set_max_decoding_threads(settings.threads);
        Ok(Arc::new(LibHeifContext {
            inner: Mutex::new(context),
            convert_hdr_to_8bit: settings.convert_hdr_to_8bit,
        }))
    }

    fn writer(&self, settings: &EncodeSettings) -> Result<Box<dyn NativeWriter>> {
        let format = native_format(settings.format);
        let mut encoder = match &settings.encoder_id {
            Some(id) => {
                let descriptor = LIB
                    .encoder_descriptors(32, Some(format), None)
                    .into_iter()
                    .find(|d| d.id() == id.as_str())
                    .ok_or_else(|| at(Error::from(HeifError::no_encoder())))?;
                LIB.encoder(descriptor).map_err(map_err)?
            }
            None => LIB
                .encoder_for_format(format)
                .map_err(|_| at(Error::from(HeifError::no_encoder())))?,
        };
        match settings.quality {
            Some(-1) => encoder.set_quality(EncoderQuality::LossLess).map_err(map_err)?,
            Some(q) => encoder
                .set_quality(EncoderQuality::Lossy(q.clamp(0, 100) as u8))
                .map_err(map_err)?,
            None => {}
        }
        for (name, value) in &settings.params {
            encoder
                .set_parameter_value(name, EncoderParameterValue::String(value.clone()))
                .map_err(map_err)?;
        }
        Ok(Box::new(LibHeifWriter {
            context: HeifContext::new().map_err(map_err)?,
            encoder,
            handles: Vec::new(),
        }))
    }

    fn has_encoder(&self, format: CompressionFormat) -> bool {
        LIB.encoder_for_format(native_format(format)).is_ok()
    }
}

struct LibHeifContext {
    inner: Mutex<HeifContext<'static>>,
    convert_hdr_to_8bit: bool,
}

// SAFETY: a libheif context may be used from any thread as long as calls are
// not concurrent; every access goes through `inner`.
unsafe impl Send for LibHeifContext {}
// SAFETY: see above.
unsafe impl Sync for LibHeifContext {}

fn handle_for(context: &HeifContext<'static>, item: ItemRef) -> Result<ImageHandle> {
    match item {
        ItemRef::Image(id) => context.image_handle(id).map_err(map_err),
        ItemRef::Thumbnail { image, thumbnail } => context
            .image_handle(image)
            .and_then(|handle| handle.thumbnail(thumbnail))
            .map_err(map_err),
    }
}

fn read_profile(handle: &ImageHandle) -> Result<ColorProfile> {
    if let Some(nclx) = handle.color_profile_nclx() {
        return Ok(ColorProfile::Nclx(NclxProfile {
            color_primaries: match nclx.color_primaries() {
                libheif_rs::ColorPrimaries::Unknown => ColorPrimaries::UNSPECIFIED,
                v => ColorPrimaries(v as u16),
            },
            transfer_characteristics: match nclx.transfer_characteristics() {
                libheif_rs::TransferCharacteristics::Unknown => TransferCharacteristics::UNSPECIFIED,
                v => TransferCharacteristics(v as u16),
            },
            matrix_coefficients: match nclx.matrix_coefficients() {
                libheif_rs::MatrixCoefficients::Unknown => MatrixCoefficients::UNSPECIFIED,
                v => MatrixCoefficients(v as u16),
            },
            full_range: nclx.full_range_flag() != 0,
            chromaticities: Chromaticities {
                red: (nclx.color_primary_red_x(), nclx.color_primary_red_y()),
                green: (nclx.color_primary_green_x(), nclx.color_primary_green_y()),
                blue: (nclx.color_primary_blue_x(), nclx.color_primary_blue_y()),
                white: (nclx.color_primary_white_x(), nclx.color_primary_white_y()),
            },
        }));
    }
    match handle.color_profile_raw() {
        Some(raw) if raw.profile_type() == color_profile_types::R_ICC => {
            ColorProfile::from_icc("rICC", raw.data)
        }
        Some(raw) if raw.profile_type() == color_profile_types::PROF => {
            ColorProfile::from_icc("prof", raw.data)
        }
        _ => Ok(ColorProfile::None),
    }
}

impl NativeContext for LibHeifContext {
    fn top_level_image_ids(&self) -> Result<Vec<ItemId>> {
        let context = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids = vec![0; context.number_of_top_level_images()];
        let count = context.top_level_image_ids(&mut ids);
        ids.truncate(count);
        Ok(ids)
    }

    fn primary_image_id(&self) -> Result<ItemId> {
        let context = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(context.primary_image_handle().map_err(map_err)?.item_id())
    }

    fn handle_info(&self, item: ItemRef) -> Result<HandleInfo> {
        let context = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = handle_for(&context, item)?;
        let mut thumbnail_ids = vec![0; handle.number_of_thumbnails()];
        let count = handle.thumbnail_ids(&mut thumbnail_ids);
        thumbnail_ids.truncate(count);
        let metadata = handle
            .all_metadata()
            .into_iter()
            .map(|m| {
                let item_type = String::from_utf8_lossy(&m.item_type.0).into_owned();
                MetadataBlock::from_native(&item_type, &m.content_type, m.raw_data)
            })
            .collect();
        Ok(HandleInfo {
            id: item.id(),
            width: handle.width(),
            height: handle.height(),
            has_alpha: handle.has_alpha_channel(),
            luma_bits: handle.luma_bits_per_pixel(),
            thumbnail_ids,
            metadata,
            color_profile: read_profile(&handle)?,
        })
    }

    fn decode(&self, item: ItemRef, mode: Mode) -> Result<PlaneBuf> {
        let context = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = handle_for(&context, item)?;
        let options = DecodingOptions::new().map(|mut options| {
            options.set_convert_hdr_to_8bit(self.convert_hdr_to_8bit && mode.bit_depth() == 8);
            options
        });
        let image = LIB.decode(&handle, colorspace(mode), options).map_err(map_err)?;
        let planes = image.planes();
        let plane = match mode.layout() {
            Layout::L => planes.y,
            _ => planes.interleaved,
        }
        .ok_or_else(|| {
            at(Error::from(HeifError::new(
                ErrorCode::DecoderPluginError,
                subcode::UNSPECIFIED,
                "Decoded image has no plane for the requested mode",
            )))
        })?;
        trace!("item {}: libheif plane {}x{} stride {}", item.id(), plane.width, plane.height, plane.stride);
        PlaneBuf::from_native(plane.data, plane.stride, plane.width, plane.height, mode.bytes_per_pixel())
    }
}

struct LibHeifWriter {
    context: HeifContext<'static>,
    encoder: libheif_rs::Encoder<'static>,
    handles: Vec<(ItemId, ImageHandle)>,
}

fn find_handle(handles: &mut [(ItemId, ImageHandle)], id: ItemId) -> Result<&mut ImageHandle> {
    handles
        .iter_mut()
        .find(|(i, _)| *i == id)
        .map(|(_, h)| h)
        .ok_or_else(|| {
            at(Error::from(HeifError::usage(
                subcode::UNSPECIFIED,
                format!("No encoded image {id}"),
            )))
        })
}

// `ColorProfileNCLX` only wraps the pointer to the native profile
const _: () = assert!(
    std::mem::size_of::<ColorProfileNCLX>() == std::mem::size_of::<*mut lh::heif_color_profile_nclx>()
);

fn check(err: lh::heif_error, what: &str) -> Result<()> {
    if err.code == lh::heif_error_code_heif_error_Ok {
        return Ok(());
    }
    Err(at(Error::from(HeifError::usage(
        subcode::INVALID_PARAMETER_VALUE,
        format!("Unsupported NCLX {what}"),
    ))))
}

/// Native NCLX profile carrying all four coded fields
///
/// `libheif-rs` only exposes a setter for the primaries, the remaining
/// fields are written through `libheif-sys`.
fn native_nclx(nclx: &NclxProfile) -> Result<ColorProfileNCLX> {
    let profile = ColorProfileNCLX::new().ok_or_else(|| {
        at(Error::from(HeifError::new(
            ErrorCode::MemoryAllocationError,
            subcode::UNSPECIFIED,
            "Cannot allocate NCLX profile",
        )))
    })?;
    // SAFETY: the size check above pins the wrapper to its single pointer
    // field, which `new` returned non-null and `profile` owns until drop.
    let raw = unsafe {
        std::ptr::read((&profile as *const ColorProfileNCLX).cast::<*mut lh::heif_color_profile_nclx>())
    };
    // SAFETY: `raw` is a live profile allocated by libheif.
    unsafe {
        check(
            lh::heif_nclx_color_profile_set_color_primaries(raw, nclx.color_primaries.0),
            "color primaries",
        )?;
        check(
            lh::heif_nclx_color_profile_set_transfer_characteristics(raw, nclx.transfer_characteristics.0),
            "transfer characteristics",
        )?;
        check(
            lh::heif_nclx_color_profile_set_matrix_coefficients(raw, nclx.matrix_coefficients.0),
            "matrix coefficients",
        )?;
        (*raw).full_range_flag = u8::from(nclx.full_range);
    }
    Ok(profile)
}

fn native_image(image: &EncodableImage<'_>) -> Result<Image> {
    let (width, height) = image.plane.size();
    let mut native = Image::new(width, height, colorspace(image.mode)).map_err(map_err)?;
    native
        .create_plane(channel(image.mode), width, height, image.mode.bit_depth())
        .map_err(map_err)?;
    {
        let planes = native.planes_mut();
        let plane = match image.mode.layout() {
            Layout::L => planes.y,
            _ => planes.interleaved,
        }
        .ok_or_else(|| at(Error::from(HeifError::usage(subcode::UNSPECIFIED, "Plane not created"))))?;
        let stride = plane.stride;
        marshal::write_plane(
            image.plane.data(),
            Some(image.plane.stride()),
            width,
            height,
            image.mode.bytes_per_pixel(),
            plane.data,
            stride,
        )?;
    }
    match image.color_profile {
        ColorProfile::None => {}
        ColorProfile::IccRestricted(data) => native
            .set_color_profile_raw(&ColorProfileRaw::new(color_profile_types::R_ICC, data.clone()))
            .map_err(map_err)?,
        ColorProfile::IccFull(data) => native
            .set_color_profile_raw(&ColorProfileRaw::new(color_profile_types::PROF, data.clone()))
            .map_err(map_err)?,
        ColorProfile::Nclx(nclx) => native
            .set_color_profile_nclx(&native_nclx(nclx)?)
            .map_err(map_err)?,
    }
    Ok(native)
}

impl NativeWriter for LibHeifWriter {
    fn encode_image(&mut self, image: &EncodableImage<'_>) -> Result<ItemId> {
        let native = native_image(image)?;
        let handle = self
            .context
            .encode_image(&native, &mut self.encoder, None)
            .map_err(map_err)?;
        let id = handle.item_id();
        self.handles.push((id, handle));
        Ok(id)
    }

    fn encode_thumbnail(
        &mut self,
        image: &EncodableImage<'_>,
        master: ItemId,
        bbox: u32,
    ) -> Result<Option<ItemId>> {
        let native = native_image(image)?;
        let handle = find_handle(&mut self.handles, master)?;
        let thumb = self
            .context
            .encode_thumbnail(&native, handle, bbox, &mut self.encoder, None)
            .map_err(map_err)?;
        Ok(thumb.map(|h| h.item_id()))
    }

    fn set_primary(&mut self, id: ItemId) -> Result<()> {
        let handle = find_handle(&mut self.handles, id)?;
        self.context.set_primary_image(handle).map_err(map_err)
    }

    fn add_metadata(&mut self, id: ItemId, block: &MetadataBlock) -> Result<()> {
        let handle = find_handle(&mut self.handles, id)?;
        let result = match block {
            MetadataBlock::Exif(data) => self.context.add_exif_metadata(handle, data),
            MetadataBlock::Xmp(data) => self.context.add_xmp_metadata(handle, data),
            MetadataBlock::Generic { content_type, data, .. } => {
                let four_cc = block.four_cc()?;
                let content_type = (!content_type.is_empty()).then_some(content_type.as_str());
                self.context
                    .add_generic_metadata(handle, data, &four_cc, content_type)
            }
        };
        result.map_err(map_err)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        self.context.write_to_bytes().map_err(map_err)
    }
}
