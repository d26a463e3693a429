//! Writing containers back to HEIF or AVIF

use std::io::Write;
use std::path::Path;

use log::{debug, trace};
use whereat::at;

use crate::brand::CompressionFormat;
use crate::container::HeifFile;
use crate::convert::convert_plane;
use crate::error::{Error, HeifError, Result, subcode};
use crate::image::HeifImage;
use crate::metadata::MetadataBlock;
use crate::native::{EncodableImage, EncodeSettings, NativeWriter};
use crate::options::{self, Options};

/// What to write for the primary image's Exif or XMP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MetadataOverride {
    /// Write what the image carries
    #[default]
    Keep,
    /// Write nothing
    Remove,
    /// Write these bytes instead
    Replace(Vec<u8>),
}

impl MetadataOverride {
    fn resolve(&self, current: Option<&[u8]>) -> Option<Vec<u8>> {
        match self {
            MetadataOverride::Keep => current.map(<[u8]>::to_vec),
            MetadataOverride::Remove => None,
            MetadataOverride::Replace(data) => Some(data.clone()),
        }
    }
}

/// Inclusion of one image, and optionally of its thumbnails, in a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSelection {
    pub(crate) include: bool,
    pub(crate) thumbnails: Option<Vec<bool>>,
}

impl Default for ImageSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl ImageSelection {
    /// Save the image with all its thumbnails
    pub fn all() -> Self {
        Self {
            include: true,
            thumbnails: None,
        }
    }

    /// Leave the image out
    pub fn skip() -> Self {
        Self {
            include: false,
            thumbnails: None,
        }
    }

    /// Save only the thumbnails whose flag is set; missing flags mean include
    pub fn thumbnails(mut self, mask: Vec<bool>) -> Self {
        self.thumbnails = Some(mask);
        self
    }

    fn thumbnail_included(&self, index: usize) -> bool {
        self.thumbnails
            .as_ref()
            .and_then(|mask| mask.get(index).copied())
            .unwrap_or(true)
    }
}

/// Options for one save call
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub(crate) format: CompressionFormat,
    pub(crate) quality: Option<i32>,
    pub(crate) save_all: bool,
    pub(crate) primary_index: Option<isize>,
    pub(crate) exif: MetadataOverride,
    pub(crate) xmp: MetadataOverride,
    pub(crate) selection: Vec<ImageSelection>,
    pub(crate) encoder_params: Vec<(String, String)>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            format: CompressionFormat::Hevc,
            quality: None,
            save_all: true,
            primary_index: None,
            exif: MetadataOverride::Keep,
            xmp: MetadataOverride::Keep,
            selection: Vec::new(),
            encoder_params: Vec::new(),
        }
    }
}

impl SaveOptions {
    /// HEVC output with every image
    pub fn new() -> Self {
        Self::default()
    }

    /// AV1 output with every image
    pub fn avif() -> Self {
        Self::default().format(CompressionFormat::Av1)
    }

    /// Output compression format
    pub fn format(mut self, format: CompressionFormat) -> Self {
        self.format = format;
        self
    }

    /// Quality for this save, overriding [`Options::quality`]
    ///
    /// `-1` selects lossless, `0..=100` lossy quality.
    pub fn quality(mut self, quality: i32) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Save every selected image (default), or only the first
    pub fn save_all(mut self, save_all: bool) -> Self {
        self.save_all = save_all;
        self
    }

    /// Index among the saved images to mark primary
    ///
    /// Negative or out-of-range values select the last saved image.
    pub fn primary_index(mut self, index: isize) -> Self {
        self.primary_index = Some(index);
        self
    }

    /// Exif to write for the primary image
    pub fn exif(mut self, exif: MetadataOverride) -> Self {
        self.exif = exif;
        self
    }

    /// XMP to write for the primary image
    pub fn xmp(mut self, xmp: MetadataOverride) -> Self {
        self.xmp = xmp;
        self
    }

    /// Per-image inclusion, by index; images past the end are included
    pub fn selection(mut self, selection: Vec<ImageSelection>) -> Self {
        self.selection = selection;
        self
    }

    /// Extra encoder parameter, such as `("preset", "slow")` for x265
    pub fn encoder_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.encoder_params.push((name.into(), value.into()));
        self
    }
}

/// Which of the selected images becomes primary
fn primary_position(images: &[(&HeifImage, &ImageSelection)], requested: Option<isize>) -> usize {
    let last = images.len().saturating_sub(1);
    match requested {
        Some(index) if index < 0 => last,
        Some(index) => (index as usize).min(last),
        None => images
            .iter()
            .rposition(|(image, _)| image.is_primary())
            .unwrap_or(0),
    }
}

fn check_quality(quality: Option<i32>) -> Result<Option<i32>> {
    match quality {
        Some(q) if !(-1..=100).contains(&q) => Err(at(Error::from(HeifError::usage(
            subcode::INVALID_PARAMETER_VALUE,
            format!("Quality {q} is outside of -1..=100"),
        )))),
        other => Ok(other),
    }
}

impl HeifFile {
    /// Write the file to `writer` using the process-wide [`Options`]
    pub fn save<W: Write>(&self, writer: W, save_options: &SaveOptions) -> Result<()> {
        self.save_with(writer, save_options, &options::global())
    }

    /// Write the file to `writer`
    pub fn save_with<W: Write>(&self, mut writer: W, save_options: &SaveOptions, options: &Options) -> Result<()> {
        let bytes = self.save_to_vec(save_options, options)?;
        writer.write_all(&bytes).map_err(|e| at(Error::Io(e)))?;
        writer.flush().map_err(|e| at(Error::Io(e)))?;
        Ok(())
    }

    /// Write the file to `path`, replacing it
    pub fn save_to_path(&self, path: impl AsRef<Path>, save_options: &SaveOptions, options: &Options) -> Result<()> {
        let bytes = self.save_to_vec(save_options, options)?;
        std::fs::write(path, bytes).map_err(|e| at(Error::Io(e)))?;
        Ok(())
    }

    /// Encode the file into memory
    ///
    /// Each saved image is decoded, converted to an encodable mode and
    /// encoded with its color profile, metadata and thumbnails.
    pub fn save_to_vec(&self, save_options: &SaveOptions, options: &Options) -> Result<Vec<u8>> {
        let format = save_options.format;
        let backend = options
            .backend
            .as_ref()
            .filter(|b| b.has_encoder(format))
            .ok_or_else(|| at(Error::from(HeifError::no_encoder())))?;

        let default_selection = ImageSelection::all();
        let mut images: Vec<(&HeifImage, &ImageSelection)> = self
            .iter()
            .enumerate()
            .map(|(i, image)| (image, save_options.selection.get(i).unwrap_or(&default_selection)))
            .filter(|(_, selection)| selection.include)
            .collect();
        if !save_options.save_all {
            images.truncate(1);
        }
        if images.is_empty() {
            return Err(at(Error::from(HeifError::usage(
                subcode::NO_IMAGES,
                "Cannot write file with no images",
            ))));
        }

        let settings = EncodeSettings {
            format,
            quality: check_quality(save_options.quality.or(options.quality))?,
            encoder_id: options.preferred_encoder.for_format(format).map(str::to_string),
            params: save_options.encoder_params.clone(),
        };
        let primary = primary_position(&images, save_options.primary_index);
        debug!(
            "saving {} image(s) as {:?} via {}, primary at {primary}",
            images.len(),
            format,
            backend.name()
        );

        let mut writer = backend.writer(&settings)?;
        for (i, (image, selection)) in images.iter().enumerate() {
            encode_one(
                writer.as_mut(),
                image,
                selection,
                (i == primary).then_some(save_options),
                options.save_to_12bit,
            )?;
        }
        writer.finish()
    }
}

/// Encode one image; `primary` carries the overrides when it is the
/// primary image
fn encode_one(
    writer: &mut dyn NativeWriter,
    image: &HeifImage,
    selection: &ImageSelection,
    primary: Option<&SaveOptions>,
    save_to_12bit: bool,
) -> Result<()> {
    let pixels = image.pixels()?;
    let mode = pixels.mode().encodable(save_to_12bit);
    let converted;
    let plane = if mode == pixels.mode() {
        pixels.plane()
    } else {
        converted = convert_plane(pixels.plane(), pixels.mode(), mode)?;
        &converted
    };
    let info = image.info();
    let encodable = EncodableImage {
        mode,
        plane,
        color_profile: &info.color_profile,
    };
    let id = writer.encode_image(&encodable)?;
    trace!("encoded image {} as item {id} ({mode})", image.id());

    let (exif, xmp) = match primary {
        Some(overrides) => {
            writer.set_primary(id)?;
            (
                overrides.exif.resolve(info.exif.as_deref()),
                overrides.xmp.resolve(info.xmp.as_deref()),
            )
        }
        None => (info.exif.clone(), info.xmp.clone()),
    };
    if let Some(exif) = exif {
        writer.add_metadata(id, &MetadataBlock::Exif(exif))?;
    }
    if let Some(xmp) = xmp {
        writer.add_metadata(id, &MetadataBlock::Xmp(xmp))?;
    }
    for block in &info.metadata {
        writer.add_metadata(id, block)?;
    }

    let largest = plane.width().max(plane.height());
    for (t, thumb) in image.thumbnails().iter().enumerate() {
        let bbox = thumb.box_size();
        if !selection.thumbnail_included(t) || bbox <= 3 || bbox >= largest {
            continue;
        }
        if let Some(thumb_id) = writer.encode_thumbnail(&encodable, id, bbox)? {
            trace!("encoded {bbox}px thumbnail {thumb_id} of item {id}");
        }
    }
    Ok(())
}
