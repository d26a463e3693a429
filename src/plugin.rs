//! Adapter exposing HEIF and AVIF to a host image library
//!
//! A host implements [`PluginHost`]; [`register_heif_opener`] and
//! [`register_avif_opener`] install sniffers, openers, savers, MIME types and
//! file extensions on it. [`Registry`] is a ready-made host.

use std::io::Write;
use std::sync::Arc;

use log::{debug, warn};

use crate::brand::{Brand, CompressionFormat};
use crate::container::HeifFile;
use crate::error::Error;
use crate::image::{HeifImage, HeifThumbnail, ImageInfo};
use crate::mode::Mode;
use crate::options::Options;
use crate::save::SaveOptions;

/// Format name of the HEIF plugin
pub const HEIF_FORMAT: &str = "HEIF";
/// Format name of the AVIF plugin
pub const AVIF_FORMAT: &str = "AVIF";

/// Extensions claimed by the HEIF plugin
pub const HEIF_EXTENSIONS: &[&str] = &[".heic", ".heics", ".heif", ".heifs", ".hif"];
/// Extensions claimed by the AVIF plugin
pub const AVIF_EXTENSIONS: &[&str] = &[".avif"];

/// Errors surfaced to a plugin host
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The opener could not read the data as its format
    #[error("cannot identify {format} image: {reason}")]
    CannotIdentify {
        /// Format that tried to open the data
        format: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// No registered format claims the data or name
    #[error("unknown image format")]
    UnknownFormat,

    /// Seek past the last frame
    #[error("attempt to seek to frame {frame} of {n_frames}")]
    EndOfSequence {
        /// Requested frame
        frame: usize,
        /// Frames available
        n_frames: usize,
    },

    /// Failure after the file was identified
    #[error(transparent)]
    Codec(#[from] Error),
}

impl From<whereat::At<Error>> for PluginError {
    fn from(e: whereat::At<Error>) -> Self {
        PluginError::Codec(e.into_inner())
    }
}

/// Accepts or rejects the first bytes of a file
pub type Sniffer = fn(&[u8]) -> bool;
/// Opens a whole file
pub type Opener = Arc<dyn Fn(&[u8]) -> Result<PluginImage, PluginError> + Send + Sync>;
/// Writes a container in the saver's format
pub type Saver = Arc<dyn Fn(&HeifFile, &mut dyn Write, &SaveOptions) -> Result<(), PluginError> + Send + Sync>;

/// Registration surface of a host image library
///
/// Registering a format again replaces its earlier entries.
pub trait PluginHost {
    /// Register how to recognize and open `format`
    fn register_open(&mut self, format: &'static str, sniffer: Sniffer, opener: Opener);

    /// Register how to save `format`
    fn register_save(&mut self, format: &'static str, saver: Saver);

    /// Drop any saver registered for `format`
    fn unregister_save(&mut self, format: &'static str);

    /// Register the MIME type of `format`
    fn register_mime(&mut self, format: &'static str, mime: &'static str);

    /// Register file extensions, with leading dot, for `format`
    fn register_extensions(&mut self, format: &'static str, extensions: &[&'static str]);
}

/// Proof that a format was registered on a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    format: &'static str,
    saves: bool,
}

impl Registration {
    /// Registered format name
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// Whether a saver was registered; `false` when no encoder exists
    pub fn saves(&self) -> bool {
        self.saves
    }
}

/// An opened file as a host sees it: one current frame out of `n_frames`
#[derive(Debug)]
pub struct PluginImage {
    file: HeifFile,
    frame: usize,
    format: &'static str,
}

impl PluginImage {
    fn open(data: &[u8], format: &'static str, options: &Options) -> Result<Self, PluginError> {
        let file = HeifFile::open(data, options).map_err(|e| PluginError::CannotIdentify {
            format,
            reason: e.into_inner().to_string(),
        })?;
        let frame = file.primary_index();
        let mut image = Self { file, frame, format };
        image.reset_frame_orientation();
        Ok(image)
    }

    fn reset_frame_orientation(&mut self) {
        if let Ok(image) = self.file.get_mut(self.frame) {
            image.reset_orientation();
        }
    }

    fn current(&self) -> Result<&HeifImage, PluginError> {
        Ok(self.file.get(self.frame)?)
    }

    /// Format name of the opener that produced this image
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// MIME type of the source brand
    pub fn mimetype(&self) -> &'static str {
        self.file.mimetype()
    }

    /// Size of the current frame
    pub fn size(&self) -> (u32, u32) {
        self.current().map_or((0, 0), HeifImage::size)
    }

    /// Mode of the current frame
    pub fn mode(&self) -> Mode {
        self.current().map_or(Mode::RGB, HeifImage::mode)
    }

    /// Info of the current frame, orientation already reset
    pub fn info(&self) -> Option<&ImageInfo> {
        self.current().ok().map(HeifImage::info)
    }

    /// Decode the current frame
    pub fn load(&self) -> Result<&HeifImage, PluginError> {
        let image = self.current()?;
        image.pixels()?;
        Ok(image)
    }

    /// Number of top-level images
    pub fn n_frames(&self) -> usize {
        self.file.len()
    }

    /// Whether there is more than one frame
    pub fn is_animated(&self) -> bool {
        self.n_frames() > 1
    }

    /// Make `frame` current
    pub fn seek(&mut self, frame: usize) -> Result<(), PluginError> {
        let n_frames = self.n_frames();
        if frame >= n_frames {
            return Err(PluginError::EndOfSequence { frame, n_frames });
        }
        if frame != self.frame {
            self.frame = frame;
            self.reset_frame_orientation();
        }
        Ok(())
    }

    /// Index of the current frame
    pub fn tell(&self) -> usize {
        self.frame
    }

    /// Thumbnails of the current frame
    pub fn thumbnails(&self) -> &[HeifThumbnail] {
        self.current().map_or(&[][..], HeifImage::thumbnails)
    }

    /// The underlying container
    pub fn file(&self) -> &HeifFile {
        &self.file
    }

    /// Take the underlying container
    pub fn into_file(self) -> HeifFile {
        self.file
    }
}

fn sniff_heif(magic: &[u8]) -> bool {
    Brand::detect(magic).is_heif()
}

fn sniff_avif(magic: &[u8]) -> bool {
    Brand::detect(magic).is_avif()
}

fn register<H: PluginHost + ?Sized>(
    host: &mut H,
    format: &'static str,
    compression: CompressionFormat,
    sniffer: Sniffer,
    mime: &'static str,
    extensions: &[&'static str],
    options: &Options,
) -> Registration {
    // Hosts hand pixels around as 8-bit data
    let options = options.clone().convert_hdr_to_8bit(true);

    let open_options = options.clone();
    host.register_open(
        format,
        sniffer,
        Arc::new(move |data: &[u8]| PluginImage::open(data, format, &open_options)),
    );

    let saves = options
        .backend
        .as_ref()
        .is_some_and(|backend| backend.has_encoder(compression));
    if saves {
        let saver: Saver = Arc::new(
            move |file: &HeifFile, writer: &mut dyn Write, save_options: &SaveOptions| -> Result<(), PluginError> {
                let save_options = save_options.clone().format(compression);
                file.save_with(writer, &save_options, &options)?;
                Ok(())
            },
        );
        host.register_save(format, saver);
    } else {
        warn!("no {compression:?} encoder available, {format} saving disabled");
        host.unregister_save(format);
    }

    host.register_mime(format, mime);
    host.register_extensions(format, extensions);
    debug!("registered {format} plugin (saves: {saves})");
    Registration { format, saves }
}

/// Register HEIF open and save support on `host`
///
/// `options` are snapshotted; later changes to them do not affect the host.
/// Calling this again replaces the earlier registration.
pub fn register_heif_opener<H: PluginHost + ?Sized>(host: &mut H, options: &Options) -> Registration {
    register(
        host,
        HEIF_FORMAT,
        CompressionFormat::Hevc,
        sniff_heif,
        "image/heif",
        HEIF_EXTENSIONS,
        options,
    )
}

/// Register AVIF open and save support on `host`
///
/// See [`register_heif_opener`].
pub fn register_avif_opener<H: PluginHost + ?Sized>(host: &mut H, options: &Options) -> Registration {
    register(
        host,
        AVIF_FORMAT,
        CompressionFormat::Av1,
        sniff_avif,
        "image/avif",
        AVIF_EXTENSIONS,
        options,
    )
}

struct OpenEntry {
    format: &'static str,
    sniffer: Sniffer,
    opener: Opener,
}

/// A minimal plugin host: formats, their openers, savers, MIME types and
/// extensions
#[derive(Default)]
pub struct Registry {
    openers: Vec<OpenEntry>,
    savers: Vec<(&'static str, Saver)>,
    mimes: Vec<(&'static str, &'static str)>,
    extensions: Vec<(&'static str, &'static str)>,
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("formats", &self.formats())
            .field("mimes", &self.mimes)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl PluginHost for Registry {
    fn register_open(&mut self, format: &'static str, sniffer: Sniffer, opener: Opener) {
        self.openers.retain(|e| e.format != format);
        self.openers.push(OpenEntry {
            format,
            sniffer,
            opener,
        });
    }

    fn register_save(&mut self, format: &'static str, saver: Saver) {
        self.savers.retain(|(f, _)| *f != format);
        self.savers.push((format, saver));
    }

    fn unregister_save(&mut self, format: &'static str) {
        self.savers.retain(|(f, _)| *f != format);
    }

    fn register_mime(&mut self, format: &'static str, mime: &'static str) {
        self.mimes.retain(|(f, _)| *f != format);
        self.mimes.push((format, mime));
    }

    fn register_extensions(&mut self, format: &'static str, extensions: &[&'static str]) {
        for &ext in extensions {
            self.extensions.retain(|(e, _)| !e.eq_ignore_ascii_case(ext));
            self.extensions.push((ext, format));
        }
    }
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered formats that can open files, in registration order
    pub fn formats(&self) -> Vec<&'static str> {
        self.openers.iter().map(|e| e.format).collect()
    }

    /// Format whose sniffer accepts `data`
    pub fn identify(&self, data: &[u8]) -> Option<&'static str> {
        self.openers
            .iter()
            .find(|e| (e.sniffer)(data))
            .map(|e| e.format)
    }

    /// Open `data` with the first format whose sniffer accepts it
    pub fn open(&self, data: &[u8]) -> Result<PluginImage, PluginError> {
        let entry = self
            .openers
            .iter()
            .find(|e| (e.sniffer)(data))
            .ok_or(PluginError::UnknownFormat)?;
        (entry.opener)(data)
    }

    /// Save `file` as `format`
    pub fn save(
        &self,
        format: &str,
        file: &HeifFile,
        writer: &mut dyn Write,
        save_options: &SaveOptions,
    ) -> Result<(), PluginError> {
        let (_, saver) = self
            .savers
            .iter()
            .find(|(f, _)| *f == format)
            .ok_or(PluginError::UnknownFormat)?;
        saver(file, writer, save_options)
    }

    /// Whether `format` has a saver
    pub fn can_save(&self, format: &str) -> bool {
        self.savers.iter().any(|(f, _)| *f == format)
    }

    /// MIME type registered for `format`
    pub fn mime(&self, format: &str) -> Option<&'static str> {
        self.mimes
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, m)| *m)
    }

    /// Format registered for a file extension, with or without the dot
    pub fn format_for_extension(&self, extension: &str) -> Option<&'static str> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        self.extensions
            .iter()
            .find(|(e, _)| e.strip_prefix('.').unwrap_or(e).eq_ignore_ascii_case(extension))
            .map(|(_, f)| *f)
    }

    /// Extensions registered for `format`
    pub fn extensions(&self, format: &str) -> Vec<&'static str> {
        self.extensions
            .iter()
            .filter(|(_, f)| *f == format)
            .map(|(e, _)| *e)
            .collect()
    }
}
