//! Read and write options, plus the process-wide default

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::brand::CompressionFormat;
use crate::native::Backend;

/// Encoder to prefer per compression format, by libheif encoder id
/// (`"x265"`, `"kvazaar"`, `"aom"`, `"rav1e"`, `"svt"`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferredEncoders {
    /// Preferred HEVC encoder
    pub hevc: Option<String>,
    /// Preferred AV1 encoder
    pub av1: Option<String>,
}

impl PreferredEncoders {
    /// Preferred encoder id for `format`
    pub fn for_format(&self, format: CompressionFormat) -> Option<&str> {
        match format {
            CompressionFormat::Hevc => self.hevc.as_deref(),
            CompressionFormat::Av1 => self.av1.as_deref(),
        }
    }
}

/// Options for opening and saving files
#[derive(Debug, Clone)]
pub struct Options {
    /// Expose thumbnails of opened images
    pub(crate) thumbnails: bool,
    /// Default encoder quality; `-1` is lossless, `None` the encoder default
    pub(crate) quality: Option<i32>,
    /// Store 16-bit input as 12-bit instead of 10-bit
    pub(crate) save_to_12bit: bool,
    /// Decoder thread limit
    pub(crate) decode_threads: u32,
    /// Accept decoded planes whose size differs from the header
    pub(crate) allow_incorrect_headers: bool,
    /// Decode high bit depth images to 8 bit
    pub(crate) convert_hdr_to_8bit: bool,
    /// Encoder to use per format
    pub(crate) preferred_encoder: PreferredEncoders,
    /// Native codec; `None` when the crate was built without one
    pub(crate) backend: Option<Arc<dyn Backend>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            thumbnails: true,
            quality: None,
            save_to_12bit: false,
            decode_threads: 4,
            allow_incorrect_headers: false,
            convert_hdr_to_8bit: true,
            preferred_encoder: PreferredEncoders::default(),
            backend: crate::native::default_backend(),
        }
    }
}

impl Options {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose thumbnails of opened images (default: on)
    pub fn thumbnails(mut self, enabled: bool) -> Self {
        self.thumbnails = enabled;
        self
    }

    /// Default save quality
    ///
    /// `Some(-1)` selects lossless, `Some(0..=100)` lossy quality and `None`
    /// leaves the encoder default.
    pub fn quality(mut self, quality: Option<i32>) -> Self {
        self.quality = quality;
        self
    }

    /// Store 16-bit images as 12-bit instead of 10-bit
    pub fn save_to_12bit(mut self, enabled: bool) -> Self {
        self.save_to_12bit = enabled;
        self
    }

    /// Decoder thread limit (default: 4)
    ///
    /// 0 decodes tiles on the calling thread.
    pub fn decode_threads(mut self, threads: u32) -> Self {
        self.decode_threads = threads;
        self
    }

    /// Accept images whose decoded size disagrees with the header
    pub fn allow_incorrect_headers(mut self, allow: bool) -> Self {
        self.allow_incorrect_headers = allow;
        self
    }

    /// Decode 10/12-bit images to 8 bit (default: on)
    pub fn convert_hdr_to_8bit(mut self, convert: bool) -> Self {
        self.convert_hdr_to_8bit = convert;
        self
    }

    /// Prefer a specific encoder for `format`
    pub fn preferred_encoder(mut self, format: CompressionFormat, id: Option<String>) -> Self {
        match format {
            CompressionFormat::Hevc => self.preferred_encoder.hevc = id,
            CompressionFormat::Av1 => self.preferred_encoder.av1 = id,
        }
        self
    }

    /// Use a specific native codec backend
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Drop the native codec backend
    pub fn without_backend(mut self) -> Self {
        self.backend = None;
        self
    }
}

static GLOBAL: LazyLock<RwLock<Options>> = LazyLock::new(|| RwLock::new(Options::default()));

/// Snapshot of the process-wide default options
pub fn global() -> Options {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide default options
pub fn set_global(options: Options) {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = options;
}

/// Modify the process-wide default options in place
pub fn update_global(f: impl FnOnce(&mut Options)) {
    let mut guard = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard);
}

/// Restore the process-wide default options
pub fn reset_global() {
    set_global(Options::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = Options::default();
        assert!(o.thumbnails);
        assert_eq!(o.quality, None);
        assert!(!o.save_to_12bit);
        assert_eq!(o.decode_threads, 4);
        assert!(!o.allow_incorrect_headers);
        assert!(o.convert_hdr_to_8bit);
        assert_eq!(o.preferred_encoder, PreferredEncoders::default());
    }

    #[test]
    fn builder_chain() {
        let o = Options::new()
            .thumbnails(false)
            .quality(Some(-1))
            .save_to_12bit(true)
            .decode_threads(1)
            .preferred_encoder(CompressionFormat::Av1, Some("rav1e".into()));
        assert!(!o.thumbnails);
        assert_eq!(o.quality, Some(-1));
        assert!(o.save_to_12bit);
        assert_eq!(o.decode_threads, 1);
        assert_eq!(o.preferred_encoder.for_format(CompressionFormat::Av1), Some("rav1e"));
        assert_eq!(o.preferred_encoder.for_format(CompressionFormat::Hevc), None);
        assert!(o.without_backend().backend.is_none());
    }

    // The only unit test touching the process-wide value
    #[test]
    fn global_options_are_snapshotted() {
        let defaults = global();
        assert!(defaults.thumbnails);
        assert_eq!(defaults.quality, None);

        update_global(|o| *o = o.clone().quality(Some(42)).thumbnails(false));
        let snapshot = global();
        assert_eq!(snapshot.quality, Some(42));
        assert!(!snapshot.thumbnails);

        set_global(Options::new().preferred_encoder(CompressionFormat::Av1, Some("aom".into())));
        assert_eq!(snapshot.quality, Some(42));
        assert_eq!(
            global().preferred_encoder.for_format(CompressionFormat::Av1),
            Some("aom")
        );
        assert_eq!(global().quality, None);

        reset_global();
        assert_eq!(global().preferred_encoder.av1, None);
    }
}
