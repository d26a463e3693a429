//! Error types for zenheif

use crate::mode::Mode;

/// Error codes reported by the native codec library
///
/// The numeric values match `enum heif_error_code` in libheif.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Input file does not exist
    InputDoesNotExist = 1,
    /// Corrupt or truncated input
    InvalidInput = 2,
    /// Input is not a HEIF/AVIF file the codec can read
    UnsupportedFiletype = 3,
    /// Image uses a feature the codec does not implement
    UnsupportedFeature = 4,
    /// API misuse
    UsageError = 5,
    /// Memory allocation failed
    MemoryAllocationError = 6,
    /// The decoder plugin failed
    DecoderPluginError = 7,
    /// The encoder plugin failed
    EncoderPluginError = 8,
    /// Encoding failed, including "no encoder available"
    EncodingError = 9,
    /// Requested color profile is absent
    ColorProfileDoesNotExist = 10,
    /// A codec plugin could not be loaded
    PluginLoadingError = 11,
}

impl ErrorCode {
    /// Map a raw libheif error code. `0` (OK) and unknown values yield `None`.
    pub fn from_raw(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::InputDoesNotExist,
            2 => Self::InvalidInput,
            3 => Self::UnsupportedFiletype,
            4 => Self::UnsupportedFeature,
            5 => Self::UsageError,
            6 => Self::MemoryAllocationError,
            7 => Self::DecoderPluginError,
            8 => Self::EncoderPluginError,
            9 => Self::EncodingError,
            10 => Self::ColorProfileDoesNotExist,
            11 => Self::PluginLoadingError,
            _ => return None,
        })
    }

    /// The raw libheif value
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Sub-codes used by this crate when it raises a codec-style error itself
pub mod subcode {
    /// Unspecified
    pub const UNSPECIFIED: i32 = 0;
    /// Input ended before the structure was complete
    pub const END_OF_DATA: i32 = 100;
    /// The input has no `ftyp` box
    pub const NO_FTYP_BOX: i32 = 102;
    /// Decoded image size differs from the size in the header
    pub const INVALID_IMAGE_SIZE: i32 = 123;
    /// No image left to write
    pub const NO_IMAGES: i32 = 1001;
    /// Quality outside of -1..=100
    pub const INVALID_PARAMETER_VALUE: i32 = 2006;
    /// No encoder or decoder available for the requested format
    pub const NO_CODEC: i32 = 5000;
}

/// A structured failure reported by the native codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Code: {code:?}, Subcode: {subcode}, Message: `{message}`")]
pub struct HeifError {
    /// Error category
    pub code: ErrorCode,
    /// Codec-specific detail code
    pub subcode: i32,
    /// Human-readable message
    pub message: String,
}

impl HeifError {
    /// Create a structured error
    pub fn new(code: ErrorCode, subcode: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            subcode,
            message: message.into(),
        }
    }

    pub(crate) fn usage(subcode: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UsageError, subcode, message)
    }

    pub(crate) fn invalid_input(subcode: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, subcode, message)
    }

    pub(crate) fn no_encoder() -> Self {
        Self::new(ErrorCode::EncodingError, subcode::NO_CODEC, "No encoder found.")
    }

    pub(crate) fn no_decoder() -> Self {
        Self::new(
            ErrorCode::DecoderPluginError,
            subcode::NO_CODEC,
            "No decoder found.",
        )
    }
}

/// Error type for zenheif operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Failure reported by (or on behalf of) the native codec
    #[error(transparent)]
    Heif(#[from] HeifError),

    /// Caller buffer is shorter than `stride * height`
    #[error("Insufficient data: need {needed} bytes, got {actual}")]
    InsufficientData {
        /// Bytes required
        needed: usize,
        /// Bytes provided
        actual: usize,
    },

    /// Width or height is zero, or the stride cannot hold a row
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// Pixel access on an image or thumbnail after `close()`,
    /// or after its container context was dropped
    #[error("Image is closed")]
    Closed,

    /// Mode string or layout/depth combination is not supported
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    /// No conversion exists between the two modes
    #[error("Unsupported mode conversion: {from} -> {to}")]
    UnsupportedConversion {
        /// Source mode
        from: Mode,
        /// Requested mode
        to: Mode,
    },

    /// Image index outside of the container
    #[error("Invalid image index: {index} (container has {len} images)")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of images
        len: usize,
    },

    /// Thumbnail was planned with `add_thumbnails` and is only produced on save
    #[error("Thumbnail {width}x{height} has no pixel data until the file is saved")]
    NotDecoded {
        /// Planned width
        width: u32,
        /// Planned height
        height: u32,
    },

    /// Reading the input or writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The native error code, when this is a codec error
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Heif(e) => Some(e.code),
            _ => None,
        }
    }

    /// `true` for errors raised by operating on a closed resource
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}

/// Result type for zenheif operations with location tracking
pub type Result<T, E = whereat::At<Error>> = core::result::Result<T, E>;
