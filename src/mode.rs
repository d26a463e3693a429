//! Pixel modes: channel layout plus bit depth

use core::fmt;
use core::str::FromStr;

use whereat::at;

use crate::error::{Error, Result};

/// Channel order of interleaved pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Single luma channel
    L,
    /// Red, green, blue
    Rgb,
    /// Red, green, blue, alpha
    Rgba,
    /// Blue, green, red
    Bgr,
    /// Blue, green, red, alpha
    Bgra,
}

impl Layout {
    /// Number of interleaved channels
    pub fn channels(self) -> usize {
        match self {
            Layout::L => 1,
            Layout::Rgb | Layout::Bgr => 3,
            Layout::Rgba | Layout::Bgra => 4,
        }
    }

    /// Whether the last channel is alpha
    pub fn has_alpha(self) -> bool {
        matches!(self, Layout::Rgba | Layout::Bgra)
    }

    /// Whether red and blue are swapped relative to RGB order
    pub fn is_bgr(self) -> bool {
        matches!(self, Layout::Bgr | Layout::Bgra)
    }

    /// The RGB-ordered layout with the same channel count
    pub fn to_rgb_order(self) -> Layout {
        match self {
            Layout::Bgr => Layout::Rgb,
            Layout::Bgra => Layout::Rgba,
            other => other,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Layout::L => "L",
            Layout::Rgb => "RGB",
            Layout::Rgba => "RGBA",
            Layout::Bgr => "BGR",
            Layout::Bgra => "BGRA",
        }
    }
}

/// Codec colorspace of a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    /// Planar luma/chroma
    YCbCr,
    /// Interleaved RGB(A)
    Rgb,
    /// Single channel
    Monochrome,
}

/// Codec chroma layout of a mode
///
/// High bit depth interleaved layouts store each sample as little-endian `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chroma {
    /// Single plane
    Monochrome,
    /// 8-bit RGB
    InterleavedRgb,
    /// 8-bit RGBA
    InterleavedRgba,
    /// 10/12/16-bit RGB, little-endian samples
    InterleavedRrggbbLe,
    /// 10/12/16-bit RGBA, little-endian samples
    InterleavedRrggbbaaLe,
}

/// A pixel mode: layout plus bits per channel
///
/// Modes are written like `"RGB"`, `"RGBA;10"`, `"L;16"` or `"BGR;16"`.
/// `"I;16"` and `"I;16L"` are accepted as aliases of `"L;16"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    layout: Layout,
    bit_depth: u8,
}

impl Mode {
    /// 8-bit RGB
    pub const RGB: Mode = Mode::raw(Layout::Rgb, 8);
    /// 8-bit RGBA
    pub const RGBA: Mode = Mode::raw(Layout::Rgba, 8);
    /// 8-bit BGR
    pub const BGR: Mode = Mode::raw(Layout::Bgr, 8);
    /// 8-bit BGRA
    pub const BGRA: Mode = Mode::raw(Layout::Bgra, 8);
    /// 8-bit luma
    pub const L: Mode = Mode::raw(Layout::L, 8);
    /// 16-bit luma
    pub const L16: Mode = Mode::raw(Layout::L, 16);
    /// 16-bit RGB
    pub const RGB16: Mode = Mode::raw(Layout::Rgb, 16);
    /// 16-bit RGBA
    pub const RGBA16: Mode = Mode::raw(Layout::Rgba, 16);

    const fn raw(layout: Layout, bit_depth: u8) -> Mode {
        Mode { layout, bit_depth }
    }

    /// Build a mode, rejecting bit depths other than 8, 10, 12 and 16
    pub fn new(layout: Layout, bit_depth: u8) -> Result<Mode> {
        match bit_depth {
            8 | 10 | 12 | 16 => Ok(Mode::raw(layout, bit_depth)),
            _ => Err(at(Error::UnsupportedMode(format!(
                "{};{bit_depth}",
                layout.name()
            )))),
        }
    }

    /// The mode a handle decodes into: RGB or RGBA at the requested depth
    pub fn for_decode(has_alpha: bool, bit_depth: u8) -> Mode {
        let layout = if has_alpha { Layout::Rgba } else { Layout::Rgb };
        let bit_depth = match bit_depth {
            10 | 12 | 16 => bit_depth,
            _ => 8,
        };
        Mode::raw(layout, bit_depth)
    }

    /// Channel layout
    pub fn layout(self) -> Layout {
        self.layout
    }

    /// Bits per channel: 8, 10, 12 or 16
    pub fn bit_depth(self) -> u8 {
        self.bit_depth
    }

    /// Interleaved channels per pixel
    pub fn channels(self) -> usize {
        self.layout.channels()
    }

    /// Bytes per channel sample: 1 for 8-bit, 2 otherwise
    pub fn bytes_per_sample(self) -> usize {
        if self.bit_depth > 8 { 2 } else { 1 }
    }

    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        self.channels() * self.bytes_per_sample()
    }

    /// Whether the mode carries alpha
    pub fn has_alpha(self) -> bool {
        self.layout.has_alpha()
    }

    /// Minimum row length in bytes
    pub fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }

    /// The codec colorspace
    pub fn colorspace(self) -> Colorspace {
        match self.layout {
            Layout::L => Colorspace::Monochrome,
            _ => Colorspace::Rgb,
        }
    }

    /// The codec chroma layout
    pub fn chroma(self) -> Chroma {
        match (self.layout.channels(), self.bit_depth) {
            (1, _) => Chroma::Monochrome,
            (3, 8) => Chroma::InterleavedRgb,
            (4, 8) => Chroma::InterleavedRgba,
            (3, _) => Chroma::InterleavedRrggbbLe,
            _ => Chroma::InterleavedRrggbbaaLe,
        }
    }

    /// The mode the encoder accepts for this one
    ///
    /// BGR orders become RGB, and 16-bit data is stored as 10-bit, or 12-bit
    /// when `save_to_12bit` is set.
    pub fn encodable(self, save_to_12bit: bool) -> Mode {
        let bit_depth = match self.bit_depth {
            16 if save_to_12bit => 12,
            16 => 10,
            other => other,
        };
        Mode::raw(self.layout.to_rgb_order(), bit_depth)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layout.name())?;
        if self.bit_depth != 8 {
            write!(f, ";{}", self.bit_depth)?;
        }
        Ok(())
    }
}

impl FromStr for Mode {
    type Err = whereat::At<Error>;

    fn from_str(s: &str) -> Result<Mode> {
        let unsupported = || at(Error::UnsupportedMode(s.to_string()));
        match s {
            "I;16" | "I;16L" => return Ok(Mode::L16),
            _ => {}
        }
        let (name, depth) = match s.split_once(';') {
            Some((name, depth)) => (name, depth.parse::<u8>().map_err(|_| unsupported())?),
            None => (s, 8),
        };
        let layout = match name {
            "L" => Layout::L,
            "RGB" => Layout::Rgb,
            "RGBA" => Layout::Rgba,
            "BGR" => Layout::Bgr,
            "BGRA" => Layout::Bgra,
            _ => return Err(unsupported()),
        };
        // ";8" is not a spelling in use
        if depth == 8 && s.contains(';') {
            return Err(unsupported());
        }
        Mode::new(layout, depth).map_err(|_| unsupported())
    }
}
