//! Typed pixel buffers for interop with `imgref`/`rgb` based code

use imgref::ImgVec;
use rgb::{Rgb, Rgba};

use crate::convert;
use crate::error::Result;
use crate::marshal::PlaneBuf;
use crate::mode::{Layout, Mode};

/// Pixels as typed `imgref` buffers
///
/// High bit depth data is widened to the full `u16` range.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PixelData {
    /// 8-bit RGB image
    Rgb8(ImgVec<Rgb<u8>>),
    /// 8-bit RGBA image
    Rgba8(ImgVec<Rgba<u8>>),
    /// 16-bit RGB image
    Rgb16(ImgVec<Rgb<u16>>),
    /// 16-bit RGBA image
    Rgba16(ImgVec<Rgba<u16>>),
    /// 8-bit grayscale image
    Gray8(ImgVec<u8>),
    /// 16-bit grayscale image
    Gray16(ImgVec<u16>),
}

fn le_samples(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn push_le(out: &mut Vec<u8>, samples: &[u16]) {
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
}

impl PixelData {
    /// Width in pixels
    pub fn width(&self) -> usize {
        match self {
            PixelData::Rgb8(img) => img.width(),
            PixelData::Rgba8(img) => img.width(),
            PixelData::Rgb16(img) => img.width(),
            PixelData::Rgba16(img) => img.width(),
            PixelData::Gray8(img) => img.width(),
            PixelData::Gray16(img) => img.width(),
        }
    }

    /// Height in pixels
    pub fn height(&self) -> usize {
        match self {
            PixelData::Rgb8(img) => img.height(),
            PixelData::Rgba8(img) => img.height(),
            PixelData::Rgb16(img) => img.height(),
            PixelData::Rgba16(img) => img.height(),
            PixelData::Gray8(img) => img.height(),
            PixelData::Gray16(img) => img.height(),
        }
    }

    /// Returns true if the image has an alpha channel
    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelData::Rgba8(_) | PixelData::Rgba16(_))
    }

    /// Returns true if the image is grayscale
    pub fn is_grayscale(&self) -> bool {
        matches!(self, PixelData::Gray8(_) | PixelData::Gray16(_))
    }

    /// Bit depth of the buffer (8 or 16)
    pub fn bit_depth(&self) -> u8 {
        match self {
            PixelData::Rgb8(_) | PixelData::Rgba8(_) | PixelData::Gray8(_) => 8,
            PixelData::Rgb16(_) | PixelData::Rgba16(_) | PixelData::Gray16(_) => 16,
        }
    }

    /// The mode of the plane [`to_plane`](Self::to_plane) produces
    pub fn mode(&self) -> Mode {
        let layout = match self {
            PixelData::Rgb8(_) | PixelData::Rgb16(_) => Layout::Rgb,
            PixelData::Rgba8(_) | PixelData::Rgba16(_) => Layout::Rgba,
            PixelData::Gray8(_) | PixelData::Gray16(_) => Layout::L,
        };
        match (layout, self.bit_depth()) {
            (Layout::Rgb, 8) => Mode::RGB,
            (Layout::Rgba, 8) => Mode::RGBA,
            (Layout::L, 8) => Mode::L,
            (Layout::Rgb, _) => Mode::RGB16,
            (Layout::Rgba, _) => Mode::RGBA16,
            _ => Mode::L16,
        }
    }

    /// Build typed buffers from a plane
    pub fn from_plane(plane: &PlaneBuf, mode: Mode) -> Result<PixelData> {
        let target = if mode.bit_depth() == 8 {
            Mode::new(mode.layout().to_rgb_order(), 8)?
        } else {
            Mode::new(mode.layout().to_rgb_order(), 16)?
        };
        let converted;
        let plane = if target == mode {
            plane
        } else {
            converted = convert::convert_plane(plane, mode, target)?;
            &converted
        };
        let packed = plane.to_packed();
        let (w, h) = (plane.width() as usize, plane.height() as usize);
        Ok(match (target.layout(), target.bit_depth()) {
            (Layout::Rgb, 8) => PixelData::Rgb8(ImgVec::new(bytemuck::cast_slice(&packed).to_vec(), w, h)),
            (Layout::Rgba, 8) => PixelData::Rgba8(ImgVec::new(bytemuck::cast_slice(&packed).to_vec(), w, h)),
            (Layout::L, 8) => PixelData::Gray8(ImgVec::new(packed, w, h)),
            (Layout::Rgb, _) => {
                PixelData::Rgb16(ImgVec::new(bytemuck::cast_slice(&le_samples(&packed)).to_vec(), w, h))
            }
            (Layout::Rgba, _) => {
                PixelData::Rgba16(ImgVec::new(bytemuck::cast_slice(&le_samples(&packed)).to_vec(), w, h))
            }
            _ => PixelData::Gray16(ImgVec::new(le_samples(&packed), w, h)),
        })
    }

    /// Copy into a packed plane, returning it with its mode
    pub fn to_plane(&self) -> Result<(PlaneBuf, Mode)> {
        let mode = self.mode();
        let mut out = Vec::with_capacity(mode.row_bytes(self.width() as u32) * self.height());
        match self {
            PixelData::Rgb8(img) => img.rows().for_each(|r| out.extend_from_slice(bytemuck::cast_slice(r))),
            PixelData::Rgba8(img) => img.rows().for_each(|r| out.extend_from_slice(bytemuck::cast_slice(r))),
            PixelData::Gray8(img) => img.rows().for_each(|r| out.extend_from_slice(r)),
            PixelData::Rgb16(img) => img.rows().for_each(|r| push_le(&mut out, bytemuck::cast_slice(r))),
            PixelData::Rgba16(img) => img.rows().for_each(|r| push_le(&mut out, bytemuck::cast_slice(r))),
            PixelData::Gray16(img) => img.rows().for_each(|r| push_le(&mut out, r)),
        }
        let plane = PlaneBuf::from_caller(
            &out,
            None,
            self.width() as u32,
            self.height() as u32,
            mode.bytes_per_pixel(),
        )?;
        Ok((plane, mode))
    }
}
