//! Strided pixel buffers and row copies between native and caller memory
//!
//! Native planes and caller buffers often disagree on stride. Copies go
//! through [`copy_rows`], which does a single bulk copy when the strides
//! match and a row-by-row copy of `row_bytes` otherwise. Nothing reads past
//! `stride * height` of the source.

use imgref::ImgRef;
use whereat::at;

use crate::error::{Error, Result};

/// Copy `height` rows of `row_bytes` from `src` to `dst`
///
/// Both buffers must hold at least `stride * height` bytes and both strides
/// must be at least `row_bytes`.
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    row_bytes: usize,
    height: usize,
) -> Result<()> {
    if row_bytes > src_stride || row_bytes > dst_stride {
        return Err(at(Error::InvalidDimensions {
            width: row_bytes as u32,
            height: height as u32,
        }));
    }
    let src_needed = src_stride * height;
    if src.len() < src_needed {
        return Err(at(Error::InsufficientData {
            needed: src_needed,
            actual: src.len(),
        }));
    }
    let dst_needed = dst_stride * height;
    if dst.len() < dst_needed {
        return Err(at(Error::InsufficientData {
            needed: dst_needed,
            actual: dst.len(),
        }));
    }
    if height == 0 || row_bytes == 0 {
        return Ok(());
    }

    if src_stride == dst_stride {
        dst[..src_needed].copy_from_slice(&src[..src_needed]);
    } else {
        for (src_row, dst_row) in src
            .chunks(src_stride)
            .zip(dst.chunks_mut(dst_stride))
            .take(height)
        {
            dst_row[..row_bytes].copy_from_slice(&src_row[..row_bytes]);
        }
    }
    Ok(())
}

fn check_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(at(Error::InvalidDimensions { width, height }));
    }
    Ok(())
}

/// Resolve a caller-declared stride, defaulting to the packed row length
fn resolve_stride(declared: Option<usize>, width: u32, height: u32, row_bytes: usize) -> Result<usize> {
    match declared {
        Some(0) | None => Ok(row_bytes),
        Some(stride) if stride < row_bytes => Err(at(Error::InvalidDimensions { width, height })),
        Some(stride) => Ok(stride),
    }
}

/// Copy caller pixels into a native plane
///
/// `declared_stride` of `None` (or `0`) means packed rows. Validation
/// matches [`PlaneBuf::from_caller`].
pub fn write_plane(
    src: &[u8],
    declared_stride: Option<usize>,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    dst: &mut [u8],
    dst_stride: usize,
) -> Result<()> {
    check_size(width, height)?;
    let row_bytes = width as usize * bytes_per_pixel;
    let src_stride = resolve_stride(declared_stride, width, height, row_bytes)?;
    copy_rows(src, src_stride, dst, dst_stride, row_bytes, height as usize)
}

/// An owned interleaved pixel plane
///
/// Always `data.len() == stride * height` and `stride >= width * bytes_per_pixel`.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaneBuf {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    bytes_per_pixel: usize,
}

impl core::fmt::Debug for PlaneBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlaneBuf")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .finish_non_exhaustive()
    }
}

impl PlaneBuf {
    /// A zero-filled plane; `stride` of `None` means packed rows
    pub fn zeroed(width: u32, height: u32, bytes_per_pixel: usize, stride: Option<usize>) -> Result<Self> {
        check_size(width, height)?;
        let row_bytes = width as usize * bytes_per_pixel;
        let stride = resolve_stride(stride, width, height, row_bytes)?;
        Ok(Self {
            data: vec![0; stride * height as usize],
            width,
            height,
            stride,
            bytes_per_pixel,
        })
    }

    /// Copy caller pixels into a new packed plane
    ///
    /// `src_stride` of `None` (or `0`) means the rows in `src` are packed.
    /// Fails with [`Error::InvalidDimensions`] before allocating anything when
    /// the size is empty or the stride cannot hold a row, and with
    /// [`Error::InsufficientData`] when `src` is shorter than `stride * height`.
    pub fn from_caller(
        src: &[u8],
        src_stride: Option<usize>,
        width: u32,
        height: u32,
        bytes_per_pixel: usize,
    ) -> Result<Self> {
        check_size(width, height)?;
        let row_bytes = width as usize * bytes_per_pixel;
        let src_stride = resolve_stride(src_stride, width, height, row_bytes)?;
        let needed = src_stride * height as usize;
        if src.len() < needed {
            return Err(at(Error::InsufficientData {
                needed,
                actual: src.len(),
            }));
        }
        let mut plane = Self::zeroed(width, height, bytes_per_pixel, None)?;
        copy_rows(src, src_stride, &mut plane.data, row_bytes, row_bytes, height as usize)?;
        Ok(plane)
    }

    /// Copy a native plane, keeping its stride
    ///
    /// Native planes may be padded; keeping the padding lets the copy be a
    /// single bulk move.
    pub fn from_native(
        src: &[u8],
        src_stride: usize,
        width: u32,
        height: u32,
        bytes_per_pixel: usize,
    ) -> Result<Self> {
        let mut plane = Self::zeroed(width, height, bytes_per_pixel, Some(src_stride))?;
        let row_bytes = plane.row_bytes();
        copy_rows(src, src_stride, &mut plane.data, src_stride, row_bytes, height as usize)?;
        Ok(plane)
    }

    /// Take ownership of a buffer that already satisfies the plane invariants
    pub fn from_vec(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
        bytes_per_pixel: usize,
    ) -> Result<Self> {
        check_size(width, height)?;
        if stride < width as usize * bytes_per_pixel {
            return Err(at(Error::InvalidDimensions { width, height }));
        }
        let needed = stride * height as usize;
        if data.len() != needed {
            return Err(at(Error::InsufficientData {
                needed,
                actual: data.len(),
            }));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            bytes_per_pixel,
        })
    }

    /// Copy this plane into memory laid out with `dst_stride`
    pub fn write_to(&self, dst: &mut [u8], dst_stride: usize) -> Result<()> {
        write_plane(
            &self.data,
            Some(self.stride),
            self.width,
            self.height,
            self.bytes_per_pixel,
            dst,
            dst_stride,
        )
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes between the starts of consecutive rows
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Meaningful bytes per row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    /// The raw buffer, `stride * height` bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw buffer
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Strided byte view, one element per byte of each row
    pub fn as_img(&self) -> ImgRef<'_, u8> {
        ImgRef::new_stride(
            &self.data[..],
            self.row_bytes(),
            self.height as usize,
            self.stride,
        )
    }

    /// Iterate the meaningful bytes of each row
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let row_bytes = self.row_bytes();
        self.data
            .chunks(self.stride)
            .map(move |row| &row[..row_bytes])
    }

    /// Iterate mutable row slices
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        let row_bytes = self.row_bytes();
        self.data
            .chunks_mut(self.stride)
            .map(move |row| &mut row[..row_bytes])
    }

    /// Rows concatenated without padding
    pub fn to_packed(&self) -> Vec<u8> {
        if self.stride == self.row_bytes() {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    /// Consume the plane, returning the raw strided buffer
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
