//! Bit depth scaling, channel reordering and resizing of planes

use whereat::at;

use crate::error::{Error, Result};
use crate::marshal::PlaneBuf;
use crate::mode::Mode;

/// Scale a sample up to a higher bit depth using LSB replication.
///
/// 10→16: `(v << 6) | (v >> 4)` maps 0→0, 1023→65535
/// 12→16: `(v << 4) | (v >> 8)` maps 0→0, 4095→65535
/// 8→16: `(v << 8) | v`
#[inline]
pub fn scale_up(v: u16, from: u8, to: u8) -> u16 {
    let shift = to - from;
    if shift == 0 {
        return v;
    }
    (v << shift) | (v >> (from - shift))
}

/// Scale a sample down by dropping low bits.
///
/// 16→10 is `v >> 6` and 16→12 is `v >> 4`. This is the exact inverse of
/// [`scale_up`] for values produced by it.
#[inline]
pub fn scale_down(v: u16, from: u8, to: u8) -> u16 {
    v >> (from - to)
}

#[inline]
fn rescale(v: u16, from: u8, to: u8) -> u16 {
    if to >= from {
        scale_up(v, from, to)
    } else {
        scale_down(v, from, to)
    }
}

#[inline]
fn read_sample(row: &[u8], index: usize, wide: bool) -> u16 {
    if wide {
        u16::from_le_bytes([row[index * 2], row[index * 2 + 1]])
    } else {
        row[index] as u16
    }
}

#[inline]
fn write_sample(row: &mut [u8], index: usize, wide: bool, v: u16) {
    if wide {
        row[index * 2..index * 2 + 2].copy_from_slice(&v.to_le_bytes());
    } else {
        row[index] = v as u8;
    }
}

/// Whether [`convert_plane`] can convert between the two modes
///
/// Conversions keep the channel count: luma stays luma, three channels stay
/// three and four stay four. Any depth and RGB/BGR order change is allowed.
pub fn can_convert(from: Mode, to: Mode) -> bool {
    from.channels() == to.channels()
}

/// Convert a plane from one mode to another
///
/// The result is packed. Converting a plane to its own mode returns a copy.
pub fn convert_plane(plane: &PlaneBuf, from: Mode, to: Mode) -> Result<PlaneBuf> {
    if !can_convert(from, to) {
        return Err(at(Error::UnsupportedConversion { from, to }));
    }
    if from == to {
        return Ok(plane.clone());
    }

    let mut out = PlaneBuf::zeroed(plane.width(), plane.height(), to.bytes_per_pixel(), None)?;
    let channels = from.channels();
    let swap = from.layout().is_bgr() != to.layout().is_bgr();
    let (src_wide, dst_wide) = (from.bytes_per_sample() == 2, to.bytes_per_sample() == 2);
    let (src_depth, dst_depth) = (from.bit_depth(), to.bit_depth());
    let width = plane.width() as usize;

    for (src_row, dst_row) in plane.rows().zip(out.rows_mut()) {
        for x in 0..width {
            let base = x * channels;
            for c in 0..channels {
                let src_c = if swap && c < 3 { 2 - c } else { c };
                let v = read_sample(src_row, base + src_c, src_wide);
                write_sample(dst_row, base + c, dst_wide, rescale(v, src_depth, dst_depth));
            }
        }
    }
    Ok(out)
}

/// Resize a plane with nearest-neighbor sampling
///
/// Destination pixel `(x, y)` takes source pixel
/// `(x * src_w / width, y * src_h / height)`. The result is packed.
pub fn scale_plane(plane: &PlaneBuf, width: u32, height: u32) -> Result<PlaneBuf> {
    let bpp = plane.bytes_per_pixel();
    let mut out = PlaneBuf::zeroed(width, height, bpp, None)?;
    let (src_w, src_h) = (plane.width() as usize, plane.height() as usize);
    let src_rows: Vec<&[u8]> = plane.rows().collect();
    for (y, row) in out.rows_mut().enumerate() {
        let src_row = src_rows[y * src_h / height as usize];
        for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
            let sx = x * src_w / width as usize;
            px.copy_from_slice(&src_row[sx * bpp..(sx + 1) * bpp]);
        }
    }
    Ok(out)
}
