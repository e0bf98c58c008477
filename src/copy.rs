//! Strided frame copies.
//!
//! Every pixel that crosses the sensor / canvas / ring-buffer boundary goes
//! through [`copy_frame`]. The `(offset, padding)` pair lets several channels
//! share one destination buffer as disjoint sub-rectangles, e.g. a depth panel
//! and a color panel side by side in a single display canvas.

use crate::{Result, RgbdError};

/// Number of destination bytes touched by [`copy_frame`].
///
/// Padding after the last row is skipped, never written, so it is not counted.
/// Saturates at `usize::MAX` when the layout cannot be addressed at all, which
/// no destination satisfies.
pub fn required_len(
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    offset: usize,
    padding: usize,
) -> usize {
    checked_required_len(width, height, bytes_per_pixel, offset, padding).unwrap_or(usize::MAX)
}

/// [`required_len`], or `None` on arithmetic overflow.
pub fn checked_required_len(
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    offset: usize,
    padding: usize,
) -> Option<usize> {
    if height == 0 {
        return Some(offset);
    }
    let stride = width.checked_mul(bytes_per_pixel)?.checked_add(padding)?;
    stride
        .checked_mul(height)?
        .checked_add(offset)
        .map(|n| n - padding)
}

/// Tightly packed size of a `width x height` frame, or `None` on overflow.
pub fn frame_len(width: usize, height: usize, bytes_per_pixel: usize) -> Option<usize> {
    width.checked_mul(height)?.checked_mul(bytes_per_pixel)
}

/// Copy a row-major `width x height` frame into `dst`.
///
/// Writing starts `offset` bytes into `dst`; after each row of
/// `width * bytes_per_pixel` bytes, `padding` destination bytes are skipped.
///
/// # Panics
/// If `src` holds fewer than `width * height * bytes_per_pixel` bytes or `dst`
/// is shorter than [`required_len`].
pub fn copy_frame(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    offset: usize,
    padding: usize,
) {
    let row = width * bytes_per_pixel;
    if row == 0 || height == 0 {
        return;
    }
    assert!(
        src.len() >= row * height,
        "source holds {} bytes, frame needs {}",
        src.len(),
        row * height
    );
    let dst_stride = row + padding;
    for (y, src_row) in src.chunks_exact(row).take(height).enumerate() {
        let start = offset + y * dst_stride;
        dst[start..start + row].copy_from_slice(src_row);
    }
}

/// Like [`copy_frame`] but skips `padding` bytes after every *pixel*.
///
/// With `offset = 1, padding = 1` this drops packed 3-byte RGB into the last
/// three bytes of 4-byte canvas pixels.
pub fn copy_pixels_interleaved(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    offset: usize,
    padding: usize,
) {
    if bytes_per_pixel == 0 {
        return;
    }
    let dst_stride = bytes_per_pixel + padding;
    for (i, pixel) in src
        .chunks_exact(bytes_per_pixel)
        .take(width * height)
        .enumerate()
    {
        let start = offset + i * dst_stride;
        dst[start..start + bytes_per_pixel].copy_from_slice(pixel);
    }
}

/// Where a panel lands inside a wider destination canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub offset: usize,
    pub padding: usize,
}

impl Placement {
    /// A panel filling its destination exactly.
    pub const PACKED: Placement = Placement {
        offset: 0,
        padding: 0,
    };

    /// Placement of a `panel_width` wide panel whose top-left pixel is at
    /// `(x, y)` in a canvas `canvas_width` pixels wide.
    ///
    /// Fails with `Configuration` if the panel does not fit horizontally.
    pub fn in_canvas(
        canvas_width: usize,
        x: usize,
        y: usize,
        panel_width: usize,
        bytes_per_pixel: usize,
    ) -> Result<Placement> {
        let fits = x
            .checked_add(panel_width)
            .map_or(false, |right| right <= canvas_width);
        if !fits {
            return Err(RgbdError::Configuration(format!(
                "panel at x={} of width {} exceeds canvas width {}",
                x, panel_width, canvas_width
            )));
        }
        let offset = y
            .checked_mul(canvas_width)
            .and_then(|n| n.checked_add(x))
            .and_then(|n| n.checked_mul(bytes_per_pixel));
        let padding = (canvas_width - panel_width).checked_mul(bytes_per_pixel);
        match (offset, padding) {
            (Some(offset), Some(padding)) => Ok(Placement { offset, padding }),
            _ => Err(RgbdError::Configuration(format!(
                "panel at ({}, {}) in a {} pixel wide canvas is not addressable",
                x, y, canvas_width
            ))),
        }
    }
}
