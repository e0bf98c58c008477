//! Jet colormap for 16-bit depth and IR samples.
//!
//! Values are clipped to `[v_min, v_max]` (below → black, above → white),
//! normalized to `r in [0, 1]` and mapped through a smooth sine/cosine ramp:
//! blue → green → red with flat endpoints.

use std::f64::consts::PI;

use crate::{Result, RgbdError};

/// Byte order of the destination pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// 3-byte packed RGB.
    Rgb = 0,
    /// 4-byte pixels with R, G, B at bytes 1, 2, 3 (BGRA8888 textures).
    Argb = 1,
}

impl ChannelLayout {
    /// Bytes per destination pixel.
    pub fn pixel_size(self) -> usize {
        match self {
            ChannelLayout::Rgb => 3,
            ChannelLayout::Argb => 4,
        }
    }

    /// Byte offsets of R, G and B inside one pixel.
    pub fn rgb_offsets(self) -> [usize; 3] {
        match self {
            ChannelLayout::Rgb => [0, 1, 2],
            ChannelLayout::Argb => [1, 2, 3],
        }
    }
}

impl TryFrom<u32> for ChannelLayout {
    type Error = RgbdError;

    fn try_from(code: u32) -> Result<Self> {
        match code {
            0 => Ok(ChannelLayout::Rgb),
            1 => Ok(ChannelLayout::Argb),
            other => Err(RgbdError::UnsupportedLayout(other)),
        }
    }
}

/// Map one sample to its jet color.
pub fn jet(v: u16, v_min: u16, v_max: u16) -> [u8; 3] {
    if v < v_min {
        return [0, 0, 0];
    }
    if v > v_max {
        return [255, 255, 255];
    }
    let span = f64::from(v_max) - f64::from(v_min);
    let r = if span > 0.0 {
        (f64::from(v) - f64::from(v_min)) / span
    } else {
        0.0
    };
    let t = 2.0 * PI * r;
    let mut red = (255.0 * (1.0 - t.sin()) / 2.0) as u8;
    let green = (255.0 * (1.0 - t.cos()) / 2.0) as u8;
    let mut blue = (255.0 * (1.0 + t.sin()) / 2.0) as u8;
    if r < 0.25 {
        red = 0;
    }
    if r > 0.75 {
        blue = 0;
    }
    [red, green, blue]
}

fn check_lengths(
    samples: usize,
    dst_len: usize,
    width: usize,
    height: usize,
    layout: ChannelLayout,
) -> Result<usize> {
    let pixels = width.checked_mul(height).unwrap_or(usize::MAX);
    if samples < pixels {
        return Err(RgbdError::BufferTooSmall {
            needed: pixels,
            actual: samples,
        });
    }
    let needed = pixels.checked_mul(layout.pixel_size()).unwrap_or(usize::MAX);
    if dst_len < needed {
        return Err(RgbdError::BufferTooSmall {
            needed,
            actual: dst_len,
        });
    }
    Ok(pixels)
}

fn write_pixels<I>(samples: I, dst: &mut [u8], layout: ChannelLayout, v_min: u16, v_max: u16)
where
    I: Iterator<Item = u16>,
{
    let [ro, go, bo] = layout.rgb_offsets();
    for (v, px) in samples.zip(dst.chunks_exact_mut(layout.pixel_size())) {
        let [r, g, b] = jet(v, v_min, v_max);
        px[ro] = r;
        px[go] = g;
        px[bo] = b;
    }
}

/// Convert a `width x height` frame of 16-bit samples into colored pixels.
///
/// Bytes of `dst` outside the R, G, B offsets of each pixel are left untouched.
pub fn jet_frame(
    src: &[u16],
    dst: &mut [u8],
    width: usize,
    height: usize,
    layout: ChannelLayout,
    v_min: u16,
    v_max: u16,
) -> Result<()> {
    let pixels = check_lengths(src.len(), dst.len(), width, height, layout)?;
    write_pixels(src[..pixels].iter().copied(), dst, layout, v_min, v_max);
    Ok(())
}

/// [`jet_frame`] over native-endian 16-bit samples stored as bytes.
pub fn jet_frame_bytes(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    layout: ChannelLayout,
    v_min: u16,
    v_max: u16,
) -> Result<()> {
    let pixels = check_lengths(src.len() / 2, dst.len(), width, height, layout)?;
    let samples = src
        .chunks_exact(2)
        .take(pixels)
        .map(|b| u16::from_ne_bytes([b[0], b[1]]));
    write_pixels(samples, dst, layout, v_min, v_max);
    Ok(())
}
