//! Fixed-capacity frame recording buffers.
//!
//! A [`FrameRing`] preallocates `capacity` frames in one buffer and addresses
//! them with a wrapping index, so recording and looped playback never
//! allocate. [`RgbdRecorder`] pairs a depth ring and a color ring that move in
//! lockstep.

use std::time::Duration;

use crate::colormap::{self, ChannelLayout};
use crate::copy;
use crate::device::MultiStreamDevice;
use crate::types::{SensorChannel, VideoMode};
use crate::{Result, RgbdError};

/// Preallocated multi-frame store with wraparound indexing.
#[derive(Debug, Default)]
pub struct FrameRing {
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    capacity: usize,
    index: usize,
    buffer: Vec<u8>,
    timestamps: Vec<Option<Duration>>,
}

impl FrameRing {
    /// An unallocated ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `capacity` zeroed frames, releasing any previous buffer.
    pub fn allocate(
        &mut self,
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
        capacity: usize,
    ) -> Result<()> {
        if capacity == 0 {
            return Err(RgbdError::InvalidCapacity(capacity));
        }
        let frame_len = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(bytes_per_pixel))
            .ok_or(RgbdError::InvalidCapacity(capacity))?;
        let total = frame_len
            .checked_mul(capacity)
            .filter(|&n| n <= isize::MAX as usize)
            .ok_or(RgbdError::InvalidCapacity(capacity))?;
        self.deallocate();
        self.width = width;
        self.height = height;
        self.bytes_per_pixel = bytes_per_pixel;
        self.capacity = capacity;
        self.index = 0;
        self.buffer = vec![0; total];
        self.timestamps = vec![None; capacity];
        log::debug!(
            "Allocated frame ring: {} x {}x{}x{} ({} bytes)",
            capacity,
            width,
            height,
            bytes_per_pixel,
            self.buffer.len()
        );
        Ok(())
    }

    /// Release the backing buffer. The ring reports unallocated afterwards.
    pub fn deallocate(&mut self) {
        self.buffer = Vec::new();
        self.timestamps = Vec::new();
        self.capacity = 0;
        self.index = 0;
    }

    pub fn is_allocated(&self) -> bool {
        self.capacity > 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per stored frame.
    pub fn frame_len(&self) -> usize {
        self.width * self.height * self.bytes_per_pixel
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Move to the next slot, wrapping to 0 after the last.
    pub fn advance(&mut self) {
        if self.capacity > 0 {
            self.index = (self.index + 1) % self.capacity;
        }
    }

    /// Set the index to `n` modulo capacity; negative values count from the end.
    pub fn set_index(&mut self, n: i64) {
        if self.capacity > 0 {
            let cap = self.capacity as i64;
            self.index = n.rem_euclid(cap) as usize;
        }
    }

    fn resolve(&self, index: Option<usize>) -> Result<usize> {
        if !self.is_allocated() {
            return Err(RgbdError::NotAllocated);
        }
        Ok(index.map_or(self.index, |i| i % self.capacity))
    }

    fn range(&self, slot: usize) -> std::ops::Range<usize> {
        let len = self.frame_len();
        slot * len..(slot + 1) * len
    }

    /// Frame at `index` (wrapped), or the current frame for `None`.
    pub fn slot(&self, index: Option<usize>) -> Result<&[u8]> {
        let slot = self.resolve(index)?;
        Ok(&self.buffer[self.range(slot)])
    }

    pub fn slot_mut(&mut self, index: Option<usize>) -> Result<&mut [u8]> {
        let slot = self.resolve(index)?;
        let range = self.range(slot);
        Ok(&mut self.buffer[range])
    }

    pub fn current_slot(&self) -> Result<&[u8]> {
        self.slot(None)
    }

    pub fn current_slot_mut(&mut self) -> Result<&mut [u8]> {
        self.slot_mut(None)
    }

    /// Record the acquisition time of the frame in the current slot.
    pub fn stamp(&mut self, timestamp: Duration) -> Result<()> {
        let slot = self.resolve(None)?;
        self.timestamps[slot] = Some(timestamp);
        Ok(())
    }

    /// Acquisition time stored with a slot, if it was ever recorded.
    pub fn timestamp(&self, index: Option<usize>) -> Result<Option<Duration>> {
        let slot = self.resolve(index)?;
        Ok(self.timestamps[slot])
    }

    /// Copy a stored frame into `dst` with the given offset and row padding.
    pub fn copy_out(
        &self,
        dst: &mut [u8],
        index: Option<usize>,
        offset: usize,
        padding: usize,
    ) -> Result<()> {
        let src = self.slot(index)?;
        let needed =
            copy::required_len(self.width, self.height, self.bytes_per_pixel, offset, padding);
        if dst.len() < needed {
            return Err(RgbdError::BufferTooSmall {
                needed,
                actual: dst.len(),
            });
        }
        copy::copy_frame(
            src,
            dst,
            self.width,
            self.height,
            self.bytes_per_pixel,
            offset,
            padding,
        );
        Ok(())
    }

    /// Colormap a stored 16-bit frame into `dst`.
    ///
    /// Thresholds are in the stored samples' native units; depth recorded at
    /// 100 um needs millimeter thresholds scaled by 10 (see
    /// [`RgbdRecorder::convert_depth_out`]).
    pub fn convert_out(
        &self,
        dst: &mut [u8],
        index: Option<usize>,
        layout: ChannelLayout,
        v_min: u16,
        v_max: u16,
    ) -> Result<()> {
        if self.is_allocated() && self.bytes_per_pixel != 2 {
            return Err(RgbdError::UnsupportedPixelFormat(format!(
                "{} bytes per pixel, colormap needs 16-bit samples",
                self.bytes_per_pixel
            )));
        }
        let src = self.slot(index)?;
        colormap::jet_frame_bytes(src, dst, self.width, self.height, layout, v_min, v_max)
    }
}

/// Depth and color rings sharing one frame index.
#[derive(Debug)]
pub struct RgbdRecorder {
    depth: FrameRing,
    color: FrameRing,
    depth_scale: u16,
}

impl Default for RgbdRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RgbdRecorder {
    pub const DEPTH_BPP: usize = 2;
    pub const COLOR_BPP: usize = 3;

    pub fn new() -> Self {
        Self {
            depth: FrameRing::new(),
            color: FrameRing::new(),
            depth_scale: 1,
        }
    }

    pub fn allocate(
        &mut self,
        depth_width: usize,
        depth_height: usize,
        color_width: usize,
        color_height: usize,
        capacity: usize,
    ) -> Result<()> {
        self.depth
            .allocate(depth_width, depth_height, Self::DEPTH_BPP, capacity)?;
        self.color
            .allocate(color_width, color_height, Self::COLOR_BPP, capacity)
    }

    /// Size both rings after the device's configured depth and color streams.
    ///
    /// The depth stream must deliver 16-bit samples and the color stream
    /// packed 3-byte pixels.
    pub fn allocate_for(&mut self, device: &MultiStreamDevice, capacity: usize) -> Result<()> {
        let depth = device.video_mode(SensorChannel::Depth)?;
        let color = device.video_mode(SensorChannel::Color)?;
        expect_bpp(SensorChannel::Depth, depth, Self::DEPTH_BPP)?;
        expect_bpp(SensorChannel::Color, color, Self::COLOR_BPP)?;
        self.allocate(
            depth.width as usize,
            depth.height as usize,
            color.width as usize,
            color.height as usize,
            capacity,
        )
    }

    pub fn deallocate(&mut self) {
        self.depth.deallocate();
        self.color.deallocate();
    }

    /// Store the device's current depth and color frames, then advance.
    pub fn record(&mut self, device: &MultiStreamDevice) -> Result<()> {
        self.depth_scale = device.depth_scale()?;
        device.record(SensorChannel::Depth, &mut self.depth)?;
        device.record(SensorChannel::Color, &mut self.color)?;
        self.advance();
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.depth.capacity()
    }

    pub fn index(&self) -> usize {
        self.depth.index()
    }

    pub fn advance(&mut self) {
        self.depth.advance();
        self.color.advance();
    }

    pub fn set_index(&mut self, n: i64) {
        self.depth.set_index(n);
        self.color.set_index(n);
    }

    pub fn depth(&self) -> &FrameRing {
        &self.depth
    }

    pub fn color(&self) -> &FrameRing {
        &self.color
    }

    pub fn copy_depth_out(
        &self,
        dst: &mut [u8],
        index: Option<usize>,
        offset: usize,
        padding: usize,
    ) -> Result<()> {
        self.depth.copy_out(dst, index, offset, padding)
    }

    pub fn copy_color_out(
        &self,
        dst: &mut [u8],
        index: Option<usize>,
        offset: usize,
        padding: usize,
    ) -> Result<()> {
        self.color.copy_out(dst, index, offset, padding)
    }

    /// Colormap a recorded depth frame with thresholds in millimeters.
    pub fn convert_depth_out(
        &self,
        dst: &mut [u8],
        index: Option<usize>,
        layout: ChannelLayout,
        min_mm: u16,
        max_mm: u16,
    ) -> Result<()> {
        let scale = self.depth_scale;
        self.depth.convert_out(
            dst,
            index,
            layout,
            min_mm.saturating_mul(scale),
            max_mm.saturating_mul(scale),
        )
    }
}

fn expect_bpp(channel: SensorChannel, mode: VideoMode, bpp: usize) -> Result<()> {
    if mode.bytes_per_pixel() == Some(bpp) {
        Ok(())
    } else {
        Err(RgbdError::UnsupportedPixelFormat(format!(
            "{} streams {}, recording needs {} bytes per pixel",
            channel.name(),
            mode.pixel_format,
            bpp
        )))
    }
}
