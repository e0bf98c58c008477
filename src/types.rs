use std::fmt;
use std::time::Duration;

/// One physical sensor feed of the camera.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    Depth = 0,
    Color = 1,
    Infrared = 2,
}

impl SensorChannel {
    /// All channels in stream-array order.
    pub const ALL: [SensorChannel; 3] = [
        SensorChannel::Depth,
        SensorChannel::Color,
        SensorChannel::Infrared,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SensorChannel::Depth => "SENSOR_DEPTH",
            SensorChannel::Color => "SENSOR_COLOR",
            SensorChannel::Infrared => "SENSOR_IR",
        }
    }

    /// Slot of this channel in a device's stream array.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase label, used for thread names.
    pub fn label(self) -> &'static str {
        match self {
            SensorChannel::Depth => "depth",
            SensorChannel::Color => "color",
            SensorChannel::Infrared => "ir",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pixel formats reported by the sensor SDK.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit depth in millimeters.
    Depth1Mm,
    /// 16-bit depth in units of 100 micrometers.
    Depth100Um,
    Shift9_2,
    Shift9_3,
    Rgb888,
    Yuv422,
    Gray8,
    Gray16,
    Jpeg,
    Yuyv,
}

impl PixelFormat {
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Depth1Mm => "PIXEL_FORMAT_DEPTH_1_MM",
            PixelFormat::Depth100Um => "PIXEL_FORMAT_DEPTH_100_UM",
            PixelFormat::Shift9_2 => "PIXEL_FORMAT_SHIFT_9_2",
            PixelFormat::Shift9_3 => "PIXEL_FORMAT_SHIFT_9_3",
            PixelFormat::Rgb888 => "PIXEL_FORMAT_RGB888",
            PixelFormat::Yuv422 => "PIXEL_FORMAT_YUV422",
            PixelFormat::Gray8 => "PIXEL_FORMAT_GRAY8",
            PixelFormat::Gray16 => "PIXEL_FORMAT_GRAY16",
            PixelFormat::Jpeg => "PIXEL_FORMAT_JPEG",
            PixelFormat::Yuyv => "PIXEL_FORMAT_YUYV",
        }
    }

    /// Number of color channels, `None` where the format has no fixed answer.
    pub fn num_channels(self) -> Option<u32> {
        match self {
            PixelFormat::Depth1Mm
            | PixelFormat::Depth100Um
            | PixelFormat::Gray8
            | PixelFormat::Gray16 => Some(1),
            PixelFormat::Rgb888 | PixelFormat::Yuv422 => Some(3),
            _ => None,
        }
    }

    /// Bytes per pixel for formats with a fixed sample size.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Depth1Mm
            | PixelFormat::Depth100Um
            | PixelFormat::Shift9_2
            | PixelFormat::Shift9_3
            | PixelFormat::Gray16
            | PixelFormat::Yuv422
            | PixelFormat::Yuyv => Some(2),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Jpeg => None,
        }
    }

    /// Native depth units per millimeter: 1 for 1 mm formats, 10 for 100 um.
    pub fn depth_scale(self) -> Option<u16> {
        match self {
            PixelFormat::Depth1Mm => Some(1),
            PixelFormat::Depth100Um => Some(10),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A (resolution, frame rate, pixel format) tuple supported by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
}

impl VideoMode {
    pub const fn new(width: u32, height: u32, fps: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            fps,
            pixel_format,
        }
    }

    pub fn bytes_per_pixel(&self) -> Option<usize> {
        self.pixel_format.bytes_per_pixel()
    }

    /// Tightly packed frame size in bytes, if the format has a fixed sample size.
    pub fn frame_len(&self) -> Option<usize> {
        self.bytes_per_pixel()
            .map(|bpp| self.width as usize * self.height as usize * bpp)
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "W:{:5}, H:{:5}, FPS:{:3}, {}",
            self.width, self.height, self.fps, self.pixel_format
        )
    }
}

/// Lifecycle of a [`SensorStream`](crate::stream::SensorStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Created,
    Configured,
    Started,
    /// Started and at least one frame has been acquired.
    Streaming,
    Stopped,
    Destroyed,
}

/// Depth-to-color image registration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    Off,
    DepthToColor,
}

bitflags::bitflags! {
    /// Alignment features reported by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct DeviceCapabilities: u32 {
        const DEPTH_TO_COLOR_REGISTRATION = 1 << 0;
        const DEPTH_COLOR_SYNC            = 1 << 1;
    }
}

/// One frame as handed over by the SDK.
///
/// `data` holds `height` rows of `stride_bytes` each.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride_bytes: u32,
    /// Device timestamp in microseconds.
    pub timestamp_us: u64,
}

impl RawFrame {
    pub fn bytes_per_pixel(&self) -> usize {
        if self.width == 0 {
            return 0;
        }
        (self.stride_bytes / self.width) as usize
    }
}

/// The frame currently held by a stream, as seen under its lock.
#[derive(Debug)]
pub struct HeldFrame {
    pub raw: RawFrame,
    /// Host time of acquisition, measured from stream start.
    pub acquired_at: Duration,
    /// Sequence number of this frame since stream start, starting at 1.
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_and_indices() {
        assert_eq!(SensorChannel::Depth.name(), "SENSOR_DEPTH");
        assert_eq!(SensorChannel::Infrared.name(), "SENSOR_IR");
        for (i, ch) in SensorChannel::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
    }

    #[test]
    fn test_pixel_format_channels() {
        assert_eq!(PixelFormat::Depth1Mm.num_channels(), Some(1));
        assert_eq!(PixelFormat::Gray16.num_channels(), Some(1));
        assert_eq!(PixelFormat::Rgb888.num_channels(), Some(3));
        assert_eq!(PixelFormat::Yuv422.num_channels(), Some(3));
        assert_eq!(PixelFormat::Jpeg.num_channels(), None);
    }

    #[test]
    fn test_depth_scale() {
        assert_eq!(PixelFormat::Depth1Mm.depth_scale(), Some(1));
        assert_eq!(PixelFormat::Depth100Um.depth_scale(), Some(10));
        assert_eq!(PixelFormat::Rgb888.depth_scale(), None);
    }

    #[test]
    fn test_video_mode_display() {
        let mode = VideoMode::new(640, 480, 30, PixelFormat::Depth1Mm);
        assert_eq!(
            mode.to_string(),
            "W:  640, H:  480, FPS: 30, PIXEL_FORMAT_DEPTH_1_MM"
        );
        assert_eq!(mode.frame_len(), Some(640 * 480 * 2));
    }

    #[test]
    fn test_raw_frame_bpp() {
        let frame = RawFrame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            stride_bytes: 6,
            timestamp_us: 0,
        };
        assert_eq!(frame.bytes_per_pixel(), 3);
    }
}
