use std::fmt;

use crate::types::SensorChannel;

/// Errors that can occur while configuring or reading the camera streams.
#[derive(Debug, thiserror::Error)]
pub enum RgbdError {
    #[error("Failed to open device {target}: {reason}")]
    DeviceOpen { target: String, reason: String },

    #[error("No sensor for {} found", .0.name())]
    SensorNotFound(SensorChannel),

    #[error("{}: invalid video mode ({mode}), value range [0, {count})", .channel.name())]
    ModeOutOfRange {
        channel: SensorChannel,
        mode: usize,
        count: usize,
    },

    #[error("Failed to create {} stream: {reason}", .channel.name())]
    StreamCreation {
        channel: SensorChannel,
        reason: String,
    },

    #[error("Configuration failed: {0}")]
    Configuration(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Timeout waiting for {} frame", .0.name())]
    ReadTimeout(SensorChannel),

    #[error("No valid {} frame has been acquired yet", .0.name())]
    InvalidFrame(SensorChannel),

    #[error("Unsupported channel layout code {0}")]
    UnsupportedLayout(u32),

    #[error("Invalid frame ring capacity {0}")]
    InvalidCapacity(usize),

    #[error("No streaming sensor")]
    NoActiveStream,

    #[error("Streams not ready after {0:?}")]
    ReadyTimeout(std::time::Duration),

    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("Buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("{} frame is {frame}, ring slot expects {slot}", .channel.name())]
    FrameGeometry {
        channel: SensorChannel,
        frame: String,
        slot: String,
    },

    #[error("Frame ring is not allocated")]
    NotAllocated,

    #[error("{}", format_failures(.0))]
    ChannelsFailed(Vec<ChannelFailure>),

    #[error("SDK error: {0}")]
    Sdk(String),
}

/// One channel's failure inside a bulk start/stop.
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel: SensorChannel,
    pub error: Box<RgbdError>,
}

fn format_failures(failures: &[ChannelFailure]) -> String {
    let parts: Vec<String> = failures
        .iter()
        .map(|f| format!("{}: {}", f.channel.name(), f.error))
        .collect();
    format!("{} channel(s) failed: {}", failures.len(), parts.join("; "))
}

impl RgbdError {
    /// Channels named by a `ChannelsFailed` error, empty for anything else.
    pub fn failed_channels(&self) -> Vec<SensorChannel> {
        match self {
            RgbdError::ChannelsFailed(failures) => failures.iter().map(|f| f.channel).collect(),
            _ => Vec::new(),
        }
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &RgbdError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_out_of_range_message() {
        let err = RgbdError::ModeOutOfRange {
            channel: SensorChannel::Depth,
            mode: 7,
            count: 4,
        };
        assert_eq!(
            err.to_string(),
            "SENSOR_DEPTH: invalid video mode (7), value range [0, 4)"
        );
    }

    #[test]
    fn test_channels_failed_lists_each_channel() {
        let err = RgbdError::ChannelsFailed(vec![
            ChannelFailure {
                channel: SensorChannel::Color,
                error: Box::new(RgbdError::Sdk("busy".into())),
            },
            ChannelFailure {
                channel: SensorChannel::Infrared,
                error: Box::new(RgbdError::Sdk("gone".into())),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 channel(s) failed"));
        assert!(msg.contains("SENSOR_COLOR: SDK error: busy"));
        assert_eq!(
            err.failed_channels(),
            vec![SensorChannel::Color, SensorChannel::Infrared]
        );
    }
}
