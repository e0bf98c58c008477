//! Capability interface of the sensor SDK.
//!
//! The pipeline never links a vendor SDK directly. A backend implements these
//! traits; [`crate::sim`] provides an in-process one.

use std::sync::Arc;
use std::time::Duration;

use crate::types::{DeviceCapabilities, RawFrame, RegistrationMode, SensorChannel, VideoMode};
use crate::Result;

/// Entry point of a backend: opens devices by URI.
pub trait SensorDriver: Send + Sync {
    /// Open a device. `None` opens any available device.
    fn open(&self, uri: Option<&str>) -> Result<Box<dyn SensorDevice>>;
}

/// An opened physical device.
pub trait SensorDevice: Send {
    /// URI the device was opened with.
    fn uri(&self) -> &str;

    fn has_sensor(&self, channel: SensorChannel) -> bool;

    /// Supported modes of a sensor, empty if the sensor is absent.
    fn sensor_modes(&self, channel: SensorChannel) -> Vec<VideoMode>;

    fn capabilities(&self) -> DeviceCapabilities;

    fn create_stream(&self, channel: SensorChannel) -> Result<Arc<dyn SdkStream>>;

    fn set_registration(&mut self, mode: RegistrationMode) -> Result<()>;

    fn set_depth_color_sync(&mut self, enable: bool) -> Result<()>;

    fn close(&mut self);
}

/// One sensor stream handle.
///
/// Shared between the owning stream object and its acquisition thread, so all
/// methods take `&self`.
pub trait SdkStream: Send + Sync {
    fn set_video_mode(&self, mode: VideoMode) -> Result<()>;

    fn video_mode(&self) -> VideoMode;

    fn mirroring(&self) -> bool;

    fn set_mirroring(&self, enable: bool) -> Result<()>;

    fn start(&self) -> Result<()>;

    fn stop(&self);

    /// Block until a new frame is ready. `Ok(false)` on timeout.
    fn wait_for_frame(&self, timeout: Duration) -> Result<bool>;

    /// Read the frame signalled by [`SdkStream::wait_for_frame`].
    fn read_frame(&self) -> Result<RawFrame>;

    fn min_pixel_value(&self) -> u32;

    fn max_pixel_value(&self) -> u32;
}
