use crate::colormap::{self, ChannelLayout};
use crate::config::DeviceConfig;
use crate::error::ChannelFailure;
use crate::ring::FrameRing;
use crate::sdk::{SensorDevice, SensorDriver};
use crate::stream::{copy_held, SensorStream};
use crate::types::{DeviceCapabilities, HeldFrame, RegistrationMode, SensorChannel, VideoMode};
use crate::{Result, RgbdError};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Supported video modes of one sensor, printable as a mode listing.
#[derive(Debug, Clone)]
pub struct ModeTable {
    pub channel: SensorChannel,
    pub modes: Vec<VideoMode>,
}

impl fmt::Display for ModeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self.channel {
            SensorChannel::Depth => "Depth",
            SensorChannel::Color => "RGB",
            SensorChannel::Infrared => "IR",
        };
        writeln!(f, "{} Sensor:", title)?;
        if self.modes.is_empty() {
            return writeln!(f, "Not available.");
        }
        for (i, mode) in self.modes.iter().enumerate() {
            writeln!(f, "  {:2}, {}", i, mode)?;
        }
        Ok(())
    }
}

/// A camera with up to three sensor streams sharing one device handle.
///
/// ```no_run
/// use rgbd::{ChannelLayout, DeviceConfig, MultiStreamDevice, SensorChannel};
/// use rgbd::sim::{SimCamera, SimDriver};
/// use std::sync::Arc;
///
/// let driver = Arc::new(SimDriver::new(SimCamera::structured_light("sim://0")));
/// let mut device = MultiStreamDevice::new(driver, DeviceConfig::from_env());
/// device.open(None).unwrap();
/// device.create_stream(SensorChannel::Depth, 1, false).unwrap();
/// device.start_all().unwrap();
/// device.wait_until_ready().unwrap();
///
/// let mut canvas = vec![0u8; 640 * 480 * 4];
/// device
///     .convert_to_colormap(SensorChannel::Depth, &mut canvas, ChannelLayout::Argb, 1, 4000)
///     .unwrap();
/// ```
pub struct MultiStreamDevice {
    driver: Arc<dyn SensorDriver>,
    config: DeviceConfig,
    device: Option<Box<dyn SensorDevice>>,
    /// URI requested at open time, `None` for "any device".
    target: Option<String>,
    streams: [SensorStream; 3],
}

impl MultiStreamDevice {
    pub fn new(driver: Arc<dyn SensorDriver>, config: DeviceConfig) -> Self {
        let streams = SensorChannel::ALL.map(|channel| SensorStream::new(channel, config.stream));
        Self {
            driver,
            config,
            device: None,
            target: None,
            streams,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Open the device at `uri`, or any device for `None`.
    ///
    /// Opening the same target again is a no-op.
    pub fn open(&mut self, uri: Option<&str>) -> Result<()> {
        if let Some(device) = &self.device {
            let same = match uri {
                None => true,
                Some(u) => u == device.uri() || self.target.as_deref() == Some(u),
            };
            if same {
                return Ok(());
            }
            return Err(RgbdError::DeviceOpen {
                target: uri.unwrap_or("ANY_DEVICE").to_string(),
                reason: format!("device already open at {}", device.uri()),
            });
        }

        let device = self.driver.open(uri).map_err(|e| match e {
            RgbdError::DeviceOpen { .. } => e,
            other => RgbdError::DeviceOpen {
                target: uri.unwrap_or("ANY_DEVICE").to_string(),
                reason: other.to_string(),
            },
        })?;

        log::info!(
            "Opened device {} (capabilities {:?})",
            device.uri(),
            device.capabilities()
        );
        self.target = uri.map(str::to_string);
        self.device = Some(device);
        Ok(())
    }

    /// Stop and destroy every stream, then close the device. Idempotent.
    pub fn close(&mut self) {
        if let Err(e) = self.stop_all() {
            log::warn!("While closing: {}", e);
        }
        for stream in &mut self.streams {
            stream.destroy();
        }
        if let Some(mut device) = self.device.take() {
            device.close();
            log::info!("Closed device {}", device.uri());
        }
        self.target = None;
    }

    fn device(&self) -> Result<&dyn SensorDevice> {
        self.device
            .as_deref()
            .ok_or_else(|| RgbdError::Configuration("device is not open".into()))
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn SensorDevice>> {
        self.device
            .as_mut()
            .ok_or_else(|| RgbdError::Configuration("device is not open".into()))
    }

    pub fn capabilities(&self) -> Result<DeviceCapabilities> {
        Ok(self.device()?.capabilities())
    }

    pub fn sensor_modes(&self, channel: SensorChannel) -> Result<ModeTable> {
        let device = self.device()?;
        let modes = if device.has_sensor(channel) {
            device.sensor_modes(channel)
        } else {
            Vec::new()
        };
        Ok(ModeTable { channel, modes })
    }

    /// Mode tables of all sensors in IR, depth, color order.
    pub fn list_sensor_modes(&self) -> Result<Vec<ModeTable>> {
        [
            SensorChannel::Infrared,
            SensorChannel::Depth,
            SensorChannel::Color,
        ]
        .into_iter()
        .map(|channel| self.sensor_modes(channel))
        .collect()
    }

    pub fn stream(&self, channel: SensorChannel) -> &SensorStream {
        &self.streams[channel.index()]
    }

    pub fn stream_mut(&mut self, channel: SensorChannel) -> &mut SensorStream {
        &mut self.streams[channel.index()]
    }

    pub fn create_stream(
        &mut self,
        channel: SensorChannel,
        mode: usize,
        mirroring: bool,
    ) -> Result<()> {
        let device = self
            .device
            .as_deref()
            .ok_or_else(|| RgbdError::Configuration("device is not open".into()))?;
        self.streams[channel.index()].create(device, mode, mirroring)
    }

    /// Enable or disable depth-to-color image registration.
    pub fn set_registration(&mut self, enable: bool) -> Result<()> {
        let device = self.device_mut()?;
        let mode = if enable {
            if !device
                .capabilities()
                .contains(DeviceCapabilities::DEPTH_TO_COLOR_REGISTRATION)
            {
                return Err(RgbdError::UnsupportedFeature(
                    "the device does not support depth to color registration".into(),
                ));
            }
            RegistrationMode::DepthToColor
        } else {
            RegistrationMode::Off
        };
        device.set_registration(mode).map_err(|e| {
            RgbdError::Configuration(format!("failed to set registration {:?}: {}", mode, e))
        })?;
        log::info!("Image registration: {:?}", mode);
        Ok(())
    }

    /// Enable or disable depth/color frame synchronization.
    pub fn set_sync(&mut self, enable: bool) -> Result<()> {
        let device = self.device_mut()?;
        if enable
            && !device
                .capabilities()
                .contains(DeviceCapabilities::DEPTH_COLOR_SYNC)
        {
            return Err(RgbdError::UnsupportedFeature(
                "the device does not support depth/color sync".into(),
            ));
        }
        device.set_depth_color_sync(enable).map_err(|e| {
            RgbdError::Configuration(format!("failed to set depth/color sync mode: {}", e))
        })?;
        log::info!("Depth/color sync: {}", enable);
        Ok(())
    }

    pub fn start_stream(&mut self, channel: SensorChannel) -> Result<()> {
        self.streams[channel.index()].start()
    }

    pub fn stop_stream(&mut self, channel: SensorChannel) -> Result<()> {
        self.streams[channel.index()].stop()
    }

    /// Start every configured, not yet started stream.
    ///
    /// All channels are attempted; failures are collected into
    /// `ChannelsFailed`.
    pub fn start_all(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for stream in &mut self.streams {
            if !stream.is_configured() || stream.is_streaming() {
                continue;
            }
            if let Err(e) = stream.start() {
                log::warn!("{}", e);
                failures.push(ChannelFailure {
                    channel: stream.channel(),
                    error: Box::new(e),
                });
            }
        }
        into_result(failures)
    }

    /// Stop every started stream.
    pub fn stop_all(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for stream in &mut self.streams {
            if !stream.is_streaming() {
                continue;
            }
            if let Err(e) = stream.stop() {
                failures.push(ChannelFailure {
                    channel: stream.channel(),
                    error: Box::new(e),
                });
            }
        }
        into_result(failures)
    }

    /// Block until every started stream holds a frame.
    ///
    /// Spins with `yield_now`; meant as a one-time startup barrier. Fails with
    /// `ReadyTimeout` once `DeviceConfig::ready_timeout` elapses, if set.
    pub fn wait_until_ready(&self) -> Result<()> {
        let started: Vec<&SensorStream> =
            self.streams.iter().filter(|s| s.is_streaming()).collect();
        if started.is_empty() {
            return Err(RgbdError::NoActiveStream);
        }

        let begin = Instant::now();
        loop {
            if started.iter().all(|s| s.is_frame_valid()) {
                log::debug!("Streams ready after {:?}", begin.elapsed());
                return Ok(());
            }
            if let Some(timeout) = self.config.ready_timeout {
                if begin.elapsed() >= timeout {
                    return Err(RgbdError::ReadyTimeout(timeout));
                }
            }
            std::thread::yield_now();
        }
    }

    /// Copy the channel's current frame into `dst`.
    pub fn extract(
        &self,
        channel: SensorChannel,
        dst: &mut [u8],
        offset: usize,
        padding: usize,
    ) -> Result<()> {
        self.streams[channel.index()].copy_to(dst, offset, padding)
    }

    /// Colormap the channel's current 16-bit frame into `dst`.
    ///
    /// For depth, `v_min`/`v_max` are millimeters and are scaled to the
    /// stream's native unit first.
    pub fn convert_to_colormap(
        &self,
        channel: SensorChannel,
        dst: &mut [u8],
        layout: ChannelLayout,
        v_min: u16,
        v_max: u16,
    ) -> Result<()> {
        let stream = &self.streams[channel.index()];
        let format = stream.video_mode()?.pixel_format;
        let (lo, hi) = match (channel, format.depth_scale()) {
            (SensorChannel::Depth, Some(scale)) => {
                (v_min.saturating_mul(scale), v_max.saturating_mul(scale))
            }
            _ => (v_min, v_max),
        };

        stream.with_frame(|frame| {
            let bpp = frame.raw.bytes_per_pixel();
            if bpp != 2 {
                return Err(RgbdError::UnsupportedPixelFormat(format!(
                    "{} with {} bytes per pixel, colormap needs 16-bit samples",
                    format, bpp
                )));
            }
            colormap::jet_frame_bytes(
                &frame.raw.data,
                dst,
                frame.raw.width as usize,
                frame.raw.height as usize,
                layout,
                lo,
                hi,
            )
        })?
    }

    /// Colormap the depth frame using the configured default range.
    pub fn convert_depth(&self, dst: &mut [u8], layout: ChannelLayout) -> Result<()> {
        let (min_mm, max_mm) = self.config.depth_range_mm;
        self.convert_to_colormap(SensorChannel::Depth, dst, layout, min_mm, max_mm)
    }

    /// Store the channel's current frame in the ring's current slot.
    ///
    /// The frame must match the ring's width, height and bytes per pixel
    /// exactly. The ring is not advanced.
    pub fn record(&self, channel: SensorChannel, ring: &mut FrameRing) -> Result<()> {
        let geometry = (ring.width(), ring.height(), ring.bytes_per_pixel());
        let slot = ring.current_slot_mut()?;
        let acquired_at = self.streams[channel.index()].with_frame(|frame| {
            check_geometry(channel, frame, geometry)?;
            copy_held(channel, frame, slot, 0, 0).map(|_| frame.acquired_at)
        })??;
        ring.stamp(acquired_at)
    }

    /// Native depth units per millimeter of the configured depth stream.
    pub fn depth_scale(&self) -> Result<u16> {
        let mode = self.streams[SensorChannel::Depth.index()].video_mode()?;
        Ok(mode.pixel_format.depth_scale().unwrap_or(1))
    }

    pub fn video_mode(&self, channel: SensorChannel) -> Result<VideoMode> {
        self.streams[channel.index()].video_mode()
    }

    pub fn width(&self, channel: SensorChannel) -> Result<u32> {
        self.streams[channel.index()].width()
    }

    pub fn height(&self, channel: SensorChannel) -> Result<u32> {
        self.streams[channel.index()].height()
    }

    pub fn num_channels(&self, channel: SensorChannel) -> Result<u32> {
        self.streams[channel.index()].num_channels()
    }

    pub fn min_value(&self, channel: SensorChannel) -> Result<u32> {
        self.streams[channel.index()].min_value()
    }

    pub fn max_value(&self, channel: SensorChannel) -> Result<u32> {
        self.streams[channel.index()].max_value()
    }
}

impl Drop for MultiStreamDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_geometry(
    channel: SensorChannel,
    frame: &HeldFrame,
    (width, height, bpp): (usize, usize, usize),
) -> Result<()> {
    let frame_bpp = frame.raw.bytes_per_pixel();
    if frame_bpp != bpp {
        return Err(RgbdError::UnsupportedPixelFormat(format!(
            "{} frame has {} bytes per pixel, ring slot holds {}",
            channel.name(),
            frame_bpp,
            bpp
        )));
    }
    let (frame_width, frame_height) = (frame.raw.width as usize, frame.raw.height as usize);
    if (frame_width, frame_height) != (width, height) {
        return Err(RgbdError::FrameGeometry {
            channel,
            frame: format!("{}x{}", frame_width, frame_height),
            slot: format!("{}x{}", width, height),
        });
    }
    Ok(())
}

fn into_result(failures: Vec<ChannelFailure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(RgbdError::ChannelsFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCamera, SimDriver};
    use crate::types::{PixelFormat, StreamState};
    use std::time::Duration;

    fn setup(camera: SimCamera) -> (SimDriver, MultiStreamDevice) {
        let driver = SimDriver::new(camera);
        let config = DeviceConfig::default().with_wait_timeout(Duration::from_millis(10));
        let mut device = MultiStreamDevice::new(Arc::new(driver.clone()), config);
        device.open(None).unwrap();
        (driver, device)
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_open_is_idempotent_per_target() {
        let (driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        device.open(None).unwrap();
        device.open(Some("sim://0")).unwrap();
        assert_eq!(driver.open_count(), 1);
        assert!(matches!(
            device.open(Some("sim://other")),
            Err(RgbdError::DeviceOpen { .. })
        ));
    }

    #[test]
    fn test_open_failure() {
        let driver = SimDriver::new(SimCamera::structured_light("sim://0"));
        let mut device = MultiStreamDevice::new(Arc::new(driver), DeviceConfig::default());
        assert!(matches!(
            device.open(Some("sim://9")),
            Err(RgbdError::DeviceOpen { .. })
        ));
        assert!(!device.is_open());
    }

    #[test]
    fn test_mode_listing() {
        let camera = SimCamera::new("sim://d").with_sensor(
            SensorChannel::Depth,
            vec![VideoMode::new(640, 480, 30, PixelFormat::Depth1Mm)],
        );
        let (_driver, device) = setup(camera);
        let tables = device.list_sensor_modes().unwrap();
        let text: String = tables.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            text,
            "IR Sensor:\nNot available.\n\
             Depth Sensor:\n   0, W:  640, H:  480, FPS: 30, PIXEL_FORMAT_DEPTH_1_MM\n\
             RGB Sensor:\nNot available.\n"
        );
    }

    #[test]
    fn test_mode_out_of_range() {
        let (_driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        let err = device
            .create_stream(SensorChannel::Depth, 3, false)
            .unwrap_err();
        assert!(matches!(err, RgbdError::ModeOutOfRange { count: 3, .. }));
        assert_eq!(
            device.stream(SensorChannel::Depth).state(),
            StreamState::Created
        );
    }

    #[test]
    fn test_registration_and_sync() {
        let (driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        device.set_registration(true).unwrap();
        assert_eq!(driver.registration(), Some(RegistrationMode::DepthToColor));
        device.set_registration(false).unwrap();
        assert_eq!(driver.registration(), Some(RegistrationMode::Off));
        device.set_sync(true).unwrap();
        assert!(driver.depth_color_sync());

        let plain = SimCamera::structured_light("sim://1")
            .with_capabilities(DeviceCapabilities::empty());
        let (driver, mut device) = setup(plain);
        assert!(matches!(
            device.set_registration(true),
            Err(RgbdError::UnsupportedFeature(_))
        ));
        assert!(matches!(
            device.set_sync(true),
            Err(RgbdError::UnsupportedFeature(_))
        ));
        device.set_registration(false).unwrap();
        assert_eq!(driver.registration(), Some(RegistrationMode::Off));
    }

    #[test]
    fn test_wait_until_ready_without_streams() {
        let (_driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        assert!(matches!(
            device.wait_until_ready(),
            Err(RgbdError::NoActiveStream)
        ));
        // Configured but not started still counts as inactive.
        device.create_stream(SensorChannel::Depth, 0, false).unwrap();
        assert!(matches!(
            device.wait_until_ready(),
            Err(RgbdError::NoActiveStream)
        ));
    }

    #[test]
    fn test_wait_until_ready_blocks_for_first_frame() {
        let (driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        device.create_stream(SensorChannel::Depth, 0, false).unwrap();
        device.start_all().unwrap();

        let delay = Duration::from_millis(100);
        let injector = driver.clone();
        let feeder = std::thread::spawn(move || {
            std::thread::sleep(delay);
            injector.inject_uniform(SensorChannel::Depth, 500).unwrap();
        });

        let begin = Instant::now();
        device.wait_until_ready().unwrap();
        assert!(begin.elapsed() >= delay);
        assert!(device.stream(SensorChannel::Depth).is_frame_valid());
        feeder.join().unwrap();
    }

    #[test]
    fn test_wait_until_ready_deadline() {
        let driver = SimDriver::new(SimCamera::structured_light("sim://0"));
        let config = DeviceConfig::default()
            .with_wait_timeout(Duration::from_millis(10))
            .with_ready_timeout(Duration::from_millis(30));
        let mut device = MultiStreamDevice::new(Arc::new(driver), config);
        device.open(None).unwrap();
        device.create_stream(SensorChannel::Color, 0, false).unwrap();
        device.start_all().unwrap();
        assert!(matches!(
            device.wait_until_ready(),
            Err(RgbdError::ReadyTimeout(_))
        ));
    }

    #[test]
    fn test_start_all_reports_failed_channels() {
        let (driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        device.create_stream(SensorChannel::Depth, 0, false).unwrap();
        device.create_stream(SensorChannel::Color, 0, false).unwrap();
        driver.fail_start(SensorChannel::Color, true);

        let err = device.start_all().unwrap_err();
        assert_eq!(err.failed_channels(), vec![SensorChannel::Color]);
        assert!(device.stream(SensorChannel::Depth).is_streaming());
        assert!(!device.stream(SensorChannel::Color).is_streaming());
        // Infrared was never configured and is skipped.
        assert_eq!(
            device.stream(SensorChannel::Infrared).state(),
            StreamState::Uninitialized
        );

        device.start_all().unwrap();
        assert!(device.stream(SensorChannel::Color).is_streaming());
        device.stop_all().unwrap();
        assert_eq!(
            device.stream(SensorChannel::Depth).state(),
            StreamState::Stopped
        );
    }

    #[test]
    fn test_colormap_scales_depth_units() {
        let camera = SimCamera::new("sim://um").with_sensor(
            SensorChannel::Depth,
            vec![VideoMode::new(2, 1, 30, PixelFormat::Depth100Um)],
        );
        let (driver, mut device) = setup(camera);
        device.create_stream(SensorChannel::Depth, 0, false).unwrap();
        device.start_all().unwrap();
        // 500 mm in 100 um units.
        driver.inject_uniform(SensorChannel::Depth, 5000).unwrap();
        device.wait_until_ready().unwrap();

        let mut scaled = [0u8; 6];
        device
            .convert_to_colormap(SensorChannel::Depth, &mut scaled, ChannelLayout::Rgb, 0, 1000)
            .unwrap();
        assert_eq!(&scaled[..3], &colormap::jet(500, 0, 1000));

        // 400 mm is 4000 native units, below the 5000 sample.
        let mut far = [0u8; 6];
        device
            .convert_to_colormap(SensorChannel::Depth, &mut far, ChannelLayout::Rgb, 0, 400)
            .unwrap();
        assert_eq!(&far[..3], &[255, 255, 255][..]);
        assert_eq!(device.depth_scale().unwrap(), 10);
    }

    #[test]
    fn test_colormap_rejects_8bit_frames() {
        let (driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        device.create_stream(SensorChannel::Color, 0, false).unwrap();
        device.start_all().unwrap();
        driver.inject_uniform(SensorChannel::Color, 10).unwrap();
        device.wait_until_ready().unwrap();
        let mut dst = vec![0u8; 640 * 480 * 4];
        assert!(matches!(
            device.convert_to_colormap(SensorChannel::Color, &mut dst, ChannelLayout::Argb, 0, 1),
            Err(RgbdError::UnsupportedPixelFormat(_))
        ));
    }

    #[test]
    fn test_record_into_ring() {
        let camera = SimCamera::new("sim://g").with_sensor(
            SensorChannel::Infrared,
            vec![VideoMode::new(2, 2, 30, PixelFormat::Gray16)],
        );
        let (driver, mut device) = setup(camera);
        device.create_stream(SensorChannel::Infrared, 0, false).unwrap();
        device.start_stream(SensorChannel::Infrared).unwrap();

        let mut ring = FrameRing::new();
        ring.allocate(2, 2, 2, 3).unwrap();
        for value in 1..=3u16 {
            driver.inject_uniform(SensorChannel::Infrared, value).unwrap();
            let stream = device.stream(SensorChannel::Infrared);
            wait_for(|| stream.frames_acquired() == u64::from(value));
            device.record(SensorChannel::Infrared, &mut ring).unwrap();
            ring.advance();
        }
        assert_eq!(ring.index(), 0);
        for i in 0..3 {
            let slot = ring.slot(Some(i)).unwrap();
            assert_eq!(u16::from_ne_bytes([slot[0], slot[1]]), i as u16 + 1);
            assert!(ring.timestamp(Some(i)).unwrap().is_some());
        }
    }

    #[test]
    fn test_record_rejects_mismatched_ring() {
        let camera = SimCamera::new("sim://g").with_sensor(
            SensorChannel::Infrared,
            vec![VideoMode::new(4, 2, 30, PixelFormat::Gray16)],
        );
        let (driver, mut device) = setup(camera);
        device.create_stream(SensorChannel::Infrared, 0, false).unwrap();
        device.start_all().unwrap();
        driver.inject_uniform(SensorChannel::Infrared, 7).unwrap();
        device.wait_until_ready().unwrap();

        // Matching size, three bytes per pixel.
        let mut rgb = FrameRing::new();
        rgb.allocate(4, 2, 3, 1).unwrap();
        assert!(matches!(
            device.record(SensorChannel::Infrared, &mut rgb),
            Err(RgbdError::UnsupportedPixelFormat(_))
        ));
        assert!(rgb.current_slot().unwrap().iter().all(|&b| b == 0));
        assert_eq!(rgb.timestamp(None).unwrap(), None);

        // Same byte count, transposed geometry.
        let mut tall = FrameRing::new();
        tall.allocate(2, 4, 2, 1).unwrap();
        assert!(matches!(
            device.record(SensorChannel::Infrared, &mut tall),
            Err(RgbdError::FrameGeometry { .. })
        ));

        let mut exact = FrameRing::new();
        exact.allocate(4, 2, 2, 1).unwrap();
        device.record(SensorChannel::Infrared, &mut exact).unwrap();
        assert_eq!(exact.current_slot().unwrap()[0], 7);
    }

    #[test]
    fn test_restarted_streams_wait_for_a_new_frame() {
        let driver = SimDriver::new(SimCamera::structured_light("sim://0"));
        let config = DeviceConfig::default()
            .with_wait_timeout(Duration::from_millis(10))
            .with_ready_timeout(Duration::from_millis(50));
        let mut device = MultiStreamDevice::new(Arc::new(driver.clone()), config);
        device.open(None).unwrap();
        device.create_stream(SensorChannel::Depth, 0, false).unwrap();
        device.start_all().unwrap();
        driver.inject_uniform(SensorChannel::Depth, 1).unwrap();
        device.wait_until_ready().unwrap();

        device.stop_all().unwrap();
        device.start_all().unwrap();
        assert_eq!(
            device.stream(SensorChannel::Depth).state(),
            StreamState::Started
        );
        assert!(matches!(
            device.wait_until_ready(),
            Err(RgbdError::ReadyTimeout(_))
        ));

        driver.inject_uniform(SensorChannel::Depth, 2).unwrap();
        let stream = device.stream(SensorChannel::Depth);
        wait_for(|| stream.is_frame_valid());
        device.wait_until_ready().unwrap();
        assert_eq!(stream.state(), StreamState::Streaming);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_driver, mut device) = setup(SimCamera::structured_light("sim://0"));
        device.create_stream(SensorChannel::Depth, 0, false).unwrap();
        device.start_all().unwrap();
        device.close();
        assert!(!device.is_open());
        assert_eq!(
            device.stream(SensorChannel::Depth).state(),
            StreamState::Destroyed
        );
        device.close();
    }
}
