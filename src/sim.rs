//! Simulated camera implementing the SDK traits in process.
//!
//! Frames are pushed by the caller with [`SimDriver::inject_frame`] and flow
//! through a `crossbeam-channel` queue to whichever thread waits on the
//! stream, which is how the acquisition path is exercised without hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::sdk::{SdkStream, SensorDevice, SensorDriver};
use crate::stream::lock;
use crate::types::{
    DeviceCapabilities, PixelFormat, RawFrame, RegistrationMode, SensorChannel, VideoMode,
};
use crate::{Result, RgbdError};

/// Frame period used for synthetic device timestamps (30 fps).
const FRAME_PERIOD_US: u64 = 33_333;

/// Description of a simulated device: sensors, modes and capabilities.
#[derive(Debug, Clone)]
pub struct SimCamera {
    uri: String,
    modes: [Vec<VideoMode>; 3],
    capabilities: DeviceCapabilities,
    pixel_range: (u32, u32),
}

impl SimCamera {
    /// A device with no sensors.
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            modes: [Vec::new(), Vec::new(), Vec::new()],
            capabilities: DeviceCapabilities::empty(),
            pixel_range: (0, 10_000),
        }
    }

    /// A structured-light RGB-D camera with all three sensors.
    pub fn structured_light(uri: &str) -> Self {
        Self::new(uri)
            .with_sensor(
                SensorChannel::Depth,
                vec![
                    VideoMode::new(320, 240, 30, PixelFormat::Depth1Mm),
                    VideoMode::new(640, 480, 30, PixelFormat::Depth1Mm),
                    VideoMode::new(640, 480, 30, PixelFormat::Depth100Um),
                ],
            )
            .with_sensor(
                SensorChannel::Color,
                vec![
                    VideoMode::new(640, 480, 30, PixelFormat::Rgb888),
                    VideoMode::new(1280, 1024, 15, PixelFormat::Rgb888),
                ],
            )
            .with_sensor(
                SensorChannel::Infrared,
                vec![VideoMode::new(640, 480, 30, PixelFormat::Gray16)],
            )
            .with_capabilities(DeviceCapabilities::all())
    }

    pub fn with_sensor(mut self, channel: SensorChannel, modes: Vec<VideoMode>) -> Self {
        self.modes[channel.index()] = modes;
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_pixel_range(mut self, min: u32, max: u32) -> Self {
        self.pixel_range = (min, max);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[derive(Default)]
struct SimState {
    streams: [Option<Arc<SimStream>>; 3],
    registration: Option<RegistrationMode>,
    depth_color_sync: bool,
    fail_start: [bool; 3],
    opened: usize,
}

/// Driver handing out [`SimCamera`] devices and giving tests access to the
/// streams they create.
#[derive(Clone)]
pub struct SimDriver {
    camera: SimCamera,
    state: Arc<Mutex<SimState>>,
}

impl SimDriver {
    pub fn new(camera: SimCamera) -> Self {
        Self {
            camera,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// The most recently created stream of `channel`.
    pub fn stream(&self, channel: SensorChannel) -> Option<Arc<SimStream>> {
        lock(&self.state).streams[channel.index()].clone()
    }

    /// Queue a frame on the channel's stream.
    pub fn inject_frame(&self, channel: SensorChannel, frame: RawFrame) -> Result<()> {
        let stream = self
            .stream(channel)
            .ok_or_else(|| RgbdError::Sdk(format!("no {} stream created", channel.name())))?;
        stream.push(frame);
        Ok(())
    }

    /// Queue a frame matching the stream's current mode with every sample set
    /// to `value` (truncated to a byte for 1- and 3-byte formats).
    pub fn inject_uniform(&self, channel: SensorChannel, value: u16) -> Result<()> {
        let stream = self
            .stream(channel)
            .ok_or_else(|| RgbdError::Sdk(format!("no {} stream created", channel.name())))?;
        let frame = uniform_frame(stream.video_mode(), value)?;
        stream.push(frame);
        Ok(())
    }

    /// Make the next `start()` of the channel's stream fail.
    pub fn fail_start(&self, channel: SensorChannel, fail: bool) {
        lock(&self.state).fail_start[channel.index()] = fail;
    }

    pub fn registration(&self) -> Option<RegistrationMode> {
        lock(&self.state).registration
    }

    pub fn depth_color_sync(&self) -> bool {
        lock(&self.state).depth_color_sync
    }

    /// Number of devices opened through this driver.
    pub fn open_count(&self) -> usize {
        lock(&self.state).opened
    }
}

impl SensorDriver for SimDriver {
    fn open(&self, uri: Option<&str>) -> Result<Box<dyn SensorDevice>> {
        if let Some(uri) = uri {
            if uri != self.camera.uri {
                return Err(RgbdError::DeviceOpen {
                    target: uri.to_string(),
                    reason: "no such device".into(),
                });
            }
        }
        lock(&self.state).opened += 1;
        Ok(Box::new(SimDevice {
            camera: self.camera.clone(),
            state: self.state.clone(),
            closed: false,
        }))
    }
}

/// An opened simulated device.
pub struct SimDevice {
    camera: SimCamera,
    state: Arc<Mutex<SimState>>,
    closed: bool,
}

impl SensorDevice for SimDevice {
    fn uri(&self) -> &str {
        &self.camera.uri
    }

    fn has_sensor(&self, channel: SensorChannel) -> bool {
        !self.camera.modes[channel.index()].is_empty()
    }

    fn sensor_modes(&self, channel: SensorChannel) -> Vec<VideoMode> {
        self.camera.modes[channel.index()].clone()
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.camera.capabilities
    }

    fn create_stream(&self, channel: SensorChannel) -> Result<Arc<dyn SdkStream>> {
        if self.closed {
            return Err(RgbdError::Sdk("device closed".into()));
        }
        let default_mode = self.camera.modes[channel.index()]
            .first()
            .copied()
            .ok_or_else(|| RgbdError::Sdk(format!("{} not present", channel.name())))?;
        let stream = Arc::new(SimStream::new(
            channel,
            default_mode,
            self.camera.pixel_range,
            self.state.clone(),
        ));
        lock(&self.state).streams[channel.index()] = Some(stream.clone());
        Ok(stream)
    }

    fn set_registration(&mut self, mode: RegistrationMode) -> Result<()> {
        if mode == RegistrationMode::DepthToColor
            && !self
                .camera
                .capabilities
                .contains(DeviceCapabilities::DEPTH_TO_COLOR_REGISTRATION)
        {
            return Err(RgbdError::Sdk("registration not supported".into()));
        }
        lock(&self.state).registration = Some(mode);
        Ok(())
    }

    fn set_depth_color_sync(&mut self, enable: bool) -> Result<()> {
        lock(&self.state).depth_color_sync = enable;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// A simulated sensor stream fed from a frame queue.
pub struct SimStream {
    channel: SensorChannel,
    mode: Mutex<VideoMode>,
    mirroring: AtomicBool,
    started: AtomicBool,
    sender: Sender<RawFrame>,
    receiver: Receiver<RawFrame>,
    pending: Mutex<Option<RawFrame>>,
    range: (u32, u32),
    read_failures: AtomicUsize,
    wait_failures: AtomicUsize,
    waits: AtomicU64,
    delivered: AtomicU64,
    state: Arc<Mutex<SimState>>,
}

impl SimStream {
    fn new(
        channel: SensorChannel,
        mode: VideoMode,
        range: (u32, u32),
        state: Arc<Mutex<SimState>>,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            channel,
            mode: Mutex::new(mode),
            mirroring: AtomicBool::new(false),
            started: AtomicBool::new(false),
            sender,
            receiver,
            pending: Mutex::new(None),
            range,
            read_failures: AtomicUsize::new(0),
            wait_failures: AtomicUsize::new(0),
            waits: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            state,
        }
    }

    pub fn push(&self, frame: RawFrame) {
        // The receiver lives in `self`, so the queue cannot be disconnected.
        let _ = self.sender.send(frame);
    }

    /// Make the next `n` reads fail after a successful wait.
    pub fn fail_next_reads(&self, n: usize) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` waits fail immediately.
    pub fn fail_next_waits(&self, n: usize) {
        self.wait_failures.store(n, Ordering::SeqCst);
    }

    /// Calls to `wait_for_frame` so far.
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Frames handed out through `read_frame`.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Frames injected but not yet waited on.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }
}

impl SdkStream for SimStream {
    fn set_video_mode(&self, mode: VideoMode) -> Result<()> {
        if self.is_started() {
            return Err(RgbdError::Sdk("cannot change mode while streaming".into()));
        }
        *lock(&self.mode) = mode;
        Ok(())
    }

    fn video_mode(&self) -> VideoMode {
        *lock(&self.mode)
    }

    fn mirroring(&self) -> bool {
        self.mirroring.load(Ordering::SeqCst)
    }

    fn set_mirroring(&self, enable: bool) -> Result<()> {
        self.mirroring.store(enable, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let fail = {
            let mut state = lock(&self.state);
            std::mem::take(&mut state.fail_start[self.channel.index()])
        };
        if fail {
            return Err(RgbdError::Sdk(format!(
                "{} refused to start",
                self.channel.name()
            )));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    fn wait_for_frame(&self, timeout: Duration) -> Result<bool> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.wait_failures) {
            return Err(RgbdError::Sdk("simulated wait failure".into()));
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => {
                *lock(&self.pending) = Some(frame);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                Err(RgbdError::Sdk("frame queue disconnected".into()))
            }
        }
    }

    fn read_frame(&self) -> Result<RawFrame> {
        let failed = take_one(&self.read_failures);
        let frame = lock(&self.pending).take();
        if failed {
            return Err(RgbdError::Sdk("simulated read failure".into()));
        }
        let frame = frame.ok_or_else(|| RgbdError::Sdk("no frame pending".into()))?;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn min_pixel_value(&self) -> u32 {
        self.range.0
    }

    fn max_pixel_value(&self) -> u32 {
        self.range.1
    }
}

/// Decrement a failure budget, reporting whether one was left.
fn take_one(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Build a frame for `mode` with every sample set to `value`.
pub fn uniform_frame(mode: VideoMode, value: u16) -> Result<RawFrame> {
    let bpp = mode
        .bytes_per_pixel()
        .ok_or_else(|| RgbdError::UnsupportedPixelFormat(mode.pixel_format.name().into()))?;
    let pixels = mode.width as usize * mode.height as usize;
    let data = if bpp == 2 {
        std::iter::repeat(value.to_ne_bytes())
            .take(pixels)
            .flatten()
            .collect()
    } else {
        vec![value as u8; pixels * bpp]
    };
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let n = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    Ok(RawFrame {
        data,
        width: mode.width,
        height: mode.height,
        stride_bytes: mode.width * bpp as u32,
        timestamp_us: n * FRAME_PERIOD_US,
    })
}
