use crate::config::StreamConfig;
use crate::copy;
use crate::sdk::{SdkStream, SensorDevice};
use crate::types::{HeldFrame, SensorChannel, StreamState, VideoMode};
use crate::{Result, RgbdError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Frame bytes carry no invariant a panicking reader could break.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The frame hand-off point between the acquisition thread and readers.
#[derive(Default)]
struct FrameSlot {
    frame: Mutex<Option<HeldFrame>>,
    acquired: AtomicU64,
}

/// One sensor channel: SDK stream handle, acquisition thread and the
/// mutex-guarded current frame.
///
/// ```no_run
/// use rgbd::{SensorChannel, SensorStream, SensorDriver, StreamConfig};
/// use rgbd::sim::{SimCamera, SimDriver};
///
/// let driver = SimDriver::new(SimCamera::structured_light("sim://0"));
/// let device = driver.open(None).unwrap();
/// let mut depth = SensorStream::new(SensorChannel::Depth, StreamConfig::default());
/// depth.create(device.as_ref(), 1, false).unwrap();
/// depth.start().unwrap();
/// ```
pub struct SensorStream {
    channel: SensorChannel,
    config: StreamConfig,
    state: StreamState,
    handle: Option<Arc<dyn SdkStream>>,
    mode: Option<VideoMode>,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SensorStream {
    pub fn new(channel: SensorChannel, config: StreamConfig) -> Self {
        Self {
            channel,
            config,
            state: StreamState::Uninitialized,
            handle: None,
            mode: None,
            slot: Arc::new(FrameSlot::default()),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn channel(&self) -> SensorChannel {
        self.channel
    }

    /// Current lifecycle state. A started stream reports `Streaming` once it
    /// holds a frame.
    pub fn state(&self) -> StreamState {
        match self.state {
            StreamState::Started if self.is_frame_valid() => StreamState::Streaming,
            state => state,
        }
    }

    /// Whether the stream has an SDK handle (created and not destroyed).
    pub fn is_stream_valid(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether a stream has a mode set and can be started.
    pub fn is_configured(&self) -> bool {
        matches!(
            self.state,
            StreamState::Configured | StreamState::Started | StreamState::Stopped
        )
    }

    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Started
    }

    pub fn is_frame_valid(&self) -> bool {
        lock(&self.slot.frame).is_some()
    }

    /// Create the SDK stream and apply video mode `mode` and mirroring.
    ///
    /// A mode index outside the sensor's table fails with `ModeOutOfRange`
    /// and leaves the stream `Created`.
    pub fn create(
        &mut self,
        device: &dyn SensorDevice,
        mode: usize,
        mirroring: bool,
    ) -> Result<()> {
        if self.is_streaming() {
            return Err(RgbdError::Configuration(format!(
                "{}: cannot re-create a running stream",
                self.channel.name()
            )));
        }
        if !device.has_sensor(self.channel) {
            return Err(RgbdError::SensorNotFound(self.channel));
        }
        if self.handle.is_some() {
            self.destroy();
        }

        let handle = device
            .create_stream(self.channel)
            .map_err(|e| RgbdError::StreamCreation {
                channel: self.channel,
                reason: e.to_string(),
            })?;
        self.handle = Some(handle.clone());
        self.mode = None;
        self.state = StreamState::Created;

        let modes = device.sensor_modes(self.channel);
        let selected = *modes.get(mode).ok_or(RgbdError::ModeOutOfRange {
            channel: self.channel,
            mode,
            count: modes.len(),
        })?;

        handle.set_video_mode(selected).map_err(|e| {
            RgbdError::Configuration(format!(
                "{}: failed to set video mode ({}): {}",
                self.channel.name(),
                mode,
                e
            ))
        })?;

        if handle.mirroring() != mirroring {
            handle.set_mirroring(mirroring).map_err(|e| {
                RgbdError::Configuration(format!(
                    "{}: failed to {}able mirroring: {}",
                    self.channel.name(),
                    if mirroring { "en" } else { "dis" },
                    e
                ))
            })?;
        }

        log::debug!(
            "{} configured: mode {} ({}), mirroring={}",
            self.channel.name(),
            mode,
            selected,
            mirroring
        );
        self.mode = Some(selected);
        self.state = StreamState::Configured;
        Ok(())
    }

    /// Start the SDK stream and its acquisition thread.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, StreamState::Configured | StreamState::Stopped) {
            return Err(RgbdError::Configuration(format!(
                "{}: cannot start a stream in state {:?}",
                self.channel.name(),
                self.state
            )));
        }
        let handle = self.handle.clone().ok_or_else(|| {
            RgbdError::Configuration(format!("{}: stream is not initialized", self.channel.name()))
        })?;

        handle.start().map_err(|e| {
            RgbdError::Configuration(format!("{}: failed to start: {}", self.channel.name(), e))
        })?;

        // A frame from a previous run must not count for this one.
        lock(&self.slot.frame).take();
        self.slot.acquired.store(0, Ordering::SeqCst);

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let slot = self.slot.clone();
        let channel = self.channel;
        let wait_timeout = self.config.wait_timeout;
        let thread_handle = handle.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("rgbd-{}", channel.label()))
            .spawn(move || acquisition_loop(channel, thread_handle, slot, running, wait_timeout));

        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                self.state = StreamState::Started;
                log::info!("{} stream started", channel.name());
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                handle.stop();
                Err(RgbdError::Configuration(format!(
                    "{}: failed to spawn acquisition thread: {}",
                    channel.name(),
                    e
                )))
            }
        }
    }

    /// Signal the acquisition thread, join it and stop the SDK stream.
    ///
    /// Returns within roughly one wait timeout. No-op unless started. The
    /// stream ends up `Stopped` even when the acquisition thread had panicked,
    /// which is reported as an error.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != StreamState::Started {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        let joined = match self.thread.take() {
            Some(thread) => thread.join().is_ok(),
            None => true,
        };
        if let Some(handle) = &self.handle {
            handle.stop();
        }
        self.state = StreamState::Stopped;
        log::info!("{} stream stopped", self.channel.name());

        if joined {
            Ok(())
        } else {
            Err(RgbdError::Sdk(format!(
                "{} acquisition thread panicked",
                self.channel.name()
            )))
        }
    }

    /// Release the held frame and the stream handle. Idempotent.
    pub fn destroy(&mut self) {
        if matches!(
            self.state,
            StreamState::Uninitialized | StreamState::Destroyed
        ) && self.handle.is_none()
        {
            return;
        }
        if let Err(e) = self.stop() {
            log::warn!("{}", e);
        }
        lock(&self.slot.frame).take();
        self.slot.acquired.store(0, Ordering::SeqCst);
        self.handle = None;
        self.mode = None;
        self.state = StreamState::Destroyed;
        log::debug!("{} stream destroyed", self.channel.name());
    }

    /// Copy the current frame into `dst` at `offset`, skipping `padding`
    /// bytes after each row.
    pub fn copy_to(&self, dst: &mut [u8], offset: usize, padding: usize) -> Result<()> {
        let channel = self.channel;
        self.with_frame(|frame| copy_held(channel, frame, dst, offset, padding))?
    }

    /// Run `f` on the current frame while holding the frame lock.
    pub fn with_frame<R>(&self, f: impl FnOnce(&HeldFrame) -> R) -> Result<R> {
        let guard = lock(&self.slot.frame);
        match guard.as_ref() {
            Some(frame) => Ok(f(frame)),
            None => Err(RgbdError::InvalidFrame(self.channel)),
        }
    }

    /// Host acquisition time of the current frame.
    pub fn frame_timestamp(&self) -> Option<Duration> {
        lock(&self.slot.frame).as_ref().map(|f| f.acquired_at)
    }

    /// Frames acquired since the stream was last started.
    pub fn frames_acquired(&self) -> u64 {
        self.slot.acquired.load(Ordering::SeqCst)
    }

    pub fn video_mode(&self) -> Result<VideoMode> {
        self.mode.ok_or_else(|| {
            RgbdError::Configuration(format!("{}: video stream is not configured", self.channel.name()))
        })
    }

    pub fn width(&self) -> Result<u32> {
        Ok(self.video_mode()?.width)
    }

    pub fn height(&self) -> Result<u32> {
        Ok(self.video_mode()?.height)
    }

    pub fn num_channels(&self) -> Result<u32> {
        let format = self.video_mode()?.pixel_format;
        format
            .num_channels()
            .ok_or_else(|| RgbdError::UnsupportedPixelFormat(format.name().into()))
    }

    pub fn min_value(&self) -> Result<u32> {
        Ok(self.sdk_handle()?.min_pixel_value())
    }

    pub fn max_value(&self) -> Result<u32> {
        Ok(self.sdk_handle()?.max_pixel_value())
    }

    fn sdk_handle(&self) -> Result<&Arc<dyn SdkStream>> {
        self.handle.as_ref().ok_or_else(|| {
            RgbdError::Configuration(format!("{}: video stream is not initialized", self.channel.name()))
        })
    }
}

impl Drop for SensorStream {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Copy a held frame into `dst`, checking both buffers first.
pub(crate) fn copy_held(
    channel: SensorChannel,
    frame: &HeldFrame,
    dst: &mut [u8],
    offset: usize,
    padding: usize,
) -> Result<()> {
    let width = frame.raw.width as usize;
    let height = frame.raw.height as usize;
    let bpp = frame.raw.bytes_per_pixel();
    let needed = copy::required_len(width, height, bpp, offset, padding);
    if dst.len() < needed {
        return Err(RgbdError::BufferTooSmall {
            needed,
            actual: dst.len(),
        });
    }
    if frame.raw.data.len() < width * height * bpp {
        return Err(RgbdError::InvalidFrame(channel));
    }
    copy::copy_frame(&frame.raw.data, dst, width, height, bpp, offset, padding);
    Ok(())
}

/// Acquisition loop of one stream, run on its own thread.
///
/// Waits are bounded so the running flag is observed at least once per
/// `wait_timeout`. Timeouts and read errors never end the loop; a failing
/// wait backs off for one `wait_timeout` before retrying.
fn acquisition_loop(
    channel: SensorChannel,
    stream: Arc<dyn SdkStream>,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    wait_timeout: Duration,
) {
    let epoch = Instant::now();
    log::debug!("{} acquisition started", channel.name());

    while running.load(Ordering::SeqCst) {
        match stream.wait_for_frame(wait_timeout) {
            Ok(true) => {}
            Ok(false) => {
                log::trace!("{}", RgbdError::ReadTimeout(channel));
                continue;
            }
            Err(e) => {
                log::warn!("{} wait failed: {}", channel.name(), e);
                std::thread::sleep(wait_timeout);
                continue;
            }
        }

        // Read outside the lock; a failed read keeps the previous frame.
        let raw = match stream.read_frame() {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("{}: failed to read frame: {}", channel.name(), e);
                continue;
            }
        };
        let acquired_at = epoch.elapsed();

        let mut held = lock(&slot.frame);
        let sequence = slot.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        if sequence == 1 {
            log::debug!(
                "{} first frame: {}x{} stride={}",
                channel.name(),
                raw.width,
                raw.height,
                raw.stride_bytes
            );
        }
        // Old frame is released and the new one installed in one critical section.
        *held = Some(HeldFrame {
            raw,
            acquired_at,
            sequence,
        });
    }

    log::debug!("{} acquisition stopping (stop flag set)", channel.name());
}
