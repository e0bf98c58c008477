//! # rgbd - multi-sensor RGB-D stream synchronization and frame conversion
//!
//! Drives up to three sensor streams (depth, color, infrared) of one camera.
//! Provides:
//! - One acquisition thread per stream holding the latest frame under a mutex
//! - Strided copies of frames into shared display canvases
//! - Jet colormapping of 16-bit depth/IR frames
//! - Fixed-capacity ring buffers for recording and looped playback
//! - C FFI over the conversion and ring primitives
//!
//! The vendor SDK sits behind the traits in [`sdk`]; [`sim`] implements them
//! in process.
//!
//! ## Quick Start
//! ```no_run
//! use rgbd::{ChannelLayout, DeviceConfig, MultiStreamDevice, RgbdRecorder, SensorChannel};
//! use rgbd::sim::{SimCamera, SimDriver};
//! use std::sync::Arc;
//!
//! let driver = Arc::new(SimDriver::new(SimCamera::structured_light("sim://0")));
//! let mut device = MultiStreamDevice::new(driver, DeviceConfig::from_env());
//! device.open(None).unwrap();
//! device.create_stream(SensorChannel::Depth, 1, false).unwrap();
//! device.create_stream(SensorChannel::Color, 0, false).unwrap();
//! device.start_all().unwrap();
//! device.wait_until_ready().unwrap();
//!
//! let mut recorder = RgbdRecorder::new();
//! recorder.allocate_for(&device, 30).unwrap();
//! for _ in 0..30 {
//!     recorder.record(&device).unwrap();
//! }
//!
//! let mut canvas = vec![0u8; 640 * 480 * 4];
//! recorder
//!     .convert_depth_out(&mut canvas, Some(0), ChannelLayout::Argb, 1, 4000)
//!     .unwrap();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod copy;
pub mod colormap;
pub mod sdk;
pub mod stream;
pub mod device;
pub mod ring;
pub mod sim;
pub mod ffi;

pub use colormap::{jet, ChannelLayout};
pub use config::{DeviceConfig, StreamConfig};
pub use copy::{copy_frame, Placement};
pub use device::{ModeTable, MultiStreamDevice};
pub use error::{ChannelFailure, RgbdError};
pub use ring::{FrameRing, RgbdRecorder};
pub use sdk::{SdkStream, SensorDevice, SensorDriver};
pub use stream::SensorStream;
pub use types::*;

/// Result type alias for rgbd operations.
pub type Result<T> = std::result::Result<T, RgbdError>;
