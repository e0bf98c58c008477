//! Record depth and color frames from a simulated camera into a ring, then
//! replay them into a side-by-side ARGB canvas (depth left, color right).
//!
//! Usage: cargo run --example record_playback [frames]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rgbd::copy::{copy_frame, copy_pixels_interleaved};
use rgbd::sim::{SimCamera, SimDriver};
use rgbd::{
    ChannelLayout, DeviceConfig, MultiStreamDevice, Placement, RgbdRecorder, SensorChannel,
};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;

fn setup(device: &mut MultiStreamDevice) -> rgbd::Result<()> {
    device.open(None)?;
    device.set_registration(true)?;
    device.create_stream(SensorChannel::Depth, 1, false)?;
    device.create_stream(SensorChannel::Color, 0, false)?;
    device.start_all()
}

fn side_by_side(canvas_width: usize, px: usize) -> rgbd::Result<(Placement, Placement)> {
    let left = Placement::in_canvas(canvas_width, 0, 0, WIDTH, px)?;
    let right = Placement::in_canvas(canvas_width, WIDTH, 0, WIDTH, px)?;
    Ok((left, right))
}

fn main() {
    env_logger::init();

    let frames: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    let driver = SimDriver::new(SimCamera::structured_light("sim://0"));
    let config = DeviceConfig::from_env();
    let (min_mm, max_mm) = config.depth_range_mm;
    let mut device = MultiStreamDevice::new(Arc::new(driver.clone()), config);

    if let Err(e) = setup(&mut device) {
        eprintln!("Failed to set up device: {}", e);
        std::process::exit(1);
    }

    // Feed synthetic frames at ~30 fps until recording is done.
    let feeding = Arc::new(AtomicBool::new(true));
    let feeder = {
        let feeding = feeding.clone();
        let driver = driver.clone();
        std::thread::spawn(move || {
            let mut n: u16 = 0;
            while feeding.load(Ordering::SeqCst) {
                let depth_mm = 500 + (n % 35) * 100;
                if let Err(e) = driver
                    .inject_uniform(SensorChannel::Depth, depth_mm)
                    .and_then(|_| driver.inject_uniform(SensorChannel::Color, n % 256))
                {
                    eprintln!("Feeder: {}", e);
                    return;
                }
                n = n.wrapping_add(1);
                std::thread::sleep(Duration::from_millis(33));
            }
        })
    };

    if let Err(e) = device.wait_until_ready() {
        eprintln!("Streams not ready: {}", e);
        std::process::exit(1);
    }

    let mut recorder = RgbdRecorder::new();
    if let Err(e) = recorder.allocate_for(&device, frames) {
        eprintln!("Failed to allocate recorder: {}", e);
        std::process::exit(1);
    }

    let start = Instant::now();
    for _ in 0..frames {
        if let Err(e) = recorder.record(&device) {
            eprintln!("Record failed: {}", e);
            break;
        }
        std::thread::sleep(Duration::from_millis(33));
    }
    println!(
        "Recorded {} frames in {:.2}s",
        recorder.capacity(),
        start.elapsed().as_secs_f64()
    );

    feeding.store(false, Ordering::SeqCst);
    let _ = feeder.join();
    if let Err(e) = device.stop_all() {
        eprintln!("Stop failed: {}", e);
    }

    // Playback into a 2x1 canvas of 4-byte pixels.
    let px = ChannelLayout::Argb.pixel_size();
    let canvas_width = 2 * WIDTH;
    let mut canvas = vec![0u8; canvas_width * HEIGHT * px];
    let mut panel = vec![0u8; WIDTH * HEIGHT * px];
    let (left, right) = match side_by_side(canvas_width, px) {
        Ok(panels) => panels,
        Err(e) => {
            eprintln!("Bad canvas layout: {}", e);
            std::process::exit(1);
        }
    };

    recorder.set_index(0);
    for i in 0..recorder.capacity() {
        if let Err(e) =
            recorder.convert_depth_out(&mut panel, None, ChannelLayout::Argb, min_mm, max_mm)
        {
            eprintln!("Frame {}: {}", i, e);
            break;
        }
        copy_frame(&panel, &mut canvas, WIDTH, HEIGHT, px, left.offset, left.padding);

        match recorder.color().current_slot() {
            Ok(rgb) => {
                // Packed RGB lands in bytes 1..4 of each ARGB pixel.
                copy_pixels_interleaved(rgb, &mut panel, WIDTH, HEIGHT, 3, 1, 1);
                copy_frame(&panel, &mut canvas, WIDTH, HEIGHT, px, right.offset, right.padding);
            }
            Err(e) => {
                eprintln!("Frame {}: {}", i, e);
                break;
            }
        }

        let centre = (HEIGHT / 2 * canvas_width + WIDTH / 2) * px;
        println!(
            "frame {:3}: depth px ARGB={:?} color px ARGB={:?}",
            i,
            &canvas[centre..centre + px],
            &canvas[centre + WIDTH * px..centre + WIDTH * px + px],
        );
        recorder.advance();
    }
}
