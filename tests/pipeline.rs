//! End-to-end runs of the acquisition, colormap and recording path against
//! the simulated camera.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rgbd::sim::{SimCamera, SimDriver};
use rgbd::types::RawFrame;
use rgbd::{
    ChannelLayout, DeviceConfig, MultiStreamDevice, Placement, RgbdError, RgbdRecorder,
    SensorChannel, StreamState,
};

fn open_device() -> (SimDriver, MultiStreamDevice) {
    let driver = SimDriver::new(SimCamera::structured_light("sim://0"));
    let config = DeviceConfig::default()
        .with_wait_timeout(Duration::from_millis(10))
        .with_ready_timeout(Duration::from_secs(5));
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
fn test_zero_depth_frame_maps_to_black() {
    let (driver, mut device) = open_device();
    device.create_stream(SensorChannel::Depth, 1, false).unwrap();
    device.start_all().unwrap();

    driver
        .inject_frame(
            SensorChannel::Depth,
            RawFrame {
                data: vec![0; 640 * 480 * 2],
                width: 640,
                height: 480,
                stride_bytes: 640 * 2,
                timestamp_us: 0,
            },
        )
        .unwrap();
    device.wait_until_ready().unwrap();
    assert_eq!(
        device.stream(SensorChannel::Depth).state(),
        StreamState::Streaming
    );

    let mut rgb = vec![0xAAu8; 640 * 480 * 3];
    device
        .convert_to_colormap(SensorChannel::Depth, &mut rgb, ChannelLayout::Rgb, 1, 4000)
        .unwrap();
    assert!(rgb.iter().all(|&b| b == 0));

    // Default range from the config is 1..=4000 mm as well.
    rgb.fill(0xAA);
    device.convert_depth(&mut rgb, ChannelLayout::Rgb).unwrap();
    assert!(rgb.iter().all(|&b| b == 0));

    device.stop_all().unwrap();
    device.close();
}

#[test]
fn test_side_by_side_canvas() {
    let (driver, mut device) = open_device();
    device.create_stream(SensorChannel::Depth, 0, false).unwrap();
    device.create_stream(SensorChannel::Infrared, 0, false).unwrap();
    device.start_all().unwrap();
    driver.inject_uniform(SensorChannel::Depth, 0).unwrap();
    driver.inject_uniform(SensorChannel::Infrared, 0x0102).unwrap();
    device.wait_until_ready().unwrap();

    // 320x240 depth (2 bytes) left of a 640-pixel-wide 16-bit canvas.
    let canvas_width = 640;
    let left = Placement::in_canvas(canvas_width, 0, 0, 320, 2).unwrap();
    let right = Placement::in_canvas(canvas_width, 320, 0, 320, 2).unwrap();
    let mut canvas = vec![0xFFu8; canvas_width * 240 * 2];
    device
        .extract(SensorChannel::Depth, &mut canvas, left.offset, left.padding)
        .unwrap();
    assert!(canvas[..640].iter().all(|&b| b == 0));
    assert!(canvas[640..1280].iter().all(|&b| b == 0xFF));

    // The 640x480 IR frame does not fit the right half.
    assert!(matches!(
        device.extract(SensorChannel::Infrared, &mut canvas, right.offset, right.padding),
        Err(RgbdError::BufferTooSmall { .. })
    ));
}

#[test]
fn test_record_and_replay_loop() {
    let camera = SimCamera::structured_light("sim://0");
    let driver = SimDriver::new(camera);
    let config = DeviceConfig::default().with_wait_timeout(Duration::from_millis(10));
    let mut device = MultiStreamDevice::new(Arc::new(driver.clone()), config);
    device.open(None).unwrap();
    // 640x480 depth in 100 um units, 640x480 color.
    device.create_stream(SensorChannel::Depth, 2, false).unwrap();
    device.create_stream(SensorChannel::Color, 0, false).unwrap();
    device.start_all().unwrap();

    let mut recorder = RgbdRecorder::new();
    recorder.allocate_for(&device, 3).unwrap();

    let depth = device.stream(SensorChannel::Depth);
    let color = device.stream(SensorChannel::Color);
    for i in 1..=3u16 {
        // i meters in 100 um units.
        driver.inject_uniform(SensorChannel::Depth, i * 10_000).unwrap();
        driver.inject_uniform(SensorChannel::Color, i).unwrap();
        wait_for(|| {
            depth.frames_acquired() == u64::from(i) && color.frames_acquired() == u64::from(i)
        });
        recorder.record(&device).unwrap();
    }
    assert_eq!(recorder.index(), 0);

    let mut rgb = vec![0u8; 640 * 480 * 3];
    recorder.copy_color_out(&mut rgb, Some(1), 0, 0).unwrap();
    assert!(rgb.iter().all(|&b| b == 2));

    // 2 m sits inside [1000, 3000] mm; 3 m is at the upper bound.
    let mut argb = vec![0u8; 640 * 480 * 4];
    recorder
        .convert_depth_out(&mut argb, Some(1), ChannelLayout::Argb, 1000, 3000)
        .unwrap();
    assert_eq!(&argb[1..4], &rgbd::jet(2000, 1000, 3000)[..]);
    recorder
        .convert_depth_out(&mut argb, Some(0), ChannelLayout::Argb, 1500, 3000)
        .unwrap();
    assert_eq!(&argb[1..4], &[0, 0, 0][..]);
    assert_eq!(argb[0], 0);

    recorder.set_index(-1);
    assert_eq!(recorder.index(), 2);
    assert!(recorder.depth().timestamp(None).unwrap().is_some());
}
