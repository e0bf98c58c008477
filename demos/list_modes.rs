//! Print the sensor mode tables of a simulated structured-light camera.
//!
//! Usage: cargo run --example list_modes

use std::sync::Arc;

use rgbd::sim::{SimCamera, SimDriver};
use rgbd::{DeviceConfig, MultiStreamDevice};

fn main() {
    env_logger::init();

    let driver = Arc::new(SimDriver::new(SimCamera::structured_light("sim://0")));
    let mut device = MultiStreamDevice::new(driver, DeviceConfig::from_env());
    if let Err(e) = device.open(None) {
        eprintln!("Failed to open device: {}", e);
        std::process::exit(1);
    }

    match device.list_sensor_modes() {
        Ok(tables) => {
            for table in tables {
                print!("{}", table);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    match device.capabilities() {
        Ok(caps) => println!("Capabilities: {:?}", caps),
        Err(e) => eprintln!("Error: {}", e),
    }
}
