//! Tunables for stream acquisition, overridable from the environment.
//!
//! | Variable                | Default | Meaning |
//! |-------------------------|---------|---------|
//! | `RGBD_WAIT_TIMEOUT_MS`  | 500     | bounded wait of each acquisition cycle |
//! | `RGBD_READY_TIMEOUT_MS` | unset   | deadline of `wait_until_ready`, unset waits forever |
//! | `RGBD_DEPTH_MIN_MM`     | 1       | lower bound of the default depth colormap range |
//! | `RGBD_DEPTH_MAX_MM`     | 4000    | upper bound of the default depth colormap range |

use std::time::Duration;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_DEPTH_MIN_MM: u16 = 1;
pub const DEFAULT_DEPTH_MAX_MM: u16 = 4000;

/// Per-stream acquisition settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Upper bound of one wait for new data; also the worst-case stop latency.
    pub wait_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl StreamConfig {
    pub fn from_env() -> Self {
        Self {
            wait_timeout: read_env_millis("RGBD_WAIT_TIMEOUT_MS").unwrap_or(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

/// Device-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub stream: StreamConfig,
    /// Deadline for the startup readiness barrier. `None` waits forever.
    pub ready_timeout: Option<Duration>,
    /// Default depth colormap range in millimeters.
    pub depth_range_mm: (u16, u16),
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            ready_timeout: None,
            depth_range_mm: (DEFAULT_DEPTH_MIN_MM, DEFAULT_DEPTH_MAX_MM),
        }
    }
}

impl DeviceConfig {
    pub fn from_env() -> Self {
        let config = Self {
            stream: StreamConfig::from_env(),
            ready_timeout: read_env_millis("RGBD_READY_TIMEOUT_MS"),
            depth_range_mm: (
                read_env_u16("RGBD_DEPTH_MIN_MM", DEFAULT_DEPTH_MIN_MM),
                read_env_u16("RGBD_DEPTH_MAX_MM", DEFAULT_DEPTH_MAX_MM),
            ),
        };
        log::debug!("Device config: {:?}", config);
        config
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.stream.wait_timeout = timeout;
        self
    }
}

fn read_env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn read_env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.stream.wait_timeout, Duration::from_millis(500));
        assert_eq!(config.ready_timeout, None);
        assert_eq!(config.depth_range_mm, (1, 4000));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("RGBD_TEST_MILLIS", " 250 ");
        std::env::set_var("RGBD_TEST_BAD", "soon");
        assert_eq!(
            read_env_millis("RGBD_TEST_MILLIS"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(read_env_millis("RGBD_TEST_BAD"), None);
        assert_eq!(read_env_u16("RGBD_TEST_BAD", 9), 9);
        assert_eq!(read_env_u16("RGBD_TEST_UNSET_VARIABLE", 3), 3);
    }

    #[test]
    fn test_builders() {
        let config = DeviceConfig::default()
            .with_ready_timeout(Duration::from_secs(2))
            .with_wait_timeout(Duration::from_millis(20));
        assert_eq!(config.ready_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.stream.wait_timeout, Duration::from_millis(20));
    }
}
