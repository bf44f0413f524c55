//! Bridge configuration

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default stream host (phone reached through `adb forward`)
pub const DEFAULT_HOST: &str = "localhost";

/// Port of the wide camera MJPEG feed
pub const WIDE_CAMERA_PORT: u16 = 8000;

/// Port of the ultra-wide camera MJPEG feed
pub const ULTRA_WIDE_CAMERA_PORT: u16 = 8001;

/// Fixed delay between forwarding attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What the driver does after a user interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum InterruptPolicy {
    /// Tear down the current attempt and stop
    #[default]
    Stop,
    /// Tear down the current attempt and reconnect after the retry delay
    Restart,
}

/// Configuration for one bridge process
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Stream host
    pub host: String,
    /// Stream port
    pub port: u16,
    /// Loopback device to claim (None = first available)
    pub device: Option<PathBuf>,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Behavior on interrupt
    pub interrupt_policy: InterruptPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: WIDE_CAMERA_PORT,
            device: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            interrupt_policy: InterruptPolicy::Stop,
        }
    }
}

impl BridgeConfig {
    /// Config for the phone's wide camera feed
    pub fn wide_camera() -> Self {
        Self::default()
    }

    /// Config for the phone's ultra-wide camera feed
    pub fn ultra_wide_camera() -> Self {
        Self {
            port: ULTRA_WIDE_CAMERA_PORT,
            ..Default::default()
        }
    }

    /// Stream endpoint, `http://<host>:<port>`
    pub fn stream_url(&self) -> Result<Url, url::ParseError> {
        // Bare IPv6 literals need brackets in a URL authority
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        Url::parse(&format!("http://{}:{}", host, self.port))
    }
}
