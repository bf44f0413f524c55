//! Phone stream → virtual webcam bridge
//!
//! Forwards the phone camera's HTTP stream into a V4L2 loopback device and
//! reconnects whenever the stream drops.

use anyhow::{Context, Result};
use clap::Parser;
use cosmic_ext_stream_camera::bridge::{
    Driver, Shutdown, StreamForwarder, ThreadSleeper, V4l2SinkOpener,
};
use cosmic_ext_stream_camera::config::{BridgeConfig, InterruptPolicy, DEFAULT_HOST};
use cosmic_ext_stream_camera::video::FfmpegConnector;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Forward a stream into a virtual camera
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stream host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Stream port [default: 8000, or 8001 with --ultra-wide]
    #[arg(long)]
    port: Option<u16>,

    /// Use the phone's ultra-wide camera feed
    #[arg(long)]
    ultra_wide: bool,

    /// Virtual camera device path (e.g., /dev/video10)
    #[arg(long)]
    device: Option<PathBuf>,

    /// Seconds to wait before reconnecting
    #[arg(long, default_value_t = 2.0)]
    retry_delay: f64,

    /// What to do on Ctrl+C
    #[arg(long, value_enum, default_value_t = InterruptPolicy::Stop)]
    on_interrupt: InterruptPolicy,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Build the bridge config, starting from the selected camera preset
fn bridge_config(args: Args) -> Result<BridgeConfig> {
    let preset = if args.ultra_wide {
        BridgeConfig::ultra_wide_camera()
    } else {
        BridgeConfig::wide_camera()
    };

    Ok(BridgeConfig {
        host: args.host,
        port: args.port.unwrap_or(preset.port),
        device: args.device,
        retry_delay: Duration::try_from_secs_f64(args.retry_delay)
            .context("invalid --retry-delay")?,
        interrupt_policy: args.on_interrupt,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --debug
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = bridge_config(args)?;
    let url = config.stream_url().context("invalid stream address")?;

    info!(
        "Stream camera bridge v{} forwarding {} (interrupt policy: {:?})",
        cosmic_ext_stream_camera::VERSION,
        url,
        config.interrupt_policy
    );

    let shutdown = Shutdown::new();

    // The driver owns FFmpeg handles, so it is built on the thread that runs it
    let driver_shutdown = shutdown.clone();
    let mut driver_task = tokio::task::spawn_blocking(move || -> Result<()> {
        let connector = FfmpegConnector::new(driver_shutdown.clone());
        let forwarder = StreamForwarder::new(connector, V4l2SinkOpener, driver_shutdown);
        let mut driver = Driver::new(forwarder, &config, ThreadSleeper)?;
        driver.run();
        Ok(())
    });

    let mut interrupts = 0u32;
    loop {
        tokio::select! {
            result = &mut driver_task => {
                result.context("forwarding thread panicked")??;
                break;
            }
            interrupt = signal::ctrl_c() => {
                interrupt.context("failed to listen for Ctrl+C")?;
                interrupts += 1;
                if interrupts > 1 {
                    // Name resolution and sink writes do not observe the flag
                    warn!("Second interrupt, exiting immediately");
                    std::process::exit(130);
                }
                info!("Interrupt received, finishing current frame (Ctrl+C again to force)");
                shutdown.trigger();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(argv: &[&str]) -> Result<BridgeConfig> {
        let argv = std::iter::once("cosmic-stream-camera").chain(argv.iter().copied());
        let args = Args::try_parse_from(argv)?;
        bridge_config(args)
    }

    #[test]
    fn test_defaults_use_wide_camera() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8000);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.interrupt_policy, InterruptPolicy::Stop);
    }

    #[test]
    fn test_ultra_wide_selects_its_port() {
        assert_eq!(config_from(&["--ultra-wide"]).unwrap().port, 8001);
        assert_eq!(
            config_from(&["--ultra-wide", "--port", "9000"]).unwrap().port,
            9000
        );
    }

    #[test]
    fn test_interrupt_policy_and_device() {
        let config = config_from(&[
            "--on-interrupt",
            "restart",
            "--device",
            "/dev/video10",
            "--retry-delay",
            "0.5",
        ])
        .unwrap();
        assert_eq!(config.interrupt_policy, InterruptPolicy::Restart);
        assert_eq!(config.device, Some(PathBuf::from("/dev/video10")));
        assert_eq!(config.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_negative_retry_delay_rejected() {
        assert!(config_from(&["--retry-delay=-1"]).is_err());
    }
}
