//! Stream-to-Camera Bridge
//!
//! Connects a network video stream to a virtual camera and keeps it
//! connected.
//!
//! ## Architecture
//!
//! ```text
//! Phone MJPEG server → SourceConnector → CaptureSession ─┐
//!                                                         ├─ StreamForwarder → VirtualCamera
//!                        StreamParams → SinkOpener ───────┘
//!
//! Driver: Disconnected → Negotiating → Streaming → Error → (2s) → Disconnected
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cosmic_ext_stream_camera::bridge::{Driver, Shutdown, StreamForwarder, ThreadSleeper, V4l2SinkOpener};
//! use cosmic_ext_stream_camera::config::BridgeConfig;
//! use cosmic_ext_stream_camera::video::FfmpegConnector;
//!
//! let shutdown = Shutdown::new();
//! let connector = FfmpegConnector::new(shutdown.clone());
//! let forwarder = StreamForwarder::new(connector, V4l2SinkOpener, shutdown.clone());
//! let mut driver = Driver::new(forwarder, &BridgeConfig::default(), ThreadSleeper)?;
//! driver.run();
//! ```

mod driver;
mod forwarder;
mod session;
mod shutdown;

pub use driver::{Driver, DriverState, Sleeper, ThreadSleeper};
pub use forwarder::{SessionEnd, SessionStats, StreamForwarder};
pub use session::{
    CaptureSession, FrameSource, SinkOpener, SourceConnector, SourceParams, StreamParams,
    V4l2SinkOpener, VirtualCamera, UNKNOWN_FPS,
};
pub use shutdown::Shutdown;
