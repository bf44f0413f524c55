//! cosmic-ext-stream-camera
//!
//! Forwards the phone camera's HTTP video stream into a V4L2 loopback
//! device, so any desktop application can use the phone as a webcam.
//!
//! ## Architecture
//!
//! A single blocking forwarding loop (read → resize → YUYV → write → pace)
//! wrapped in a retry driver that reconnects after a fixed delay whenever
//! the stream or the device goes away.
//!
//! ### Modules
//!
//! - `bridge`: Forwarder stages, capture/sink seams, retry state machine
//! - `video`: Frames, pixel conversion, pacing, FFmpeg source, V4L2 output
//! - `config`: Process configuration and stream endpoint
//! - `error`: Forwarding error taxonomy
//!
//! ## Example
//!
//! ```rust
//! use cosmic_ext_stream_camera::bridge::{SourceParams, StreamParams};
//!
//! let params = StreamParams::from_source(&SourceParams {
//!     width: 1281,
//!     height: 721,
//!     fps: None,
//! });
//! assert_eq!((params.width, params.height, params.fps), (1280, 720, -1.0));
//! ```

pub use error::{ForwardError, Result};

pub mod bridge;
pub mod config;
pub mod error;
pub mod video;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
