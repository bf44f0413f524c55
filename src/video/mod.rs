//! Video Processing Module
//!
//! Frame types, pixel conversion, pacing, the FFmpeg capture source and the
//! V4L2 loopback output.
//!
//! ## Architecture
//!
//! ```text
//! HTTP MJPEG stream → FfmpegSource (RGB24) → resize → YUYV → V4L2 Loopback
//!                                                                  ↓
//!                                                       Any V4L2 application
//!                                                       (Zoom, OBS, etc.)
//! ```
//!
//! ## Requirements
//!
//! - Linux kernel with V4L2 support
//! - `v4l2loopback` kernel module loaded:
//!   ```bash
//!   sudo modprobe v4l2loopback devices=1 video_nr=10 card_label="Phone Camera" exclusive_caps=1
//!   ```
//! - FFmpeg libraries for the `ffmpeg` feature (enabled by default)

pub mod frame;
pub mod pacing;
pub mod v4l2_device;
#[cfg(feature = "ffmpeg")]
mod ffmpeg_source;

pub use frame::{FrameError, PixelFormat, VideoFrame};
pub use pacing::{Clock, FramePacer, ManualClock, SystemClock};
pub use v4l2_device::{find_loopback_devices, V4l2Error, V4l2LoopbackDevice};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_source::{FfmpegConnector, FfmpegSource};
