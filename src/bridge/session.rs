//! Capture and Sink Seams
//!
//! Traits the forwarder is generic over, the stream parameter types that
//! flow between connect, negotiate and sink open, and the scoped capture
//! session that releases its source on every exit path.

use crate::error::{ForwardError, Result};
use crate::video::{PixelFormat, V4l2Error, V4l2LoopbackDevice, VideoFrame};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Frame rate sentinel meaning "unknown, run as fast as the source allows"
pub const UNKNOWN_FPS: f64 = -1.0;

/// Stream metadata as reported by a capture source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second (None if the source does not report one)
    pub fps: Option<f64>,
}

/// Negotiated stream parameters used to open the virtual camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParams {
    /// Even frame width
    pub width: u32,
    /// Even frame height
    pub height: u32,
    /// Frames per second, or [`UNKNOWN_FPS`]
    pub fps: f64,
}

impl StreamParams {
    /// Normalize source metadata for the sink
    ///
    /// Odd dimensions lose one pixel (YUYV encodes pixel pairs). A missing,
    /// NaN, infinite or non-positive rate becomes [`UNKNOWN_FPS`].
    pub fn from_source(source: &SourceParams) -> Self {
        let fps = match source.fps {
            Some(fps) if fps > 0.0 && fps.is_finite() => fps,
            _ => UNKNOWN_FPS,
        };

        Self {
            width: source.width - source.width % 2,
            height: source.height - source.height % 2,
            fps,
        }
    }

    /// Whether the frame rate is usable by the sink (at least 1 fps)
    pub fn has_fps(&self) -> bool {
        self.fps >= 1.0
    }

    /// Integer frame rate handed to the sink (-1 when unknown or below 1)
    pub fn sink_fps(&self) -> i32 {
        if self.has_fps() {
            self.fps as i32
        } else {
            -1
        }
    }
}

impl fmt::Display for StreamParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {} FPS", self.width, self.height, self.fps)
    }
}

/// An open capture source producing decoded RGB24 frames
pub trait FrameSource {
    /// Stream metadata reported when the source was opened
    fn params(&self) -> SourceParams;

    /// Read the next frame
    ///
    /// Returns [`ForwardError::FrameReadFailure`] when the source yields no
    /// frame (end of stream, dropped connection).
    fn read_frame(&mut self) -> Result<VideoFrame>;
}

/// Opens capture sources by URL
pub trait SourceConnector {
    type Source: FrameSource;

    /// Open the source at `url`
    fn connect(&mut self, url: &str) -> Result<Self::Source>;
}

/// A virtual camera accepting frames at a fixed geometry and rate
pub trait VirtualCamera {
    /// Device path the camera is bound to
    fn device(&self) -> &Path;

    /// Pixel format frames must be converted to before [`send`](Self::send)
    fn format(&self) -> PixelFormat;

    /// Hand one frame to the device
    fn send(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Block until the next frame is due
    fn sleep_until_next_frame(&mut self);
}

/// Opens virtual cameras for negotiated stream parameters
pub trait SinkOpener {
    type Sink: VirtualCamera;

    /// Open a camera; `device` of None picks the first available one
    fn open(&mut self, params: &StreamParams, device: Option<&Path>) -> Result<Self::Sink>;
}

/// Scoped capture session
///
/// Owns the source for one forwarding attempt. Dropping the session
/// releases the source, so every exit path of the loop releases it.
pub struct CaptureSession<S: FrameSource> {
    url: String,
    source: Option<S>,
}

impl<S: FrameSource> CaptureSession<S> {
    /// Wrap an open source
    pub fn new(url: impl Into<String>, source: S) -> Self {
        Self {
            url: url.into(),
            source: Some(source),
        }
    }

    /// Stream metadata of the underlying source
    pub fn params(&self) -> Result<SourceParams> {
        self.source().map(|source| source.params())
    }

    /// Read the next frame from the underlying source
    pub fn read_frame(&mut self) -> Result<VideoFrame> {
        match self.source.as_mut() {
            Some(source) => source.read_frame(),
            None => Err(ForwardError::frame_read("capture session already released")),
        }
    }

    /// Release the source now
    pub fn release(&mut self) {
        if self.source.take().is_some() {
            info!("Released capture session for {}", self.url);
        }
    }

    fn source(&self) -> Result<&S> {
        self.source
            .as_ref()
            .ok_or_else(|| ForwardError::runtime("capture session already released"))
    }
}

impl<S: FrameSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl VirtualCamera for V4l2LoopbackDevice {
    fn device(&self) -> &Path {
        self.path()
    }

    fn format(&self) -> PixelFormat {
        V4l2LoopbackDevice::format(self)
    }

    fn send(&mut self, frame: &VideoFrame) -> Result<()> {
        self.write_frame(frame)?;
        Ok(())
    }

    fn sleep_until_next_frame(&mut self) {
        V4l2LoopbackDevice::sleep_until_next_frame(self);
    }
}

/// Opens [`V4l2LoopbackDevice`] sinks in YUYV
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2SinkOpener;

impl SinkOpener for V4l2SinkOpener {
    type Sink = V4l2LoopbackDevice;

    fn open(&mut self, params: &StreamParams, device: Option<&Path>) -> Result<Self::Sink> {
        let fps = params.sink_fps();
        let result = match device {
            Some(path) => {
                V4l2LoopbackDevice::open(path, params.width, params.height, fps, PixelFormat::YUYV)
            }
            None => V4l2LoopbackDevice::open_first_available(
                params.width,
                params.height,
                fps,
                PixelFormat::YUYV,
            ),
        };

        result.map_err(|e: V4l2Error| ForwardError::sink_unavailable(e.to_string()))
    }
}
