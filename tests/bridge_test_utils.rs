//! Bridge Testing Utilities
//!
//! Scriptable capture sources, connectors, virtual cameras and sleepers for
//! exercising the forwarder and the retry driver without a network stream
//! or a v4l2loopback device.

#![allow(dead_code)]

use cosmic_ext_stream_camera::bridge::{
    FrameSource, Shutdown, SinkOpener, Sleeper, SourceConnector, SourceParams, StreamParams,
    VirtualCamera,
};
use cosmic_ext_stream_camera::video::{FramePacer, ManualClock, PixelFormat, VideoFrame};
use cosmic_ext_stream_camera::{ForwardError, Result};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Solid-color RGB24 frame
pub fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> VideoFrame {
    VideoFrame::from_data(
        width,
        height,
        PixelFormat::RGB24,
        Duration::ZERO,
        rgb.repeat((width * height) as usize),
    )
    .expect("valid frame geometry")
}

/// What a mock source does once its frames run out
#[derive(Debug, Clone)]
pub enum SourceEnd {
    /// Report a frame read failure (stream dropped)
    ReadFailure,
    /// Report a runtime failure (decoder blew up)
    Error(String),
}

/// Observations shared between a mock source and the test
#[derive(Debug, Clone, Default)]
pub struct SourceWatch {
    pub reads: Rc<Cell<u32>>,
    pub released: Rc<Cell<bool>>,
}

/// Capture source replaying a fixed list of frames
pub struct MockSource {
    params: SourceParams,
    frames: VecDeque<VideoFrame>,
    end: SourceEnd,
    interrupt: Option<(u32, Shutdown)>,
    watch: SourceWatch,
}

impl MockSource {
    /// Source reporting `params` that yields `frames`, then `end`
    pub fn new(params: SourceParams, frames: Vec<VideoFrame>, end: SourceEnd) -> Self {
        Self {
            params,
            frames: frames.into(),
            end,
            interrupt: None,
            watch: SourceWatch::default(),
        }
    }

    /// Source of `count` solid frames at the reported geometry
    pub fn uniform(width: u32, height: u32, fps: Option<f64>, count: usize) -> Self {
        let frames = (0..count)
            .map(|i| solid_frame(width, height, [(i * 10) as u8, 128, 64]))
            .collect();
        Self::new(SourceParams { width, height, fps }, frames, SourceEnd::ReadFailure)
    }

    /// Raise `shutdown` when the `nth` frame (1-based) is read
    pub fn interrupt_on_read(mut self, nth: u32, shutdown: Shutdown) -> Self {
        self.interrupt = Some((nth, shutdown));
        self
    }

    /// Finish with `end` instead of the default read failure
    pub fn ending_with(mut self, end: SourceEnd) -> Self {
        self.end = end;
        self
    }

    /// Handle for observing reads and release
    pub fn watch(&self) -> SourceWatch {
        self.watch.clone()
    }
}

impl FrameSource for MockSource {
    fn params(&self) -> SourceParams {
        self.params
    }

    fn read_frame(&mut self) -> Result<VideoFrame> {
        let reads = self.watch.reads.get() + 1;
        self.watch.reads.set(reads);

        if let Some((nth, shutdown)) = &self.interrupt {
            if *nth == reads {
                shutdown.trigger();
            }
        }

        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None => match &self.end {
                SourceEnd::ReadFailure => Err(ForwardError::frame_read("no frame")),
                SourceEnd::Error(msg) => Err(ForwardError::runtime(msg.clone())),
            },
        }
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.watch.released.set(true);
    }
}

/// Connector handing out scripted sources
///
/// Each queued `None` is a failed connect. Once the script is exhausted every
/// connect fails, and raises `shutdown_when_exhausted` if set.
pub struct MockConnector {
    script: VecDeque<Option<MockSource>>,
    shutdown_when_exhausted: Option<Shutdown>,
    pub urls: Rc<RefCell<Vec<String>>>,
}

impl MockConnector {
    pub fn new(script: Vec<Option<MockSource>>) -> Self {
        Self {
            script: script.into(),
            shutdown_when_exhausted: None,
            urls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Connector that fails `count` times
    pub fn failing(count: usize) -> Self {
        Self::new((0..count).map(|_| None).collect())
    }

    pub fn stop_when_exhausted(mut self, shutdown: Shutdown) -> Self {
        self.shutdown_when_exhausted = Some(shutdown);
        self
    }
}

impl SourceConnector for MockConnector {
    type Source = MockSource;

    fn connect(&mut self, url: &str) -> Result<MockSource> {
        self.urls.borrow_mut().push(url.to_string());

        match self.script.pop_front() {
            Some(Some(source)) => Ok(source),
            Some(None) => Err(ForwardError::connection(url, "Connection refused")),
            None => {
                if let Some(shutdown) = &self.shutdown_when_exhausted {
                    shutdown.trigger();
                }
                Err(ForwardError::connection(url, "Connection refused"))
            }
        }
    }
}

/// A frame as received by a mock camera
#[derive(Debug, Clone)]
pub struct SentFrame {
    /// Manual clock reading when the frame was sent
    pub at: Duration,
    pub frame: VideoFrame,
}

/// Shared log of everything a mock camera saw
#[derive(Debug, Default)]
pub struct SinkLog {
    pub opened: Vec<(StreamParams, Option<PathBuf>)>,
    pub sent: Vec<SentFrame>,
    pub closed: u32,
}

/// Virtual camera recording frames against a manual clock
pub struct MockCamera {
    path: PathBuf,
    params: StreamParams,
    clock: ManualClock,
    pacer: FramePacer<ManualClock>,
    log: Rc<RefCell<SinkLog>>,
}

impl VirtualCamera for MockCamera {
    fn device(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::YUYV
    }

    fn send(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.dimensions() != (self.params.width, self.params.height) {
            return Err(ForwardError::runtime("frame size mismatch"));
        }
        self.log.borrow_mut().sent.push(SentFrame {
            at: self.clock.elapsed(),
            frame: frame.clone(),
        });
        Ok(())
    }

    fn sleep_until_next_frame(&mut self) {
        self.pacer.sleep_until_next_frame();
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.log.borrow_mut().closed += 1;
    }
}

/// Opens [`MockCamera`]s, optionally failing the first few opens
pub struct MockCameraOpener {
    pub clock: ManualClock,
    pub log: Rc<RefCell<SinkLog>>,
    failures: u32,
}

impl MockCameraOpener {
    pub fn new() -> Self {
        Self {
            clock: ManualClock::new(),
            log: Rc::new(RefCell::new(SinkLog::default())),
            failures: 0,
        }
    }

    /// Fail the first `count` opens with SinkUnavailable
    pub fn failing_first(mut self, count: u32) -> Self {
        self.failures = count;
        self
    }
}

impl SinkOpener for MockCameraOpener {
    type Sink = MockCamera;

    fn open(&mut self, params: &StreamParams, device: Option<&Path>) -> Result<MockCamera> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ForwardError::sink_unavailable("no loopback device"));
        }

        self.log
            .borrow_mut()
            .opened
            .push((*params, device.map(Path::to_path_buf)));

        Ok(MockCamera {
            path: device
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/dev/video10")),
            params: *params,
            clock: self.clock.clone(),
            pacer: FramePacer::with_clock(params.sink_fps(), self.clock.clone()),
            log: Rc::clone(&self.log),
        })
    }
}

/// Sleeper that records requested delays instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pub sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}
