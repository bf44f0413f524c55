//! Stream Forwarder
//!
//! One forwarding attempt, split into stages that each return a typed
//! result:
//!
//! ```text
//! connect(url) → negotiate(session) → open_sink(params) → forward_loop(session, sink)
//! ```
//!
//! The forward loop reads a frame, resizes it to the negotiated geometry if
//! needed, converts it to the sink's pixel format, hands it to the sink and
//! then waits in the sink's pacer. It runs until a read fails, another stage
//! fails, or the shutdown flag is raised.

use crate::bridge::session::{
    CaptureSession, SinkOpener, SourceConnector, StreamParams, VirtualCamera,
};
use crate::bridge::shutdown::Shutdown;
use crate::error::{ForwardError, Result};
use crate::video::VideoFrame;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters for one streaming session
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Frames handed to the sink
    pub frames_forwarded: u64,
    /// Frames that needed a resize first
    pub frames_resized: u64,
    /// When streaming started
    pub started: Instant,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            frames_forwarded: 0,
            frames_resized: 0,
            started: Instant::now(),
        }
    }

    /// Time since streaming started
    pub fn duration(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average delivered frame rate over the session
    pub fn effective_fps(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.frames_forwarded as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of one [`StreamForwarder::forward_loop`] run
#[derive(Debug)]
pub struct SessionEnd {
    /// Why the session stopped
    pub reason: ForwardError,
    /// Session counters at the time it stopped
    pub stats: SessionStats,
}

/// Forwards frames from a capture source into a virtual camera
pub struct StreamForwarder<C: SourceConnector, O: SinkOpener> {
    connector: C,
    opener: O,
    shutdown: Shutdown,
}

impl<C: SourceConnector, O: SinkOpener> StreamForwarder<C, O> {
    /// Create a forwarder from a source connector and a sink opener
    pub fn new(connector: C, opener: O, shutdown: Shutdown) -> Self {
        Self {
            connector,
            opener,
            shutdown,
        }
    }

    /// Shutdown flag observed by the forward loop
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Open the capture source at `url`
    pub fn connect(&mut self, url: &str) -> Result<CaptureSession<C::Source>> {
        info!("Connecting to {}...", url);

        match self.connector.connect(url) {
            Ok(source) => Ok(CaptureSession::new(url, source)),
            Err(e) => {
                error!(
                    "Could not open video stream: {}. Make sure the phone app is running and the ADB port forward is set.",
                    e
                );
                Err(e)
            }
        }
    }

    /// Read and normalize the stream parameters of an open session
    pub fn negotiate(&self, session: &CaptureSession<C::Source>) -> Result<StreamParams> {
        let source = session.params()?;
        let params = StreamParams::from_source(&source);

        if params.width == 0 || params.height == 0 {
            return Err(ForwardError::InvalidStream(format!(
                "stream reported a {}x{} frame size",
                source.width, source.height
            )));
        }

        info!("Stream detected: {}", params);
        Ok(params)
    }

    /// Open a virtual camera matching `params`
    pub fn open_sink(&mut self, params: &StreamParams, device: Option<&Path>) -> Result<O::Sink> {
        let sink = self.opener.open(params, device)?;
        info!("Virtual camera started: {}", sink.device().display());
        Ok(sink)
    }

    /// Forward frames until the session ends
    ///
    /// The capture session is released before this returns, whatever the
    /// reason. The sink is dropped by the caller.
    pub fn forward_loop(
        &self,
        mut session: CaptureSession<C::Source>,
        params: &StreamParams,
        sink: &mut O::Sink,
    ) -> SessionEnd {
        let mut stats = SessionStats::new();
        let reason = self.run_frames(&mut session, params, sink, &mut stats);

        match &reason {
            ForwardError::FrameReadFailure(msg) => {
                warn!("Frame read failed ({}). Attempting to reconnect...", msg)
            }
            ForwardError::Interrupted => info!("Stopping..."),
            e => error!("Error: {}", e),
        }

        session.release();

        info!(
            "Session ended after {} frames ({} resized) in {:.1}s, {:.1} fps",
            stats.frames_forwarded,
            stats.frames_resized,
            stats.duration().as_secs_f64(),
            stats.effective_fps()
        );

        SessionEnd { reason, stats }
    }

    fn run_frames(
        &self,
        session: &mut CaptureSession<C::Source>,
        params: &StreamParams,
        sink: &mut O::Sink,
        stats: &mut SessionStats,
    ) -> ForwardError {
        loop {
            if self.shutdown.is_triggered() {
                return ForwardError::Interrupted;
            }

            let frame = match session.read_frame() {
                Ok(frame) => frame,
                // A read aborted by the interrupt is not a stream failure
                Err(_) if self.shutdown.is_triggered() => return ForwardError::Interrupted,
                Err(e) => return e,
            };

            if let Err(e) = self.forward_frame(frame, params, sink, stats) {
                return e;
            }

            sink.sleep_until_next_frame();
        }
    }

    fn forward_frame(
        &self,
        frame: VideoFrame,
        params: &StreamParams,
        sink: &mut O::Sink,
        stats: &mut SessionStats,
    ) -> Result<()> {
        let frame = match frame
            .resized(params.width, params.height)
            .map_err(|e| ForwardError::runtime(format!("resize failed: {}", e)))?
        {
            Some(resized) => {
                if stats.frames_resized == 0 {
                    debug!(
                        "Resizing frames from {}x{} to {}x{}",
                        frame.width, frame.height, params.width, params.height
                    );
                }
                stats.frames_resized += 1;
                resized
            }
            None => frame,
        };

        let converted = frame
            .convert(sink.format())
            .map_err(|e| ForwardError::runtime(format!("color conversion failed: {}", e)))?;

        sink.send(&converted)?;
        stats.frames_forwarded += 1;
        Ok(())
    }
}
