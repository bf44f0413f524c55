//! Retry Driver
//!
//! Explicit state machine around [`StreamForwarder`]:
//!
//! ```text
//!                 connect ok            sink open
//! Disconnected ─────────────▶ Negotiating ─────────▶ Streaming
//!      ▲                          │                      │
//!      │ fixed delay              │ failure              │ session ended
//!      └────────────────────── Error ◀───────────────────┘
//!                                 │
//!                                 └── interrupt + InterruptPolicy::Stop ──▶ Stopped
//! ```
//!
//! A failed connect goes straight to `Error`. There is no backoff and no
//! retry limit. The delay goes through a [`Sleeper`] so retry timing can be
//! observed without real sleeps.

use crate::bridge::forwarder::StreamForwarder;
use crate::bridge::session::{CaptureSession, SinkOpener, SourceConnector, StreamParams};
use crate::config::{BridgeConfig, InterruptPolicy};
use crate::error::ForwardError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};

/// Blocks between attempts
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Observable driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No source open; next step connects
    Disconnected,
    /// Source open; next step negotiates and opens the sink
    Negotiating,
    /// Source and sink open; next step runs the forward loop
    Streaming,
    /// Attempt failed; next step waits and reconnects (or stops)
    Error,
    /// Terminal
    Stopped,
}

/// State plus the handles it owns
enum Phase<C: SourceConnector, O: SinkOpener> {
    Disconnected,
    Negotiating(CaptureSession<C::Source>),
    Streaming(CaptureSession<C::Source>, StreamParams, O::Sink),
    Error(ForwardError),
    Stopped,
}

/// Drives forwarding attempts until stopped
pub struct Driver<C: SourceConnector, O: SinkOpener, S: Sleeper = ThreadSleeper> {
    forwarder: StreamForwarder<C, O>,
    sleeper: S,
    url: String,
    device: Option<PathBuf>,
    retry_delay: Duration,
    interrupt_policy: InterruptPolicy,
    phase: Phase<C, O>,
    attempts: u64,
    last_error: Option<String>,
}

impl<C: SourceConnector, O: SinkOpener, S: Sleeper> Driver<C, O, S> {
    /// Create a driver in the `Disconnected` state
    pub fn new(
        forwarder: StreamForwarder<C, O>,
        config: &BridgeConfig,
        sleeper: S,
    ) -> Result<Self, url::ParseError> {
        let url = config.stream_url()?;

        Ok(Self {
            forwarder,
            sleeper,
            url: url.to_string(),
            device: config.device.clone(),
            retry_delay: config.retry_delay,
            interrupt_policy: config.interrupt_policy,
            phase: Phase::Disconnected,
            attempts: 0,
            last_error: None,
        })
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        match self.phase {
            Phase::Disconnected => DriverState::Disconnected,
            Phase::Negotiating(..) => DriverState::Negotiating,
            Phase::Streaming(..) => DriverState::Streaming,
            Phase::Error(_) => DriverState::Error,
            Phase::Stopped => DriverState::Stopped,
        }
    }

    /// Stream URL every attempt connects to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of connect attempts so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Message of the error that ended the most recent attempt
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run until the driver stops
    pub fn run(&mut self) {
        while self.step() != DriverState::Stopped {}
        info!("Stopped after {} connection attempts", self.attempts);
    }

    /// Perform one transition and return the new state
    pub fn step(&mut self) -> DriverState {
        let phase = std::mem::replace(&mut self.phase, Phase::Stopped);

        self.phase = match phase {
            Phase::Disconnected => self.on_disconnected(),
            Phase::Negotiating(session) => self.on_negotiating(session),
            Phase::Streaming(session, params, mut sink) => {
                let end = self.forwarder.forward_loop(session, &params, &mut sink);
                drop(sink);
                Phase::Error(end.reason)
            }
            Phase::Error(reason) => self.on_error(reason),
            Phase::Stopped => Phase::Stopped,
        };

        let state = self.state();
        debug!("Driver state: {:?}", state);
        state
    }

    fn on_disconnected(&mut self) -> Phase<C, O> {
        if self.forwarder.shutdown().is_triggered() {
            return Phase::Error(ForwardError::Interrupted);
        }

        self.attempts += 1;
        match self.forwarder.connect(&self.url) {
            Ok(session) => Phase::Negotiating(session),
            Err(e) => Phase::Error(e),
        }
    }

    fn on_negotiating(&mut self, session: CaptureSession<C::Source>) -> Phase<C, O> {
        let params = match self.forwarder.negotiate(&session) {
            Ok(params) => params,
            Err(e) => {
                error!("Error: {}", e);
                return Phase::Error(e);
            }
        };

        match self.forwarder.open_sink(&params, self.device.as_deref()) {
            Ok(sink) => Phase::Streaming(session, params, sink),
            Err(e) => {
                error!("Error: {}", e);
                Phase::Error(e)
            }
        }
    }

    fn on_error(&mut self, reason: ForwardError) -> Phase<C, O> {
        let interrupted = reason.is_interrupt() || self.forwarder.shutdown().is_triggered();
        self.last_error = Some(reason.to_string());

        if interrupted {
            match self.interrupt_policy {
                InterruptPolicy::Stop => return Phase::Stopped,
                InterruptPolicy::Restart => self.forwarder.shutdown().reset(),
            }
        }

        info!("Retrying in {:.1}s", self.retry_delay.as_secs_f64());
        self.sleeper.sleep(self.retry_delay);
        Phase::Disconnected
    }
}
