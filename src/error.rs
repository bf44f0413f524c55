//! Error types for cosmic-ext-stream-camera

use crate::video::V4l2Error;
use thiserror::Error;

/// Result type alias using ForwardError
pub type Result<T> = std::result::Result<T, ForwardError>;

/// Forwarding error types
///
/// Every stage of a forwarding attempt (connect, negotiate, sink open,
/// frame read) reports one of these as a value. None of them are fatal to
/// the process; the driver decides whether to retry.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The capture source could not be opened
    #[error("could not open video stream {url}: {reason}")]
    ConnectionFailure { url: String, reason: String },

    /// The source returned no frame mid-stream
    #[error("frame read failed: {0}")]
    FrameReadFailure(String),

    /// No virtual camera device could be claimed
    #[error("virtual camera unavailable: {0}")]
    SinkUnavailable(String),

    /// The source reported parameters the sink cannot use
    #[error("invalid stream parameters: {0}")]
    InvalidStream(String),

    /// User-initiated shutdown
    #[error("interrupted")]
    Interrupted,

    /// Any other failure during one attempt
    #[error("{0}")]
    Runtime(String),
}

impl ForwardError {
    /// Create a ConnectionFailure error
    pub fn connection(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a FrameReadFailure error
    pub fn frame_read(msg: impl Into<String>) -> Self {
        Self::FrameReadFailure(msg.into())
    }

    /// Create a SinkUnavailable error
    pub fn sink_unavailable(msg: impl Into<String>) -> Self {
        Self::SinkUnavailable(msg.into())
    }

    /// Create a Runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Whether this error ends the session because of a user interrupt
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

// Device write failures mid-stream are runtime failures; open failures are
// mapped to SinkUnavailable explicitly where the sink is opened.
impl From<V4l2Error> for ForwardError {
    fn from(err: V4l2Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ForwardError::connection("http://localhost:8000", "refused");
        assert!(matches!(err, ForwardError::ConnectionFailure { .. }));
        assert!(!err.is_interrupt());
        assert!(ForwardError::Interrupted.is_interrupt());
    }

    #[test]
    fn test_error_display() {
        let err = ForwardError::connection("http://localhost:8000", "Connection refused");
        assert_eq!(
            err.to_string(),
            "could not open video stream http://localhost:8000: Connection refused"
        );

        let err = ForwardError::frame_read("end of stream");
        assert_eq!(err.to_string(), "frame read failed: end of stream");
    }

    #[test]
    fn test_v4l2_error_becomes_runtime() {
        let err: ForwardError = V4l2Error::WriteError("broken pipe".into()).into();
        assert!(matches!(err, ForwardError::Runtime(_)));
        assert_eq!(err.to_string(), "V4L2 write error: broken pipe");
    }
}
