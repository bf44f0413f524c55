//! V4L2 Loopback Device Management
//!
//! Provides the virtual webcam output: an open, configured v4l2loopback node
//! that accepts raw frames through `write(2)`.
//!
//! ## Prerequisites
//!
//! The `v4l2loopback` kernel module must be loaded:
//!
//! ```bash
//! # Install the module (Debian/Ubuntu)
//! sudo apt install v4l2loopback-dkms
//!
//! # Load with a specific device number
//! sudo modprobe v4l2loopback devices=1 video_nr=10 card_label="Phone Camera" exclusive_caps=1
//! ```

use crate::video::frame::{PixelFormat, VideoFrame};
use crate::video::pacing::FramePacer;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use v4l::prelude::*;
use v4l::video::output::Parameters;
use v4l::video::Output;
use v4l::FourCC;

/// Error types for V4L2 operations
#[derive(Debug)]
pub enum V4l2Error {
    /// Device not found
    DeviceNotFound(String),
    /// No loopback device could be claimed
    NoLoopbackDevice,
    /// Failed to open device
    OpenError(String),
    /// Device configuration error
    ConfigError(String),
    /// Write error
    WriteError(String),
    /// Format not supported
    UnsupportedFormat(String),
    /// Permission denied
    PermissionDenied(String),
}

impl fmt::Display for V4l2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            V4l2Error::DeviceNotFound(path) => write!(f, "V4L2 device not found: {}", path),
            V4l2Error::NoLoopbackDevice => write!(
                f,
                "no v4l2loopback device available, load the module with 'modprobe v4l2loopback'"
            ),
            V4l2Error::OpenError(msg) => write!(f, "Failed to open V4L2 device: {}", msg),
            V4l2Error::ConfigError(msg) => write!(f, "V4L2 configuration error: {}", msg),
            V4l2Error::WriteError(msg) => write!(f, "V4L2 write error: {}", msg),
            V4l2Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            V4l2Error::PermissionDenied(path) => {
                write!(f, "Permission denied for {}, try adding user to 'video' group", path)
            }
        }
    }
}

impl std::error::Error for V4l2Error {}

/// V4L2 loopback device for virtual webcam output
///
/// Geometry, rate and pixel format are fixed when the device is opened.
/// The device node is closed when the handle is dropped.
pub struct V4l2LoopbackDevice {
    /// Device path (e.g., /dev/video10)
    path: PathBuf,
    /// Device file for raw writes
    device: Option<File>,
    /// Configured width
    width: u32,
    /// Configured height
    height: u32,
    /// Configured frame rate (-1 = unknown)
    fps: i32,
    /// Configured pixel format
    format: PixelFormat,
    /// Paces writes to `fps`
    pacer: FramePacer,
    /// Frames written counter
    frames_written: u64,
}

impl V4l2LoopbackDevice {
    /// Open and configure the loopback device at `path`
    pub fn open(
        path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        fps: i32,
        format: PixelFormat,
    ) -> Result<Self, V4l2Error> {
        let path = path.into();

        info!(
            "Opening V4L2 loopback device {} ({}x{} @ {} fps, {})",
            path.display(),
            width,
            height,
            fps,
            format
        );

        if !path.exists() {
            return Err(V4l2Error::DeviceNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                V4l2Error::PermissionDenied(path.display().to_string())
            } else {
                V4l2Error::OpenError(e.to_string())
            }
        })?;

        Self::configure(&path, width, height, fps, format)?;

        Ok(Self {
            path,
            device: Some(file),
            width,
            height,
            fps,
            format,
            pacer: FramePacer::new(fps),
            frames_written: 0,
        })
    }

    /// Open the first loopback device on the system that can be claimed
    pub fn open_first_available(
        width: u32,
        height: u32,
        fps: i32,
        format: PixelFormat,
    ) -> Result<Self, V4l2Error> {
        for path in find_loopback_devices() {
            match Self::open(&path, width, height, fps, format) {
                Ok(device) => return Ok(device),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        Err(V4l2Error::NoLoopbackDevice)
    }

    /// Set output format and frame interval on the device
    ///
    /// v4l2loopback accepts writes even when these ioctls are refused, so
    /// only a device that cannot be opened at all is an error.
    fn configure(
        path: &Path,
        width: u32,
        height: u32,
        fps: i32,
        format: PixelFormat,
    ) -> Result<(), V4l2Error> {
        let device = Device::with_path(path).map_err(|e| V4l2Error::OpenError(e.to_string()))?;

        let fourcc = FourCC::new(&format.fourcc());
        let mut fmt = v4l::Format::new(width, height, fourcc);
        fmt.stride = format.bytes_per_line(width);
        fmt.size = format.buffer_size(width, height) as u32;

        if let Err(e) = Output::set_format(&device, &fmt) {
            warn!("Could not set V4L2 format (may still work): {}", e);
        }

        if fps > 0 {
            if let Err(e) = Output::set_params(&device, &Parameters::with_fps(fps as u32)) {
                warn!("Could not set V4L2 frame interval: {}", e);
            }
        }

        debug!(
            "Set V4L2 format: {}x{}, fourcc={}, stride={}",
            width, height, fourcc, fmt.stride
        );

        Ok(())
    }

    /// Write a frame to the V4L2 device
    ///
    /// The frame must already match the device geometry and pixel format.
    pub fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), V4l2Error> {
        let Some(device) = self.device.as_mut() else {
            return Err(V4l2Error::OpenError("Device not opened".into()));
        };

        if frame.format != self.format {
            return Err(V4l2Error::UnsupportedFormat(format!(
                "frame is {:?}, device expects {:?}",
                frame.format, self.format
            )));
        }

        if frame.width != self.width || frame.height != self.height {
            return Err(V4l2Error::ConfigError(format!(
                "Frame dimensions {}x{} don't match device {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        device
            .write_all(&frame.data)
            .map_err(|e| V4l2Error::WriteError(e.to_string()))?;

        self.frames_written += 1;
        Ok(())
    }

    /// Block until the next frame is due at the configured rate
    pub fn sleep_until_next_frame(&mut self) {
        self.pacer.sleep_until_next_frame();
    }

    /// Close the device
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            info!(
                "Closing V4L2 loopback device {} (wrote {} frames)",
                self.path.display(),
                self.frames_written
            );
        }
    }

    /// Check if device is open
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Get device path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get configured dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get configured frame rate (-1 = unknown)
    pub fn fps(&self) -> i32 {
        self.fps
    }

    /// Get configured pixel format
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Get number of frames written
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for V4l2LoopbackDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Find available V4L2 loopback devices on the system, sorted by path
pub fn find_loopback_devices() -> Vec<PathBuf> {
    let mut devices: Vec<PathBuf> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with("video"))
        })
        .filter(|path| is_loopback_device(path))
        .collect();

    devices.sort_by_key(|path| device_number(path));
    devices
}

/// Check if a V4L2 device is a loopback device
fn is_loopback_device(path: &Path) -> bool {
    let Ok(device) = Device::with_path(path) else {
        return false;
    };
    let Ok(caps) = device.query_caps() else {
        return false;
    };

    // v4l2loopback shows up as output-capable
    let has_output = caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_OUTPUT);

    has_output && caps.driver.contains("v4l2 loopback")
}

/// Numeric suffix of a /dev/videoN path, so video2 sorts before video10
fn device_number(path: &Path) -> (u32, String) {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let number = name
        .trim_start_matches("video")
        .parse()
        .unwrap_or(u32::MAX);
    (number, name.to_string())
}
