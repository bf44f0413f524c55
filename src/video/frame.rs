//! Video Frame Types
//!
//! Defines frame buffers and pixel format types for the forwarding pipeline.
//! Frames are contiguous (no row padding) in a single packed buffer.

use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fmt;
use std::time::Duration;

/// Pixel format for video frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV (YUV 4:2:2 packed) - virtual camera output format
    YUYV,
    /// RGB24 (8 bits per channel, packed) - decoder output format
    RGB24,
}

impl PixelFormat {
    /// Get the V4L2 fourcc bytes for this format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::YUYV => *b"YUYV",
            PixelFormat::RGB24 => *b"RGB3",
        }
    }

    /// Calculate the buffer size needed for a frame
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        height as usize * self.bytes_per_line(width) as usize
    }

    /// Calculate bytes per line for this format
    pub fn bytes_per_line(&self, width: u32) -> u32 {
        match self {
            PixelFormat::YUYV => width * 2,
            PixelFormat::RGB24 => width * 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::YUYV => write!(f, "YUYV (YUV 4:2:2 packed)"),
            PixelFormat::RGB24 => write!(f, "RGB24"),
        }
    }
}

/// Error returned when a frame cannot be resized or converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer length does not match the frame geometry
    BufferSize { expected: usize, actual: usize },
    /// Conversion between the two formats is not supported
    UnsupportedConversion(PixelFormat, PixelFormat),
    /// YUYV needs an even width (pixels are encoded in pairs)
    OddWidth(u32),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BufferSize { expected, actual } => {
                write!(f, "frame buffer is {} bytes, expected {}", actual, expected)
            }
            FrameError::UnsupportedConversion(from, to) => {
                write!(f, "cannot convert {:?} to {:?}", from, to)
            }
            FrameError::OddWidth(width) => {
                write!(f, "YUYV requires an even width, got {}", width)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A decoded video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Presentation timestamp
    pub timestamp: Duration,
    /// Frame data buffer
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Create a frame from existing data
    pub fn from_data(
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: Duration,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = format.buffer_size(width, height);
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            format,
            timestamp,
            data,
        })
    }

    /// Frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize the frame to exactly `width` x `height` (bilinear)
    ///
    /// Returns `None` when the frame already has those dimensions, so callers
    /// can keep the original without copying.
    pub fn resized(&self, width: u32, height: u32) -> Result<Option<VideoFrame>, FrameError> {
        if self.dimensions() == (width, height) {
            return Ok(None);
        }

        if self.format != PixelFormat::RGB24 {
            return Err(FrameError::UnsupportedConversion(self.format, PixelFormat::RGB24));
        }

        let expected = self.format.buffer_size(self.width, self.height);
        let source = RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::BufferSize {
                expected,
                actual: self.data.len(),
            },
        )?;

        let scaled = imageops::resize(&source, width, height, FilterType::Triangle);

        Ok(Some(VideoFrame {
            width,
            height,
            format: PixelFormat::RGB24,
            timestamp: self.timestamp,
            data: scaled.into_raw(),
        }))
    }

    /// Convert frame to a different pixel format
    ///
    /// Supports RGB24 → YUYV and YUYV → RGB24.
    pub fn convert(&self, target_format: PixelFormat) -> Result<VideoFrame, FrameError> {
        let expected = self.format.buffer_size(self.width, self.height);
        if self.data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }

        match (self.format, target_format) {
            (a, b) if a == b => Ok(self.clone()),
            (PixelFormat::RGB24, PixelFormat::YUYV) => self.rgb24_to_yuyv(),
            (PixelFormat::YUYV, PixelFormat::RGB24) => Ok(self.yuyv_to_rgb24()),
            (a, b) => Err(FrameError::UnsupportedConversion(a, b)),
        }
    }

    /// Convert RGB24 to YUYV
    ///
    /// BT.601 limited range. Each pixel keeps its own luma; the pair shares
    /// chroma computed from the averaged RGB of both pixels.
    fn rgb24_to_yuyv(&self) -> Result<VideoFrame, FrameError> {
        if self.width % 2 != 0 {
            return Err(FrameError::OddWidth(self.width));
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let mut yuyv_data = vec![0u8; width * height * 2];

        for (src_row, dst_row) in self
            .data
            .chunks_exact(width * 3)
            .zip(yuyv_data.chunks_exact_mut(width * 2))
        {
            for (px, out) in src_row.chunks_exact(6).zip(dst_row.chunks_exact_mut(4)) {
                let (r0, g0, b0) = (px[0] as i32, px[1] as i32, px[2] as i32);
                let (r1, g1, b1) = (px[3] as i32, px[4] as i32, px[5] as i32);

                let r = (r0 + r1 + 1) / 2;
                let g = (g0 + g1 + 1) / 2;
                let b = (b0 + b1 + 1) / 2;

                out[0] = luma(r0, g0, b0);
                out[1] = clamp_u8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128);
                out[2] = luma(r1, g1, b1);
                out[3] = clamp_u8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128);
            }
        }

        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::YUYV,
            timestamp: self.timestamp,
            data: yuyv_data,
        })
    }

    /// Convert YUYV to RGB24 (inverse BT.601 limited range)
    fn yuyv_to_rgb24(&self) -> VideoFrame {
        let mut rgb_data = Vec::with_capacity(self.width as usize * self.height as usize * 3);

        for px in self.data.chunks_exact(4) {
            let u = px[1] as i32 - 128;
            let v = px[3] as i32 - 128;

            for y in [px[0], px[2]] {
                let c = 298 * (y as i32 - 16);
                rgb_data.push(clamp_u8((c + 409 * v + 128) >> 8));
                rgb_data.push(clamp_u8((c - 100 * u - 208 * v + 128) >> 8));
                rgb_data.push(clamp_u8((c + 516 * u + 128) >> 8));
            }
        }

        VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::RGB24,
            timestamp: self.timestamp,
            data: rgb_data,
        }
    }
}

fn luma(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
