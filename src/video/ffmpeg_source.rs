//! FFmpeg Capture Source
//!
//! Opens a network stream (the phone's MJPEG feed, or anything libavformat
//! can demux) and produces decoded RGB24 frames at the source geometry.

use crate::bridge::{FrameSource, Shutdown, SourceConnector, SourceParams};
use crate::error::{ForwardError, Result};
use crate::video::frame::{PixelFormat, VideoFrame};
use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as Scaler, Flags};
use ffmpeg::util::frame::video::Video as DecodedFrame;
use ffmpeg::{ffi, Rational};
use std::time::Duration;
use tracing::{debug, info};

/// Opens [`FfmpegSource`]s
///
/// Blocking network I/O inside libavformat is aborted once `shutdown` is
/// raised.
#[derive(Debug, Clone, Default)]
pub struct FfmpegConnector {
    shutdown: Shutdown,
}

impl FfmpegConnector {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl SourceConnector for FfmpegConnector {
    type Source = FfmpegSource;

    fn connect(&mut self, url: &str) -> Result<FfmpegSource> {
        FfmpegSource::open(url, &self.shutdown)
    }
}

/// Decoding capture source backed by libavformat/libavcodec
pub struct FfmpegSource {
    /// Demuxer context
    input_ctx: ffmpeg::format::context::Input,
    /// Video stream index
    video_stream_index: usize,
    /// Video stream time base
    time_base: Rational,
    /// Video decoder
    decoder: ffmpeg::codec::decoder::Video,
    /// Converter to RGB24, rebuilt when the decoded format or size changes
    scaler: Option<(ScalerKey, Scaler)>,
    /// Metadata reported at open
    params: SourceParams,
    /// Whether the demuxer hit end of stream
    exhausted: bool,
}

/// Input geometry a scaler was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerKey {
    format: Pixel,
    width: u32,
    height: u32,
}

impl FfmpegSource {
    /// Open the stream at `url`
    ///
    /// Reads blocked on the network return early once `shutdown` is raised.
    pub fn open(url: &str, shutdown: &Shutdown) -> Result<Self> {
        ffmpeg::init().map_err(|e| ForwardError::connection(url, e.to_string()))?;

        let interrupt = shutdown.clone();
        let input_ctx =
            ffmpeg::format::input_with_interrupt(&url, move || interrupt.is_triggered())
                .map_err(|e| ForwardError::connection(url, e.to_string()))?;

        let video_stream = input_ctx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| ForwardError::connection(url, "no video stream found"))?;

        let video_stream_index = video_stream.index();
        let time_base = video_stream.time_base();
        let fps = rate_to_fps(video_stream.avg_frame_rate())
            .or_else(|| rate_to_fps(video_stream.rate()));

        let context_decoder =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| ForwardError::connection(url, format!("decoder context: {}", e)))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| ForwardError::connection(url, format!("video decoder: {}", e)))?;

        let params = SourceParams {
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };

        info!(
            "Opened stream: {}x{} @ {:?} fps, format: {:?}",
            params.width,
            params.height,
            params.fps,
            decoder.format()
        );

        Ok(Self {
            input_ctx,
            video_stream_index,
            time_base,
            decoder,
            scaler: None,
            params,
            exhausted: false,
        })
    }

    /// Pull the next decoded frame, feeding packets as needed
    fn next_decoded(&mut self) -> Result<DecodedFrame> {
        loop {
            let mut decoded = DecodedFrame::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return Ok(decoded),
                Err(e) => {
                    if let Some(failure) = receive_failure(e) {
                        return Err(failure);
                    }
                }
            }

            if self.exhausted {
                return Err(ForwardError::frame_read("end of stream"));
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    // Flush whatever the decoder still holds
                    self.exhausted = true;
                    self.decoder.send_eof().map_err(decode_failure)?;
                    continue;
                }
                Err(e) => return Err(ForwardError::frame_read(e.to_string())),
            }

            if packet.stream() != self.video_stream_index {
                continue;
            }

            self.decoder.send_packet(&packet).map_err(decode_failure)?;
        }
    }

    /// Convert a decoded frame of any pixel format to contiguous RGB24
    fn convert_frame(&mut self, decoded: &DecodedFrame) -> Result<VideoFrame> {
        let key = ScalerKey {
            format: decoded.format(),
            width: decoded.width(),
            height: decoded.height(),
        };

        let mut scaler = match self.scaler.take() {
            Some((current, scaler)) if current == key => scaler,
            _ => {
                debug!(
                    "Creating scaler for {:?} {}x{}",
                    key.format, key.width, key.height
                );
                Scaler::get(
                    key.format,
                    key.width,
                    key.height,
                    Pixel::RGB24,
                    key.width,
                    key.height,
                    Flags::BILINEAR,
                )
                .map_err(|e| ForwardError::runtime(format!("failed to create scaler: {}", e)))?
            }
        };

        let mut rgb_frame = DecodedFrame::empty();
        let converted = scaler.run(decoded, &mut rgb_frame);
        self.scaler = Some((key, scaler));
        converted.map_err(|e| ForwardError::runtime(format!("failed to convert frame: {}", e)))?;

        let width = key.width as usize;
        let height = key.height as usize;
        let data = rgb_frame.data(0);
        let stride = rgb_frame.stride(0);

        let pixels = strip_row_padding(data, stride, width * 3, height);
        let timestamp = decoded
            .timestamp()
            .map(|pts| pts_to_duration(pts, self.time_base))
            .unwrap_or_default();

        VideoFrame::from_data(key.width, key.height, PixelFormat::RGB24, timestamp, pixels)
            .map_err(|e| ForwardError::runtime(e.to_string()))
    }
}

impl FrameSource for FfmpegSource {
    fn params(&self) -> SourceParams {
        self.params
    }

    fn read_frame(&mut self) -> Result<VideoFrame> {
        let decoded = self.next_decoded()?;
        self.convert_frame(&decoded)
    }
}

/// Classify a `receive_frame` error; None means the decoder wants more input
fn receive_failure(error: ffmpeg::Error) -> Option<ForwardError> {
    match error {
        ffmpeg::Error::Other { errno } if errno == ffi::EAGAIN => None,
        ffmpeg::Error::Eof => Some(ForwardError::frame_read("end of stream")),
        e => Some(decode_failure(e)),
    }
}

fn decode_failure(error: ffmpeg::Error) -> ForwardError {
    ForwardError::runtime(format!("decode error: {}", error))
}

/// Copy `height` rows of `row_bytes` out of a buffer with `stride`-byte rows
fn strip_row_padding(data: &[u8], stride: usize, row_bytes: usize, height: usize) -> Vec<u8> {
    if stride == row_bytes {
        return data[..row_bytes * height].to_vec();
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in data.chunks(stride).take(height) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    pixels
}

/// Presentation timestamp in seconds, zero when negative or not representable
fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    if pts <= 0 || time_base.denominator() == 0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(pts as f64 * f64::from(time_base)).unwrap_or_default()
}

/// Frames per second from a stream rate, None when undefined
fn rate_to_fps(rate: Rational) -> Option<f64> {
    if rate.denominator() == 0 {
        return None;
    }
    let fps = f64::from(rate);
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
