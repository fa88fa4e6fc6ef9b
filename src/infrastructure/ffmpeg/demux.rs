// SPDX-License-Identifier: MPL-2.0
//! In-process container demux backend built on the `FFmpeg` libraries.
//!
//! Opens paths and direct URLs, decodes the best video stream and converts
//! every frame to packed RGB24 through swscale. Supports random seeks:
//! the demuxer jumps to the preceding keyframe and frames before the target
//! are decoded and dropped.

use crate::application::port::{BackendKind, Capabilities, FrameSource};
use crate::config::FALLBACK_FRAME_RATE;
use crate::error::{Error, Result};
use crate::media::video::{init_ffmpeg, rational_to_f64};
use crate::media::{AudioStreamInfo, ColourFormat, Interpolation, MediaLocator, SourceInfo, VideoFrame};
use crate::video_player::time_units::{frame_start_secs, secs_to_micros};
use std::path::PathBuf;

/// `FFmpeg`-based frame source.
///
/// # Thread Safety
///
/// This type is `Send` but not `Sync` due to internal mutable state.
pub struct DemuxFrameSource {
    state: Option<DecoderState>,
    info: SourceInfo,
    output_size: (u32, u32),
    interpolation: Interpolation,
    /// Index assigned to the next frame handed out.
    next_index: usize,
    /// Frames with a timestamp before this are dropped (post-seek).
    skip_until_secs: Option<f64>,
    eof_sent: bool,
}

/// Internal decoder state that holds `FFmpeg` contexts.
struct DecoderState {
    input_context: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    video_stream_index: usize,
    time_base_f64: f64,
    /// Stream start time; exposed timestamps are shifted to begin at zero.
    start_secs: f64,
    src_format: ffmpeg_next::format::Pixel,
}

// SAFETY: DecoderState contains FFmpeg types with internal raw pointers.
// Ownership is exclusive and the contexts are only touched by one thread at
// a time (the session's control thread).
unsafe impl Send for DecoderState {}

impl DemuxFrameSource {
    /// Opens `locator` with the in-process demuxer.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendUnavailable`] if `FFmpeg` failed to initialize
    /// - [`Error::UnsupportedFormat`] for in-memory media or containers
    ///   without a decodable video stream
    pub fn open(locator: &MediaLocator) -> Result<Self> {
        let input_path = match locator {
            MediaLocator::Path(path) => path.clone(),
            MediaLocator::Url(url) => PathBuf::from(url),
            MediaLocator::Memory(_) => {
                return Err(Error::UnsupportedFormat(
                    "demux backend cannot read in-memory media".to_string(),
                ))
            }
            MediaLocator::Device(_) => {
                return Err(Error::UnsupportedFormat(
                    "demux backend cannot open capture devices".to_string(),
                ))
            }
        };
        init_ffmpeg()?;

        let input_context = ffmpeg_next::format::input(&input_path)
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to open {locator}: {e}")))?;

        let video_stream = input_context
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| Error::UnsupportedFormat(format!("No video stream in {locator}")))?;
        let video_stream_index = video_stream.index();

        let time_base_f64 = rational_to_f64(video_stream.time_base()).unwrap_or(0.0);
        let start_secs = stream_start_secs(video_stream.start_time(), time_base_f64);

        #[allow(clippy::cast_precision_loss)]
        let duration_secs = if input_context.duration() > 0 {
            input_context.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        } else if video_stream.duration() > 0 {
            video_stream.duration() as f64 * time_base_f64
        } else {
            0.0
        };

        let frame_rate = rational_to_f64(video_stream.avg_frame_rate())
            .or_else(|| rational_to_f64(video_stream.rate()))
            .unwrap_or(FALLBACK_FRAME_RATE);

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let frame_count = (video_stream.frames() > 0).then(|| video_stream.frames() as usize);

        let context_decoder =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| Error::UnsupportedFormat(format!("Failed to create codec context: {e}")))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to create video decoder: {e}")))?;

        let width = decoder.width();
        let height = decoder.height();
        let src_format = decoder.format();

        let audio = Self::probe_audio(&input_context);

        log::debug!(
            "demux opened {locator}: {width}x{height} @ {frame_rate:.3} fps, {duration_secs:.2}s"
        );

        Ok(Self {
            state: Some(DecoderState {
                input_context,
                decoder,
                video_stream_index,
                time_base_f64,
                start_secs,
                src_format,
            }),
            info: SourceInfo {
                width,
                height,
                frame_rate,
                frame_count,
                duration_secs,
                colour: ColourFormat::Rgb,
                audio,
                timestamps: None,
            },
            output_size: (width, height),
            interpolation: Interpolation::default(),
            next_index: 0,
            skip_until_secs: None,
            eof_sent: false,
        })
    }

    fn probe_audio(input_context: &ffmpeg_next::format::context::Input) -> Option<AudioStreamInfo> {
        let track_count = input_context
            .streams()
            .filter(|s| s.parameters().medium() == ffmpeg_next::media::Type::Audio)
            .count();
        let stream = input_context.streams().best(ffmpeg_next::media::Type::Audio)?;
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .ok()?
            .decoder()
            .audio()
            .ok()?;

        Some(AudioStreamInfo {
            channels: decoder.channels() as u16,
            sample_rate: decoder.rate(),
            codec_name: decoder
                .codec()
                .map_or_else(|| "unknown".to_string(), |c| c.name().to_string()),
            track_count,
        })
    }

    fn scaling_flags(interp: Interpolation) -> ffmpeg_next::software::scaling::Flags {
        use ffmpeg_next::software::scaling::Flags;
        match interp {
            Interpolation::Nearest => Flags::POINT,
            Interpolation::Linear => Flags::BILINEAR,
            Interpolation::Cubic => Flags::BICUBIC,
            Interpolation::Area => Flags::AREA,
            Interpolation::Lanczos => Flags::LANCZOS,
        }
    }

    /// Copies packed RGB rows out of a scaled frame, dropping stride padding.
    fn extract_rgb_data(frame: &ffmpeg_next::frame::Video) -> Vec<u8> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let data = frame.data(0);
        let stride = frame.stride(0);

        let mut rgb_bytes = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let row_start = y * stride;
            rgb_bytes.extend_from_slice(&data[row_start..row_start + width * 3]);
        }
        rgb_bytes
    }

    /// Pulls the next decoded frame out of the codec, feeding packets as needed.
    fn decode_raw(&mut self) -> Result<Option<ffmpeg_next::frame::Video>> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| Error::VideoStream("Decoder not opened".to_string()))?;

        let mut decoded = ffmpeg_next::frame::Video::empty();
        loop {
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let video_stream_index = state.video_stream_index;
            let packet = state
                .input_context
                .packets()
                .find(|(stream, _)| stream.index() == video_stream_index);

            match packet {
                Some((_, packet)) => {
                    state
                        .decoder
                        .send_packet(&packet)
                        .map_err(|e| Error::VideoStream(format!("Packet send failed: {e}")))?;
                }
                None => {
                    // Drain frames still buffered in the codec.
                    let _ = state.decoder.send_eof();
                    self.eof_sent = true;
                }
            }
        }
    }

    fn convert(&self, decoded: &ffmpeg_next::frame::Video, pts_secs: f64) -> Result<VideoFrame> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::VideoStream("Decoder not opened".to_string()))?;
        let (width, height) = self.output_size;

        // Recreated per frame; the scaling context is not Send.
        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            state.src_format,
            self.info.width,
            self.info.height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            Self::scaling_flags(self.interpolation),
        )
        .map_err(|e| Error::VideoStream(format!("Failed to create scaler: {e}")))?;

        let mut rgb_frame = ffmpeg_next::frame::Video::empty();
        scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| Error::VideoStream(format!("Scaling failed: {e}")))?;

        Ok(VideoFrame {
            index: self.next_index,
            pts_secs,
            width,
            height,
            colour: ColourFormat::Rgb,
            data: Self::extract_rgb_data(&rgb_frame),
        })
    }

    fn pts_secs(&self, decoded: &ffmpeg_next::frame::Video) -> f64 {
        let (time_base, start) = self
            .state
            .as_ref()
            .map_or((0.0, 0.0), |s| (s.time_base_f64, s.start_secs));
        match decoded.timestamp() {
            Some(pts) if time_base > 0.0 => relative_pts_secs(pts, time_base, start),
            _ => frame_start_secs(self.next_index, self.info.frame_rate),
        }
    }

    fn seek_to_secs(&mut self, target_secs: f64) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| Error::VideoStream("Decoder not opened".to_string()))?;

        // AV_TIME_BASE is microseconds, measured from the container origin
        let timestamp = secs_to_micros(target_secs + state.start_secs);

        state
            .input_context
            .seek(timestamp, ..timestamp)
            .map_err(|e| Error::VideoStream(format!("Seek failed: {e}")))?;
        state.decoder.flush();
        self.eof_sent = false;
        Ok(())
    }
}

impl FrameSource for DemuxFrameSource {
    fn backend(&self) -> BackendKind {
        BackendKind::Demux
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sequential_read: true,
            random_seek: true,
            frame_count_known: self.info.frame_count.is_some(),
            colour: ColourFormat::Rgb,
        }
    }

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let half_frame = 0.5 / self.info.frame_rate;
        loop {
            let Some(decoded) = self.decode_raw()? else {
                return Ok(None);
            };
            let pts_secs = self.pts_secs(&decoded);

            if let Some(target) = self.skip_until_secs {
                if pts_secs + half_frame < target {
                    continue;
                }
                self.skip_until_secs = None;
            }

            let frame = self.convert(&decoded, pts_secs)?;
            self.next_index += 1;
            return Ok(Some(frame));
        }
    }

    fn seek_to_frame(&mut self, index: usize, pts_secs: f64) -> Result<()> {
        let target_secs = pts_secs.max(0.0);
        self.seek_to_secs(target_secs)?;
        self.skip_until_secs = (index > 0).then_some(target_secs);
        self.next_index = index;
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.seek_to_secs(0.0)?;
        self.skip_until_secs = None;
        self.next_index = 0;
        Ok(())
    }

    fn resize(&mut self, size: Option<(u32, u32)>, interp: Interpolation) -> Result<()> {
        let size = size.unwrap_or((self.info.width, self.info.height));
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::VideoStream(format!(
                "Invalid resize target {}x{}",
                size.0, size.1
            )));
        }
        self.output_size = size;
        self.interpolation = interp;
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn close(&mut self) {
        self.state = None;
    }
}

/// Start offset of a stream in seconds, zero when the container has none.
#[allow(clippy::cast_precision_loss)]
fn stream_start_secs(start_time: i64, time_base: f64) -> f64 {
    if start_time == ffmpeg_next::ffi::AV_NOPTS_VALUE || time_base <= 0.0 {
        0.0
    } else {
        start_time as f64 * time_base
    }
}

/// Presentation time relative to the stream start.
#[allow(clippy::cast_precision_loss)]
fn relative_pts_secs(pts: i64, time_base: f64, start_secs: f64) -> f64 {
    pts as f64 * time_base - start_secs
}
