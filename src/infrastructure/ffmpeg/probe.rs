// SPDX-License-Identifier: MPL-2.0
//! Stream metadata and per-frame timestamps via `ffprobe`.

use super::process::run_to_completion;
use crate::config::FALLBACK_FRAME_RATE;
use crate::error::{Error, Result};
use crate::media::{AudioStreamInfo, ColourFormat, MediaLocator, SourceInfo};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parses a rate such as `"30000/1001"` or `"25"`.
#[must_use]
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Builds [`SourceInfo`] from `ffprobe -print_format json` output.
pub fn parse_source_info(json: &[u8], colour: ColourFormat) -> Result<SourceInfo> {
    let output: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::UnsupportedFormat(format!("Unreadable probe output: {e}")))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::UnsupportedFormat("No video stream found".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::UnsupportedFormat(
                "Video stream has no dimensions".to_string(),
            ))
        }
    };

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(FALLBACK_FRAME_RATE);

    let duration_secs = output
        .format
        .as_ref()
        .and_then(|f| parse_number::<f64>(f.duration.as_ref()))
        .or_else(|| parse_number::<f64>(video.duration.as_ref()))
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let frame_count = parse_number::<usize>(video.nb_frames.as_ref()).filter(|&n| n > 0);

    let audio_streams: Vec<&ProbeStream> = output
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .collect();
    let audio = audio_streams.first().map(|stream| AudioStreamInfo {
        channels: stream.channels.unwrap_or(0),
        sample_rate: parse_number(stream.sample_rate.as_ref()).unwrap_or(0),
        codec_name: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        track_count: audio_streams.len(),
    });

    Ok(SourceInfo {
        width,
        height,
        frame_rate,
        frame_count,
        duration_secs,
        colour,
        audio,
        timestamps: None,
    })
}

/// Probes stream metadata for `locator`.
pub fn probe_source(ffprobe: &str, locator: &MediaLocator, colour: ColourFormat) -> Result<SourceInfo> {
    let args: Vec<String> = [
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .iter()
    .map(ToString::to_string)
    .chain(locator.ffmpeg_input_args())
    .collect();

    let json = match locator.stdin_bytes() {
        Some(bytes) => {
            let mut child = super::process::ManagedChild::spawn(ffprobe, &args, Some(bytes))?;
            let mut out = Vec::new();
            let mut block = vec![0u8; 64 * 1024];
            loop {
                let n = child.read_full(&mut block)?;
                out.extend_from_slice(&block[..n]);
                if n < block.len() {
                    break;
                }
            }
            child.finish()?;
            out
        }
        None => run_to_completion(ffprobe, &args)?,
    };

    parse_source_info(&json, colour)
}

/// Parses one `pts_time` per line, skipping unparseable lines.
///
/// The result is sorted and shifted so the first frame is at zero, since
/// containers may start their clock anywhere.
#[must_use]
pub fn parse_packet_times(text: &str) -> Vec<f64> {
    let mut pts: Vec<f64> = text
        .lines()
        .filter_map(|line| line.trim().trim_end_matches(',').parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .collect();
    pts.sort_by(f64::total_cmp);
    if let Some(&origin) = pts.first() {
        for t in &mut pts {
            *t -= origin;
        }
    }
    pts
}

/// Reads every video packet timestamp, in presentation order.
pub fn probe_frame_times(ffprobe: &str, locator: &MediaLocator) -> Result<Vec<f64>> {
    let args: Vec<String> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "packet=pts_time",
        "-of",
        "csv=p=0",
    ]
    .iter()
    .map(ToString::to_string)
    .chain(locator.ffmpeg_input_args())
    .collect();

    if !locator.supports_input_seek() {
        return Err(Error::UnsupportedFormat(
            "Timestamp probing needs a seekable input".to_string(),
        ));
    }

    let stdout = run_to_completion(ffprobe, &args)?;
    let pts = parse_packet_times(&String::from_utf8_lossy(&stdout));
    if pts.is_empty() {
        return Err(Error::VideoStream("No frame timestamps found".to_string()));
    }
    Ok(pts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
             "avg_frame_rate": "24000/1001", "r_frame_rate": "24/1", "nb_frames": "240"},
            {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2},
            {"codec_type": "audio", "codec_name": "opus", "sample_rate": "48000", "channels": 6}
        ],
        "format": {"duration": "10.010000"}
    }"#;

    #[test]
    fn parses_video_and_audio_streams() {
        let info = parse_source_info(SAMPLE.as_bytes(), ColourFormat::Bgr).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.frame_rate - 23.976).abs() < 0.001);
        assert_eq!(info.frame_count, Some(240));
        assert!((info.duration_secs - 10.01).abs() < 1e-9);
        assert_eq!(info.colour, ColourFormat::Bgr);

        let audio = info.audio.unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.codec_name, "aac");
        assert_eq!(audio.track_count, 2);
    }

    #[test]
    fn missing_video_stream_is_unsupported() {
        let json = r#"{"streams": [{"codec_type": "audio"}]}"#;
        let err = parse_source_info(json.as_bytes(), ColourFormat::Rgb).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn zero_rate_falls_back() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2,
                        "avg_frame_rate": "0/0", "r_frame_rate": "0/0"}]}"#;
        let info = parse_source_info(json.as_bytes(), ColourFormat::Rgb).unwrap();
        assert_eq!(info.frame_rate, FALLBACK_FRAME_RATE);
        assert_eq!(info.frame_count, None);
        assert_eq!(info.duration_secs, 0.0);
    }

    #[test]
    fn parse_rate_handles_forms() {
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("1/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn packet_times_are_sorted() {
        let pts = parse_packet_times("0.080000\n0.000000\n0.040000,\nN/A\n\n0.120000\n");
        assert_eq!(pts, vec![0.0, 0.04, 0.08, 0.12]);
    }

    #[test]
    fn packet_times_start_at_zero() {
        let pts = parse_packet_times("1.480000\n1.400000\n1.440000\n");
        assert_eq!(pts.len(), 3);
        assert!(pts[0].abs() < 1e-12);
        assert!((pts[1] - 0.04).abs() < 1e-9);
        assert!((pts[2] - 0.08).abs() < 1e-9);
    }
}
