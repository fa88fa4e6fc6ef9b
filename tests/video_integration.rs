// SPDX-License-Identifier: MPL-2.0
//! Integration tests for the real decode backends.
//!
//! These tests validate frame sources, audio extraction and whole sessions
//! against sample files in `tests/data`. Each of those returns early when its
//! fixture (or the `ffmpeg` binaries it needs) is missing. The animated WebP
//! tests encode their own fixture and always run.

use framepace::application::port::{
    BackendKind, Cancellation, ChunkExtractor, ChunkRequest, FrameSource,
};
use framepace::config::PlaybackConfig;
use framepace::infrastructure::ffmpeg::process::binary_available;
use framepace::infrastructure::{
    open_frame_source, DemuxFrameSource, FfmpegChunkExtractor, PipeFrameSource,
};
use framepace::media::{ColourFormat, MediaLocator};
use framepace::video_player::PlaybackSession;
use framepace::Error;
use std::path::Path;

/// Frame start times of the generated animation, in milliseconds.
const ANIMATION_STARTS_MS: [i32; 6] = [0, 100, 150, 400, 450, 700];
const ANIMATION_END_MS: i32 = 800;

/// Encodes a 4x4 animated WebP with uneven frame durations.
fn variable_rate_animation() -> Vec<u8> {
    let mut encoder = webp_animation::Encoder::new((4, 4)).unwrap();
    for (i, start) in ANIMATION_STARTS_MS.into_iter().enumerate() {
        let shade = u8::try_from(i * 40).unwrap();
        let rgba: Vec<u8> = [shade, 255 - shade, shade / 2, 255].repeat(16);
        encoder.add_frame(&rgba, start).unwrap();
    }
    encoder.finalize(ANIMATION_END_MS).unwrap().to_vec()
}

fn animation_starts_secs() -> Vec<f64> {
    ANIMATION_STARTS_MS
        .iter()
        .map(|ms| f64::from(*ms) / 1000.0)
        .collect()
}

const SAMPLES: &[&str] = &[
    "tests/data/sample.mp4",
    "tests/data/sample.avi",
    "tests/data/sample.mov",
    "tests/data/sample.mkv",
    "tests/data/sample.webm",
];

struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

fn fixture(path: &str) -> Option<MediaLocator> {
    Path::new(path).exists().then(|| MediaLocator::path(path))
}

fn ffmpeg_tools_available() -> bool {
    binary_available("ffmpeg") && binary_available("ffprobe")
}

#[test]
fn test_demux_decodes_first_frames() {
    for path in SAMPLES {
        let Some(locator) = fixture(path) else {
            continue;
        };
        let mut source = DemuxFrameSource::open(&locator).expect("demux should open sample");
        assert_eq!(source.colour_format(), ColourFormat::Rgb);
        assert!(source.frame_rate() > 0.0, "{path}: frame rate");

        let first = source.next_frame().unwrap().expect("first frame");
        let second = source.next_frame().unwrap().expect("second frame");
        assert_eq!(first.index, 0, "{path}");
        assert!(second.index > first.index, "{path}");
        assert_eq!(
            first.data.len(),
            ColourFormat::Rgb.channels() * first.width as usize * first.height as usize
        );
    }
}

#[test]
fn test_demux_seek_lands_on_target() {
    let Some(locator) = fixture("tests/data/sample.mp4") else {
        return;
    };
    let mut source = DemuxFrameSource::open(&locator).unwrap();
    let target = source.frame_count() / 2;
    #[allow(clippy::cast_precision_loss)]
    let target_secs = target as f64 / source.frame_rate();
    source.seek_to_frame(target, target_secs).unwrap();
    let frame = source.next_frame().unwrap().expect("frame after seek");
    assert!(frame.index >= target);
}

#[test]
fn test_pipe_reports_bgr() {
    let Some(locator) = fixture("tests/data/sample.mp4") else {
        return;
    };
    if !ffmpeg_tools_available() {
        return;
    }
    let mut source = PipeFrameSource::open(&locator, &PlaybackConfig::default()).unwrap();
    assert_eq!(source.colour_format(), ColourFormat::Bgr);
    let frame = source.next_frame().unwrap().expect("first frame");
    assert_eq!(frame.colour, ColourFormat::Bgr);
    assert_eq!((frame.width, frame.height), source.original_size());
}

#[test]
fn test_pipe_resizes_externally() {
    let Some(locator) = fixture("tests/data/sample.mp4") else {
        return;
    };
    if !ffmpeg_tools_available() {
        return;
    }
    let mut source = PipeFrameSource::open(&locator, &PlaybackConfig::default()).unwrap();
    source
        .resize(Some((64, 36)), framepace::Interpolation::Area)
        .unwrap();
    let frame = source.next_frame().unwrap().expect("resized frame");
    assert_eq!((frame.width, frame.height), (64, 36));
}

#[test]
fn test_extractor_decodes_first_chunk() {
    let Some(locator) = fixture("tests/data/sample.mp4") else {
        return;
    };
    if !binary_available("ffmpeg") {
        return;
    }
    let extractor = FfmpegChunkExtractor::new("ffmpeg", locator).unwrap();
    let request = ChunkRequest {
        index: 0,
        epoch: 0,
        start_secs: 0.0,
        duration_secs: 0.5,
        speed: 1.0,
        sample_rate: 8_000,
        channels: 1,
        audio_track: 0,
        attempt: 0,
    };
    match extractor.extract(&request, &NeverCancelled) {
        Ok(samples) => {
            assert!(samples.len() <= 4_100, "got {} samples", samples.len());
            assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
        // The sample may have no audio stream
        Err(Error::AudioStream(_)) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn test_backend_chain_opens_sample() {
    let Some(locator) = fixture("tests/data/sample.mp4") else {
        return;
    };
    let source = open_frame_source(&locator, &PlaybackConfig::default()).unwrap();
    assert!(source.frame_count() > 0);
}

#[test]
fn test_unreadable_file_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.mp4");
    std::fs::write(&path, b"definitely not a video").unwrap();
    let result = open_frame_source(&MediaLocator::path(&path), &PlaybackConfig::default());
    assert!(
        matches!(
            result,
            Err(Error::UnsupportedFormat(_) | Error::NoBackendAvailable)
        ),
        "got {:?}",
        result.err()
    );
}

#[test]
fn test_session_plays_sample_without_audio() {
    let Some(locator) = fixture("tests/data/sample.mp4") else {
        return;
    };
    let config = PlaybackConfig {
        no_audio: true,
        ..PlaybackConfig::default()
    };
    let mut session = PlaybackSession::open(locator, &config).unwrap();
    let metadata = session.metadata().unwrap();
    assert!(metadata.duration_secs > 0.0);
    assert!(metadata.frame_count > 0);

    session.seek(metadata.duration_secs / 2.0, false).unwrap();
    assert!(session.force_frame().unwrap());
    let frame = session.frame().unwrap().expect("materialized frame");
    assert_eq!((frame.width, frame.height), metadata.output_size);

    session.close();
    assert!(session.is_closed());
}

#[test]
fn test_generated_animation_opens_through_backend_chain() {
    let locator = MediaLocator::memory(variable_rate_animation());
    let mut source = open_frame_source(&locator, &PlaybackConfig::default()).unwrap();
    assert_eq!(source.backend(), BackendKind::Memory);
    assert_eq!(source.frame_count(), ANIMATION_STARTS_MS.len());
    assert_eq!(source.info().timestamps, Some(animation_starts_secs()));

    source.seek_to_frame(4, 0.45).unwrap();
    let frame = source.next_frame().unwrap().expect("frame after seek");
    assert_eq!(frame.index, 4);
    assert!((frame.pts_secs - 0.45).abs() < 1e-9);
}

#[test]
fn test_session_seeks_by_native_timestamps() {
    let locator = MediaLocator::memory(variable_rate_animation());
    let config = PlaybackConfig {
        no_audio: true,
        ..PlaybackConfig::default()
    };
    let mut session = PlaybackSession::open(locator, &config).unwrap();
    let metadata = session.metadata().unwrap();
    assert_eq!(metadata.frame_count, ANIMATION_STARTS_MS.len());
    assert!((metadata.duration_secs - 0.8).abs() < 1e-9);

    // 0.42s falls inside the frame starting at 0.40s, not 0.42 * avg fps.
    session.seek(0.42, false).unwrap();
    assert_eq!(session.frame_index().unwrap(), 3);
    assert!(session.force_frame().unwrap());
    let frame = session.frame().unwrap().expect("materialized frame");
    assert_eq!(frame.index, 3);
    assert!((frame.pts_secs - 0.4).abs() < 1e-9);

    session.seek_frame(1, false).unwrap();
    session.force_frame().unwrap();
    let frame = session.frame().unwrap().expect("materialized frame");
    assert!((frame.pts_secs - 0.1).abs() < 1e-9);
    session.close();
}
