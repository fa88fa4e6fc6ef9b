// SPDX-License-Identifier: MPL-2.0
//! Session-level behaviour, driven by the in-memory collaborators from
//! `framepace::testing` so no FFmpeg install or audio device is needed.
//! Needs the `testing` feature: `cargo test --features testing`.

use framepace::application::port::ResolvedStream;
use framepace::config::PlaybackConfig;
use framepace::media::MediaLocator;
use framepace::testing::{
    RecordingAudioSink, RecordingFrameSink, ScriptedSource, SinkHandle, SourceLogHandle,
    SyntheticExtractor,
};
use framepace::video_player::{
    AudioChunkPipeline, ChunkPoll, PipelineSettings, PlaybackSession, PlaybackState,
    TimestampTable,
};
use framepace::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FPS: f64 = 24.0;
const FRAMES: usize = 240;

fn config() -> PlaybackConfig {
    PlaybackConfig {
        chunk_size_secs: 0.5,
        max_threads: 2,
        max_chunks: 2,
        audio_wait_ms: 20,
        ..PlaybackConfig::default()
    }
}

fn video_only() -> (PlaybackSession, SourceLogHandle) {
    let source = ScriptedSource::new(FRAMES, FPS, (4, 4));
    let log = source.log_handle();
    let session = PlaybackSession::with_components(Box::new(source), None, &config()).unwrap();
    (session, log)
}

fn with_audio(extractor: SyntheticExtractor) -> (PlaybackSession, SinkHandle) {
    let source = ScriptedSource::new(FRAMES, FPS, (4, 4)).with_audio(2, 1_000);
    let sink = RecordingAudioSink::new(1_000, 2);
    let handle = sink.handle();
    let session = PlaybackSession::with_components(
        Box::new(source),
        Some((Box::new(extractor), Box::new(sink))),
        &config(),
    )
    .unwrap();
    (session, handle)
}

/// Polls until `done` holds or a second has passed, draining the sink so the
/// clock keeps asking for audio.
fn pump_until(
    session: &mut PlaybackSession,
    sink: &SinkHandle,
    mut done: impl FnMut(&PlaybackSession, &SinkHandle) -> bool,
) -> bool {
    for _ in 0..200 {
        session.update().unwrap();
        if done(&*session, sink) {
            return true;
        }
        sink.drain();
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn seek_then_update_lands_within_one_frame() {
    let (mut session, _) = video_only();
    session.play().unwrap();
    for target in [0.0, 0.5, 3.33, 7.9, 9.99, 10.0] {
        session.seek(target, false).unwrap();
        session.update().unwrap();
        let pos = session.get_pos().unwrap();
        assert!(
            (pos - target).abs() <= 1.0 / FPS,
            "target {target}, position {pos}"
        );
        if session.is_ended().unwrap() {
            session.play().unwrap();
        }
    }
}

#[test]
fn seek_past_duration_shows_last_frame() {
    let (mut session, _) = video_only();
    session.play().unwrap();
    session.seek(1e6, false).unwrap();
    assert_eq!(session.get_pos().unwrap(), session.duration().unwrap());
    session.update().unwrap();
    assert_eq!(session.frame().unwrap().unwrap().index, FRAMES - 1);
}

#[test]
fn seek_before_start_clamps_to_zero() {
    let (mut session, _) = video_only();
    session.seek(3.0, false).unwrap();
    session.seek(-999_999.0, false).unwrap();
    assert_eq!(session.get_pos().unwrap(), 0.0);
    session.seek(2.0, false).unwrap();
    session.seek(-10.0, true).unwrap();
    assert_eq!(session.get_pos().unwrap(), 0.0);
}

#[test]
fn seek_does_not_decode_until_asked() {
    let (mut session, log) = video_only();
    for step in 0..20 {
        session.seek(f64::from(step) * 0.4, false).unwrap();
    }
    assert!(log.snapshot().decoded.is_empty());
    session.force_frame().unwrap();
    assert_eq!(log.snapshot().decoded.len(), 1);
}

#[test]
fn seek_frame_is_exact() {
    let (mut session, _) = video_only();
    for index in [0_i64, 1, 7, 100, 239] {
        session.seek_frame(index, false).unwrap();
        session.force_frame().unwrap();
        assert_eq!(session.frame().unwrap().unwrap().index as i64, index);
    }
    session.seek_frame(-5, true).unwrap();
    assert_eq!(session.frame_index().unwrap(), 234);
    session.seek_frame(1_000, true).unwrap();
    assert_eq!(session.frame_index().unwrap(), FRAMES - 1);
}

#[test]
fn constant_rate_lookup_is_floor() {
    let table = TimestampTable::constant(FPS, FRAMES);
    for step in 0..=1000 {
        let t = f64::from(step) * 0.009_99;
        let expected = ((t * FPS).floor() as usize).min(FRAMES - 1);
        assert_eq!(table.frame_for_time(t), expected);
    }
}

#[test]
fn chunk_pipeline_example_never_exceeds_two_buffered() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(2)
        .build()
        .unwrap();
    let pipeline = AudioChunkPipeline::new(
        Arc::new(SyntheticExtractor::new()),
        PipelineSettings {
            chunk_size_secs: 2.0,
            max_threads: 1,
            max_chunks: 2,
            sample_rate: 100,
            channels: 1,
            audio_track: 0,
            media_duration_secs: Some(10.0),
        },
        runtime.handle().clone(),
        0.0,
        1.0,
    );

    for index in 0..5 {
        pipeline.request_chunk(index);
    }
    std::thread::sleep(Duration::from_millis(50));
    assert!(pipeline.buffered_count() <= 2);

    let mut starts = Vec::new();
    while let ChunkPoll::Ready(chunk) = pipeline.take_next(Duration::from_secs(5)) {
        assert!(pipeline.buffered_count() <= 2);
        starts.push((chunk.start_secs, chunk.start_secs + chunk.duration_secs));
    }
    assert_eq!(
        starts,
        vec![(0.0, 2.0), (2.0, 4.0), (4.0, 6.0), (6.0, 8.0), (8.0, 10.0)]
    );
    assert!(pipeline.stats().peak_buffered <= 2);
}

#[test]
fn audio_flows_to_sink_in_order() {
    let (mut session, sink) = with_audio(SyntheticExtractor::new());
    session.play().unwrap();
    assert!(pump_until(&mut session, &sink, |_, sink| sink
        .snapshot()
        .chunks
        .len()
        >= 4));

    let record = sink.snapshot();
    assert!(!record.paused);
    let indices: Vec<usize> = record.chunks.iter().map(|c| c.index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
    assert_eq!(indices[0], 0);
}

#[test]
fn no_stale_audio_after_seek() {
    let extractor = SyntheticExtractor::new().with_delay(Duration::from_millis(10));
    let (mut session, sink) = with_audio(extractor);
    session.play().unwrap();
    assert!(pump_until(&mut session, &sink, |_, sink| !sink
        .snapshot()
        .chunks
        .is_empty()));

    let before = sink.snapshot().chunks.len();
    session.seek(5.0, false).unwrap();
    let epoch = session.audio_stats().unwrap().unwrap().epoch;
    assert!(pump_until(&mut session, &sink, |_, sink| sink
        .snapshot()
        .chunks
        .len()
        >= before + 3));

    let after: Vec<_> = sink.snapshot().chunks.split_off(before);
    assert!(after.iter().all(|c| c.epoch == epoch));
    assert!((after[0].start_secs - 5.0).abs() < 1e-9);
    assert!(sink.snapshot().clears >= 1);
}

#[test]
fn late_audio_freezes_the_clock() {
    let extractor = SyntheticExtractor::new().with_delay(Duration::from_millis(400));
    let (mut session, _) = with_audio(extractor);
    session.play().unwrap();
    let start = Instant::now();
    session.update_at(start).unwrap();
    session.update_at(start + Duration::from_millis(100)).unwrap();
    assert!(session.state().unwrap().buffering);
    assert_eq!(session.get_pos().unwrap(), 0.0);
}

#[test]
fn failing_audio_degrades_to_video_only() {
    let (mut session, sink) = with_audio(SyntheticExtractor::new().always_failing());
    session.play().unwrap();
    assert!(pump_until(&mut session, &sink, |session, _| session
        .audio_stats()
        .unwrap()
        .is_none()));
    assert_eq!(session.state().unwrap().playback, PlaybackState::Playing);
    assert!(!session.state().unwrap().buffering);
    session.update().unwrap();
    assert!(session.frame().unwrap().is_some());
}

#[test]
fn speed_change_restarts_audio_with_new_tempo() {
    let extractor = SyntheticExtractor::new();
    let (mut session, sink) = with_audio(extractor.clone());
    session.play().unwrap();
    session.set_speed(2.0).unwrap();
    assert!(pump_until(&mut session, &sink, |_, _| extractor
        .requests()
        .iter()
        .any(|r| r.speed == 2.0)));
    session.set_speed(50.0).unwrap();
    assert_eq!(session.speed().unwrap(), 10.0);
}

#[test]
fn reverse_preloads_and_walks_down() {
    let (mut session, log) = video_only();
    session.seek(5.0, false).unwrap();
    log.reset();
    session.set_reverse(true).unwrap();
    assert_eq!(log.snapshot().decoded.len(), FRAMES);
    assert_eq!(log.snapshot().rewinds, 1);

    session.play().unwrap();
    let start = Instant::now();
    session.update_at(start).unwrap();
    let mut previous = session.frame().unwrap().unwrap().index;
    for step in 1..=10 {
        session
            .update_at(start + Duration::from_millis(step * 100))
            .unwrap();
        let index = session.frame().unwrap().unwrap().index;
        assert!(index < previous, "{index} !< {previous}");
        previous = index;
    }
    assert_eq!(log.snapshot().decoded.len(), FRAMES);
}

#[test]
fn reverse_over_memory_ceiling_is_refused() {
    let source = ScriptedSource::new(100_000, FPS, (1920, 1080));
    let config = PlaybackConfig {
        reverse_memory_limit_mb: 64,
        ..config()
    };
    let mut session = PlaybackSession::with_components(Box::new(source), None, &config).unwrap();
    match session.set_reverse(true) {
        Err(Error::ReverseMemoryExceeded {
            required_bytes,
            limit_bytes,
        }) => {
            assert_eq!(limit_bytes, 64 * 1024 * 1024);
            assert_eq!(required_bytes, 100_000 * 1920 * 1080 * 3);
        }
        other => panic!("expected memory error, got {other:?}"),
    }
    assert!(!session.state().unwrap().reverse);
}

#[test]
fn reverse_silences_audio() {
    let (mut session, sink) = with_audio(SyntheticExtractor::new());
    session.play().unwrap();
    session.set_reverse(true).unwrap();
    assert!(sink.snapshot().paused);
    let pushed = sink.snapshot().chunks.len();
    for _ in 0..5 {
        session.update().unwrap();
        sink.drain();
    }
    assert_eq!(sink.snapshot().chunks.len(), pushed);
}

#[test]
fn transport_state_machine() {
    let (mut session, _) = video_only();
    assert_eq!(session.state().unwrap().playback, PlaybackState::Stopped);
    session.play().unwrap();
    assert_eq!(session.state().unwrap().playback, PlaybackState::Playing);
    session.toggle_pause().unwrap();
    assert_eq!(session.state().unwrap().playback, PlaybackState::Paused);
    session.resume().unwrap();
    assert_eq!(session.state().unwrap().playback, PlaybackState::Playing);
    session.seek(4.0, false).unwrap();
    session.stop().unwrap();
    assert_eq!(session.state().unwrap().playback, PlaybackState::Stopped);
    assert_eq!(session.get_pos().unwrap(), 0.0);
    session.seek(4.0, false).unwrap();
    session.restart().unwrap();
    assert_eq!(session.get_pos().unwrap(), 0.0);
    assert_eq!(session.state().unwrap().playback, PlaybackState::Playing);
}

#[test]
fn natural_end_stops_unless_looping() {
    let (mut session, _) = video_only();
    session.play().unwrap();
    let start = Instant::now();
    session.update_at(start).unwrap();
    session.update_at(start + Duration::from_secs(11)).unwrap();
    assert!(session.is_ended().unwrap());
    assert_eq!(session.state().unwrap().playback, PlaybackState::Stopped);

    session.set_looping(true).unwrap();
    session.play().unwrap();
    let start = Instant::now();
    session.update_at(start).unwrap();
    session.update_at(start + Duration::from_secs(11)).unwrap();
    assert!(!session.is_ended().unwrap());
    assert_eq!(session.state().unwrap().playback, PlaybackState::Playing);
}

#[test]
fn volume_and_mute_reach_the_sink() {
    let (mut session, sink) = with_audio(SyntheticExtractor::new());
    session.set_volume(0.3).unwrap();
    assert!((sink.snapshot().volume - 0.3).abs() < 1e-6);
    session.volume_up().unwrap();
    assert!((session.get_volume().unwrap() - 0.35).abs() < 1e-6);
    session.mute().unwrap();
    assert!(sink.snapshot().muted);
    session.toggle_mute().unwrap();
    assert!(!session.is_muted().unwrap());
    session.set_volume(7.0).unwrap();
    assert_eq!(session.get_volume().unwrap(), 1.0);
}

#[test]
fn draw_hands_new_frames_to_the_sink() {
    let (mut session, _) = video_only();
    let mut sink = RecordingFrameSink::default();
    assert!(session.draw(&mut sink, true).unwrap());
    assert!(!session.draw(&mut sink, false).unwrap());
    session.seek_frame(12, false).unwrap();
    assert!(session.draw(&mut sink, true).unwrap());
    assert_eq!(sink.indices(), vec![0, 12]);
    assert_eq!(sink.presented[1].1, (4, 4));
}

#[test]
fn resize_changes_output_and_metadata() {
    let (mut session, _) = video_only();
    session.resize(Some((2, 2))).unwrap();
    session.force_frame().unwrap();
    let frame = session.frame().unwrap().unwrap();
    assert_eq!((frame.width, frame.height), (2, 2));
    let metadata = session.metadata().unwrap();
    assert_eq!(metadata.output_size, (2, 2));
    assert_eq!(metadata.original_size, (4, 4));
    session.resize(None).unwrap();
    assert_eq!(session.metadata().unwrap().output_size, (4, 4));
}

#[test]
fn metadata_map_reports_derived_properties() {
    let (session, _) = with_audio(SyntheticExtractor::new());
    let map = session.metadata().unwrap().to_map();
    assert_eq!(map["frame_count"], serde_json::json!(FRAMES));
    assert_eq!(map["frame_rate"], serde_json::json!(FPS));
    assert_eq!(map["duration_secs"], serde_json::json!(10.0));
    assert_eq!(map["original_size"], serde_json::json!([4, 4]));
    assert_eq!(map["audio_channels"], serde_json::json!(2));
    assert_eq!(map["colour_format"], serde_json::json!("rgb"));
    assert_eq!(map["vfr"], serde_json::json!(false));
}

#[test]
fn native_timestamps_drive_frame_lookup() {
    let timestamps = vec![0.0, 0.1, 0.15, 0.5, 1.0];
    let source = ScriptedSource::new(5, 10.0, (2, 2)).with_timestamps(timestamps);
    let mut session = PlaybackSession::with_components(Box::new(source), None, &config()).unwrap();
    assert!(session.metadata().unwrap().vfr);
    session.seek(0.4, false).unwrap();
    assert_eq!(session.frame_index().unwrap(), 2);
    session.seek(0.7, false).unwrap();
    assert_eq!(session.frame_index().unwrap(), 3);
}

#[test]
fn stream_resolver_errors_abort_open() {
    let resolver = |_: &str| -> framepace::Result<ResolvedStream> {
        Err(Error::UnsupportedFormat("no playable formats".to_string()))
    };
    let result = PlaybackSession::open_stream(&resolver, "https://example.invalid/v", &config());
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}

#[test]
fn open_with_no_usable_backend_fails() {
    let config = PlaybackConfig {
        backends: vec![framepace::application::port::BackendKind::Custom],
        ..config()
    };
    let result = PlaybackSession::open(MediaLocator::path("/nonexistent/clip.mp4"), &config);
    assert!(matches!(result, Err(Error::NoBackendAvailable)));
}

#[test]
fn close_is_idempotent_and_quiesces_workers() {
    let extractor = SyntheticExtractor::new().with_delay(Duration::from_millis(5));
    let source = ScriptedSource::new(FRAMES, FPS, (4, 4)).with_audio(2, 1_000);
    let log = source.log_handle();
    let sink = RecordingAudioSink::new(1_000, 2);
    let mut session = PlaybackSession::with_components(
        Box::new(source),
        Some((Box::new(extractor.clone()), Box::new(sink))),
        &config(),
    )
    .unwrap();
    session.play().unwrap();
    for _ in 0..5 {
        session.update().unwrap();
    }

    session.close();
    session.close();
    assert!(log.snapshot().closed);
    let requests = extractor.requests().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(extractor.requests().len(), requests);

    assert_eq!(session.play(), Err(Error::Closed));
    assert_eq!(session.seek(1.0, false), Err(Error::Closed));
    assert_eq!(session.update(), Err(Error::Closed));
    assert_eq!(session.set_reverse(true), Err(Error::Closed));
    assert!(matches!(session.frame(), Err(Error::Closed)));
}
