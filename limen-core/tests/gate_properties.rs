//! End-to-end engine tests: lifecycle, gating over the public API, detector
//! fallback, and diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::broadcast::Receiver;
use tokio::time::{sleep, timeout};

use limen_core::{
    AudioChunk, CloseReason, DetectorKind, EngineConfig, EngineStatus, LimenEngine, LimenError,
    SegmentEvent, VadConfig,
};

const CHUNK_SAMPLES: usize = 480; // 30 ms at 16 kHz

fn fast_config() -> EngineConfig {
    EngineConfig {
        vad: VadConfig {
            threshold: 0.5,
            min_speech_ms: 60,  // 2 chunks
            min_silence_ms: 60, // 2 chunks
            gate_close_timeout_ms: 5_000,
            chunk_duration_ms: 30,
        },
        ..EngineConfig::default()
    }
}

fn loud(seq: u64) -> AudioChunk {
    AudioChunk::new(vec![0.3; CHUNK_SAMPLES], 16_000, seq)
}

fn quiet(seq: u64) -> AudioChunk {
    AudioChunk::new(vec![0.0; CHUNK_SAMPLES], 16_000, seq)
}

async fn recv_segment(rx: &mut Receiver<SegmentEvent>) -> SegmentEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for segment")
        .expect("segment channel closed")
}

/// Poll until the worker has consumed at least `n` chunks.
async fn wait_for_chunks(engine: &LimenEngine, n: usize) {
    for _ in 0..200 {
        if engine.diagnostics_snapshot().chunks_in >= n {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "worker consumed only {} of {n} chunks",
        engine.diagnostics_snapshot().chunks_in
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn start_and_stop_enforce_lifecycle_order() {
    let engine = LimenEngine::new(fast_config());
    assert_eq!(engine.status(), EngineStatus::Idle);
    assert!(matches!(engine.frame_sink(), Err(LimenError::NotRunning)));

    engine.start().expect("first start");
    assert_eq!(engine.status(), EngineStatus::Listening);
    assert!(matches!(engine.start(), Err(LimenError::AlreadyRunning)));

    engine.stop().expect("stop");
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(matches!(engine.stop(), Err(LimenError::NotRunning)));
    assert!(matches!(engine.frame_sink(), Err(LimenError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread")]
async fn loud_then_quiet_audio_produces_one_silence_segment() {
    let engine = LimenEngine::new(fast_config());
    let mut segments = engine.subscribe_segments();
    engine.start().expect("start");

    let sink = engine.frame_sink().expect("sink");
    for seq in 0..4 {
        sink.push(loud(seq));
    }
    for seq in 4..8 {
        sink.push(quiet(seq));
    }

    let event = recv_segment(&mut segments).await;
    assert_eq!(event.segment.reason, CloseReason::Silence);
    assert_eq!(event.segment.start_seq(), Some(0));
    // The segment ends at the chunk whose silence run crossed the threshold.
    assert_eq!(event.segment.end_seq(), Some(5));

    engine.stop().expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_flushes_open_segment_as_teardown() {
    let engine = LimenEngine::new(fast_config());
    let mut segments = engine.subscribe_segments();
    engine.start().expect("start");

    let sink = engine.frame_sink().expect("sink");
    for seq in 0..6 {
        sink.push(loud(seq));
    }
    wait_for_chunks(&engine, 6).await;

    engine.stop().expect("stop");

    let event = recv_segment(&mut segments).await;
    assert_eq!(event.segment.reason, CloseReason::Teardown);
    assert_eq!(event.segment.start_seq(), Some(0));
    assert_eq!(event.segment.end_seq(), Some(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_falls_back_to_amplitude_and_reports_it_once() {
    let engine = LimenEngine::new(EngineConfig {
        model_path: Some(PathBuf::from("/nonexistent/silero_vad.onnx")),
        ..fast_config()
    });
    let mut status = engine.subscribe_status();
    engine.start().expect("start still succeeds on fallback");

    assert_eq!(engine.detector_kind(), Some(DetectorKind::Amplitude));

    let warming = status.try_recv().expect("warming-up event");
    assert_eq!(warming.status, EngineStatus::WarmingUp);
    assert!(warming.detail.is_none());

    let listening = status.try_recv().expect("listening event");
    assert_eq!(listening.status, EngineStatus::Listening);
    assert!(
        listening.detail.is_some(),
        "fallback must be reported in the listening event"
    );

    // The degradation is reported exactly once; gating still works.
    let mut segments = engine.subscribe_segments();
    let sink = engine.frame_sink().expect("sink");
    for seq in 0..4 {
        sink.push(loud(seq));
    }
    for seq in 4..8 {
        sink.push(quiet(seq));
    }
    let event = recv_segment(&mut segments).await;
    assert_eq!(event.segment.reason, CloseReason::Silence);

    engine.stop().expect("stop");
    assert!(status.try_recv().expect("stopped event").detail.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn amplitude_without_model_path_is_not_a_degradation() {
    let engine = LimenEngine::new(fast_config());
    let mut status = engine.subscribe_status();
    engine.start().expect("start");

    assert_eq!(engine.detector_kind(), Some(DetectorKind::Amplitude));

    let warming = status.try_recv().expect("warming-up event");
    assert_eq!(warming.status, EngineStatus::WarmingUp);
    let listening = status.try_recv().expect("listening event");
    assert_eq!(listening.status, EngineStatus::Listening);
    assert!(listening.detail.is_none());

    engine.stop().expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn diagnostics_track_consumed_chunks_and_segments() {
    let engine = LimenEngine::new(fast_config());
    let mut segments = engine.subscribe_segments();
    engine.start().expect("start");

    let sink = engine.frame_sink().expect("sink");
    for seq in 0..4 {
        sink.push(loud(seq));
    }
    for seq in 4..8 {
        sink.push(quiet(seq));
    }
    recv_segment(&mut segments).await;
    wait_for_chunks(&engine, 8).await;

    let snap = engine.diagnostics_snapshot();
    assert_eq!(snap.chunks_in, 8);
    assert_eq!(snap.segments_emitted, 1);
    assert_eq!(snap.gate_opens, 1);
    assert_eq!(snap.gate_closes, 1);
    assert_eq!(snap.chunks_dropped, 0);
    assert_eq!(snap.forced_closes, 0);

    engine.stop().expect("stop");
}
