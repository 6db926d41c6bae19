//! Offline gate trace over a WAV file.
//!
//! Runs the full detector → gate → emitter path against a recording and
//! prints every emitted segment as JSON, one per line. Useful for tuning
//! gate parameters against known audio.
//!
//! ```text
//! cargo run --bin gate_trace -- recording.wav
//! cargo run --features onnx --bin gate_trace -- recording.wav --model silero_vad.onnx
//! RUST_LOG=limen_core=debug cargo run --bin gate_trace -- recording.wav
//! ```

use std::path::PathBuf;
use std::sync::{atomic::AtomicU64, Arc};

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use limen_core::engine::pipeline::PipelineDiagnostics;
use limen_core::{detector, AudioChunk, VadConfig, VadSession};

struct Args {
    wav: PathBuf,
    model: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut wav = None;
    let mut model = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--model" => {
                let path = iter.next().context("--model requires a path")?;
                model = Some(PathBuf::from(path));
            }
            _ if wav.is_none() => wav = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument: {other}"),
        }
    }

    Ok(Args {
        wav: wav.context("usage: gate_trace <recording.wav> [--model silero_vad.onnx]")?,
        model,
    })
}

/// Read a WAV file as mono f32 samples in [-1.0, 1.0].
fn read_wav(path: &PathBuf) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("reading float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("reading integer samples")?
        }
    };

    let channels = spec.channels as usize;
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let (samples, sample_rate) = read_wav(&args.wav)?;
    info!(
        path = %args.wav.display(),
        sample_rate,
        duration_s = samples.len() as f32 / sample_rate as f32,
        "loaded recording"
    );

    let config = VadConfig::default();
    let samples_per_chunk =
        (sample_rate as usize * config.chunk_duration_ms as usize) / 1000;

    let selection = detector::loader::load(args.model.as_deref(), 0.01);
    info!(detector = ?selection.kind, degraded = ?selection.degraded, "detector selected");

    let (segment_tx, mut segment_rx) = broadcast::channel(1024);
    let (activity_tx, _) = broadcast::channel(1024);
    let mut session = VadSession::new(
        config,
        30_000,
        selection.detector,
        segment_tx,
        activity_tx,
        Arc::new(AtomicU64::new(0)),
        Arc::new(PipelineDiagnostics::default()),
    );

    for (seq, window) in samples.chunks(samples_per_chunk).enumerate() {
        session.process(AudioChunk::new(window.to_vec(), sample_rate, seq as u64));
    }
    session.finish();

    let mut total = 0usize;
    while let Ok(event) = segment_rx.try_recv() {
        total += 1;
        let line = serde_json::json!({
            "seq": event.seq,
            "reason": event.segment.reason,
            "startSeq": event.segment.start_seq(),
            "endSeq": event.segment.end_seq(),
            "chunks": event.segment.chunks.len(),
            "durationMs": event.segment.duration_ms(),
        });
        println!("{line}");
    }
    info!(segments = total, "trace complete");

    Ok(())
}
