//! Bounded chunk queue between the frame source and the gate worker.
//!
//! The frame source pushes; the worker pulls. When the worker falls behind
//! (e.g. neural inference slower than the chunk period on a weak device) the
//! queue drops the *oldest* unprocessed chunk and counts it, keeping memory
//! bounded. VAD is a best-effort gating signal, not a lossless audio path,
//! so losing the stalest chunk beats growing without limit.

pub mod chunk;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::{bounded, Receiver, TryRecvError, TrySendError};
use tracing::warn;

use chunk::AudioChunk;

/// Type alias for the consumer half — held by the worker thread.
pub type ChunkReceiver = Receiver<AudioChunk>;

/// Default queue depth: 64 chunks ≈ 1.9 s of audio at a 30 ms cadence.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Push handle held by the frame source.
///
/// Cloneable so the engine can keep one for drop accounting while the host
/// feeds chunks through another.
#[derive(Clone)]
pub struct FrameSink {
    tx: crossbeam_channel::Sender<AudioChunk>,
    rx: Receiver<AudioChunk>,
    dropped: Arc<AtomicUsize>,
}

impl FrameSink {
    /// Push one chunk, evicting the oldest queued chunk if the queue is full.
    ///
    /// Never blocks and never fails: overflow is recovered locally and
    /// reported via [`FrameSink::dropped_total`] plus a warn-level event.
    pub fn push(&self, chunk: AudioChunk) {
        let mut chunk = chunk;
        loop {
            match self.tx.try_send(chunk) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    match self.rx.try_recv() {
                        Ok(evicted) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                evicted_seq = evicted.seq,
                                incoming_seq = returned.seq,
                                "chunk queue full — dropping oldest unprocessed chunk"
                            );
                        }
                        Err(TryRecvError::Empty) => {
                            // Worker drained the queue between try_send and
                            // try_recv; retry the send.
                        }
                        Err(TryRecvError::Disconnected) => return,
                    }
                    chunk = returned;
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("chunk queue receiver gone — discarding chunk");
                    return;
                }
            }
        }
    }

    /// Total chunks evicted due to backpressure since creation.
    pub fn dropped_total(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a matched sink/receiver pair backed by a bounded channel.
pub fn create_chunk_queue(capacity: usize) -> (FrameSink, ChunkReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let sink = FrameSink {
        tx,
        rx: rx.clone(),
        dropped: Arc::new(AtomicUsize::new(0)),
    };
    (sink, rx)
}
