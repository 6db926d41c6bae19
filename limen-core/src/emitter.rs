//! Segment emitter: buffers chunks from gate-open to gate-close inclusive,
//! then hands the completed segment downstream and clears.
//!
//! Buffer growth is bounded: if a segment reaches the configured maximum
//! duration with the gate still open (detector stuck high), the emitter
//! force-closes and emits, then reopens an empty segment immediately so one
//! runaway detection cannot starve the consumer indefinitely.

use tracing::warn;

use crate::buffering::chunk::{AudioChunk, CloseReason, SpeechSegment};

pub struct SegmentEmitter {
    buf: Vec<AudioChunk>,
    /// Maximum buffered chunks before a forced close. Never 0.
    max_chunks: usize,
    open: bool,
}

impl SegmentEmitter {
    pub fn new(max_chunks: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_chunks: max_chunks.max(1),
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn buffered_chunks(&self) -> usize {
        self.buf.len()
    }

    /// Begin a segment from the gate's onset chunks.
    ///
    /// Returns an overflow segment in the degenerate case where the onset
    /// alone exceeds the maximum (max shorter than min speech duration).
    pub fn open(&mut self, onset: Vec<AudioChunk>) -> Option<SpeechSegment> {
        debug_assert!(!self.open, "segment already open");
        self.open = true;
        self.buf = onset;
        self.maybe_overflow()
    }

    /// Append one chunk to the open segment.
    ///
    /// Returns `Some` when the append tripped the maximum duration: the
    /// returned segment carries `CloseReason::Overflow` and the emitter is
    /// already reopened (empty) for the back-to-back continuation.
    pub fn push(&mut self, chunk: AudioChunk) -> Option<SpeechSegment> {
        debug_assert!(self.open, "push on a closed emitter");
        self.buf.push(chunk);
        self.maybe_overflow()
    }

    /// Close the segment and take it. `None` when nothing is buffered.
    pub fn close(&mut self, reason: CloseReason) -> Option<SpeechSegment> {
        self.open = false;
        if self.buf.is_empty() {
            return None;
        }
        Some(SpeechSegment {
            chunks: std::mem::take(&mut self.buf),
            reason,
        })
    }

    fn maybe_overflow(&mut self) -> Option<SpeechSegment> {
        if self.buf.len() < self.max_chunks {
            return None;
        }
        warn!(
            buffered_chunks = self.buf.len(),
            max_chunks = self.max_chunks,
            "segment exceeded maximum duration — forcing close and reopening"
        );
        Some(SpeechSegment {
            chunks: std::mem::take(&mut self.buf),
            reason: CloseReason::Overflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64) -> AudioChunk {
        AudioChunk::new(vec![0.1; 480], 16_000, seq)
    }

    #[test]
    fn buffers_onset_through_close() {
        let mut emitter = SegmentEmitter::new(100);
        assert!(emitter.open(vec![chunk(3), chunk(4)]).is_none());
        assert!(emitter.push(chunk(5)).is_none());
        assert!(emitter.push(chunk(6)).is_none());

        let seg = emitter.close(CloseReason::Silence).expect("segment");
        assert_eq!(seg.start_seq(), Some(3));
        assert_eq!(seg.end_seq(), Some(6));
        assert_eq!(seg.chunks.len(), 4);
        assert_eq!(seg.reason, CloseReason::Silence);
        assert!(!emitter.is_open());
        assert_eq!(emitter.buffered_chunks(), 0);
    }

    #[test]
    fn overflow_emits_and_reopens_back_to_back() {
        let mut emitter = SegmentEmitter::new(3);
        assert!(emitter.open(vec![chunk(0)]).is_none());
        assert!(emitter.push(chunk(1)).is_none());

        let overflow = emitter.push(chunk(2)).expect("forced close");
        assert_eq!(overflow.reason, CloseReason::Overflow);
        assert_eq!(overflow.chunks.len(), 3);

        // Still open: the continuation starts immediately.
        assert!(emitter.is_open());
        assert!(emitter.push(chunk(3)).is_none());
        let seg = emitter.close(CloseReason::Silence).expect("continuation");
        assert_eq!(seg.start_seq(), Some(3));
    }

    #[test]
    fn close_with_empty_buffer_emits_nothing() {
        let mut emitter = SegmentEmitter::new(10);
        emitter.open(vec![chunk(0)]);
        emitter.close(CloseReason::Silence);
        assert!(emitter.close(CloseReason::Teardown).is_none());
    }
}
