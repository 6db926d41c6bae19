//! Gate state machine: probability stream in, gate-open/gate-close out.
//!
//! ## Transition table
//!
//! ```text
//!            prob ≥ threshold                    prob < threshold
//! Closed  │ count run; open when run        │ reset run, discard onset
//!         │ reaches min_speech (onset kept) │
//! Opening │ (Closed with a nonzero run)     │ back to Closed
//! Open    │ stay, reset below-run           │ start/continue below-run
//! Closing │ revert to Open, reset below-run │ close when run reaches
//!         │ (brief dips absorbed)           │ min_silence or the timeout
//! ```
//!
//! All durations are counted in whole chunks (`ceil(ms / chunk_ms)`), so a
//! replayed chunk sequence always yields the identical event sequence. The
//! gate-close timeout is likewise counted in chunk time; it wins over
//! `min_silence` when misconfigured shorter.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::buffering::chunk::{AudioChunk, CloseReason};
use crate::detector::DetectionResult;

/// Gate tuning, immutable once a session starts.
///
/// Duration fields are whole milliseconds; counting happens in whole chunks
/// of `chunk_duration_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadConfig {
    /// Speech probability threshold in (0, 1). Default: 0.5.
    pub threshold: f32,
    /// Sustained above-threshold audio required to open the gate.
    /// 0 opens on the first above-threshold chunk. Default: 250 ms.
    pub min_speech_ms: u32,
    /// Sustained below-threshold audio required to close the gate.
    /// 0 closes on the first below-threshold chunk. Default: 800 ms.
    pub min_silence_ms: u32,
    /// Hard ceiling on one closing episode, independent of probability.
    /// Must be ≥ `min_silence_ms`; if shorter, the timeout wins and closes
    /// early (warned at construction, not rejected). Default: 2000 ms.
    pub gate_close_timeout_ms: u32,
    /// Fixed chunk duration delivered by the frame source. Default: 30 ms.
    pub chunk_duration_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_ms: 250,
            min_silence_ms: 800,
            gate_close_timeout_ms: 2_000,
            chunk_duration_ms: 30,
        }
    }
}

impl VadConfig {
    /// Convert a duration to whole chunks, rounding up.
    pub fn chunks_for(&self, ms: u32) -> u32 {
        let chunk_ms = self.chunk_duration_ms.max(1);
        ms.div_ceil(chunk_ms)
    }
}

/// Externally observable gate state. Exactly one per active session,
/// mutated only by [`GateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// No speech; no above-threshold run in progress.
    Closed,
    /// Above-threshold run accumulating but not yet at `min_speech_ms`.
    Opening,
    /// Speech in progress; last chunk was above threshold.
    Open,
    /// Below-threshold run inside an open gate (hysteresis window).
    Closing,
}

/// A discrete gate event produced by [`GateMachine::advance`].
#[derive(Debug, Clone)]
pub enum GateTransition {
    /// The gate opened. Carries the chunks of the opening run so the
    /// segment starts at the onset, not at the chunk that crossed the
    /// duration bar.
    Opened { onset: Vec<AudioChunk> },
    /// The gate closed. The chunk passed to `advance` is the closing
    /// trigger and belongs to the segment.
    Closed { reason: CloseReason },
}

/// The gate state machine.
///
/// Transitions are a strict function of (state, consecutive-above run,
/// consecutive-below run); no external code can set the state directly.
pub struct GateMachine {
    config: VadConfig,
    /// Chunks needed to open (≥ 1).
    open_after: u32,
    /// Below-run length that closes with `CloseReason::Silence` (≥ 1).
    close_after: u32,
    /// Below-run length at which the timeout ceiling fires (≥ 1).
    timeout_after: u32,
    open: bool,
    above_run: u32,
    below_run: u32,
    onset: Vec<AudioChunk>,
    last_seq: Option<u64>,
}

impl GateMachine {
    pub fn new(config: VadConfig) -> Self {
        if config.gate_close_timeout_ms < config.min_silence_ms {
            warn!(
                gate_close_timeout_ms = config.gate_close_timeout_ms,
                min_silence_ms = config.min_silence_ms,
                "gate close timeout shorter than min silence — timeout policy wins, gates will close early"
            );
        }
        debug_assert!(
            config.threshold > 0.0 && config.threshold < 1.0,
            "threshold must be in (0, 1)"
        );

        let open_after = config.chunks_for(config.min_speech_ms).max(1);
        let close_after = config.chunks_for(config.min_silence_ms).max(1);
        let timeout_after = config.chunks_for(config.gate_close_timeout_ms).max(1);

        Self {
            config,
            open_after,
            close_after,
            timeout_after,
            open: false,
            above_run: 0,
            below_run: 0,
            onset: Vec::new(),
            last_seq: None,
        }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Current externally observable state.
    pub fn state(&self) -> GateState {
        match (self.open, self.above_run, self.below_run) {
            (false, 0, _) => GateState::Closed,
            (false, _, _) => GateState::Opening,
            (true, _, 0) => GateState::Open,
            (true, _, _) => GateState::Closing,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Feed one detection result and its chunk; returns a transition when
    /// the gate opened or closed on this chunk.
    ///
    /// The frame source contract is strictly increasing sequence numbers;
    /// violations are debug-asserted, not recovered.
    pub fn advance(
        &mut self,
        result: &DetectionResult,
        chunk: &AudioChunk,
    ) -> Option<GateTransition> {
        debug_assert_eq!(result.chunk_seq, chunk.seq);
        if let Some(last) = self.last_seq {
            debug_assert!(chunk.seq > last, "chunk sequence numbers must increase");
        }
        self.last_seq = Some(chunk.seq);

        let above = result.probability >= self.config.threshold;

        if !self.open {
            if above {
                self.onset.push(chunk.clone());
                self.above_run += 1;
                if self.above_run >= self.open_after {
                    self.open = true;
                    self.above_run = 0;
                    self.below_run = 0;
                    return Some(GateTransition::Opened {
                        onset: std::mem::take(&mut self.onset),
                    });
                }
            } else {
                self.above_run = 0;
                self.onset.clear();
            }
            return None;
        }

        if above {
            self.below_run = 0;
            return None;
        }

        self.below_run += 1;
        let reason = if self.below_run >= self.close_after {
            Some(CloseReason::Silence)
        } else if self.below_run >= self.timeout_after {
            Some(CloseReason::Timeout)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.open = false;
            self.below_run = 0;
            return Some(GateTransition::Closed { reason });
        }
        None
    }

    /// Drop all run state (between sessions or after teardown).
    pub fn reset(&mut self) {
        self.open = false;
        self.above_run = 0;
        self.below_run = 0;
        self.onset.clear();
        self.last_seq = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64) -> AudioChunk {
        AudioChunk::new(vec![0.0; 480], 16_000, seq)
    }

    fn feed(machine: &mut GateMachine, seq: u64, probability: f32) -> Option<GateTransition> {
        let c = chunk(seq);
        machine.advance(
            &DetectionResult {
                probability,
                chunk_seq: seq,
            },
            &c,
        )
    }

    fn config(min_speech_ms: u32, min_silence_ms: u32) -> VadConfig {
        VadConfig {
            threshold: 0.5,
            min_speech_ms,
            min_silence_ms,
            gate_close_timeout_ms: 5_000,
            chunk_duration_ms: 30,
        }
    }

    #[test]
    fn duration_to_chunks_rounds_up() {
        let cfg = config(250, 800);
        assert_eq!(cfg.chunks_for(250), 9);
        assert_eq!(cfg.chunks_for(800), 27);
        assert_eq!(cfg.chunks_for(0), 0);
        assert_eq!(cfg.chunks_for(30), 1);
    }

    #[test]
    fn interrupted_run_never_opens_then_second_run_opens_at_ninth_chunk() {
        // Scenario: threshold 0.5, 250 ms speech (9 chunks), 800 ms silence.
        // 5 chunks at 0.9, one dip at 0.2, then 10 chunks at 0.9 — exactly
        // one open, on the 9th consecutive qualifying chunk of the second run.
        let mut gate = GateMachine::new(config(250, 800));
        let mut seq = 0u64;
        let mut opens = Vec::new();

        for _ in 0..5 {
            if let Some(GateTransition::Opened { .. }) = feed(&mut gate, seq, 0.9) {
                opens.push(seq);
            }
            seq += 1;
        }
        assert!(feed(&mut gate, seq, 0.2).is_none());
        seq += 1;
        assert_eq!(gate.state(), GateState::Closed);

        let second_run_start = seq;
        for _ in 0..10 {
            if let Some(GateTransition::Opened { onset }) = feed(&mut gate, seq, 0.9) {
                opens.push(seq);
                // Onset spans the whole second run so far, not just the
                // chunk that crossed the duration bar.
                assert_eq!(onset.first().unwrap().seq, second_run_start);
                assert_eq!(onset.len(), 9);
            }
            seq += 1;
        }

        assert_eq!(opens, vec![second_run_start + 8]);
        assert_eq!(gate.state(), GateState::Open);
    }

    #[test]
    fn brief_dip_below_threshold_never_closes() {
        // Scenario: open gate, 5 below-threshold chunks (fewer than the 27
        // needed), then probability recovers — no close event at all.
        let mut gate = GateMachine::new(config(0, 800));
        assert!(matches!(
            feed(&mut gate, 0, 0.9),
            Some(GateTransition::Opened { .. })
        ));

        for seq in 1..=5 {
            assert!(feed(&mut gate, seq, 0.2).is_none());
        }
        assert_eq!(gate.state(), GateState::Closing);

        assert!(feed(&mut gate, 6, 0.9).is_none());
        assert_eq!(gate.state(), GateState::Open);

        // The absorbed dip leaves no residue: a fresh full-length silence
        // run is still required to close.
        for seq in 7..(7 + 26) {
            assert!(feed(&mut gate, seq, 0.2).is_none());
        }
        assert!(matches!(
            feed(&mut gate, 33, 0.2),
            Some(GateTransition::Closed {
                reason: CloseReason::Silence
            })
        ));
        assert_eq!(gate.state(), GateState::Closed);
    }

    #[test]
    fn zero_min_speech_opens_on_first_above_chunk() {
        let mut gate = GateMachine::new(config(0, 800));
        match feed(&mut gate, 0, 0.6) {
            Some(GateTransition::Opened { onset }) => {
                assert_eq!(onset.len(), 1);
                assert_eq!(onset[0].seq, 0);
            }
            other => panic!("expected immediate open, got {other:?}"),
        }
    }

    #[test]
    fn zero_min_silence_closes_on_first_below_chunk() {
        let mut gate = GateMachine::new(config(0, 0));
        assert!(feed(&mut gate, 0, 0.9).is_some());
        assert!(matches!(
            feed(&mut gate, 1, 0.1),
            Some(GateTransition::Closed {
                reason: CloseReason::Silence
            })
        ));
    }

    #[test]
    fn shorter_timeout_wins_over_min_silence() {
        let cfg = VadConfig {
            threshold: 0.5,
            min_speech_ms: 0,
            min_silence_ms: 800,  // 27 chunks
            gate_close_timeout_ms: 300, // 10 chunks — misconfigured shorter
            chunk_duration_ms: 30,
        };
        let mut gate = GateMachine::new(cfg);
        assert!(feed(&mut gate, 0, 0.9).is_some());

        for seq in 1..10 {
            assert!(feed(&mut gate, seq, 0.1).is_none());
        }
        assert!(matches!(
            feed(&mut gate, 10, 0.1),
            Some(GateTransition::Closed {
                reason: CloseReason::Timeout
            })
        ));
    }

    #[test]
    fn opening_state_is_observable_but_not_emitted() {
        let mut gate = GateMachine::new(config(250, 800));
        assert_eq!(gate.state(), GateState::Closed);
        assert!(feed(&mut gate, 0, 0.9).is_none());
        assert_eq!(gate.state(), GateState::Opening);
        assert!(feed(&mut gate, 1, 0.2).is_none());
        assert_eq!(gate.state(), GateState::Closed);
    }

    #[test]
    fn threshold_boundary_counts_as_speech() {
        let mut gate = GateMachine::new(config(0, 0));
        assert!(matches!(
            feed(&mut gate, 0, 0.5),
            Some(GateTransition::Opened { .. })
        ));
    }

    #[test]
    fn replay_yields_identical_transitions() {
        let probs: Vec<f32> = vec![
            0.9, 0.9, 0.2, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.2, 0.2, 0.9, 0.2, 0.2,
            0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2,
        ];
        let cfg = VadConfig {
            threshold: 0.5,
            min_speech_ms: 120, // 4 chunks
            min_silence_ms: 240, // 8 chunks
            gate_close_timeout_ms: 1_000,
            chunk_duration_ms: 30,
        };

        let run = |cfg: VadConfig| -> Vec<String> {
            let mut gate = GateMachine::new(cfg);
            probs
                .iter()
                .enumerate()
                .filter_map(|(i, &p)| {
                    feed(&mut gate, i as u64, p).map(|t| match t {
                        GateTransition::Opened { onset } => {
                            format!("open@{i} onset={}", onset.len())
                        }
                        GateTransition::Closed { reason } => format!("close@{i} {reason:?}"),
                    })
                })
                .collect()
        };

        let first = run(cfg.clone());
        let second = run(cfg);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn reset_returns_to_closed_with_no_residue() {
        let mut gate = GateMachine::new(config(60, 800));
        feed(&mut gate, 0, 0.9);
        feed(&mut gate, 1, 0.9);
        assert!(gate.is_open());
        gate.reset();
        assert_eq!(gate.state(), GateState::Closed);
        // Sequence restarts are legal after a reset.
        assert!(feed(&mut gate, 0, 0.2).is_none());
    }
}
