//! Silero VAD neural speech detector.
//!
//! Wraps the Silero VAD ONNX model published at
//! <https://github.com/snakers4/silero-vad>, supporting both the v3/v4 LSTM
//! interface (separate `h`/`c` tensors) and the v5 GRU interface (single
//! `state` tensor).
//!
//! The model consumes 512-sample windows at 16 kHz. Incoming chunks are
//! accumulated into a carry-over buffer; each complete window runs one
//! inference and updates the recurrent state. The per-chunk probability is
//! the maximum over the windows completed by that chunk, or the previous
//! value when the chunk did not complete a window (a 30 ms chunk at 16 kHz
//! is 480 samples, so roughly every 16th chunk yields two windows).

use std::path::Path;

use ndarray::{Array1, Array2, Array3};
use ort::session::builder::SessionBuilder;
use ort::session::SessionInputValue;
use ort::value::Value;
use tracing::{info, warn};

use super::SpeechDetector;
use crate::buffering::chunk::AudioChunk;
use crate::error::{LimenError, Result};

/// Window size expected by Silero VAD (samples at 16 kHz = 32 ms).
const WINDOW: usize = 512;
/// Sample rate the model was trained for.
const MODEL_RATE: u32 = 16_000;
/// v3/v4 LSTM state size: 2 layers × 1 batch × 64 units.
const LSTM_SIZE: usize = 128;
/// v5 GRU state size: 2 layers × 1 batch × 128 units.
const GRU_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IoMode {
    /// v3/v4: separate `h`/`c` state tensors, outputs `hn`/`cn`.
    Lstm,
    /// v5: single `state` tensor, output `stateN`.
    Gru,
    /// No recurrent state passing.
    Stateless,
}

/// Neural detector backed by the Silero VAD ONNX model.
pub struct SileroDetector {
    session: ort::session::Session,
    io_mode: IoMode,
    input_name: String,
    sr_name: Option<String>,
    output_name: String,
    h_name: Option<String>,
    c_name: Option<String>,
    hn_name: Option<String>,
    cn_name: Option<String>,
    state_name: Option<String>,
    state_out_name: Option<String>,
    h: Vec<f32>,
    c: Vec<f32>,
    state: Vec<f32>,
    carry: Vec<f32>,
    last_prob: f32,
    shape_warned: bool,
}

impl SileroDetector {
    /// Load the Silero VAD ONNX model from `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LimenError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let session = SessionBuilder::new()
            .map_err(|e| LimenError::OnnxSession(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        let input_name = resolve_name(&input_names, &["input", "audio", "x"])
            .or_else(|| input_names.first().cloned())
            .ok_or_else(|| LimenError::OnnxSession("Silero model has no inputs".into()))?;
        let sr_name = resolve_name(&input_names, &["sr", "sample_rate"]);
        let h_name = resolve_name(&input_names, &["h", "state_h"]);
        let c_name = resolve_name(&input_names, &["c", "state_c"]);
        let state_name = resolve_name(&input_names, &["state", "h_0", "hidden"]);

        let output_name = resolve_name(&output_names, &["output", "speech_prob", "prob"])
            .or_else(|| output_names.first().cloned())
            .ok_or_else(|| LimenError::OnnxSession("Silero model has no outputs".into()))?;
        let hn_name = resolve_name(&output_names, &["hn", "state_hn", "h_out"]);
        let cn_name = resolve_name(&output_names, &["cn", "state_cn", "c_out"]);
        let state_out_name =
            resolve_name(&output_names, &["stateN", "state_out", "h_0_out", "hn_out"]);

        let io_mode = if h_name.is_some() && c_name.is_some() && hn_name.is_some() && cn_name.is_some()
        {
            IoMode::Lstm
        } else if state_name.is_some() {
            IoMode::Gru
        } else {
            IoMode::Stateless
        };

        info!(
            path = %path.display(),
            inputs = ?input_names,
            outputs = ?output_names,
            ?io_mode,
            "Silero VAD model loaded"
        );

        Ok(Self {
            session,
            io_mode,
            input_name,
            sr_name,
            output_name,
            h_name,
            c_name,
            hn_name,
            cn_name,
            state_name,
            state_out_name,
            h: vec![0.0; LSTM_SIZE],
            c: vec![0.0; LSTM_SIZE],
            state: vec![0.0; GRU_SIZE],
            carry: Vec::new(),
            last_prob: 0.0,
            shape_warned: false,
        })
    }

    /// Run one 512-sample window through the model; update recurrent state.
    fn run_window(&mut self, window: &[f32]) -> Result<f32> {
        debug_assert_eq!(window.len(), WINDOW);

        let input_arr = Array2::<f32>::from_shape_vec((1, WINDOW), window.to_vec())
            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
        let input_val = Value::from_array(input_arr)
            .map_err(|e: ort::Error| LimenError::OnnxSession(e.to_string()))?;

        let mut inputs: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), input_val.into())];

        if let Some(sr_name) = &self.sr_name {
            let sr_arr = Array1::<i64>::from_elem(1, MODEL_RATE as i64);
            let sr_val = Value::from_array(sr_arr)
                .map_err(|e: ort::Error| LimenError::OnnxSession(e.to_string()))?;
            inputs.push((sr_name.clone(), sr_val.into()));
        }

        match self.io_mode {
            IoMode::Lstm => {
                let h_arr = Array3::<f32>::from_shape_vec((2, 1, 64), self.h.clone())
                    .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
                let c_arr = Array3::<f32>::from_shape_vec((2, 1, 64), self.c.clone())
                    .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
                let h_val = Value::from_array(h_arr)
                    .map_err(|e: ort::Error| LimenError::OnnxSession(e.to_string()))?;
                let c_val = Value::from_array(c_arr)
                    .map_err(|e: ort::Error| LimenError::OnnxSession(e.to_string()))?;
                if let (Some(h_name), Some(c_name)) = (&self.h_name, &self.c_name) {
                    inputs.push((h_name.clone(), h_val.into()));
                    inputs.push((c_name.clone(), c_val.into()));
                }
            }
            IoMode::Gru => {
                let state_arr = Array3::<f32>::from_shape_vec((2, 1, 128), self.state.clone())
                    .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
                let state_val = Value::from_array(state_arr)
                    .map_err(|e: ort::Error| LimenError::OnnxSession(e.to_string()))?;
                if let Some(state_name) = &self.state_name {
                    inputs.push((state_name.clone(), state_val.into()));
                }
            }
            IoMode::Stateless => {}
        }

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;

        let prob_output = outputs
            .get(self.output_name.as_str())
            .unwrap_or(&outputs[0]);
        let (_, prob_data) = prob_output
            .try_extract_tensor::<f32>()
            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
        let prob = prob_data.first().copied().unwrap_or(0.0);

        match self.io_mode {
            IoMode::Lstm => {
                if let (Some(hn_name), Some(cn_name)) = (self.hn_name.clone(), self.cn_name.clone())
                {
                    if let (Some(hn_out), Some(cn_out)) =
                        (outputs.get(hn_name.as_str()), outputs.get(cn_name.as_str()))
                    {
                        let (_, hn_data) = hn_out
                            .try_extract_tensor::<f32>()
                            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
                        let (_, cn_data) = cn_out
                            .try_extract_tensor::<f32>()
                            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
                        self.h = hn_data.to_vec();
                        self.c = cn_data.to_vec();
                    } else {
                        warn!("Silero LSTM state outputs missing; continuing stateless");
                        self.io_mode = IoMode::Stateless;
                    }
                }
            }
            IoMode::Gru => {
                if let Some(state_out_name) = self.state_out_name.clone() {
                    if let Some(state_out) = outputs.get(state_out_name.as_str()) {
                        let (_, state_data) = state_out
                            .try_extract_tensor::<f32>()
                            .map_err(|e| LimenError::OnnxSession(e.to_string()))?;
                        self.state = state_data.to_vec();
                    } else {
                        warn!("Silero GRU state output missing; continuing stateless");
                        self.io_mode = IoMode::Stateless;
                    }
                }
            }
            IoMode::Stateless => {}
        }

        Ok(prob)
    }
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

impl SpeechDetector for SileroDetector {
    fn probability(&mut self, chunk: &AudioChunk) -> Result<f32> {
        if chunk.sample_rate != MODEL_RATE {
            // Caller contract violation: chunking/resampling upstream must
            // deliver 16 kHz audio. Fatal in debug builds; release builds
            // treat the chunk as silence to keep the audio path alive.
            debug_assert!(
                false,
                "{}",
                LimenError::InputShape {
                    expected_rate: MODEL_RATE,
                    got_rate: chunk.sample_rate,
                }
            );
            if !self.shape_warned {
                warn!(
                    expected = MODEL_RATE,
                    got = chunk.sample_rate,
                    "chunk sample rate mismatch — treating as silence"
                );
                self.shape_warned = true;
            }
            return Ok(0.0);
        }

        self.carry.extend_from_slice(&chunk.samples);

        let mut max_prob: Option<f32> = None;
        while self.carry.len() >= WINDOW {
            let window: Vec<f32> = self.carry[..WINDOW].to_vec();
            self.carry.drain(..WINDOW);
            let prob = self.run_window(&window)?;
            max_prob = Some(max_prob.map_or(prob, |p: f32| p.max(prob)));
        }

        if let Some(prob) = max_prob {
            self.last_prob = prob;
        }
        Ok(self.last_prob)
    }

    fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
        self.state.iter_mut().for_each(|v| *v = 0.0);
        self.carry.clear();
        self.last_prob = 0.0;
    }
}
