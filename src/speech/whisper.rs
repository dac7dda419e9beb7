//! Whisper transcriber built on whisper-rs
//!
//! Audio is read from WAV, down-mixed to mono and resampled to 16 kHz before
//! decoding. Loaded models are kept per model file.

use crate::audio::{read_wav, resample_mono, to_mono};
use crate::speech::stt::{RawTranscript, Segment, TranscriptionRequest, Transcriber};
use crate::{Result, VoxError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const WHISPER_SAMPLE_RATE: u32 = 16000;

pub struct WhisperTranscriber {
    models_dir: PathBuf,
    n_threads: i32,
    contexts: Mutex<HashMap<PathBuf, Arc<WhisperContext>>>,
}

impl WhisperTranscriber {
    /// `models_dir` holds `ggml-<name>.bin` files
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            n_threads: 4,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_threads(mut self, n_threads: i32) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Resolve a model name or path to a ggml model file
    pub fn model_path(&self, model: &str) -> PathBuf {
        let as_path = Path::new(model);
        if as_path.is_file() {
            return as_path.to_path_buf();
        }

        let name = match model {
            "turbo" => "large-v3-turbo",
            other => other,
        };
        self.models_dir.join(format!("ggml-{}.bin", name))
    }

    fn context(&self, model: &str) -> Result<Arc<WhisperContext>> {
        let path = self.model_path(model);
        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get(&path) {
            return Ok(Arc::clone(ctx));
        }

        if !path.exists() {
            return Err(VoxError::ModelLoadError(format!(
                "Model file not found: {:?}",
                path
            )));
        }

        info!("Loading Whisper model from: {:?}", path);
        let path_str = path
            .to_str()
            .ok_or_else(|| VoxError::ModelLoadError("Invalid model path".to_string()))?;
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| VoxError::ModelLoadError(format!("Failed to load Whisper model: {:?}", e)))?;

        let ctx = Arc::new(ctx);
        contexts.insert(path, Arc::clone(&ctx));
        Ok(ctx)
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<RawTranscript> {
        let (samples, sample_rate, channels) = read_wav(&request.audio_path)?;
        let mono = to_mono(&samples, channels);
        let audio = resample_mono(&mono, sample_rate, WHISPER_SAMPLE_RATE)?;
        let duration = mono.len() as f64 / sample_rate as f64;

        if audio.is_empty() {
            return Err(VoxError::TranscriptionError("Empty audio file".to_string()));
        }

        let ctx = self.context(&request.model)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.n_threads);
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(Some(&request.language));
        params.set_initial_prompt(&request.initial_prompt);

        let mut state = ctx.create_state().map_err(|e| {
            VoxError::TranscriptionError(format!("Failed to create state: {:?}", e))
        })?;

        state
            .full(params, &audio)
            .map_err(|e| VoxError::TranscriptionError(format!("Transcription failed: {:?}", e)))?;

        let num_segments = state.full_n_segments().map_err(|e| {
            VoxError::TranscriptionError(format!("Failed to get segments: {:?}", e))
        })?;

        let mut text = String::new();
        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let segment_text = state.full_get_segment_text(i).map_err(|e| {
                VoxError::TranscriptionError(format!("Failed to get segment text: {:?}", e))
            })?;
            let t0 = state.full_get_segment_t0(i).map_err(|e| {
                VoxError::TranscriptionError(format!("Failed to get start time: {:?}", e))
            })?;
            let t1 = state.full_get_segment_t1(i).map_err(|e| {
                VoxError::TranscriptionError(format!("Failed to get end time: {:?}", e))
            })?;

            text.push_str(&segment_text);
            // Timestamps are in centiseconds
            segments.push(Segment {
                start: t0 as f64 / 100.0,
                end: t1 as f64 / 100.0,
                text: segment_text,
            });
        }

        debug!("Whisper result: '{}'", text.trim());

        Ok(RawTranscript {
            text,
            language: request.language.clone(),
            duration,
            segments,
        })
    }
}
