//! VITS speech engine built on sherpa-rs
//!
//! A model directory must contain `model.onnx` and `tokens.txt`; `lexicon.txt`
//! and `espeak-ng-data/` are picked up when present. VITS models have a fixed
//! voice, so the reference sample and synthesis mode are not used.

use crate::speech::engine::{EngineFactory, InferenceRequest, SpeechChunk, SpeechEngine};
use crate::{Result, VoxError};
use parking_lot::Mutex;
use sherpa_rs::tts::{VitsTts, VitsTtsConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SherpaEngine {
    tts: Mutex<VitsTts>,
    speaker_id: i32,
}

impl SpeechEngine for SherpaEngine {
    fn inference(&self, request: &InferenceRequest) -> Result<Vec<SpeechChunk>> {
        debug!(
            "VITS synthesis (reference {:?} and mode {:?} unused)",
            request.reference_audio, request.mode
        );

        let audio = self
            .tts
            .lock()
            .create(&request.text, self.speaker_id, request.speed)
            .map_err(|e| VoxError::SynthesisError(format!("Synthesis failed: {}", e)))?;

        Ok(vec![SpeechChunk::audio(audio.samples, audio.sample_rate as u32)])
    }
}

/// Builds [`SherpaEngine`]s from model directories
#[derive(Clone, Debug, Default)]
pub struct SherpaEngineFactory {
    pub speaker_id: i32,
}

impl SherpaEngineFactory {
    pub fn with_speaker(speaker_id: i32) -> Self {
        Self { speaker_id }
    }
}

fn optional_path(model_dir: &Path, name: &str) -> String {
    let path = model_dir.join(name);
    if path.exists() {
        path.to_string_lossy().into_owned()
    } else {
        String::new()
    }
}

impl EngineFactory for SherpaEngineFactory {
    fn build(&self, model_dir: &Path) -> Result<Arc<dyn SpeechEngine>> {
        let model = model_dir.join("model.onnx");
        let tokens = model_dir.join("tokens.txt");

        for required in [&model, &tokens] {
            if !required.exists() {
                return Err(VoxError::ModelLoadError(format!(
                    "Required model file not found: {:?}",
                    required
                )));
            }
        }

        info!("Loading VITS TTS model from: {:?}", model_dir);

        let config = VitsTtsConfig {
            model: model.to_string_lossy().into_owned(),
            tokens: tokens.to_string_lossy().into_owned(),
            lexicon: optional_path(model_dir, "lexicon.txt"),
            data_dir: optional_path(model_dir, "espeak-ng-data"),
            ..Default::default()
        };

        Ok(Arc::new(SherpaEngine {
            tts: Mutex::new(VitsTts::new(config)),
            speaker_id: self.speaker_id,
        }))
    }
}
