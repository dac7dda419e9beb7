//! Speech-to-text front-end
//!
//! [`SpeechRecognizer`] validates input and turns engine output or engine
//! errors into a [`TranscriptionResult`]. The recognition model itself sits
//! behind the [`Transcriber`] trait.

use crate::output::ControlAction;
use crate::utils::Stopwatch;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prompt nudging the model towards Cantonese transcription
pub const DEFAULT_INITIAL_PROMPT: &str = "這段錄音是講廣東話的，";

/// Configuration for the speech-to-text front-end
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Model name (e.g. `turbo`) or path understood by the transcriber
    pub model: String,

    /// Language hint passed to the engine
    pub language: String,

    /// Initial prompt; `None` uses [`DEFAULT_INITIAL_PROMPT`]
    pub initial_prompt: Option<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "turbo".to_string(),
            language: "yue".to_string(),
            initial_prompt: None,
        }
    }
}

/// Input handed to a [`Transcriber`]
#[derive(Clone, Debug)]
pub struct TranscriptionRequest {
    pub audio_path: PathBuf,
    pub language: String,
    pub model: String,
    pub initial_prompt: String,
}

/// A timed piece of transcribed text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// What a transcription engine returns on success
#[derive(Clone, Debug, Default)]
pub struct RawTranscript {
    pub text: String,
    pub language: String,
    pub duration: f64,
    pub segments: Vec<Segment>,
}

/// Recognition model seam
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<RawTranscript>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionErrorKind {
    /// The audio file does not exist; the engine was not called
    FileNotFound,
    /// The engine failed
    Engine,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranscriptionError {
    pub kind: TranscriptionErrorKind,
    pub message: String,
}

/// Result of transcribing one audio file
#[derive(Clone, Debug, Serialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub duration: f64,
    pub segments: Vec<Segment>,
    pub model: String,
    pub success: bool,
    pub error: Option<TranscriptionError>,

    /// Control command found in the text, filled in by the orchestrator
    pub control_action: ControlAction,

    /// Voice output state after command handling, filled in by the orchestrator
    pub voice_enabled: bool,
}

impl TranscriptionResult {
    fn failed(model: &str, kind: TranscriptionErrorKind, message: String) -> Self {
        Self {
            text: String::new(),
            language: String::new(),
            duration: 0.0,
            segments: Vec::new(),
            model: model.to_string(),
            success: false,
            error: Some(TranscriptionError { kind, message }),
            control_action: ControlAction::None,
            voice_enabled: false,
        }
    }

    pub fn is_file_not_found(&self) -> bool {
        matches!(
            self.error,
            Some(TranscriptionError {
                kind: TranscriptionErrorKind::FileNotFound,
                ..
            })
        )
    }
}

/// Validating wrapper around a [`Transcriber`]
pub struct SpeechRecognizer {
    config: SttConfig,
    transcriber: Arc<dyn Transcriber>,
}

impl SpeechRecognizer {
    pub fn new(config: SttConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            config,
            transcriber,
        }
    }

    pub fn config(&self) -> &SttConfig {
        &self.config
    }

    /// Transcribe `audio`, using the configured language unless one is given
    pub fn transcribe(&self, audio: &Path, language: Option<&str>) -> TranscriptionResult {
        let model = self.config.model.as_str();

        if !audio.exists() {
            warn!("Audio file not found: {:?}", audio);
            return TranscriptionResult::failed(
                model,
                TranscriptionErrorKind::FileNotFound,
                format!("File not found: {}", audio.display()),
            );
        }

        let request = TranscriptionRequest {
            audio_path: audio.to_path_buf(),
            language: language.unwrap_or(&self.config.language).to_string(),
            model: model.to_string(),
            initial_prompt: self
                .config
                .initial_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_INITIAL_PROMPT.to_string()),
        };

        debug!(
            "Transcribing {:?} (language: {}, model: {})",
            audio, request.language, model
        );
        let stopwatch = Stopwatch::start();

        match self.transcriber.transcribe(&request) {
            Ok(raw) => {
                info!(
                    "Transcription finished in {:.2}s ({} segments)",
                    stopwatch.elapsed_secs(),
                    raw.segments.len()
                );
                TranscriptionResult {
                    text: raw.text.trim().to_string(),
                    language: raw.language,
                    duration: raw.duration,
                    segments: raw
                        .segments
                        .into_iter()
                        .map(|s| Segment {
                            text: s.text.trim().to_string(),
                            ..s
                        })
                        .collect(),
                    model: model.to_string(),
                    success: true,
                    error: None,
                    control_action: ControlAction::None,
                    voice_enabled: false,
                }
            }
            Err(e) => {
                warn!(
                    "Transcription failed after {:.2}s: {}",
                    stopwatch.elapsed_secs(),
                    e
                );
                TranscriptionResult::failed(model, TranscriptionErrorKind::Engine, e.to_string())
            }
        }
    }
}
