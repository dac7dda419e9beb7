//! Conversation orchestrator
//!
//! Connects the components for one conversational exchange:
//! audio -> transcription -> control commands -> response synthesis.
//! Every response path hands text back to the caller, so a surface can always
//! show something even when no audio was produced.

use crate::integration::config::IntegrationConfig;
use crate::output::{ControlAction, VoiceOutputStore};
use crate::speech::engine::EngineFactory;
use crate::speech::stt::{SpeechRecognizer, Transcriber, TranscriptionResult};
use crate::speech::tts::{SpeechSynthesizer, SynthesisErrorKind, SynthesisResult};
use crate::utils::Stopwatch;
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const TIMED_OUT_MESSAGE: &str = "synthesis timed out, text only";
pub const DISABLED_MESSAGE: &str = "voice output is disabled, text only";
pub const NO_CONTENT_MESSAGE: &str = "nothing to speak";

/// Which path a response took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondOutcome {
    /// The text was a control command; nothing was synthesized
    Command,
    /// Audio was produced
    Spoken,
    /// Voice output is off
    Disabled,
    /// Synthesis missed its deadline
    TimedOut,
    /// Synthesis failed for another reason
    Failed,
    /// No text left to speak
    NoContent,
}

/// Result of responding to a piece of text
#[derive(Debug, Clone, Serialize)]
pub struct RespondResult {
    /// False only when synthesis failed outright
    pub success: bool,
    /// Full response text shown to the user
    pub text: String,
    /// Text handed to the synthesizer, possibly truncated
    pub spoken_text: String,
    pub text_truncated: bool,
    pub output_file: Option<PathBuf>,
    pub duration: f64,
    pub action: ControlAction,
    pub message: Option<String>,
    pub voice_enabled: bool,
    pub timed_out: bool,
    pub outcome: RespondOutcome,
    pub synthesis: Option<SynthesisResult>,
}

impl RespondResult {
    fn text_only(text: String, outcome: RespondOutcome, voice_enabled: bool) -> Self {
        Self {
            success: outcome != RespondOutcome::Failed,
            text,
            spoken_text: String::new(),
            text_truncated: false,
            output_file: None,
            duration: 0.0,
            action: ControlAction::None,
            message: None,
            voice_enabled,
            timed_out: false,
            outcome,
            synthesis: None,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.output_file.is_some()
    }
}

/// Result of a full transcribe-then-respond exchange
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub transcription: TranscriptionResult,
    /// Whether the transcript was accepted for a response
    pub confirmed: bool,
    pub response: Option<RespondResult>,
    pub success: bool,
}

/// Shorten `text` so its estimated speaking time fits `budget_secs`
///
/// Leading whitespace is dropped. Returns the text otherwise unchanged when it
/// already fits, or else the longest prefix that fits together with `marker`,
/// never fewer than one visible character.
pub fn truncate_for_budget(
    text: &str,
    budget_secs: f64,
    seconds_per_char: f64,
    marker: &str,
) -> (String, bool) {
    let text = text.trim_start();
    let chars = text.chars().count();
    if chars as f64 * seconds_per_char <= budget_secs {
        return (text.to_string(), false);
    }

    let fitting = (budget_secs / seconds_per_char + 1e-9).floor().max(0.0) as usize;
    let keep = fitting.saturating_sub(marker.chars().count()).max(1);

    let mut truncated: String = text.chars().take(keep).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push_str(marker);
    (truncated, true)
}

/// Unique file name for a generated response
pub fn response_file_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let id = Uuid::new_v4().simple().to_string();
    format!("voice_response_{}_{}.wav", secs, &id[..8])
}

/// Main orchestrator that coordinates recognition, the toggle and synthesis
pub struct VoiceConversation {
    config: IntegrationConfig,
    recognizer: SpeechRecognizer,
    synthesizer: SpeechSynthesizer,
    voice_output: VoiceOutputStore,
}

impl VoiceConversation {
    /// Create an orchestrator; ensures the output directory exists
    pub fn new(
        config: IntegrationConfig,
        transcriber: Arc<dyn Transcriber>,
        engines: Arc<dyn EngineFactory>,
    ) -> Result<Self> {
        let recognizer = SpeechRecognizer::new(config.stt.clone(), transcriber);
        let synthesizer = SpeechSynthesizer::new(config.tts.clone(), engines);
        Self::with_components(config, recognizer, synthesizer)
    }

    /// Create an orchestrator around already constructed components
    pub fn with_components(
        config: IntegrationConfig,
        recognizer: SpeechRecognizer,
        synthesizer: SpeechSynthesizer,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        let voice_output = VoiceOutputStore::open(&config.voice_output_state);

        info!(
            "Voice conversation ready (output dir: {:?}, voice output: {})",
            config.output_dir,
            voice_output.is_enabled()
        );

        Ok(Self {
            config,
            recognizer,
            synthesizer,
            voice_output,
        })
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn recognizer(&self) -> &SpeechRecognizer {
        &self.recognizer
    }

    pub fn synthesizer(&self) -> &SpeechSynthesizer {
        &self.synthesizer
    }

    pub fn voice_output(&self) -> &VoiceOutputStore {
        &self.voice_output
    }

    /// Transcribe audio and apply any control command it contains
    pub fn transcribe(&self, audio: &Path, language: Option<&str>) -> TranscriptionResult {
        let mut result = self.recognizer.transcribe(audio, language);
        if !result.success {
            result.voice_enabled = self.voice_output.is_enabled();
            return result;
        }

        let parsed = self.voice_output.parse_command(&result.text);
        if parsed.action.is_command() {
            debug!("Transcript was a control command: {:?}", parsed.action);
        }
        result.text = parsed.text;
        result.control_action = parsed.action;
        result.voice_enabled = parsed.voice_enabled;
        result
    }

    /// Synthesize `text`, honoring the voice output toggle unless `force` is set
    pub fn synthesize_response(
        &self,
        text: &str,
        output: Option<PathBuf>,
        speed: Option<f32>,
        force: bool,
    ) -> SynthesisResult {
        self.synthesize_with_deadline(text, output, speed, force, None)
    }

    fn synthesize_with_deadline(
        &self,
        text: &str,
        output: Option<PathBuf>,
        speed: Option<f32>,
        force: bool,
        deadline: Option<Duration>,
    ) -> SynthesisResult {
        if !force && !self.voice_output.is_enabled() {
            debug!("Voice output disabled, skipping synthesis");
            return SynthesisResult::disabled();
        }

        let output = output.unwrap_or_else(|| self.config.output_dir.join(response_file_name()));
        let mut request = self.synthesizer.request(text, output);
        if let Some(speed) = speed {
            request = request.with_speed(speed);
        }
        if let Some(deadline) = deadline {
            request = request.with_deadline(deadline);
        }

        self.synthesizer.synthesize(&request)
    }

    /// Respond to `text` with speech where possible, always returning the text
    pub fn respond_speech(
        &self,
        text: &str,
        speed: Option<f32>,
        force: bool,
        timeout: Option<Duration>,
    ) -> RespondResult {
        let parsed = self.voice_output.parse_command(text);

        if let Some(message) = parsed.action.status_message() {
            let mut result = RespondResult::text_only(
                message.to_string(),
                RespondOutcome::Command,
                parsed.voice_enabled,
            );
            result.action = parsed.action;
            result.message = Some(message.to_string());
            return result;
        }

        if parsed.text.trim().is_empty() {
            let mut result =
                RespondResult::text_only(parsed.text, RespondOutcome::NoContent, parsed.voice_enabled);
            result.message = Some(NO_CONTENT_MESSAGE.to_string());
            return result;
        }

        let deadline = timeout.unwrap_or_else(|| self.config.tts.timeout());
        let (spoken_text, text_truncated) = truncate_for_budget(
            &parsed.text,
            self.config.speaking_budget(deadline),
            self.config.seconds_per_char,
            &self.config.truncation_marker,
        );
        if text_truncated {
            info!(
                "Response truncated from {} to {} chars to fit {:.1}s deadline",
                parsed.text.chars().count(),
                spoken_text.chars().count(),
                deadline.as_secs_f64()
            );
        }

        let stopwatch = Stopwatch::start();
        let synthesis = self.synthesize_with_deadline(&spoken_text, None, speed, force, Some(deadline));
        let voice_enabled = self.voice_output.is_enabled();

        if synthesis.is_disabled() {
            let mut result =
                RespondResult::text_only(parsed.text, RespondOutcome::Disabled, voice_enabled);
            result.spoken_text = spoken_text;
            result.text_truncated = text_truncated;
            result.message = Some(DISABLED_MESSAGE.to_string());
            result.synthesis = Some(synthesis);
            return result;
        }

        let outcome = if synthesis.success {
            RespondOutcome::Spoken
        } else if synthesis.error_kind() == Some(SynthesisErrorKind::Timeout) {
            RespondOutcome::TimedOut
        } else {
            RespondOutcome::Failed
        };

        let message = match outcome {
            RespondOutcome::TimedOut => {
                warn!("Synthesis timed out after {:.2}s", stopwatch.elapsed_secs());
                Some(TIMED_OUT_MESSAGE.to_string())
            }
            RespondOutcome::Failed => {
                warn!("Synthesis failed after {:.2}s", stopwatch.elapsed_secs());
                synthesis.error.as_ref().map(|e| e.message.clone())
            }
            _ => None,
        };

        RespondResult {
            success: outcome != RespondOutcome::Failed,
            text: parsed.text,
            spoken_text,
            text_truncated,
            output_file: synthesis.output_file.clone(),
            duration: synthesis.duration,
            action: ControlAction::None,
            message,
            voice_enabled,
            timed_out: synthesis.timed_out,
            outcome,
            synthesis: Some(synthesis),
        }
    }

    /// Transcribe `audio`, then speak `response_text`
    pub fn conversation_turn(&self, audio: &Path, response_text: &str) -> TurnResult {
        let transcription = self.transcribe(audio, None);
        if !transcription.success {
            warn!("Turn aborted, transcription failed");
            return TurnResult {
                transcription,
                confirmed: false,
                response: None,
                success: false,
            };
        }

        let response = self.respond_speech(response_text, None, false, None);
        TurnResult {
            success: response.success,
            transcription,
            confirmed: true,
            response: Some(response),
        }
    }

    pub fn enable_voice_output(&self) -> bool {
        self.voice_output.enable()
    }

    pub fn disable_voice_output(&self) -> bool {
        self.voice_output.disable()
    }

    pub fn toggle_voice_output(&self) -> bool {
        self.voice_output.toggle()
    }

    pub fn is_voice_output_enabled(&self) -> bool {
        self.voice_output.is_enabled()
    }

    pub fn voice_output_status(&self) -> String {
        self.voice_output.status_info()
    }
}
