//! Deadline-bounded, retrying speech synthesis
//!
//! Engine inference can hang with no way to cancel it. Each attempt therefore
//! runs on its own worker thread while the caller waits on a channel with a
//! timeout. A worker that misses the deadline is detached: it keeps running
//! until the engine returns and its result is dropped. Attempts never overlap
//! within one [`SpeechSynthesizer::synthesize`] call.

use crate::audio::{
    apply_gain_and_clip, ensure_silent_placeholder, peak, resample_mono, write_wav,
};
use crate::speech::engine::{
    EngineFactory, EngineRegistry, InferenceRequest, SpeechChunk, SpeechEngine, SynthesisMode,
    DEFAULT_INSTRUCTION, DEFAULT_REFERENCE_TEXT,
};
use crate::utils::Stopwatch;
use crate::{Result, VoxError};
use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sample rate of every file the synthesizer writes
pub const SAMPLE_RATE: u32 = 24000;

/// Gain applied to engine output, which is characteristically quiet
pub const OUTPUT_GAIN: f32 = 2.0;

/// Length of the silent reference sample written when none exists
pub const PLACEHOLDER_SECS: f32 = 1.0;

pub const DEFAULT_TIMEOUT_SECS: f64 = 50.0;
pub const DEFAULT_RETRY_BUDGET: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Error text fragments of known transient inference backend crashes
const CRASH_SIGNATURES: &[&str] = &[
    "cuda error",
    "illegal memory access",
    "cudnn",
    "segmentation fault",
    "core dumped",
    "panicked",
];

/// Configuration for the synthesis invoker
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Model directory handed to the engine factory
    pub model_dir: PathBuf,

    /// Reference voice sample; `None` uses `<model_dir>/reference_audio.wav`
    pub reference_audio: Option<PathBuf>,

    /// Transcript of the reference sample (zero-shot mode)
    pub reference_text: String,

    /// Use the instruction-conditioned Cantonese mode instead of zero-shot
    pub cantonese: bool,

    /// Instruction used in instruction-conditioned mode
    pub instruction: String,

    /// Default speed multiplier
    pub speed: f32,

    /// Per-attempt deadline in seconds
    pub timeout_secs: f64,

    /// Maximum number of attempts per call
    pub retry_budget: u32,

    /// Pause between attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("pretrained_models/Fun-CosyVoice3-0.5B"),
            reference_audio: None,
            reference_text: DEFAULT_REFERENCE_TEXT.to_string(),
            cantonese: true,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            speed: 1.0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl TtsConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_reference_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_audio = Some(path.into());
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Switch to zero-shot cloning with the given reference transcript
    pub fn zero_shot(mut self, reference_text: impl Into<String>) -> Self {
        self.cantonese = false;
        self.reference_text = reference_text.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn reference_audio_path(&self) -> PathBuf {
        self.reference_audio
            .clone()
            .unwrap_or_else(|| default_reference_audio(&self.model_dir))
    }

    pub fn mode(&self) -> SynthesisMode {
        if self.cantonese {
            SynthesisMode::Instruct {
                instruction: self.instruction.clone(),
            }
        } else {
            SynthesisMode::ZeroShot {
                reference_text: self.reference_text.clone(),
            }
        }
    }
}

/// One synthesis call. Build it with [`SpeechSynthesizer::request`].
#[derive(Clone, Debug)]
pub struct SynthesisRequest {
    pub text: String,
    pub output_file: PathBuf,
    pub speed: f32,
    pub reference_audio: PathBuf,
    pub mode: SynthesisMode,
    pub deadline: Duration,
    /// Maximum attempts; 0 is treated as 1
    pub retry_budget: u32,
}

impl SynthesisRequest {
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_reference_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_audio = path.into();
        self
    }

    pub fn with_mode(mut self, mode: SynthesisMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisErrorKind {
    /// Nothing to synthesize
    InvalidInput,
    /// Voice output is switched off; not an engine failure
    OutputDisabled,
    /// The attempt missed its deadline
    Timeout,
    /// The engine returned an error or could not be built
    EngineFailure,
    /// The engine failed with a known transient crash signature
    BackendCrash,
    /// The engine finished without any audio
    EmptyOutput,
    /// Resampling the engine output failed
    Processing,
    /// Reading or writing audio files failed
    Io,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SynthesisError {
    pub kind: SynthesisErrorKind,
    pub message: String,
}

impl SynthesisError {
    pub fn new(kind: SynthesisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify an engine error message, annotating known crash signatures
    pub fn from_engine_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if CRASH_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
            Self::new(
                SynthesisErrorKind::BackendCrash,
                format!(
                    "{} (known inference backend crash, usually transient)",
                    message
                ),
            )
        } else {
            Self::new(SynthesisErrorKind::EngineFailure, message)
        }
    }
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of one synthesis call
///
/// Either `success` is set and `output_file` is populated, or `success` is
/// clear and `error` is populated. `timed_out` is only ever set on failure and
/// describes the final attempt.
#[derive(Clone, Debug, Serialize)]
pub struct SynthesisResult {
    pub output_file: Option<PathBuf>,
    pub duration: f64,
    pub sample_rate: u32,
    pub success: bool,
    pub error: Option<SynthesisError>,
    pub timed_out: bool,
    pub retry_count: u32,
}

impl SynthesisResult {
    pub fn succeeded(output_file: PathBuf, duration: f64, retry_count: u32) -> Self {
        Self {
            output_file: Some(output_file),
            duration,
            sample_rate: SAMPLE_RATE,
            success: true,
            error: None,
            timed_out: false,
            retry_count,
        }
    }

    pub fn failed(error: SynthesisError, retry_count: u32) -> Self {
        Self {
            output_file: None,
            duration: 0.0,
            sample_rate: SAMPLE_RATE,
            success: false,
            timed_out: error.kind == SynthesisErrorKind::Timeout,
            error: Some(error),
            retry_count,
        }
    }

    /// Short-circuit result for switched-off voice output
    pub fn disabled() -> Self {
        Self::failed(
            SynthesisError::new(SynthesisErrorKind::OutputDisabled, "voice_output_disabled"),
            0,
        )
    }

    pub fn error_kind(&self) -> Option<SynthesisErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn is_disabled(&self) -> bool {
        self.error_kind() == Some(SynthesisErrorKind::OutputDisabled)
    }
}

/// Bounded synthesis invoker
///
/// Owns the engine registry; callers reach engines only through
/// [`SpeechSynthesizer::engine_handle`].
pub struct SpeechSynthesizer {
    config: TtsConfig,
    registry: Arc<EngineRegistry>,
}

impl SpeechSynthesizer {
    pub fn new(config: TtsConfig, factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_registry(config, Arc::new(EngineRegistry::new(factory)))
    }

    /// Share an existing registry, e.g. between several synthesizers
    pub fn with_registry(config: TtsConfig, registry: Arc<EngineRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<EngineRegistry> {
        Arc::clone(&self.registry)
    }

    /// Cached engine for the configured model directory
    pub fn engine_handle(&self) -> Result<Arc<dyn SpeechEngine>> {
        self.registry.get_or_build(&self.config.model_dir)
    }

    /// Build a request with the configured defaults
    pub fn request(&self, text: impl Into<String>, output_file: impl Into<PathBuf>) -> SynthesisRequest {
        SynthesisRequest {
            text: text.into(),
            output_file: output_file.into(),
            speed: self.config.speed,
            reference_audio: self.config.reference_audio_path(),
            mode: self.config.mode(),
            deadline: self.config.timeout(),
            retry_budget: self.config.retry_budget,
        }
    }

    /// Run the request to completion of its retry budget or first success
    pub fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResult {
        if request.text.trim().is_empty() {
            return SynthesisResult::failed(
                SynthesisError::new(SynthesisErrorKind::InvalidInput, "No text to synthesize"),
                0,
            );
        }

        if let Err(e) =
            ensure_silent_placeholder(&request.reference_audio, SAMPLE_RATE, PLACEHOLDER_SECS)
        {
            error!("Failed to prepare reference audio: {}", e);
            return SynthesisResult::failed(
                SynthesisError::new(
                    SynthesisErrorKind::Io,
                    format!("Reference audio unavailable: {}", e),
                ),
                0,
            );
        }

        let budget = request.retry_budget.max(1);
        info!(
            "Synthesizing \"{}\" (deadline {:.1}s, up to {} attempts)",
            preview(&request.text),
            request.deadline.as_secs_f64(),
            budget
        );

        let mut attempt = 0;
        loop {
            let is_last = attempt + 1 >= budget;
            let mut stopwatch = Stopwatch::start();

            let failure = match self.run_attempt(request, attempt) {
                Ok(chunk) => {
                    stopwatch.split("inference");
                    match self.finish(request, chunk, attempt) {
                        Ok(result) => {
                            stopwatch.split("written");
                            info!(
                                "Synthesis complete: {:.2}s of audio, attempt {} ({})",
                                result.duration,
                                attempt + 1,
                                stopwatch.summary()
                            );
                            return result;
                        }
                        // Local post-processing or disk failures are not retried
                        Err(e) => return SynthesisResult::failed(e, attempt),
                    }
                }
                Err(e) => e,
            };

            warn!(
                "Synthesis attempt {}/{} failed after {:.2}s: {}",
                attempt + 1,
                budget,
                stopwatch.elapsed_secs(),
                failure
            );

            if is_last {
                error!("Synthesis gave up after {} attempts", attempt + 1);
                return SynthesisResult::failed(failure, attempt);
            }

            thread::sleep(self.config.retry_backoff());
            attempt += 1;
        }
    }

    /// One inference on a detached worker, bounded by the request deadline
    fn run_attempt(
        &self,
        request: &SynthesisRequest,
        attempt: u32,
    ) -> std::result::Result<(Vec<f32>, u32), SynthesisError> {
        // Native model loaders may panic; the registry lock is released on unwind
        let engine = panic::catch_unwind(AssertUnwindSafe(|| self.engine_handle()))
            .unwrap_or_else(|payload| {
                Err(VoxError::ModelLoadError(format!(
                    "engine panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })
            .map_err(|e| SynthesisError::from_engine_message(&e.to_string()))?;

        let inference = InferenceRequest {
            text: request.text.clone(),
            reference_audio: request.reference_audio.clone(),
            speed: request.speed,
            mode: request.mode.clone(),
        };

        let (tx, rx) = bounded::<Result<Vec<SpeechChunk>>>(1);
        thread::Builder::new()
            .name(format!("tts-attempt-{}", attempt))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.inference(&inference)))
                    .unwrap_or_else(|payload| {
                        Err(VoxError::SynthesisError(format!(
                            "engine panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    });
                // The caller is gone if the deadline already passed
                if tx.send(outcome).is_err() {
                    debug!("Discarding result of a timed-out synthesis worker");
                }
            })
            .map_err(|e| {
                SynthesisError::new(
                    SynthesisErrorKind::EngineFailure,
                    format!("Failed to start synthesis worker: {}", e),
                )
            })?;

        match rx.recv_timeout(request.deadline) {
            Ok(Ok(chunks)) => first_audio(chunks).ok_or_else(|| {
                SynthesisError::new(
                    SynthesisErrorKind::EmptyOutput,
                    "Engine produced no audio output",
                )
            }),
            Ok(Err(e)) => Err(SynthesisError::from_engine_message(&e.to_string())),
            Err(RecvTimeoutError::Timeout) => Err(SynthesisError::new(
                SynthesisErrorKind::Timeout,
                format!(
                    "Synthesis timeout after {:.1}s",
                    request.deadline.as_secs_f64()
                ),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(SynthesisError::new(
                SynthesisErrorKind::EngineFailure,
                "Synthesis worker exited without a result",
            )),
        }
    }

    fn finish(
        &self,
        request: &SynthesisRequest,
        (samples, sample_rate): (Vec<f32>, u32),
        attempt: u32,
    ) -> std::result::Result<SynthesisResult, SynthesisError> {
        let mut samples = if sample_rate == SAMPLE_RATE {
            samples
        } else {
            debug!("Resampling engine output {} Hz -> {} Hz", sample_rate, SAMPLE_RATE);
            resample_mono(&samples, sample_rate, SAMPLE_RATE)
                .map_err(|e| SynthesisError::new(SynthesisErrorKind::Processing, e.to_string()))?
        };

        apply_gain_and_clip(&mut samples, OUTPUT_GAIN);
        debug!("Output peak after gain: {:.3}", peak(&samples));

        write_wav(&request.output_file, &samples, SAMPLE_RATE, 1)
            .map_err(|e| SynthesisError::new(SynthesisErrorKind::Io, e.to_string()))?;

        let duration = samples.len() as f64 / SAMPLE_RATE as f64;
        Ok(SynthesisResult::succeeded(
            request.output_file.clone(),
            duration,
            attempt,
        ))
    }
}

/// First chunk that actually carries samples
fn first_audio(chunks: Vec<SpeechChunk>) -> Option<(Vec<f32>, u32)> {
    chunks.into_iter().find_map(|chunk| match chunk.samples {
        Some(samples) if !samples.is_empty() => Some((samples, chunk.sample_rate)),
        _ => None,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(30).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Default reference sample location for a model directory
pub fn default_reference_audio(model_dir: &Path) -> PathBuf {
    model_dir.join("reference_audio.wav")
}
