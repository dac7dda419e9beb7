//! Speech processing: engine seams, transcription and bounded synthesis
//!
//! This module provides:
//! - [`engine`]: the synthesis engine traits and the per-directory registry
//! - [`stt`]: the validating transcription front-end
//! - [`tts`]: the deadline-bounded, retrying synthesis invoker
//! - `whisper` / `sherpa`: concrete engines behind cargo features

pub mod engine;
#[cfg(feature = "sherpa")]
pub mod sherpa;
pub mod stt;
pub mod tts;
#[cfg(feature = "whisper")]
pub mod whisper;

// Re-export commonly used types
pub use engine::{
    EngineFactory, EngineRegistry, InferenceRequest, SpeechChunk, SpeechEngine, SynthesisMode,
};
#[cfg(feature = "sherpa")]
pub use sherpa::{SherpaEngine, SherpaEngineFactory};
pub use stt::{
    RawTranscript, Segment, SpeechRecognizer, SttConfig, Transcriber, TranscriptionErrorKind,
    TranscriptionRequest, TranscriptionResult,
};
pub use tts::{
    SpeechSynthesizer, SynthesisError, SynthesisErrorKind, SynthesisRequest, SynthesisResult,
    TtsConfig, OUTPUT_GAIN, SAMPLE_RATE,
};
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;
