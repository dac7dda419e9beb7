//! Voxgate: speech-to-text and text-to-speech orchestration around external
//! inference engines, with a persisted switch for spoken output.
//!
//! The crate is organized leaves first:
//! - [`output`]: the persisted voice output toggle and its bracket command parser
//! - [`speech`]: engine traits, the transcription front-end and the bounded
//!   synthesis invoker
//! - [`integration`]: configuration and the conversation orchestrator

pub mod audio;
pub mod integration;
pub mod output;
pub mod speech;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum VoxError {
    #[error("Model load error: {0}")]
    ModelLoadError(String),

    #[error("Transcription error: {0}")]
    TranscriptionError(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl From<std::io::Error> for VoxError {
    fn from(e: std::io::Error) -> Self {
        VoxError::IOError(e.to_string())
    }
}

impl VoxError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Model errors require fixing the model directory
            VoxError::ModelLoadError(_) => false,
            // Engine calls are typically transient
            VoxError::TranscriptionError(_) => true,
            VoxError::SynthesisError(_) => true,
            VoxError::FileNotFound(_) => false,
            VoxError::IOError(_) => false,
            VoxError::AudioProcessingError(_) => true,
            VoxError::ConfigError(_) => false,
            VoxError::EngineUnavailable(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VoxError::ModelLoadError(_) => {
                "Failed to load speech model. Please verify model files are present.".to_string()
            }
            VoxError::TranscriptionError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            VoxError::SynthesisError(_) => {
                "Text-to-speech failed. Response will be shown as text.".to_string()
            }
            VoxError::FileNotFound(path) => format!("File not found: {}", path),
            VoxError::IOError(_) => "File system error occurred.".to_string(),
            VoxError::AudioProcessingError(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            VoxError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            VoxError::EngineUnavailable(_) => {
                "No speech engine is available in this build.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: VoxError = io.into();
        assert!(matches!(err, VoxError::IOError(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        let err = VoxError::FileNotFound("/tmp/missing.wav".into());
        assert!(err.user_message().contains("/tmp/missing.wav"));

        let err = VoxError::SynthesisError("boom".into());
        assert!(err.is_recoverable());
        assert!(err.user_message().contains("shown as text"));
    }
}
