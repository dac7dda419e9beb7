//! Configuration for the integration layer
//!
//! Provides centralized configuration for all components. Every section
//! falls back to its defaults, so a TOML file only needs the keys it changes.

use crate::speech::stt::SttConfig;
use crate::speech::tts::TtsConfig;
use crate::{Result, VoxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Estimated speaking time per character of response text
pub const DEFAULT_SECONDS_PER_CHAR: f64 = 0.3;

/// Share of the deadline the estimated speaking time may use
pub const DEFAULT_TRUNCATION_SAFETY_RATIO: f64 = 0.8;

pub const DEFAULT_TRUNCATION_MARKER: &str = "…";

const STATE_FILE_NAME: &str = "voice_output_state.json";

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voxgate")
}

/// Convert a deadline given in seconds, rejecting zero, negative and non-finite values
pub fn parse_deadline(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(deadline) if !deadline.is_zero() => Ok(deadline),
        _ => Err(VoxError::ConfigError(format!(
            "Timeout must be a positive number of seconds, got {}",
            secs
        ))),
    }
}

/// Configuration for the complete integration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Directory receiving generated response audio
    pub output_dir: PathBuf,

    /// JSON file holding the voice output toggle
    pub voice_output_state: PathBuf,

    /// Speaking time estimate used for truncation
    pub seconds_per_char: f64,

    /// Fraction of the deadline available to the estimated speaking time
    pub truncation_safety_ratio: f64,

    /// Appended to truncated response text
    pub truncation_marker: String,

    /// STT configuration
    pub stt: SttConfig,

    /// TTS configuration
    pub tts: TtsConfig,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        let data = data_dir();
        Self {
            output_dir: data.join("responses"),
            voice_output_state: data.join(STATE_FILE_NAME),
            seconds_per_char: DEFAULT_SECONDS_PER_CHAR,
            truncation_safety_ratio: DEFAULT_TRUNCATION_SAFETY_RATIO,
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
        }
    }
}

impl IntegrationConfig {
    /// Load a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VoxError::ConfigError(format!("Failed to read config {:?}: {}", path, e))
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            VoxError::ConfigError(format!("Failed to parse config {:?}: {}", path, e))
        })?;

        debug!("Loaded configuration from {:?}", path);
        config.validate()?;
        Ok(config)
    }

    /// Keep generated audio and the toggle file under one directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.output_dir = dir.join("responses");
        self.voice_output_state = dir.join(STATE_FILE_NAME);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_voice_output_state(mut self, path: impl Into<PathBuf>) -> Self {
        self.voice_output_state = path.into();
        self
    }

    pub fn with_stt(mut self, stt: SttConfig) -> Self {
        self.stt = stt;
        self
    }

    pub fn with_tts(mut self, tts: TtsConfig) -> Self {
        self.tts = tts;
        self
    }

    pub fn with_seconds_per_char(mut self, seconds: f64) -> Self {
        self.seconds_per_char = seconds;
        self
    }

    /// Longest speaking time estimate allowed within `deadline`
    pub fn speaking_budget(&self, deadline: Duration) -> f64 {
        deadline.as_secs_f64() * self.truncation_safety_ratio
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tts.timeout_secs <= 0.0 || !self.tts.timeout_secs.is_finite() {
            return Err(VoxError::ConfigError(format!(
                "TTS timeout must be positive, got {}",
                self.tts.timeout_secs
            )));
        }

        if self.tts.speed <= 0.0 || !self.tts.speed.is_finite() {
            return Err(VoxError::ConfigError(format!(
                "TTS speed must be positive, got {}",
                self.tts.speed
            )));
        }

        if self.seconds_per_char <= 0.0 {
            return Err(VoxError::ConfigError(
                "seconds_per_char must be positive".to_string(),
            ));
        }

        if !(self.truncation_safety_ratio > 0.0 && self.truncation_safety_ratio <= 1.0) {
            return Err(VoxError::ConfigError(format!(
                "truncation_safety_ratio must be in (0, 1], got {}",
                self.truncation_safety_ratio
            )));
        }

        Ok(())
    }
}
