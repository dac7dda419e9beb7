//! Persisted voice output toggle
//!
//! The state lives in a small JSON file. It is read once when the store is
//! opened and written back synchronously after every change. A failed write
//! is logged and reported as `false` while the in-memory state keeps the
//! requested value, so memory and disk can disagree until the next successful
//! write. Only a single writing process is assumed.

use super::command::{classify, ControlAction, ParsedCommand};
use chrono::{Local, SecondsFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk record of the toggle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputToggleState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub last_updated: Option<String>,
}

pub struct VoiceOutputStore {
    path: PathBuf,
    state: Mutex<OutputToggleState>,
}

impl VoiceOutputStore {
    /// Open the store, falling back to a disabled state when the file is
    /// missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path);
        debug!(
            "Voice output store opened at {:?} (enabled: {})",
            path, state.enabled
        );

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current state
    pub fn state(&self) -> OutputToggleState {
        self.state.lock().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Turn voice output on; returns whether the change was persisted
    pub fn enable(&self) -> bool {
        self.set(true)
    }

    /// Turn voice output off; returns whether the change was persisted
    pub fn disable(&self) -> bool {
        self.set(false)
    }

    /// Flip the toggle and return the new value
    pub fn toggle(&self) -> bool {
        let mut state = self.state.lock();
        state.enabled = !state.enabled;
        let enabled = state.enabled;
        if self.persist(&mut state) {
            info!("Voice output {}", if enabled { "enabled" } else { "disabled" });
        }
        enabled
    }

    /// Apply a bracket-only control command if `text` is one
    pub fn parse_command(&self, text: &str) -> ParsedCommand {
        let action = classify(text);
        let text = match action {
            ControlAction::Enable => {
                self.enable();
                info!("Voice output control: enable");
                String::new()
            }
            ControlAction::Disable => {
                self.disable();
                info!("Voice output control: disable");
                String::new()
            }
            ControlAction::None => text.to_string(),
        };

        ParsedCommand {
            text,
            action,
            voice_enabled: self.is_enabled(),
        }
    }

    /// Human readable status line
    pub fn status_info(&self) -> String {
        let status = if self.is_enabled() { "on" } else { "off" };
        format!("voice output: {}", status)
    }

    fn set(&self, enabled: bool) -> bool {
        let mut state = self.state.lock();
        if state.enabled == enabled {
            return true;
        }

        state.enabled = enabled;
        let saved = self.persist(&mut state);
        if saved {
            info!("Voice output {}", if enabled { "enabled" } else { "disabled" });
        }
        saved
    }

    fn persist(&self, state: &mut OutputToggleState) -> bool {
        state.last_updated = Some(Local::now().to_rfc3339_opts(SecondsFormat::Micros, false));

        match write_state(&self.path, state) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save voice output state to {:?}: {}", self.path, e);
                false
            }
        }
    }
}

fn load_state(path: &Path) -> OutputToggleState {
    if !path.exists() {
        return OutputToggleState::default();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));

    match parsed {
        Ok(state) => state,
        Err(e) => {
            warn!("Failed to load voice output state, using default: {}", e);
            OutputToggleState::default()
        }
    }
}

fn write_state(path: &Path, state: &OutputToggleState) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(state)
        .map_err(|e| crate::VoxError::IOError(format!("Failed to encode state: {}", e)))?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> VoiceOutputStore {
        VoiceOutputStore::open(dir.path().join("voice_output_state.json"))
    }

    #[test]
    fn test_defaults_to_disabled_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.is_enabled());
        assert!(store.state().last_updated.is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_defaults_to_disabled_when_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice_output_state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = VoiceOutputStore::open(&path);
        assert!(!store.is_enabled());
    }

    #[test]
    fn test_enable_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.enable());
        assert!(store.is_enabled());

        let reopened = store_in(&dir);
        assert!(reopened.is_enabled());
        assert!(reopened.state().last_updated.is_some());

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["enabled"], serde_json::Value::Bool(true));
        assert!(value["last_updated"].is_string());
    }

    #[test]
    fn test_enable_twice_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.enable());
        let first = store.state();
        let on_disk = fs::read_to_string(store.path()).unwrap();

        assert!(store.enable());
        assert_eq!(store.state(), first);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), on_disk);
    }

    #[test]
    fn test_disable_when_already_disabled_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.disable());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_toggle_returns_new_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.toggle());
        assert!(store.is_enabled());
        assert!(!store.toggle());
        assert!(!store_in(&dir).is_enabled());
    }

    #[test]
    fn test_parse_command_flips_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let parsed = store.parse_command("（");
        assert_eq!(parsed.action, ControlAction::Enable);
        assert_eq!(parsed.text, "");
        assert!(parsed.voice_enabled);
        assert!(store.is_enabled());

        let parsed = store.parse_command("）");
        assert_eq!(parsed.action, ControlAction::Disable);
        assert_eq!(parsed.text, "");
        assert!(!parsed.voice_enabled);
        assert!(!store.is_enabled());
    }

    #[test]
    fn test_parse_command_passes_content_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let parsed = store.parse_command("hello（");
        assert_eq!(parsed.action, ControlAction::None);
        assert_eq!(parsed.text, "hello（");
        assert!(!parsed.voice_enabled);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail
        let path = dir.path().join("state_dir");
        fs::create_dir_all(&path).unwrap();

        let store = VoiceOutputStore::open(&path);
        assert!(!store.enable());
        assert!(store.is_enabled());
        assert_eq!(store.status_info(), "voice output: on");
    }
}
