//! Voice output toggle: persisted on/off switch for spoken responses

pub mod command;
pub mod store;

pub use command::{classify, ControlAction, ParsedCommand};
pub use store::{OutputToggleState, VoiceOutputStore};
