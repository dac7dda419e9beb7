//! Bracket-only control commands embedded in user utterances
//!
//! A message made up solely of opening brackets switches spoken output on,
//! one made up solely of closing brackets switches it off. Anything else is
//! ordinary content. An utterance that merely transcribes to brackets cannot
//! be told apart from a deliberate command.

use serde::{Deserialize, Serialize};

const OPENING_BRACKETS: &[char] = &['(', '（', '[', '［'];
const CLOSING_BRACKETS: &[char] = &[')', '）', ']', '］'];

/// Effect of a parsed control command on the voice output toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Enable,
    Disable,
    #[default]
    None,
}

impl ControlAction {
    pub fn is_command(self) -> bool {
        self != ControlAction::None
    }

    /// Status message reported back to the caller for a pure command
    pub fn status_message(self) -> Option<&'static str> {
        match self {
            ControlAction::Enable => Some("voice_output_enabled"),
            ControlAction::Disable => Some("voice_output_disabled"),
            ControlAction::None => None,
        }
    }
}

/// Outcome of running user text through the command parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCommand {
    /// Text left for normal processing (empty for a pure command)
    pub text: String,
    pub action: ControlAction,
    /// Toggle state after the command was applied
    pub voice_enabled: bool,
}

/// Classify text without touching any state
pub fn classify(text: &str) -> ControlAction {
    let trimmed = text.trim();
    // Blank input is never a command, so silence cannot switch output on
    if trimmed.is_empty() {
        return ControlAction::None;
    }

    if trimmed.chars().all(|c| OPENING_BRACKETS.contains(&c)) {
        ControlAction::Enable
    } else if trimmed.chars().all(|c| CLOSING_BRACKETS.contains(&c)) {
        ControlAction::Disable
    } else {
        ControlAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_brackets_enable() {
        assert_eq!(classify("（"), ControlAction::Enable);
        assert_eq!(classify("("), ControlAction::Enable);
        assert_eq!(classify("["), ControlAction::Enable);
        assert_eq!(classify("  （(［ "), ControlAction::Enable);
    }

    #[test]
    fn test_closing_brackets_disable() {
        assert_eq!(classify("）"), ControlAction::Disable);
        assert_eq!(classify(")"), ControlAction::Disable);
        assert_eq!(classify("]］"), ControlAction::Disable);
    }

    #[test]
    fn test_mixed_content_is_not_a_command() {
        assert_eq!(classify("hello（"), ControlAction::None);
        assert_eq!(classify("請開幫我查天氣（"), ControlAction::None);
        assert_eq!(classify("()"), ControlAction::None);
        assert_eq!(classify(""), ControlAction::None);
        assert_eq!(classify("   "), ControlAction::None);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(
            ControlAction::Enable.status_message(),
            Some("voice_output_enabled")
        );
        assert_eq!(
            ControlAction::Disable.status_message(),
            Some("voice_output_disabled")
        );
        assert!(ControlAction::None.status_message().is_none());
        assert!(!ControlAction::None.is_command());
    }
}
