//! Integration layer that wires the components into conversations

pub mod config;
pub mod orchestrator;

pub use config::{parse_deadline, IntegrationConfig};
pub use orchestrator::{
    truncate_for_budget, RespondOutcome, RespondResult, TurnResult, VoiceConversation,
};
