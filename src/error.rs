//! Moot error types

use thiserror::Error;

use crate::completion::CompletionError;
use crate::conversation::Level;

/// Errors that can end a run
#[derive(Debug, Error)]
pub enum MootError {
    /// A participant or conversation could not be built
    #[error("Setup failed: {0}")]
    Setup(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker's or supervisor's model call failed
    #[error("Completion failed for {participant} in {level}: {source}")]
    Completion {
        participant: String,
        level: Level,
        #[source]
        source: CompletionError,
    },

    /// The input channel closed while a human gate was waiting
    #[error("Input channel disconnected while {participant} in {level} awaited input")]
    Disconnected { participant: String, level: Level },

    /// A second gate tried to wait while another one holds the input channel
    #[error("{participant} in {level} cannot await input while {holder} is awaiting input")]
    GateBusy {
        participant: String,
        holder: String,
        level: Level,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl MootError {
    /// Name of the participant the error originated from, if any
    pub fn participant(&self) -> Option<&str> {
        match self {
            MootError::Completion { participant, .. }
            | MootError::Disconnected { participant, .. }
            | MootError::GateBusy { participant, .. } => Some(participant),
            _ => None,
        }
    }

    /// Conversation level the error originated from, if any
    pub fn level(&self) -> Option<&Level> {
        match self {
            MootError::Completion { level, .. }
            | MootError::Disconnected { level, .. }
            | MootError::GateBusy { level, .. } => Some(level),
            _ => None,
        }
    }

    /// Whether the run never started because it could not be assembled
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            MootError::Setup(_) | MootError::Config(_) | MootError::Io(_) | MootError::TomlParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MootError>;
