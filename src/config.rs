//! Configuration: model endpoint, server address and team layout

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MootError, Result};
use crate::prompts;

/// Top-level configuration, loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MootConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub team: ConversationConfig,
}

impl MootConfig {
    /// Load from `path`, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    MootError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                let config = Self::from_toml_str(&raw)?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// OpenAI-compatible completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: Option<f32>,
    /// Per-request timeout enforced by the HTTP client
    pub timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: None,
            timeout_secs: Some(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// One conversation: ordered participants and stop rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub name: String,
    #[serde(default)]
    pub marker: Option<String>,
    pub max_turns: usize,
    pub participants: Vec<ParticipantConfig>,
}

/// A participant; supervisors nest a whole conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticipantConfig {
    Worker {
        name: String,
        #[serde(default)]
        description: String,
        instruction: String,
    },
    HumanGate {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        request_prompt: Option<String>,
    },
    Supervisor {
        name: String,
        summary_prompt: String,
        team: ConversationConfig,
    },
}

impl ParticipantConfig {
    pub fn name(&self) -> &str {
        match self {
            ParticipantConfig::Worker { name, .. }
            | ParticipantConfig::HumanGate { name, .. }
            | ParticipantConfig::Supervisor { name, .. } => name,
        }
    }

    /// Free-text role description; empty for supervisors
    pub fn description(&self) -> &str {
        match self {
            ParticipantConfig::Worker { description, .. }
            | ParticipantConfig::HumanGate { description, .. } => description,
            ParticipantConfig::Supervisor { .. } => "",
        }
    }

    fn worker(name: &str, description: &str, instruction: &str) -> Self {
        ParticipantConfig::Worker {
            name: name.to_string(),
            description: description.to_string(),
            instruction: instruction.to_string(),
        }
    }

    fn gate(name: &str, description: &str, request_prompt: &str) -> Self {
        ParticipantConfig::HumanGate {
            name: name.to_string(),
            description: description.to_string(),
            request_prompt: Some(request_prompt.to_string()),
        }
    }
}

impl ConversationConfig {
    /// Content and quality teams under a human project overseer
    pub fn society_of_mind() -> Self {
        let content = ConversationConfig {
            name: "content".to_string(),
            marker: Some("APPROVE".to_string()),
            max_turns: 4,
            participants: vec![
                ParticipantConfig::worker("Writer", "Expert content writer", prompts::WRITER),
                ParticipantConfig::worker(
                    "Editor",
                    "Content editor for quality assurance",
                    prompts::EDITOR,
                ),
                ParticipantConfig::gate(
                    "Human_ContentOverseer",
                    "Human oversight for content decisions",
                    prompts::CONTENT_GATE,
                ),
            ],
        };

        let quality = ConversationConfig {
            name: "quality".to_string(),
            marker: Some("QUALITY_APPROVED".to_string()),
            max_turns: 3,
            participants: vec![
                ParticipantConfig::worker(
                    "Reviewer",
                    "Quality reviewer for content assessment",
                    prompts::REVIEWER,
                ),
                ParticipantConfig::gate(
                    "Human_QualityOverseer",
                    "Human oversight for quality decisions",
                    prompts::QUALITY_GATE,
                ),
            ],
        };

        ConversationConfig {
            name: "coordination".to_string(),
            marker: Some("FINAL_APPROVAL".to_string()),
            max_turns: 10,
            participants: vec![
                ParticipantConfig::Supervisor {
                    name: "ContentTeam_SoM".to_string(),
                    summary_prompt: prompts::CONTENT_SUMMARY.to_string(),
                    team: content,
                },
                ParticipantConfig::Supervisor {
                    name: "QualityTeam_SoM".to_string(),
                    summary_prompt: prompts::QUALITY_SUMMARY.to_string(),
                    team: quality,
                },
                ParticipantConfig::gate(
                    "Human_ProjectOverseer",
                    "Human oversight for final decisions",
                    prompts::PROJECT_GATE,
                ),
            ],
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self::society_of_mind()
    }
}
