//! # Moot
//!
//! Nested turn-taking councils of AI agents with human approval gates.
//!
//! A run drives one outer conversation. Supervisors in that conversation each run a
//! whole inner conversation on their turn and answer with a single summary; human gates
//! suspend the run until a reply arrives on the run's input channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    OUTER CONVERSATION (depth 0)                       │
//! │   ContentTeam_SoM  →  QualityTeam_SoM  →  Human_ProjectOverseer  → …  │
//! └────────┬──────────────────────┬──────────────────────────────────────┘
//!          │ one summary          │ one summary
//!          ▼                      ▼
//!   ┌──────────────────┐   ┌──────────────────┐
//!   │ content (depth 1)│   │ quality (depth 1)│
//!   │ Writer → Editor  │   │ Reviewer →       │
//!   │ → Human gate     │   │ Human gate       │
//!   └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Participant**: worker, human gate or summarizing supervisor
//! - **Conversation**: round-robin loop with a termination marker and a turn budget
//! - **Run**: one task driven through the outer conversation
//! - **Orchestrator**: builds a fresh team per run and spawns it

pub mod agent;
pub mod channel;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod message;
pub mod orchestrator;
pub mod prompts;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod termination;

#[cfg(test)]
mod test_support;

pub use agent::{GateState, HumanGateAgent, Participant, TurnContext, WorkerAgent};
pub use channel::{input_channel, ChannelError, EventSink, InputChannel, ReplySender};
pub use completion::{CompletionClient, CompletionError, OpenAiCompatibleClient};
pub use config::{ConversationConfig, MootConfig, ParticipantConfig};
pub use conversation::{Conversation, ConversationOutcome, ConversationSpec, Level};
pub use error::{MootError, Result};
pub use message::{Message, MessageKind, Transcript};
pub use orchestrator::Orchestrator;
pub use session::{Run, RunEvent, RunHandle, RunOutcome};
pub use supervisor::SummarizingSupervisor;
pub use termination::{StopReason, TurnPolicy};
