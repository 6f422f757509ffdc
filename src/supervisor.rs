//! Summarizing supervisor - runs a nested team and answers with one summary

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{error, info};

use crate::agent::TurnContext;
use crate::completion::CompletionClient;
use crate::conversation::ConversationSpec;
use crate::error::{MootError, Result};
use crate::message::Message;

/// Participant that wraps an inner conversation
///
/// Each turn instantiates a fresh inner conversation seeded with the outer transcript,
/// runs it to its end (terminal or exhausted) and issues one extra completion call with
/// the summary instruction over the whole inner transcript. Only that summary leaves.
pub struct SummarizingSupervisor {
    name: String,
    instruction: String,
    client: Arc<dyn CompletionClient>,
    team: ConversationSpec,
}

impl SummarizingSupervisor {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        client: Arc<dyn CompletionClient>,
        team: ConversationSpec,
    ) -> Result<Self> {
        let name = name.into();
        let instruction = instruction.into();

        if name.trim().is_empty() {
            return Err(MootError::Setup("supervisor name must not be empty".into()));
        }
        if instruction.trim().is_empty() {
            return Err(MootError::Setup(format!(
                "supervisor {name} has no summary instruction"
            )));
        }

        Ok(Self {
            name,
            instruction,
            client,
            team,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn team(&self) -> &ConversationSpec {
        &self.team
    }

    /// Boxed because the inner conversation may itself contain supervisors.
    pub fn respond<'a>(&'a self, ctx: &'a TurnContext<'a>) -> BoxFuture<'a, Result<Message>> {
        async move {
            let level = ctx.level.child(self.team.name());
            info!(supervisor = %self.name, level = %level, "Starting inner conversation");

            let seed = ctx.transcript.messages().to_vec();
            let outcome = self
                .team
                .instantiate(level.clone())
                .run_seeded(seed, ctx.events)
                .await
                .inspect_err(|e| {
                    error!(supervisor = %self.name, level = %level, error = %e, "Inner conversation failed");
                })?;

            info!(
                supervisor = %self.name,
                level = %level,
                turns = outcome.turns,
                terminal = outcome.is_terminal(),
                "Inner conversation finished, summarizing"
            );

            let summary = self
                .client
                .complete(&self.instruction, outcome.transcript.messages())
                .await
                .map_err(|source| {
                    error!(supervisor = %self.name, error = %source, "Summary completion failed");
                    MootError::Completion {
                        participant: self.name.clone(),
                        level: ctx.level.clone(),
                        source,
                    }
                })?;

            Ok(Message::normal(&self.name, summary))
        }
        .boxed()
    }
}
