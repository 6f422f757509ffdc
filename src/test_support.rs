//! Scripted completion client for unit tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::completion::{CompletionClient, CompletionError};
use crate::message::Message;

/// One recorded `complete` call
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub instruction: String,
    /// Sources of the transcript messages passed in, in order
    pub sources: Vec<String>,
}

/// Replies are queued per role instruction and handed out in order.
///
/// An instruction with nothing left queued fails with a provider error.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, CompletionError>>>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, instruction: &str, text: &str) -> Self {
        self.push(instruction, Ok(text.to_string()));
        self
    }

    pub fn fail(self, instruction: &str, error: CompletionError) -> Self {
        self.push(instruction, Err(error));
        self
    }

    fn push(&self, instruction: &str, result: Result<String, CompletionError>) {
        self.scripts
            .lock()
            .entry(instruction.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Number of calls made with `instruction`
    pub fn calls_for(&self, instruction: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.instruction == instruction)
            .count()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        instruction: &str,
        transcript: &[Message],
    ) -> Result<String, CompletionError> {
        self.calls.lock().push(CallRecord {
            instruction: instruction.to_string(),
            sources: transcript.iter().map(|m| m.source.clone()).collect(),
        });

        self.scripts
            .lock()
            .get_mut(instruction)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(CompletionError::Provider(format!(
                    "no scripted reply for {instruction}"
                )))
            })
    }
}
