//! Round-robin conversation loop
//!
//! A [`ConversationSpec`] is the reusable blueprint: participants in turn order plus a
//! [`TurnPolicy`]. Each run gets a fresh [`Conversation`] with its own transcript and turn
//! index, which is consumed by [`Conversation::run`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{Participant, TurnContext};
use crate::channel::EventSink;
use crate::error::{MootError, Result};
use crate::message::{Message, MessageKind, Transcript};
use crate::termination::{StopReason, TurnPolicy};

/// Position of a conversation in the nesting hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Level {
    depth: usize,
    path: String,
}

impl Level {
    /// Level of the outermost conversation
    pub fn root(name: &str) -> Self {
        Self {
            depth: 0,
            path: name.to_string(),
        }
    }

    /// Level of a conversation nested inside this one
    pub fn child(&self, name: &str) -> Self {
        Self {
            depth: self.depth + 1,
            path: format!("{}/{}", self.path, name),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_outer(&self) -> bool {
        self.depth == 0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Participants and stop rules of a conversation, fixed at construction
pub struct ConversationSpec {
    name: String,
    participants: Vec<Participant>,
    policy: TurnPolicy,
}

impl ConversationSpec {
    pub fn new(
        name: impl Into<String>,
        participants: Vec<Participant>,
        policy: TurnPolicy,
    ) -> Result<Self> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(MootError::Setup("conversation name must not be empty".into()));
        }
        if participants.is_empty() {
            return Err(MootError::Setup(format!(
                "conversation {name} has no participants"
            )));
        }

        let mut seen = HashSet::new();
        for participant in &participants {
            if !seen.insert(participant.name()) {
                return Err(MootError::Setup(format!(
                    "duplicate participant {} in conversation {name}",
                    participant.name()
                )));
            }
        }

        policy.validate()?;

        Ok(Self {
            name,
            participants,
            policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn policy(&self) -> &TurnPolicy {
        &self.policy
    }

    /// Fresh conversation with an empty transcript and turn index zero
    pub fn instantiate(&self, level: Level) -> Conversation<'_> {
        Conversation {
            spec: self,
            level,
            transcript: Transcript::new(),
            turn_index: 0,
        }
    }
}

/// Result of a finished conversation loop
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub level: Level,
    /// Full transcript including the seed messages
    pub transcript: Transcript,
    /// Messages appended by participants
    pub turns: usize,
    pub stop: StopReason,
}

impl ConversationOutcome {
    pub fn is_terminal(&self) -> bool {
        self.stop.is_terminal()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.stop.is_terminal()
    }
}

/// One run of a conversation
pub struct Conversation<'a> {
    spec: &'a ConversationSpec,
    level: Level,
    transcript: Transcript,
    turn_index: usize,
}

impl Conversation<'_> {
    /// Run with `task` seeded as a message from the user
    pub async fn run(self, task: &str, events: &EventSink) -> Result<ConversationOutcome> {
        self.run_seeded(vec![Message::task(task)], events).await
    }

    /// Run with the given seed messages as initial context
    ///
    /// Every appended participant message is emitted to `events` as it is produced,
    /// except human gate replies, which stay in the transcript only.
    pub async fn run_seeded(
        mut self,
        seed: Vec<Message>,
        events: &EventSink,
    ) -> Result<ConversationOutcome> {
        let spec = self.spec;
        let max_turns = spec.policy.max_turns();

        if max_turns == 0 {
            info!(level = %self.level, "Conversation has no turn budget, not starting");
            return Ok(self.finish(StopReason::Exhausted { max_turns }));
        }

        for message in seed {
            self.transcript.push(message);
        }

        info!(
            level = %self.level,
            participants = spec.participants.len(),
            max_turns,
            marker = ?spec.policy.marker(),
            "Starting conversation"
        );

        let count = spec.participants.len();

        while self.turn_index < max_turns {
            let turn = self.turn_index;
            let participant = &spec.participants[turn % count];
            debug!(level = %self.level, turn, participant = participant.name(), "Selecting participant");

            let produced = {
                let ctx = TurnContext {
                    transcript: &self.transcript,
                    level: &self.level,
                    events,
                    turn,
                };
                participant.respond(&ctx).await?
            };

            let marker = spec.policy.matches(&produced.content).map(str::to_string);
            let message = match marker {
                Some(_) => produced.with_kind(MessageKind::Termination),
                None => produced,
            };

            self.transcript.push(message);
            self.turn_index += 1;

            if !participant.is_human_gate() {
                if let Some(appended) = self.transcript.last() {
                    events.message(&self.level, turn, appended);
                }
            }

            if let Some(marker) = marker {
                info!(level = %self.level, turns = self.turn_index, marker = %marker, "Termination marker seen");
                return Ok(self.finish(StopReason::Terminated { marker }));
            }
        }

        info!(level = %self.level, turns = self.turn_index, "Turn budget exhausted");
        Ok(self.finish(StopReason::Exhausted { max_turns }))
    }

    fn finish(self, stop: StopReason) -> ConversationOutcome {
        ConversationOutcome {
            level: self.level,
            transcript: self.transcript,
            turns: self.turn_index,
            stop,
        }
    }
}
