//! Participants - the entities that take turns in a conversation

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::channel::{EventSink, InputChannel};
use crate::completion::CompletionClient;
use crate::conversation::Level;
use crate::error::{MootError, Result};
use crate::message::{Message, MessageKind, Transcript};
use crate::supervisor::SummarizingSupervisor;

/// Everything a participant sees on its turn
pub struct TurnContext<'a> {
    /// Read-only view of the conversation so far
    pub transcript: &'a Transcript,
    pub level: &'a Level,
    pub events: &'a EventSink,
    /// Zero-based turn index within this conversation
    pub turn: usize,
}

/// A conversation participant
pub enum Participant {
    Worker(WorkerAgent),
    HumanGate(HumanGateAgent),
    Supervisor(SummarizingSupervisor),
}

impl Participant {
    pub fn name(&self) -> &str {
        match self {
            Participant::Worker(w) => &w.name,
            Participant::HumanGate(g) => &g.name,
            Participant::Supervisor(s) => s.name(),
        }
    }

    pub fn is_human_gate(&self) -> bool {
        matches!(self, Participant::HumanGate(_))
    }

    /// Produce this participant's message for the current turn
    pub async fn respond(&self, ctx: &TurnContext<'_>) -> Result<Message> {
        match self {
            Participant::Worker(w) => w.respond(ctx).await,
            Participant::HumanGate(g) => g.respond(ctx).await,
            Participant::Supervisor(s) => s.respond(ctx).await,
        }
    }
}

impl From<WorkerAgent> for Participant {
    fn from(agent: WorkerAgent) -> Self {
        Participant::Worker(agent)
    }
}

impl From<HumanGateAgent> for Participant {
    fn from(agent: HumanGateAgent) -> Self {
        Participant::HumanGate(agent)
    }
}

impl From<SummarizingSupervisor> for Participant {
    fn from(agent: SummarizingSupervisor) -> Self {
        Participant::Supervisor(agent)
    }
}

/// Model-backed worker with a fixed role instruction
pub struct WorkerAgent {
    pub name: String,
    instruction: String,
    client: Arc<dyn CompletionClient>,
}

impl WorkerAgent {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self> {
        let name = name.into();
        let instruction = instruction.into();

        if name.trim().is_empty() {
            return Err(MootError::Setup("worker name must not be empty".into()));
        }
        if instruction.trim().is_empty() {
            return Err(MootError::Setup(format!(
                "worker {name} has no role instruction"
            )));
        }

        debug!(worker = %name, "Creating worker agent");

        Ok(Self {
            name,
            instruction,
            client,
        })
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// One completion call, no retries
    #[instrument(skip_all, fields(worker = %self.name, level = %ctx.level, turn = ctx.turn))]
    pub async fn respond(&self, ctx: &TurnContext<'_>) -> Result<Message> {
        let text = self
            .client
            .complete(&self.instruction, ctx.transcript.messages())
            .await
            .map_err(|source| {
                warn!(error = %source, "Worker completion failed");
                MootError::Completion {
                    participant: self.name.clone(),
                    level: ctx.level.clone(),
                    source,
                }
            })?;

        Ok(Message::normal(&self.name, text))
    }
}

/// Gate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    AwaitingInput,
}

/// Participant that suspends the conversation until a human replies
pub struct HumanGateAgent {
    pub name: String,
    /// Shown to the human when input is requested
    request_prompt: String,
    input: InputChannel,
    state: RwLock<GateState>,
}

impl HumanGateAgent {
    pub fn new(
        name: impl Into<String>,
        request_prompt: impl Into<String>,
        input: InputChannel,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MootError::Setup("human gate name must not be empty".into()));
        }

        Ok(Self {
            name,
            request_prompt: request_prompt.into(),
            input,
            state: RwLock::new(GateState::Idle),
        })
    }

    pub fn state(&self) -> GateState {
        *self.state.read()
    }

    /// Emit an input request, then wait for the reply
    pub async fn respond(&self, ctx: &TurnContext<'_>) -> Result<Message> {
        let claim = self
            .input
            .claim(&self.name)
            .map_err(|holder| MootError::GateBusy {
                participant: self.name.clone(),
                holder,
                level: ctx.level.clone(),
            })?;

        let _awaiting = StateGuard::enter(&self.state);
        info!(gate = %self.name, level = %ctx.level, turn = ctx.turn, "Awaiting human input");

        ctx.events.input_requested(
            ctx.level,
            Message::new(&self.name, &self.request_prompt, MessageKind::InputRequest),
        );

        let reply = claim.recv().await.map_err(|_| {
            warn!(gate = %self.name, level = %ctx.level, "Input channel closed while awaiting input");
            MootError::Disconnected {
                participant: self.name.clone(),
                level: ctx.level.clone(),
            }
        })?;

        debug!(gate = %self.name, "Human input received");
        Ok(Message::normal(&self.name, reply))
    }
}

/// Holds a gate in `AwaitingInput` until dropped
struct StateGuard<'a> {
    state: &'a RwLock<GateState>,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a RwLock<GateState>) -> Self {
        *state.write() = GateState::AwaitingInput;
        Self { state }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state.write() = GateState::Idle;
    }
}
