//! Main orchestrator - assembles teams and launches independent runs

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::{HumanGateAgent, Participant, WorkerAgent};
use crate::channel::{input_channel, EventSink, InputChannel};
use crate::completion::CompletionClient;
use crate::config::{ConversationConfig, ParticipantConfig};
use crate::conversation::ConversationSpec;
use crate::error::{MootError, Result};
use crate::prompts;
use crate::session::{Run, RunHandle};
use crate::supervisor::SummarizingSupervisor;
use crate::termination::TurnPolicy;

/// Launches runs of one team layout
///
/// Every run gets freshly built participants and its own input channel; only the
/// completion client is shared.
pub struct Orchestrator {
    team: Arc<ConversationConfig>,
    client: Arc<dyn CompletionClient>,
    runs: Arc<RwLock<HashSet<Uuid>>>,
}

impl Orchestrator {
    /// Create an orchestrator, rejecting a team layout that cannot be built
    pub fn new(team: ConversationConfig, client: Arc<dyn CompletionClient>) -> Result<Self> {
        let (_replies, input) = input_channel();
        build_team(&team, &client, &input)?;

        Ok(Self {
            team: Arc::new(team),
            client,
            runs: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    /// Build a fresh team for `task` and spawn its run
    pub fn start_run(&self, task: impl Into<String>) -> Result<RunHandle> {
        let task = task.into();
        if task.trim().is_empty() {
            return Err(MootError::Setup("task must not be empty".into()));
        }

        let (replies, input) = input_channel();
        let team = build_team(&self.team, &self.client, &input)?;
        let (events, events_rx) = EventSink::new();

        let run = Run::new(task, team, events);
        let id = run.id;
        self.runs.write().insert(id);

        let active = ActiveRun {
            runs: Arc::clone(&self.runs),
            id,
        };
        let handle = tokio::spawn(async move {
            let _active = active;
            run.execute().await
        });

        info!(run_id = %id, active = self.active_count(), "Started run");

        Ok(RunHandle {
            id,
            events: events_rx,
            replies,
            task: handle,
        })
    }

    pub fn active_count(&self) -> usize {
        self.runs.read().len()
    }

    pub fn team(&self) -> &ConversationConfig {
        &self.team
    }
}

/// Keeps a run id in the active set until its task ends or is aborted
struct ActiveRun {
    runs: Arc<RwLock<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.runs.write().remove(&self.id);
    }
}

/// Build a conversation tree from configuration
///
/// Human gates anywhere in the tree share `input`. Participant names must be unique
/// across the whole tree.
pub fn build_team(
    config: &ConversationConfig,
    client: &Arc<dyn CompletionClient>,
    input: &InputChannel,
) -> Result<ConversationSpec> {
    let mut names = HashSet::new();
    build_conversation(config, client, input, &mut names)
}

fn build_conversation(
    config: &ConversationConfig,
    client: &Arc<dyn CompletionClient>,
    input: &InputChannel,
    names: &mut HashSet<String>,
) -> Result<ConversationSpec> {
    let mut participants = Vec::with_capacity(config.participants.len());

    for participant in &config.participants {
        if !names.insert(participant.name().to_string()) {
            return Err(MootError::Setup(format!(
                "participant name {} is used more than once",
                participant.name()
            )));
        }
        participants.push(build_participant(participant, client, input, names)?);
    }

    let mut policy = TurnPolicy::new(config.max_turns);
    if let Some(marker) = &config.marker {
        policy = policy.with_marker(marker.clone());
    }

    debug!(conversation = %config.name, participants = participants.len(), "Built conversation");
    ConversationSpec::new(config.name.clone(), participants, policy)
}

fn build_participant(
    config: &ParticipantConfig,
    client: &Arc<dyn CompletionClient>,
    input: &InputChannel,
    names: &mut HashSet<String>,
) -> Result<Participant> {
    let participant = match config {
        ParticipantConfig::Worker {
            name, instruction, ..
        } => WorkerAgent::new(name.clone(), instruction.clone(), Arc::clone(client))?.into(),
        ParticipantConfig::HumanGate {
            name,
            request_prompt,
            ..
        } => {
            let prompt = request_prompt
                .clone()
                .unwrap_or_else(|| prompts::generic_gate(name));
            HumanGateAgent::new(name.clone(), prompt, input.clone())?.into()
        }
        ParticipantConfig::Supervisor {
            name,
            summary_prompt,
            team,
        } => {
            let inner = build_conversation(team, client, input, names)?;
            SummarizingSupervisor::new(name.clone(), summary_prompt.clone(), Arc::clone(client), inner)?
                .into()
        }
    };

    debug!(
        participant = config.name(),
        description = config.description(),
        "Built participant"
    );
    Ok(participant)
}
