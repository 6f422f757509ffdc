//! Runs - one end-to-end execution of the outer conversation for a task

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::channel::{EventSink, ReplySender};
use crate::conversation::{ConversationOutcome, ConversationSpec, Level};
use crate::error::MootError;
use crate::message::{Message, MessageKind, SYSTEM_SOURCE};
use crate::termination::StopReason;

/// Event streamed to the transport while a run progresses
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A participant message was appended at `level`
    Message {
        level: Level,
        turn: usize,
        message: Message,
    },
    /// A human gate is waiting for a reply
    InputRequested { level: Level, message: Message },
    /// Always the last event of a run
    Finished(RunOutcome),
}

impl RunEvent {
    /// Whether this event belongs to the outermost conversation
    pub fn is_outer(&self) -> bool {
        match self {
            RunEvent::Message { level, .. } | RunEvent::InputRequested { level, .. } => {
                level.is_outer()
            }
            RunEvent::Finished(_) => true,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The outer conversation saw its termination marker
    Terminated { turns: usize, marker: String },
    /// The outer turn budget ran out
    Exhausted { turns: usize, max_turns: usize },
    /// A participant failed
    Failed {
        participant: String,
        level: String,
        reason: String,
    },
    /// The human input channel closed while a gate was waiting
    Disconnected { participant: String, level: String },
    /// The team could not be assembled
    SetupFailed { reason: String },
    /// The transport stopped listening before the run ended
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Terminated { .. })
    }

    /// Whether the transport must stop writing to the client
    pub fn is_disconnect(&self) -> bool {
        matches!(self, RunOutcome::Disconnected { .. } | RunOutcome::Cancelled)
    }

    /// Same value as the serialized `status` tag
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Terminated { .. } => "terminated",
            RunOutcome::Exhausted { .. } => "exhausted",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Disconnected { .. } => "disconnected",
            RunOutcome::SetupFailed { .. } => "setup_failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }

    /// Human-readable description
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Terminated { turns, marker } => {
                format!("Task completed: {marker} received after {turns} turns.")
            }
            RunOutcome::Exhausted { turns, max_turns } => {
                format!("Task stalled: turn budget exhausted ({turns}/{max_turns}) without approval.")
            }
            RunOutcome::Failed {
                participant,
                level,
                reason,
            } => format!("An error occurred in {participant} ({level}): {reason}"),
            RunOutcome::Disconnected { participant, level } => {
                format!("Client disconnected while {participant} ({level}) awaited input.")
            }
            RunOutcome::SetupFailed { reason } => format!("Setup failed: {reason}"),
            RunOutcome::Cancelled => "Run cancelled: the client stopped listening.".to_string(),
        }
    }

    /// Final system message for the external actor
    pub fn to_message(&self) -> Message {
        let kind = match self {
            RunOutcome::Terminated { .. } | RunOutcome::Exhausted { .. } => MessageKind::Termination,
            _ => MessageKind::Error,
        };
        Message::new(SYSTEM_SOURCE, self.summary(), kind)
    }
}

impl From<&ConversationOutcome> for RunOutcome {
    fn from(outcome: &ConversationOutcome) -> Self {
        match &outcome.stop {
            StopReason::Terminated { marker } => RunOutcome::Terminated {
                turns: outcome.turns,
                marker: marker.clone(),
            },
            StopReason::Exhausted { max_turns } => RunOutcome::Exhausted {
                turns: outcome.turns,
                max_turns: *max_turns,
            },
        }
    }
}

impl From<&MootError> for RunOutcome {
    fn from(err: &MootError) -> Self {
        match err {
            MootError::Disconnected { participant, level } => RunOutcome::Disconnected {
                participant: participant.clone(),
                level: level.to_string(),
            },
            e if e.is_setup() => RunOutcome::SetupFailed {
                reason: e.to_string(),
            },
            e => RunOutcome::Failed {
                participant: e.participant().unwrap_or_default().to_string(),
                level: e.level().map(ToString::to_string).unwrap_or_default(),
                reason: e.to_string(),
            },
        }
    }
}

/// A task bound to its own outer conversation
pub struct Run {
    pub id: Uuid,
    task: String,
    team: ConversationSpec,
    events: EventSink,
}

impl Run {
    pub fn new(task: impl Into<String>, team: ConversationSpec, events: EventSink) -> Self {
        let id = Uuid::new_v4();
        info!(run_id = %id, team = team.name(), "Creating new run");

        Self {
            id,
            task: task.into(),
            team,
            events,
        }
    }

    /// Drive the outer conversation to its end and report the outcome once
    ///
    /// Stops at the next await point once the transport drops its event receiver.
    #[instrument(skip(self), fields(run_id = %self.id))]
    pub async fn execute(self) -> RunOutcome {
        let level = Level::root(self.team.name());
        let conversation = self.team.instantiate(level);

        let result = tokio::select! {
            biased;
            _ = self.events.closed() => {
                warn!("Transport stopped listening, cancelling run");
                return RunOutcome::Cancelled;
            }
            result = conversation.run(&self.task, &self.events) => result,
        };

        let outcome = match &result {
            Ok(conversation) => RunOutcome::from(conversation),
            Err(e @ MootError::Disconnected { .. }) => {
                warn!(error = %e, "Run ended by disconnect");
                RunOutcome::from(e)
            }
            Err(e) => {
                error!(error = %e, "Run failed");
                RunOutcome::from(e)
            }
        };

        info!(status = ?outcome, "Run finished");
        self.events.finished(outcome.clone());
        outcome
    }

    pub fn spawn(self) -> JoinHandle<RunOutcome> {
        tokio::spawn(self.execute())
    }
}

/// Transport-side handle to a spawned run
pub struct RunHandle {
    pub id: Uuid,
    /// Streamed events, ending with `RunEvent::Finished`
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    /// Replies for whichever human gate is awaiting input
    pub replies: ReplySender,
    pub task: JoinHandle<RunOutcome>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::{HumanGateAgent, Participant, WorkerAgent};
    use crate::channel::{input_channel, InputChannel};
    use crate::completion::CompletionError;
    use crate::supervisor::SummarizingSupervisor;
    use crate::termination::TurnPolicy;
    use crate::test_support::ScriptedClient;

    fn content_team(client: Arc<ScriptedClient>, input: InputChannel, max_turns: usize) -> ConversationSpec {
        let participants: Vec<Participant> = vec![
            WorkerAgent::new("Writer", "write", client.clone()).unwrap().into(),
            WorkerAgent::new("Editor", "edit", client).unwrap().into(),
            HumanGateAgent::new("Human_ContentOverseer", "Type APPROVE", input).unwrap().into(),
        ];
        ConversationSpec::new("content", participants, TurnPolicy::new(max_turns).with_marker("APPROVE"))
            .unwrap()
    }

    fn quality_team(client: Arc<ScriptedClient>, input: InputChannel) -> ConversationSpec {
        let participants: Vec<Participant> = vec![
            WorkerAgent::new("Reviewer", "review", client).unwrap().into(),
            HumanGateAgent::new("Human_QualityOverseer", "Type QUALITY_APPROVED", input)
                .unwrap()
                .into(),
        ];
        ConversationSpec::new(
            "quality",
            participants,
            TurnPolicy::new(3).with_marker("QUALITY_APPROVED"),
        )
        .unwrap()
    }

    fn outer_team(client: Arc<ScriptedClient>, input: InputChannel, content_turns: usize) -> ConversationSpec {
        let content = SummarizingSupervisor::new(
            "ContentTeam_SoM",
            "summarize content",
            client.clone(),
            content_team(client.clone(), input.clone(), content_turns),
        )
        .unwrap();
        let quality = SummarizingSupervisor::new(
            "QualityTeam_SoM",
            "summarize quality",
            client.clone(),
            quality_team(client, input.clone()),
        )
        .unwrap();
        let overseer =
            HumanGateAgent::new("Human_ProjectOverseer", "Type FINAL_APPROVAL", input).unwrap();

        ConversationSpec::new(
            "coordination",
            vec![content.into(), quality.into(), overseer.into()],
            TurnPolicy::new(10).with_marker("FINAL_APPROVAL"),
        )
        .unwrap()
    }

    /// Feed replies one at a time as gates consume them
    fn feed(replies: ReplySender, script: &[&str]) -> JoinHandle<()> {
        let script: Vec<String> = script.iter().map(|s| s.to_string()).collect();
        tokio::spawn(async move {
            for reply in script {
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
        })
    }

    fn collect(mut rx: mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_outer_advances_once_per_supervisor_turn() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply("write", "draft... READY_FOR_REVIEW")
                .reply("edit", "NEEDS_REVISION")
                .reply("summarize content", "Draft done, human wants revisions.")
                .reply("review", "QUALITY_OK")
                .reply("summarize quality", "Quality approved."),
        );
        let (replies, input) = input_channel();
        let feeder = feed(
            replies,
            &["please revise the intro", "QUALITY_APPROVED", "FINAL_APPROVAL"],
        );

        let (events, rx) = EventSink::new();
        let run = Run::new("write a post", outer_team(client.clone(), input, 3), events);
        let outcome = run.execute().await;
        feeder.await.unwrap();

        assert_eq!(outcome, RunOutcome::Terminated { turns: 3, marker: "FINAL_APPROVAL".into() });
        assert!(outcome.is_success());

        // The first outer message is the content summary at outer turn 0
        let outer: Vec<(usize, String)> = collect(rx)
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Message { level, turn, message } if level.is_outer() => {
                    Some((turn, message.source))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            outer,
            vec![
                (0, "ContentTeam_SoM".to_string()),
                (1, "QualityTeam_SoM".to_string()),
            ]
        );

        // Quality's inner conversation is seeded with the outer transcript,
        // which holds only the summary from the content team
        let review = client
            .calls()
            .into_iter()
            .find(|c| c.instruction == "review")
            .unwrap();
        assert_eq!(review.sources, vec!["user", "ContentTeam_SoM"]);
    }

    #[tokio::test]
    async fn test_outer_transcript_has_no_inner_participants() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply("write", "draft")
                .reply("edit", "CONTENT_OK")
                .reply("summarize content", "Content approved.")
                .reply("review", "QUALITY_OK")
                .reply("summarize quality", "Quality approved."),
        );
        let (replies, input) = input_channel();
        let feeder = feed(replies, &["APPROVE", "QUALITY_APPROVED", "FINAL_APPROVAL"]);

        let team = outer_team(client.clone(), input, 4);
        let (events, _rx) = EventSink::new();
        let outcome = team
            .instantiate(Level::root("coordination"))
            .run("write a post", &events)
            .await
            .unwrap();
        feeder.await.unwrap();

        assert_eq!(outcome.turns, 3);
        for inner in ["Writer", "Editor", "Human_ContentOverseer", "Reviewer", "Human_QualityOverseer"] {
            assert!(!outcome.transcript.has_source(inner), "{inner} leaked into outer transcript");
        }
        let sources: Vec<&str> = outcome.transcript.iter().map(|m| m.source.as_str()).collect();
        assert_eq!(
            sources,
            vec!["user", "ContentTeam_SoM", "QualityTeam_SoM", "Human_ProjectOverseer"]
        );
    }

    #[tokio::test]
    async fn test_inner_failure_ends_run() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply("write", "draft")
                .reply("edit", "NEEDS_REVISION")
                .reply("write", "second draft")
                .fail("edit", CompletionError::Provider("HTTP 500".into())),
        );
        let (replies, input) = input_channel();
        let feeder = feed(replies, &["please revise the intro"]);

        let (events, rx) = EventSink::new();
        let run = Run::new("write a post", outer_team(client.clone(), input, 8), events);
        let outcome = run.execute().await;
        feeder.await.unwrap();

        match &outcome {
            RunOutcome::Failed { participant, level, .. } => {
                assert_eq!(participant, "Editor");
                assert_eq!(level, "coordination/content");
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(client.calls_for("summarize content"), 0);

        let events = collect(rx);
        assert!(matches!(events.last(), Some(RunEvent::Finished(RunOutcome::Failed { .. }))));
        let last_message = events
            .iter()
            .rev()
            .find_map(|e| match e {
                RunEvent::Message { message, .. } => Some(message.content.clone()),
                _ => None,
            });
        assert_eq!(last_message.as_deref(), Some("second draft"));
    }

    #[tokio::test]
    async fn test_disconnect_ends_run_as_disconnected() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply("write", "draft")
                .reply("edit", "CONTENT_OK"),
        );
        let (replies, input) = input_channel();
        drop(replies);

        let (events, rx) = EventSink::new();
        let run = Run::new("write a post", outer_team(client, input, 4), events);
        let outcome = run.execute().await;

        assert_eq!(
            outcome,
            RunOutcome::Disconnected {
                participant: "Human_ContentOverseer".into(),
                level: "coordination/content".into(),
            }
        );
        assert!(outcome.is_disconnect());
        assert!(matches!(collect(rx).last(), Some(RunEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_outer_budget_exhaustion() {
        let client = Arc::new(ScriptedClient::new().reply("solo", "still thinking"));
        let participants: Vec<Participant> =
            vec![WorkerAgent::new("Solo", "solo", client).unwrap().into()];
        let team = ConversationSpec::new(
            "coordination",
            participants,
            TurnPolicy::new(1).with_marker("FINAL_APPROVAL"),
        )
        .unwrap();

        let (events, _rx) = EventSink::new();
        let outcome = Run::new("go", team, events).spawn().await.unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted { turns: 1, max_turns: 1 });
        assert!(!outcome.is_success());
        assert_eq!(outcome.to_message().kind, MessageKind::Termination);
    }

    #[test]
    fn test_outcome_from_setup_error() {
        let outcome = RunOutcome::from(&MootError::Setup("no participants".into()));
        assert!(matches!(outcome, RunOutcome::SetupFailed { .. }));
        assert_eq!(outcome.to_message().kind, MessageKind::Error);
    }

    #[tokio::test]
    async fn test_run_cancelled_when_transport_stops_listening() {
        let client = Arc::new(ScriptedClient::new().reply("write", "draft").reply("edit", "edited"));
        let (replies, input) = input_channel();
        let team = content_team(client.clone(), input, 4);

        let (events, rx) = EventSink::new();
        drop(rx);
        drop(replies);

        let outcome = Run::new("write a post", team, events).execute().await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(outcome.is_disconnect());
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_status_matches_serialized_tag() {
        let outcomes = [
            RunOutcome::Terminated { turns: 3, marker: "APPROVE".into() },
            RunOutcome::Exhausted { turns: 4, max_turns: 4 },
            RunOutcome::Failed {
                participant: "Editor".into(),
                level: "coordination/content".into(),
                reason: "rate limited".into(),
            },
            RunOutcome::Disconnected {
                participant: "Human_ContentOverseer".into(),
                level: "coordination/content".into(),
            },
            RunOutcome::SetupFailed { reason: "empty team".into() },
            RunOutcome::Cancelled,
        ];

        for outcome in outcomes {
            let json = serde_json::to_value(&outcome).unwrap();
            assert_eq!(json["status"], outcome.status());
        }
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RunOutcome::Exhausted { turns: 4, max_turns: 4 };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "exhausted");
        assert_eq!(json["turns"], 4);
    }
}
