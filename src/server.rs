//! WebSocket transport: one connection drives one run

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::channel::ReplySender;
use crate::error::Result;
use crate::message::{MessageKind, SYSTEM_SOURCE};
use crate::orchestrator::Orchestrator;
use crate::session::{RunEvent, RunHandle, RunOutcome};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Frame sent by the client: the task first, then replies to human gates
#[derive(Debug, Deserialize)]
struct ClientFrame {
    content: String,
}

/// Frame sent to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerFrame {
    pub source: String,
    pub content: String,
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Conversation path, absent for run-level frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Run status, only on the final frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ServerFrame {
    pub fn from_event(event: &RunEvent) -> Self {
        match event {
            RunEvent::Message { level, message, .. } => Self {
                source: message.source.clone(),
                content: message.content.clone(),
                frame_type: "TextMessage".to_string(),
                level: Some(level.to_string()),
                status: None,
            },
            RunEvent::InputRequested { level, message } => Self {
                source: message.source.clone(),
                content: message.content.clone(),
                frame_type: "UserInputRequestedEvent".to_string(),
                level: Some(level.to_string()),
                status: None,
            },
            RunEvent::Finished(outcome) => Self::outcome(outcome),
        }
    }

    pub fn outcome(outcome: &RunOutcome) -> Self {
        let message = outcome.to_message();
        let frame_type = match message.kind {
            MessageKind::Error => "error",
            _ => "TextMessage",
        };

        Self {
            source: SYSTEM_SOURCE.to_string(),
            content: message.content,
            frame_type: frame_type.to_string(),
            level: None,
            status: Some(outcome.status().to_string()),
        }
    }
}

/// Routes: `GET /health` and `GET /ws/chat`
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/chat", get(chat))
        .with_state(AppState { orchestrator })
}

/// Bind `addr` and serve until the process stops
pub async fn serve(addr: &str, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Listening for chat connections");
    axum::serve(listener, router(orchestrator)).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "team": state.orchestrator.team().name,
        "active_runs": state.orchestrator.active_count(),
    }))
}

async fn chat(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| chat_session(socket, state))
}

async fn chat_session(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(task) = next_content(&mut receiver).await else {
        info!("Client disconnected before sending a task");
        return;
    };

    let RunHandle {
        id,
        mut events,
        replies,
        task: run,
    } = match state.orchestrator.start_run(task) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "Could not start run");
            let _ = send_frame(&mut sender, &ServerFrame::outcome(&RunOutcome::from(&e))).await;
            return;
        }
    };

    let mut reader = tokio::spawn(route_replies(receiver, replies));

    tokio::select! {
        _ = forward_events(&mut sender, &mut events) => {}
        _ = &mut reader => {
            info!(run_id = %id, "Client disconnected");
        }
    }

    run.abort();
    reader.abort();
    let _ = sender.close().await;
}

/// Next text frame from the client, `None` once it closes
async fn next_content<S, E>(receiver: &mut S) -> Option<String>
where
    S: Stream<Item = std::result::Result<WsMessage, E>> + Unpin,
{
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            WsMessage::Text(text) => return Some(parse_client_text(text.as_str())),
            WsMessage::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Feed client frames to the run until either side goes away
///
/// Dropping `replies` on return disconnects a waiting gate.
async fn route_replies<S, E>(mut receiver: S, replies: ReplySender)
where
    S: Stream<Item = std::result::Result<WsMessage, E>> + Unpin,
{
    while let Some(reply) = next_content(&mut receiver).await {
        if replies.send(reply).await.is_err() {
            break;
        }
    }
}

/// Write run events to the client
///
/// Ends after the final frame, on a disconnect outcome (which is not written) or when
/// the client can no longer be written to.
async fn forward_events<S>(sender: &mut S, events: &mut mpsc::UnboundedReceiver<RunEvent>)
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    while let Some(event) = events.recv().await {
        let finished = match &event {
            RunEvent::Finished(outcome) if outcome.is_disconnect() => return,
            RunEvent::Finished(_) => true,
            _ => false,
        };

        if let Err(e) = send_frame(sender, &ServerFrame::from_event(&event)).await {
            warn!(error = %e, "Failed to send frame");
            return;
        }
        if finished {
            return;
        }
    }
}

/// JSON `{"content": ...}` frames, falling back to the raw text
fn parse_client_text(text: &str) -> String {
    serde_json::from_str::<ClientFrame>(text)
        .map(|frame| frame.content)
        .unwrap_or_else(|_| text.to_string())
}

async fn send_frame<S>(sender: &mut S, frame: &ServerFrame) -> std::result::Result<(), String>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    sender
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}
