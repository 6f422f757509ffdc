//! Communication channels between a run and its transport

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::conversation::Level;
use crate::message::Message;
use crate::session::{RunEvent, RunOutcome};

/// Create the single-slot human input channel for one run
///
/// Returns the transport-side sender and the run-side channel handed to every human gate.
pub fn input_channel() -> (ReplySender, InputChannel) {
    let (tx, rx) = mpsc::channel(1);
    let awaiting = Arc::new(Mutex::new(None));

    let sender = ReplySender {
        tx,
        awaiting: Arc::clone(&awaiting),
    };
    let channel = InputChannel {
        rx: Arc::new(tokio::sync::Mutex::new(rx)),
        awaiting,
    };

    (sender, channel)
}

/// Transport-side handle for delivering human replies
///
/// Dropping every clone disconnects the run.
#[derive(Clone)]
pub struct ReplySender {
    tx: mpsc::Sender<String>,
    awaiting: Arc<Mutex<Option<String>>>,
}

impl ReplySender {
    /// Deliver a reply, waiting while the slot is occupied
    pub async fn send(&self, reply: impl Into<String>) -> Result<(), ChannelError> {
        self.tx
            .send(reply.into())
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Deliver a reply without waiting
    pub fn try_send(&self, reply: impl Into<String>) -> Result<(), ChannelError> {
        self.tx.try_send(reply.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Full,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Name of the gate currently awaiting input
    pub fn awaiting_gate(&self) -> Option<String> {
        self.awaiting.lock().clone()
    }

    /// Check if the run side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Run-side end of the input channel, shared by the run's human gates
#[derive(Clone)]
pub struct InputChannel {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    awaiting: Arc<Mutex<Option<String>>>,
}

impl InputChannel {
    /// Take the channel for `gate`
    ///
    /// Fails with the current holder's name if another gate is already awaiting input.
    pub fn claim(&self, gate: &str) -> Result<InputClaim<'_>, String> {
        let mut awaiting = self.awaiting.lock();
        if let Some(holder) = awaiting.as_ref() {
            return Err(holder.clone());
        }
        *awaiting = Some(gate.to_string());

        Ok(InputClaim { channel: self })
    }

    /// Name of the gate currently awaiting input
    pub fn awaiting_gate(&self) -> Option<String> {
        self.awaiting.lock().clone()
    }
}

/// Exclusive right to wait on the input channel; released on drop
pub struct InputClaim<'a> {
    channel: &'a InputChannel,
}

impl InputClaim<'_> {
    /// Wait for the next reply
    ///
    /// No timeout: returns only on a reply or once every sender is gone.
    pub async fn recv(&self) -> Result<String, ChannelError> {
        let mut rx = self.channel.rx.lock().await;
        rx.recv().await.ok_or(ChannelError::Closed)
    }
}

impl Drop for InputClaim<'_> {
    fn drop(&mut self) {
        *self.channel.awaiting.lock() = None;
    }
}

/// Emits run events to the transport
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the transport reads from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn message(&self, level: &Level, turn: usize, message: &Message) {
        let _ = self.tx.send(RunEvent::Message {
            level: level.clone(),
            turn,
            message: message.clone(),
        });
    }

    pub fn input_requested(&self, level: &Level, message: Message) {
        let _ = self.tx.send(RunEvent::InputRequested {
            level: level.clone(),
            message,
        });
    }

    pub fn finished(&self, outcome: RunOutcome) {
        let _ = self.tx.send(RunEvent::Finished(outcome));
    }

    /// Check if the transport stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the transport has dropped its receiver
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Channel errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,

    #[error("A reply is already pending")]
    Full,
}
