//! Progress events published by a running session
//!
//! Delivery is best-effort: a subscriber that hung up is dropped and the loop
//! carries on.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::metrics::MetricsSnapshot;
use crate::buffer::EpisodeSummary;

/// Notification emitted by the training loop
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new batch of rollouts is about to be collected
    RolloutStarted { iteration: usize },

    /// An episode finished during the last batch
    EpisodeEnded(EpisodeSummary),

    /// Metrics after a training iteration
    TrainingProgress(MetricsSnapshot),

    /// The game budget was reached
    TrainingComplete(MetricsSnapshot),

    /// The session was stopped before reaching its budget
    Stopped(MetricsSnapshot),
}

/// Fan-out of session events to any number of subscribers
#[derive(Debug, Default)]
pub struct EventSink {
    subscribers: Vec<Sender<SessionEvent>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Dropping disconnected event subscriber");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
