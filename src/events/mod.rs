use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::Operation;
use crate::models::{TransactionId, TransactionKind};

// Events that tell open views to refetch a cached list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    TransactionsChanged {
        kind: TransactionKind,
        id: Option<TransactionId>,
        operation: Operation,
        timestamp: DateTime<Utc>,
    },
    ReferenceDataRefreshed {
        suppliers: usize,
        items: usize,
        users: usize,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn transactions_changed(
        kind: TransactionKind,
        id: Option<TransactionId>,
        operation: Operation,
    ) -> Self {
        Event::TransactionsChanged {
            kind,
            id,
            operation,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast handle shared by every controller and view.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: broadcast::Sender<Event>,
}

impl EventSender {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning how many subscribers received it.
    /// Having nobody listening is not an error.
    pub fn send(&self, event: Event) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "no subscribers for event");
                0
            }
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(64)
    }
}
