// Sends that have been shown to the user but not yet confirmed by the backend.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::Message;

/// Temporary id a pending message carries until the server record replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "temp-{}", self.0)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOp {
    pub correlation: CorrelationId,
    pub message: Message,
    pub queued_at: DateTime<Utc>,
}

/// FIFO of in-flight sends, resolved by correlation id (never by content).
#[derive(Debug, Default)]
pub struct PendingQueue {
    ops: VecDeque<PendingOp>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `message` under a fresh correlation id, which also becomes its temporary id.
    pub fn push(&mut self, mut message: Message) -> CorrelationId {
        let correlation = CorrelationId::new();
        let now = Utc::now();
        message.id = correlation.to_string();
        message.created_date.get_or_insert(now);
        self.ops.push_back(PendingOp {
            correlation: correlation.clone(),
            message,
            queued_at: now,
        });
        correlation
    }

    pub fn resolve(&mut self, correlation: &CorrelationId) -> Option<PendingOp> {
        let index = self.ops.iter().position(|op| &op.correlation == correlation)?;
        self.ops.remove(index)
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.ops.iter().map(|op| &op.message)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
