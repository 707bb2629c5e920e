//! Inbound and outbound chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::SenderId;

/// A single message received from the chat network for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: SenderId,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a message stamped with the current time.
    pub fn new(sender_id: SenderId, payload: impl Into<String>) -> Self {
        Self {
            sender_id,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Join the payloads of an aggregated batch into one text, one line each.
///
/// Handy for dispatchers whose downstream handler expects a single utterance.
pub fn join_payloads(batch: &[InboundMessage]) -> String {
    batch
        .iter()
        .map(|m| m.payload.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A message to deliver to a recipient through a tenant's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: SenderId,
    pub payload: String,
}
