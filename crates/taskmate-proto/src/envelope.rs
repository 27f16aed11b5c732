//! Relationship request envelope
//!
//! Envelopes are created by the request-facing side once a user answers a
//! friend or team invitation, published to the broker and consumed by the
//! relationship handlers. They are immutable once published and never stored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope codec errors
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unknown message type: {0}")]
    UnknownMessageKind(i64),

    #[error("unknown action type: {0}")]
    UnknownAction(i64),

    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which relationship an envelope is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageKind {
    Friend,
    Team,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Friend => "friend",
            MessageKind::Team => "team",
        }
    }
}

impl From<MessageKind> for i64 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Friend => 1,
            MessageKind::Team => 2,
        }
    }
}

impl TryFrom<i64> for MessageKind {
    type Error = ProtoError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::Friend),
            2 => Ok(MessageKind::Team),
            other => Err(ProtoError::UnknownMessageKind(other)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recipient's answer to the invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Action {
    Reject,
    Accept,
}

impl From<Action> for i64 {
    fn from(action: Action) -> Self {
        match action {
            Action::Reject => 0,
            Action::Accept => 1,
        }
    }
}

impl TryFrom<i64> for Action {
    type Error = ProtoError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Action::Reject),
            1 => Ok(Action::Accept),
            other => Err(ProtoError::UnknownAction(other)),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Reject => f.write_str("reject"),
            Action::Accept => f.write_str("accept"),
        }
    }
}

/// A relationship state-transition request.
///
/// For friend envelopes `relation_id` is the id of the pending friendship
/// edge. For team envelopes it is the id of the team task being joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "message_type")]
    pub message_kind: MessageKind,
    #[serde(rename = "action_type")]
    pub action: Action,
    pub relation_id: i32,
    pub requester_id: i32,
    pub receiver_id: i32,
}

impl Envelope {
    pub fn friend(action: Action, relation_id: i32, requester_id: i32, receiver_id: i32) -> Self {
        Self {
            message_kind: MessageKind::Friend,
            action,
            relation_id,
            requester_id,
            receiver_id,
        }
    }

    pub fn team(action: Action, task_id: i32, requester_id: i32, receiver_id: i32) -> Self {
        Self {
            message_kind: MessageKind::Team,
            action,
            relation_id: task_id,
            requester_id,
            receiver_id,
        }
    }

    /// Encode to the JSON wire form
    pub fn to_json(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the JSON wire form
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
