//! Relationship Message Protocol
//!
//! Defines the JSON envelope exchanged between the request-facing services and
//! the relationship consumers, plus the routing constants both sides agree on.

pub mod envelope;

pub use envelope::{Action, Envelope, MessageKind, ProtoError};

/// Default exchange relationship requests are published to
pub const DEFAULT_EXCHANGE: &str = "social";

/// Routing key for friend request envelopes
pub const FRIEND_ROUTING_KEY: &str = "friend_request";

/// Routing key for team request envelopes
pub const TEAM_ROUTING_KEY: &str = "team_request";

/// Content type attached to every published envelope
pub const CONTENT_TYPE: &str = "application/json";
