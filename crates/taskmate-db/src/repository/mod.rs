//! Relationship store operations
//!
//! Every function takes any [`sea_orm::ConnectionTrait`], so the same call
//! works on the pooled connection and inside a [`sea_orm::DatabaseTransaction`].
//! Single-row lookups return `Option`; a missing row is not an error.

pub mod friend;
pub mod invite_code;
pub mod notice_history;
pub mod task;
pub mod team;
