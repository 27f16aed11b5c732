//! Friendship edge entity
//!
//! A friendship is directional: an accepted friendship between A and B is two
//! rows, (A, B) and (B, A), both `Accepted`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status of a friendship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum FriendStatus {
    /// Request sent, not yet answered
    #[sea_orm(num_value = 0)]
    Pending,

    #[sea_orm(num_value = 1)]
    Accepted,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "friends")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Who sent the request (or owns this direction of the friendship)
    pub user_id: i32,

    pub friend_id: i32,

    pub status: FriendStatus,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
