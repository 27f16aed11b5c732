//! Team membership edge entity
//!
//! One row per (team task, member); the leader has an edge like everyone else.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a member has finished their part of the team task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum MembershipStatus {
    #[sea_orm(num_value = 0)]
    Incomplete,

    #[sea_orm(num_value = 1)]
    Complete,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "team_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub task_id: i32,

    pub user_id: i32,

    pub status: MembershipStatus,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::task::Entity",
        from = "Column::TaskId",
        to = "super::task::Column::Id"
    )]
    Task,
}

impl Related<super::task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
