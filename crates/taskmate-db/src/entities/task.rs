//! Task entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Personal tasks have a single owner, team tasks have membership edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum TaskKind {
    #[sea_orm(num_value = 0)]
    Personal,

    #[sea_orm(num_value = 1)]
    Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum TaskStatus {
    #[sea_orm(num_value = 0)]
    Incomplete,

    #[sea_orm(num_value = 1)]
    Complete,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Owner; for team tasks this is the team leader
    pub user_id: i32,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub deadline: ChronoDateTimeUtc,

    pub kind: TaskKind,

    pub status: TaskStatus,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::team_task::Entity")]
    TeamTasks,
}

impl Related<super::team_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TeamTasks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
