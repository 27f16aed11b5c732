//! Relationship errors

use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Task {0} not found")]
    TaskNotFound(i32),

    #[error("Invite code {0} not found")]
    InviteCodeNotFound(String),

    #[error("User {user_id} is already a member of task {task_id}")]
    AlreadyMember { task_id: i32, user_id: i32 },

    #[error("User {user_id} is not a member of task {task_id}")]
    MembershipNotFound { task_id: i32, user_id: i32 },

    #[error("Users cannot befriend themselves")]
    SelfRelation,
}
