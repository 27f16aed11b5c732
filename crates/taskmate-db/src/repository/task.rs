//! Tasks

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, Set,
};

use crate::entities::task::{self, TaskKind, TaskStatus};

/// Fields required to create a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: i32,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub kind: TaskKind,
}

pub async fn create<C: ConnectionTrait>(conn: &C, new: NewTask) -> Result<task::Model, DbErr> {
    let now = Utc::now();
    task::ActiveModel {
        user_id: Set(new.user_id),
        title: Set(new.title),
        description: Set(new.description),
        deadline: Set(new.deadline),
        kind: Set(new.kind),
        status: Set(TaskStatus::Incomplete),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
}

pub async fn find<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<task::Model>, DbErr> {
    task::Entity::find_by_id(id).one(conn).await
}

pub async fn update_status<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    status: TaskStatus,
) -> Result<u64, DbErr> {
    let result = task::Entity::update_many()
        .col_expr(task::Column::Status, Expr::value(status))
        .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(task::Column::Id.eq(id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Hand the task to another user (team leadership transfer)
pub async fn update_owner<C: ConnectionTrait>(conn: &C, id: i32, user_id: i32) -> Result<u64, DbErr> {
    let result = task::Entity::update_many()
        .col_expr(task::Column::UserId, Expr::value(user_id))
        .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(task::Column::Id.eq(id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

pub async fn update_deadline<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    deadline: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = task::Entity::update_many()
        .col_expr(task::Column::Deadline, Expr::value(deadline))
        .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(task::Column::Id.eq(id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

pub async fn delete<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, DbErr> {
    let result = task::Entity::delete_by_id(id).exec(conn).await?;
    Ok(result.rows_affected)
}
