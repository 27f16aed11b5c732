//! Deadline notification history

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::entities::task_notice_history;

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> Result<task_notice_history::Model, DbErr> {
    task_notice_history::ActiveModel {
        task_id: Set(task_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

pub async fn get_by_task_id<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> Result<Option<task_notice_history::Model>, DbErr> {
    task_notice_history::Entity::find()
        .filter(task_notice_history::Column::TaskId.eq(task_id))
        .one(conn)
        .await
}

pub async fn get_by_task_ids<C: ConnectionTrait>(
    conn: &C,
    task_ids: &[i32],
) -> Result<Vec<task_notice_history::Model>, DbErr> {
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }

    task_notice_history::Entity::find()
        .filter(task_notice_history::Column::TaskId.is_in(task_ids.iter().copied()))
        .all(conn)
        .await
}

pub async fn delete_by_task_id<C: ConnectionTrait>(conn: &C, task_id: i32) -> Result<u64, DbErr> {
    let result = task_notice_history::Entity::delete_many()
        .filter(task_notice_history::Column::TaskId.eq(task_id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}
