//! Team invite codes

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::entities::invite_code;

/// Fails with a unique violation if the code is taken
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    code: &str,
) -> Result<invite_code::Model, DbErr> {
    invite_code::ActiveModel {
        task_id: Set(task_id),
        code: Set(code.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

pub async fn get_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<invite_code::Model>, DbErr> {
    invite_code::Entity::find()
        .filter(invite_code::Column::Code.eq(code))
        .one(conn)
        .await
}

pub async fn get_by_task_id<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> Result<Option<invite_code::Model>, DbErr> {
    invite_code::Entity::find()
        .filter(invite_code::Column::TaskId.eq(task_id))
        .one(conn)
        .await
}

pub async fn delete_by_task_id<C: ConnectionTrait>(conn: &C, task_id: i32) -> Result<u64, DbErr> {
    let result = invite_code::Entity::delete_many()
        .filter(invite_code::Column::TaskId.eq(task_id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}
