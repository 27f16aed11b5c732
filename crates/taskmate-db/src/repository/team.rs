//! Team membership edges

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use crate::entities::team_task::{self, MembershipStatus};

pub async fn insert_membership<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    user_id: i32,
    status: MembershipStatus,
) -> Result<team_task::Model, DbErr> {
    let now = Utc::now();
    team_task::ActiveModel {
        task_id: Set(task_id),
        user_id: Set(user_id),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
}

pub async fn get_membership<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    user_id: i32,
) -> Result<Option<team_task::Model>, DbErr> {
    team_task::Entity::find()
        .filter(team_task::Column::TaskId.eq(task_id))
        .filter(team_task::Column::UserId.eq(user_id))
        .order_by_asc(team_task::Column::Id)
        .one(conn)
        .await
}

/// Memberships of all given tasks, ordered by edge id (join order)
pub async fn get_memberships_by_task_ids<C: ConnectionTrait>(
    conn: &C,
    task_ids: &[i32],
) -> Result<Vec<team_task::Model>, DbErr> {
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }

    team_task::Entity::find()
        .filter(team_task::Column::TaskId.is_in(task_ids.iter().copied()))
        .order_by_asc(team_task::Column::Id)
        .all(conn)
        .await
}

/// Team tasks `user_id` belongs to
pub async fn get_memberships_by_user_id<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Vec<team_task::Model>, DbErr> {
    team_task::Entity::find()
        .filter(team_task::Column::UserId.eq(user_id))
        .order_by_asc(team_task::Column::Id)
        .all(conn)
        .await
}

pub async fn update_membership_status<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    user_id: i32,
    status: MembershipStatus,
) -> Result<u64, DbErr> {
    let result = team_task::Entity::update_many()
        .col_expr(team_task::Column::Status, Expr::value(status))
        .col_expr(team_task::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(team_task::Column::TaskId.eq(task_id))
        .filter(team_task::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

pub async fn delete_membership<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    user_id: i32,
) -> Result<u64, DbErr> {
    let result = team_task::Entity::delete_many()
        .filter(team_task::Column::TaskId.eq(task_id))
        .filter(team_task::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}
