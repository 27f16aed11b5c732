//! Friendship edges

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use crate::entities::friend::{self, FriendStatus};

/// First edge from `user_id` to `friend_id`, any status
pub async fn get_relation<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    friend_id: i32,
) -> Result<Option<friend::Model>, DbErr> {
    friend::Entity::find()
        .filter(friend::Column::UserId.eq(user_id))
        .filter(friend::Column::FriendId.eq(friend_id))
        .order_by_asc(friend::Column::Id)
        .one(conn)
        .await
}

/// Edge by primary key
pub async fn find<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<friend::Model>, DbErr> {
    friend::Entity::find_by_id(id).one(conn).await
}

/// Every edge from `user_id` to `friend_id`, oldest first.
///
/// More than one row means a race produced duplicates.
pub async fn get_is_friend<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    friend_id: i32,
) -> Result<Vec<friend::Model>, DbErr> {
    friend::Entity::find()
        .filter(friend::Column::UserId.eq(user_id))
        .filter(friend::Column::FriendId.eq(friend_id))
        .order_by_asc(friend::Column::Id)
        .all(conn)
        .await
}

pub async fn add_request<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    friend_id: i32,
    status: FriendStatus,
) -> Result<friend::Model, DbErr> {
    let now = Utc::now();
    friend::ActiveModel {
        user_id: Set(user_id),
        friend_id: Set(friend_id),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
}

/// Set the status of one edge, returns the number of rows touched
pub async fn update<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    status: FriendStatus,
) -> Result<u64, DbErr> {
    let result = friend::Entity::update_many()
        .col_expr(friend::Column::Status, Expr::value(status))
        .col_expr(friend::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(friend::Column::Id.eq(id))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Delete one edge; deleting a missing edge affects zero rows
pub async fn delete<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, DbErr> {
    let result = friend::Entity::delete_by_id(id).exec(conn).await?;
    Ok(result.rows_affected)
}

/// Delete one edge only while it is still pending.
///
/// Zero rows affected means the edge is gone or was accepted meanwhile.
pub async fn delete_pending<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, DbErr> {
    let result = friend::Entity::delete_many()
        .filter(friend::Column::Id.eq(id))
        .filter(friend::Column::Status.eq(FriendStatus::Pending))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

pub async fn delete_many<C: ConnectionTrait>(conn: &C, ids: Vec<i32>) -> Result<u64, DbErr> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = friend::Entity::delete_many()
        .filter(friend::Column::Id.is_in(ids))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Remove pending edges from `user_id` to `friend_id`
pub async fn delete_is_friend<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    friend_id: i32,
) -> Result<u64, DbErr> {
    let result = friend::Entity::delete_many()
        .filter(friend::Column::UserId.eq(user_id))
        .filter(friend::Column::FriendId.eq(friend_id))
        .filter(friend::Column::Status.eq(FriendStatus::Pending))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Remove every edge between the two users, both directions
pub async fn delete_pair<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    friend_id: i32,
) -> Result<u64, DbErr> {
    let forward = friend::Column::UserId
        .eq(user_id)
        .and(friend::Column::FriendId.eq(friend_id));
    let backward = friend::Column::UserId
        .eq(friend_id)
        .and(friend::Column::FriendId.eq(user_id));

    let result = friend::Entity::delete_many()
        .filter(forward.or(backward))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}

/// Ids of everyone `user_id` has an accepted edge to
pub async fn list_friends<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<Vec<i32>, DbErr> {
    let edges = friend::Entity::find()
        .filter(friend::Column::UserId.eq(user_id))
        .filter(friend::Column::Status.eq(FriendStatus::Accepted))
        .order_by_asc(friend::Column::FriendId)
        .all(conn)
        .await?;

    let mut ids: Vec<i32> = edges.into_iter().map(|edge| edge.friend_id).collect();
    ids.dedup();
    Ok(ids)
}
