//! Friendship state machine
//!
//! A request is a PENDING edge from requester to receiver. Accepting it makes
//! the friendship mutual: the request edge and a reciprocal edge are both
//! ACCEPTED, written in one transaction. Accepting is idempotent because the
//! broker may deliver the same envelope more than once.

use sea_orm::{DatabaseConnection, TransactionTrait};
use taskmate_db::entities::friend::{FriendStatus, Model as FriendEdge};
use taskmate_db::repository::friend;
use tracing::{debug, info, warn};

use crate::error::RelationError;

#[derive(Clone)]
pub struct FriendService {
    db: DatabaseConnection,
}

/// Most recent edge with `status`
fn latest(edges: &[FriendEdge], status: FriendStatus) -> Option<&FriendEdge> {
    edges.iter().filter(|edge| edge.status == status).max_by_key(|edge| edge.id)
}

/// Every edge except `keep`
fn others(edges: &[FriendEdge], keep: i32) -> impl Iterator<Item = i32> + '_ {
    edges.iter().map(|edge| edge.id).filter(move |id| *id != keep)
}

impl FriendService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Make `requester_id` and `receiver_id` friends.
    ///
    /// Redelivered envelopes find the friendship already in place and only
    /// clean up duplicate edges left behind by races.
    pub async fn accept_friend_request(
        &self,
        requester_id: i32,
        receiver_id: i32,
    ) -> Result<(), RelationError> {
        let txn = self.db.begin().await?;

        let forward = friend::get_is_friend(&txn, requester_id, receiver_id).await?;
        let backward = friend::get_is_friend(&txn, receiver_id, requester_id).await?;

        if let (Some(kept_forward), Some(kept_backward)) = (
            latest(&forward, FriendStatus::Accepted),
            latest(&backward, FriendStatus::Accepted),
        ) {
            let stale: Vec<i32> = others(&forward, kept_forward.id)
                .chain(others(&backward, kept_backward.id))
                .collect();

            if stale.is_empty() {
                debug!(requester_id, receiver_id, "Already friends, nothing to do");
                return Ok(());
            }

            let removed = friend::delete_many(&txn, stale).await?;
            txn.commit().await?;
            info!(
                requester_id,
                receiver_id, removed, "Already friends, removed duplicate edges"
            );
            return Ok(());
        }

        let Some(request) = latest(&forward, FriendStatus::Pending)
            .or_else(|| latest(&forward, FriendStatus::Accepted))
        else {
            warn!(
                requester_id,
                receiver_id, "No friend request to accept, it was withdrawn or rejected"
            );
            return Ok(());
        };

        friend::update(&txn, request.id, FriendStatus::Accepted).await?;
        friend::delete_many(&txn, others(&forward, request.id).collect()).await?;

        match backward.iter().max_by_key(|edge| edge.id) {
            Some(reciprocal) => {
                // The receiver had asked too; reuse their edge
                friend::update(&txn, reciprocal.id, FriendStatus::Accepted).await?;
                friend::delete_many(&txn, others(&backward, reciprocal.id).collect()).await?;
            }
            None => {
                friend::add_request(&txn, receiver_id, requester_id, FriendStatus::Accepted)
                    .await?;
            }
        }

        txn.commit().await?;

        info!(
            relation_id = request.id,
            requester_id, receiver_id, "Friend request accepted"
        );
        Ok(())
    }

    /// Drop the pending request edge.
    ///
    /// An edge that is already gone or was accepted in the meantime is left
    /// alone, so a late rejection never breaks a friendship.
    pub async fn reject_friend_request(&self, relation_id: i32) -> Result<(), RelationError> {
        let removed = friend::delete_pending(&self.db, relation_id).await?;

        if removed == 0 {
            debug!(relation_id, "Friend request no longer pending");
        } else {
            info!(relation_id, "Friend request rejected");
        }
        Ok(())
    }

    /// Record a pending request unless one (or a friendship) already exists
    pub async fn add_friend_request(
        &self,
        requester_id: i32,
        receiver_id: i32,
    ) -> Result<FriendEdge, RelationError> {
        if requester_id == receiver_id {
            return Err(RelationError::SelfRelation);
        }

        let txn = self.db.begin().await?;
        let existing = friend::get_is_friend(&txn, requester_id, receiver_id).await?;

        if let Some(edge) = latest(&existing, FriendStatus::Accepted)
            .or_else(|| latest(&existing, FriendStatus::Pending))
        {
            debug!(
                relation_id = edge.id,
                requester_id, receiver_id, "Friend request already exists"
            );
            return Ok(edge.clone());
        }

        let edge =
            friend::add_request(&txn, requester_id, receiver_id, FriendStatus::Pending).await?;
        txn.commit().await?;

        info!(relation_id = edge.id, requester_id, receiver_id, "Friend request sent");
        Ok(edge)
    }

    /// End a friendship, removing both directions
    pub async fn delete_friend(&self, user_id: i32, friend_id: i32) -> Result<(), RelationError> {
        let txn = self.db.begin().await?;
        let removed = friend::delete_pair(&txn, user_id, friend_id).await?;
        txn.commit().await?;

        info!(user_id, friend_id, removed, "Friendship removed");
        Ok(())
    }

    pub async fn relation(
        &self,
        user_id: i32,
        friend_id: i32,
    ) -> Result<Option<FriendEdge>, RelationError> {
        Ok(friend::get_relation(&self.db, user_id, friend_id).await?)
    }

    pub async fn friends_of(&self, user_id: i32) -> Result<Vec<i32>, RelationError> {
        Ok(friend::list_friends(&self.db, user_id).await?)
    }
}
