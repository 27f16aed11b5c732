//! Deadline notification bookkeeping
//!
//! The reminder sweep notifies tasks without a history row and records one
//! afterwards. Moving a deadline far enough out clears the row so the task is
//! reminded again.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::collections::HashSet;
use taskmate_db::repository::{notice_history, task};
use tracing::{debug, info};

use crate::error::RelationError;

/// How far ahead a deadline must be to be reminded again
pub fn reminder_window() -> Duration {
    Duration::hours(24)
}

#[derive(Clone)]
pub struct NoticeHistory {
    db: DatabaseConnection,
}

impl NoticeHistory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Clear the history of `task_id` if its new deadline is at least the
    /// reminder window after `now`. Returns whether a row was removed.
    ///
    /// Takes the connection explicitly so it can run inside the caller's
    /// transaction.
    pub async fn reschedule<C: ConnectionTrait>(
        conn: &C,
        task_id: i32,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RelationError> {
        if deadline - now < reminder_window() {
            return Ok(false);
        }

        let removed = notice_history::delete_by_task_id(conn, task_id).await?;
        if removed > 0 {
            debug!(task_id, "Deadline moved out, reminder will be sent again");
        }
        Ok(removed > 0)
    }

    /// Move the deadline of `task_id` and reschedule its reminder in one
    /// transaction. Returns whether the reminder will be sent again.
    pub async fn move_deadline(
        &self,
        task_id: i32,
        deadline: DateTime<Utc>,
    ) -> Result<bool, RelationError> {
        let txn = self.db.begin().await?;

        if task::find(&txn, task_id).await?.is_none() {
            return Err(RelationError::TaskNotFound(task_id));
        }

        task::update_deadline(&txn, task_id, deadline).await?;
        let rescheduled = Self::reschedule(&txn, task_id, deadline, Utc::now()).await?;

        txn.commit().await?;

        info!(task_id, %deadline, rescheduled, "Task deadline moved");
        Ok(rescheduled)
    }

    /// The subset of `task_ids` that has not been notified yet, in input order
    pub async fn unnotified(&self, task_ids: &[i32]) -> Result<Vec<i32>, RelationError> {
        let notified: HashSet<i32> = notice_history::get_by_task_ids(&self.db, task_ids)
            .await?
            .into_iter()
            .map(|row| row.task_id)
            .collect();

        Ok(task_ids
            .iter()
            .copied()
            .filter(|id| !notified.contains(id))
            .collect())
    }

    pub async fn mark_notified(&self, task_id: i32) -> Result<(), RelationError> {
        if notice_history::get_by_task_id(&self.db, task_id)
            .await?
            .is_none()
        {
            notice_history::insert(&self.db, task_id).await?;
        }
        Ok(())
    }
}
