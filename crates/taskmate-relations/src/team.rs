//! Team task membership
//!
//! Every member of a team task, the leader included, has one membership edge.
//! The task is complete once every edge is complete, so anyone joining resets
//! the task to incomplete.

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use taskmate_db::entities::task::{Model as Task, TaskKind, TaskStatus};
use taskmate_db::entities::team_task::MembershipStatus;
use taskmate_db::repository::{invite_code, notice_history, task, team};
use tracing::{debug, info, warn};

use crate::error::RelationError;
use crate::invite_code::InviteCodeGenerator;

/// A team task as entered by its leader
#[derive(Debug, Clone)]
pub struct NewTeamTask {
    pub leader_id: i32,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
}

/// What happened to the task when a member left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    LeadershipTransferred { new_leader_id: i32 },
    TaskDeleted,
}

#[derive(Clone)]
pub struct TeamService {
    db: DatabaseConnection,
    invite_codes: InviteCodeGenerator,
}

impl TeamService {
    pub fn new(db: DatabaseConnection, invite_codes: InviteCodeGenerator) -> Self {
        Self { db, invite_codes }
    }

    /// Add `user_id` to the team task and mark the task incomplete.
    ///
    /// Joining twice writes nothing. A task that no longer exists is logged
    /// and skipped.
    pub async fn join_team(&self, task_id: i32, user_id: i32) -> Result<(), RelationError> {
        let txn = self.db.begin().await?;

        if task::find(&txn, task_id).await?.is_none() {
            warn!(task_id, user_id, "Team task no longer exists, ignoring join");
            return Ok(());
        }

        if team::get_membership(&txn, task_id, user_id).await?.is_some() {
            debug!(task_id, user_id, "Already a team member");
            return Ok(());
        }

        team::insert_membership(&txn, task_id, user_id, MembershipStatus::Incomplete).await?;
        task::update_status(&txn, task_id, TaskStatus::Incomplete).await?;
        txn.commit().await?;

        info!(task_id, user_id, "Joined team task");
        Ok(())
    }

    /// Create a team task led by `new.leader_id` and start generating its
    /// invite code in the background
    pub async fn create_team_task(&self, new: NewTeamTask) -> Result<Task, RelationError> {
        let leader_id = new.leader_id;
        let txn = self.db.begin().await?;

        let created = task::create(
            &txn,
            task::NewTask {
                user_id: leader_id,
                title: new.title,
                description: new.description,
                deadline: new.deadline,
                kind: TaskKind::Team,
            },
        )
        .await?;
        team::insert_membership(&txn, created.id, leader_id, MembershipStatus::Incomplete)
            .await?;
        txn.commit().await?;

        info!(task_id = created.id, leader_id, "Team task created");
        self.invite_codes.spawn(created.id);

        Ok(created)
    }

    /// Remove `user_id` from the team.
    ///
    /// The last member leaving deletes the task together with its invite code
    /// and notification history. A leaving leader hands the task to the
    /// member who joined earliest.
    pub async fn leave_team(&self, task_id: i32, user_id: i32) -> Result<LeaveOutcome, RelationError> {
        let txn = self.db.begin().await?;

        let current = task::find(&txn, task_id)
            .await?
            .ok_or(RelationError::TaskNotFound(task_id))?;

        if team::delete_membership(&txn, task_id, user_id).await? == 0 {
            return Err(RelationError::MembershipNotFound { task_id, user_id });
        }

        let remaining = team::get_memberships_by_task_ids(&txn, &[task_id]).await?;

        let outcome = match remaining.first() {
            None => {
                task::delete(&txn, task_id).await?;
                invite_code::delete_by_task_id(&txn, task_id).await?;
                notice_history::delete_by_task_id(&txn, task_id).await?;
                LeaveOutcome::TaskDeleted
            }
            Some(successor) if current.user_id == user_id => {
                task::update_owner(&txn, task_id, successor.user_id).await?;
                LeaveOutcome::LeadershipTransferred {
                    new_leader_id: successor.user_id,
                }
            }
            Some(_) => LeaveOutcome::Left,
        };

        txn.commit().await?;

        info!(task_id, user_id, outcome = ?outcome, "Left team task");
        Ok(outcome)
    }

    /// Mark the user's part done; returns whether the whole task is now done
    pub async fn complete_team_task(&self, task_id: i32, user_id: i32) -> Result<bool, RelationError> {
        let txn = self.db.begin().await?;

        let touched =
            team::update_membership_status(&txn, task_id, user_id, MembershipStatus::Complete)
                .await?;
        if touched == 0 {
            return Err(RelationError::MembershipNotFound { task_id, user_id });
        }

        let members = team::get_memberships_by_task_ids(&txn, &[task_id]).await?;
        let all_done = members
            .iter()
            .all(|member| member.status == MembershipStatus::Complete);

        if all_done {
            task::update_status(&txn, task_id, TaskStatus::Complete).await?;
        }
        txn.commit().await?;

        info!(task_id, user_id, task_complete = all_done, "Team task part completed");
        Ok(all_done)
    }

    /// Join the team task an invite code points at; returns the task id
    pub async fn join_by_invite_code(&self, code: &str, user_id: i32) -> Result<i32, RelationError> {
        let invite = invite_code::get_by_code(&self.db, code)
            .await?
            .ok_or_else(|| RelationError::InviteCodeNotFound(code.to_string()))?;
        let task_id = invite.task_id;

        if task::find(&self.db, task_id).await?.is_none() {
            return Err(RelationError::TaskNotFound(task_id));
        }

        if team::get_membership(&self.db, task_id, user_id).await?.is_some() {
            return Err(RelationError::AlreadyMember { task_id, user_id });
        }

        self.join_team(task_id, user_id).await?;
        Ok(task_id)
    }

    pub async fn invite_code(&self, task_id: i32) -> Result<Option<String>, RelationError> {
        Ok(invite_code::get_by_task_id(&self.db, task_id)
            .await?
            .map(|invite| invite.code))
    }

    pub async fn members(&self, task_id: i32) -> Result<Vec<i32>, RelationError> {
        Ok(team::get_memberships_by_task_ids(&self.db, &[task_id])
            .await?
            .into_iter()
            .map(|member| member.user_id)
            .collect())
    }
}
