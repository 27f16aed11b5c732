//! Broker message handlers for relationship envelopes
//!
//! Envelopes the handler cannot act on (wrong kind, unsupported action) are
//! logged and acknowledged. Requeueing them would only deliver them again.

use async_trait::async_trait;
use taskmate_broker::{HandlerError, MessageHandler};
use taskmate_proto::{Action, Envelope, MessageKind};
use tracing::{info, warn};

use crate::friend::FriendService;
use crate::team::TeamService;

pub struct FriendActionHandler {
    friends: FriendService,
}

impl FriendActionHandler {
    pub fn new(friends: FriendService) -> Self {
        Self { friends }
    }
}

#[async_trait]
impl MessageHandler for FriendActionHandler {
    type Message = Envelope;

    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        if envelope.message_kind != MessageKind::Friend {
            warn!(
                kind = %envelope.message_kind,
                relation_id = envelope.relation_id,
                "Dropping non-friend envelope"
            );
            return Ok(());
        }

        match envelope.action {
            Action::Accept => {
                self.friends
                    .accept_friend_request(envelope.requester_id, envelope.receiver_id)
                    .await?
            }
            Action::Reject => {
                self.friends
                    .reject_friend_request(envelope.relation_id)
                    .await?
            }
        }

        Ok(())
    }
}

pub struct TeamActionHandler {
    teams: TeamService,
}

impl TeamActionHandler {
    pub fn new(teams: TeamService) -> Self {
        Self { teams }
    }
}

#[async_trait]
impl MessageHandler for TeamActionHandler {
    type Message = Envelope;

    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        if envelope.message_kind != MessageKind::Team {
            warn!(
                kind = %envelope.message_kind,
                relation_id = envelope.relation_id,
                "Dropping non-team envelope"
            );
            return Ok(());
        }

        match envelope.action {
            Action::Accept => {
                self.teams
                    .join_team(envelope.relation_id, envelope.receiver_id)
                    .await?
            }
            Action::Reject => {
                info!(
                    task_id = envelope.relation_id,
                    user_id = envelope.receiver_id,
                    "Team invitation declined"
                );
            }
        }

        Ok(())
    }
}
