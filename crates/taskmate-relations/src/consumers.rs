//! Relationship consumers, ready for the supervisor

use std::sync::Arc;
use taskmate_broker::{Broker, BrokerConfig, BrokerError, Consumer};
use taskmate_proto::MessageKind;

use crate::friend::FriendService;
use crate::handlers::{FriendActionHandler, TeamActionHandler};
use crate::team::TeamService;

pub const FRIEND_CONSUMER: &str = "friend";
pub const TEAM_CONSUMER: &str = "team";

/// Consumer for the friend request queue
pub fn friend_consumer(
    broker: Arc<dyn Broker>,
    config: &BrokerConfig,
    friends: FriendService,
) -> Result<Consumer<FriendActionHandler>, BrokerError> {
    Ok(Consumer::new(
        FRIEND_CONSUMER,
        config.topology(MessageKind::Friend)?,
        FriendActionHandler::new(friends),
        broker,
        config.reconnect_policy(),
    ))
}

/// Consumer for the team request queue
pub fn team_consumer(
    broker: Arc<dyn Broker>,
    config: &BrokerConfig,
    teams: TeamService,
) -> Result<Consumer<TeamActionHandler>, BrokerError> {
    Ok(Consumer::new(
        TEAM_CONSUMER,
        config.topology(MessageKind::Team)?,
        TeamActionHandler::new(teams),
        broker,
        config.reconnect_policy(),
    ))
}
