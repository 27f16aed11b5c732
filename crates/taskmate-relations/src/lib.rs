//! Friend and team relationship state machines
//!
//! [`FriendService`] and [`TeamService`] hold the transactional rules for
//! turning answered invitations into relationship edges. The handlers in
//! [`handlers`] adapt them to the broker consumer, and [`consumers`] wires
//! both into ready-to-run [`taskmate_broker::Consumer`]s.

pub mod consumers;
pub mod error;
pub mod friend;
pub mod handlers;
pub mod invite_code;
pub mod notice;
pub mod team;

pub use consumers::{friend_consumer, team_consumer};
pub use error::RelationError;
pub use friend::FriendService;
pub use handlers::{FriendActionHandler, TeamActionHandler};
pub use invite_code::InviteCodeGenerator;
pub use notice::NoticeHistory;
pub use team::{LeaveOutcome, NewTeamTask, TeamService};
