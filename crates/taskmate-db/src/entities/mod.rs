//! Database entities

pub mod friend;
pub mod invite_code;
pub mod task;
pub mod task_notice_history;
pub mod team_task;
pub mod user;

pub use friend::Entity as Friend;
pub use invite_code::Entity as InviteCode;
pub use task::Entity as Task;
pub use task_notice_history::Entity as TaskNoticeHistory;
pub use team_task::Entity as TeamTask;
pub use user::Entity as User;

pub mod prelude {
    pub use super::friend::Entity as Friend;
    pub use super::invite_code::Entity as InviteCode;
    pub use super::task::Entity as Task;
    pub use super::task_notice_history::Entity as TaskNoticeHistory;
    pub use super::team_task::Entity as TeamTask;
    pub use super::user::Entity as User;
}
