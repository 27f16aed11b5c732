//! Consolidated initial schema migration

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. Create users table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(pk_auto(User::Id))
                    .col(string_len(User::Email, 255).not_null().unique_key())
                    .col(string_len(User::Name, 255).not_null())
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. Create tasks table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(pk_auto(Task::Id))
                    .col(integer(Task::UserId).not_null())
                    .col(string_len(Task::Title, 255).not_null())
                    .col(text(Task::Description).not_null().default(""))
                    .col(timestamp_with_time_zone(Task::Deadline).not_null())
                    .col(integer(Task::Kind).not_null().default(0))
                    .col(integer(Task::Status).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Task::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Task::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tasks_user_id")
                    .table(Task::Table)
                    .col(Task::UserId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. Create friends table (one row per direction)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Friend::Table)
                    .if_not_exists()
                    .col(pk_auto(Friend::Id))
                    .col(integer(Friend::UserId).not_null())
                    .col(integer(Friend::FriendId).not_null())
                    .col(integer(Friend::Status).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Friend::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Friend::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_friends_user_friend")
                    .table(Friend::Table)
                    .col(Friend::UserId)
                    .col(Friend::FriendId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 4. Create team_tasks table (team membership edges)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(TeamTask::Table)
                    .if_not_exists()
                    .col(pk_auto(TeamTask::Id))
                    .col(integer(TeamTask::TaskId).not_null())
                    .col(integer(TeamTask::UserId).not_null())
                    .col(integer(TeamTask::Status).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(TeamTask::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(TeamTask::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_team_tasks_task_user")
                    .table(TeamTask::Table)
                    .col(TeamTask::TaskId)
                    .col(TeamTask::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_team_tasks_user_id")
                    .table(TeamTask::Table)
                    .col(TeamTask::UserId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 5. Create invite_codes table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(InviteCode::Table)
                    .if_not_exists()
                    .col(pk_auto(InviteCode::Id))
                    .col(integer(InviteCode::TaskId).not_null())
                    .col(string_len(InviteCode::Code, 16).not_null())
                    .col(
                        timestamp_with_time_zone(InviteCode::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invite_codes_code")
                    .table(InviteCode::Table)
                    .col(InviteCode::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invite_codes_task_id")
                    .table(InviteCode::Table)
                    .col(InviteCode::TaskId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 6. Create task_notice_history table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(TaskNoticeHistory::Table)
                    .if_not_exists()
                    .col(pk_auto(TaskNoticeHistory::Id))
                    .col(integer(TaskNoticeHistory::TaskId).not_null())
                    .col(
                        timestamp_with_time_zone(TaskNoticeHistory::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_task_notice_history_task_id")
                    .table(TaskNoticeHistory::Table)
                    .col(TaskNoticeHistory::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskNoticeHistory::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(InviteCode::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(TeamTask::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Friend::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        Ok(())
    }
}

// ============================================================
// Table identifiers
// ============================================================

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Email,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Task {
    #[sea_orm(iden = "tasks")]
    Table,
    Id,
    UserId,
    Title,
    Description,
    Deadline,
    Kind,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Friend {
    #[sea_orm(iden = "friends")]
    Table,
    Id,
    UserId,
    FriendId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TeamTask {
    #[sea_orm(iden = "team_tasks")]
    Table,
    Id,
    TaskId,
    UserId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InviteCode {
    #[sea_orm(iden = "invite_codes")]
    Table,
    Id,
    TaskId,
    Code,
    CreatedAt,
}

#[derive(DeriveIden)]
enum TaskNoticeHistory {
    #[sea_orm(iden = "task_notice_history")]
    Table,
    Id,
    TaskId,
    CreatedAt,
}
