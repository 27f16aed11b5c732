//! Invite code generation
//!
//! Codes are six characters from `A-Z0-9`. Generation keeps drawing until it
//! finds an unused code and stores it; database failures pause for the retry
//! interval and start over. There is no attempt limit. A task deleted before
//! its code is stored gets no code.

use rand::Rng;
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use std::sync::Arc;
use std::time::Duration;
use taskmate_db::repository::{invite_code, task};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const CODE_LENGTH: usize = 6;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a random code
pub fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

type CodeSource = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct InviteCodeGenerator {
    db: DatabaseConnection,
    retry_interval: Duration,
    codes: CodeSource,
}

impl InviteCodeGenerator {
    pub fn new(db: DatabaseConnection, retry_interval: Duration) -> Self {
        Self {
            db,
            retry_interval,
            codes: Arc::new(random_code),
        }
    }

    /// Replace the random source
    pub fn with_code_source(mut self, codes: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    /// Store a fresh code for `task_id` and return it.
    ///
    /// Returns `None` when the task no longer exists.
    pub async fn generate(&self, task_id: i32) -> Option<String> {
        loop {
            let code = (self.codes)();

            match invite_code::get_by_code(&self.db, &code).await {
                Ok(Some(_)) => {
                    debug!(task_id, code = %code, "Invite code taken, drawing another");
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(task_id, error = %e, "Failed to look up invite code, retrying");
                    tokio::time::sleep(self.retry_interval).await;
                    continue;
                }
            }

            match self.store(task_id, &code).await {
                Ok(true) => {
                    info!(task_id, code = %code, "Invite code generated");
                    return Some(code);
                }
                Ok(false) => {
                    debug!(task_id, "Task deleted before its invite code was stored");
                    return None;
                }
                Err(e) => {
                    warn!(task_id, error = %e, "Failed to store invite code, retrying");
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    /// Insert `code` only while the task still exists
    async fn store(&self, task_id: i32, code: &str) -> Result<bool, DbErr> {
        let txn = self.db.begin().await?;

        if task::find(&txn, task_id).await?.is_none() {
            return Ok(false);
        }

        invite_code::insert(&txn, task_id, code).await?;
        txn.commit().await?;
        Ok(true)
    }

    /// Run [`generate`](Self::generate) on a background task
    pub fn spawn(&self, task_id: i32) -> JoinHandle<()> {
        let generator = self.clone();
        tokio::spawn(async move {
            generator.generate(task_id).await;
        })
    }
}
