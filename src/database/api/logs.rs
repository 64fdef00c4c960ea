use async_trait::async_trait;

use super::Result;
use crate::database::structs::LogAction;

#[async_trait]
pub trait LogQueries: Send + Sync {
    /// Record an administrative action.
    async fn create_log(&self, from: i32, to: i32, action: LogAction, msg: &str) -> Result<()>;

    /// All note entries about a user within the last `days` days,
    /// formatted one per line.
    async fn recent_notes(&self, about: i32, days: i64) -> Result<Vec<String>>;
}
