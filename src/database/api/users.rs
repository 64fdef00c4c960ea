use async_trait::async_trait;

use super::Result;
use crate::database::structs::{ModeStatsRow, User};

#[async_trait]
pub trait UserQueries: Send + Sync {
    /// Look up a user by safe name (lowercase, underscored).
    async fn user_by_safe_name(&self, safe_name: &str) -> Result<Option<User>>;

    async fn user_by_id(&self, id: i32) -> Result<Option<User>>;

    /// Whether any account already uses this display name.
    async fn username_taken(&self, name: &str) -> Result<bool>;

    async fn update_username(&self, id: i32, name: &str, safe_name: &str) -> Result<()>;

    async fn update_privileges(&self, id: i32, privileges: i32) -> Result<()>;

    async fn update_silence_end(&self, id: i32, silence_end: i64) -> Result<()>;

    async fn update_country(&self, id: i32, country: &str) -> Result<()>;

    async fn update_donor_end(&self, id: i32, donor_end: i64) -> Result<()>;

    async fn update_clan(&self, id: i32, clan_id: i32, clan_priv: i32) -> Result<()>;

    /// Stamp the user's latest-activity time to now.
    async fn touch_latest_activity(&self, id: i32) -> Result<()>;

    async fn update_api_key(&self, id: i32, api_key: &str) -> Result<()>;

    /// Users whose donor perks have lapsed but who still carry donor bits.
    async fn expired_donors(&self, now: i64) -> Result<Vec<User>>;

    /// All per-mode stats rows for a user.
    async fn stats_for_user(&self, id: i32) -> Result<Vec<ModeStatsRow>>;
}
