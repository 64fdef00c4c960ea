use async_trait::async_trait;

use super::Result;
use crate::database::structs::{Clan, User};

#[async_trait]
pub trait ClanQueries: Send + Sync {
    async fn clan_by_id(&self, id: i32) -> Result<Option<Clan>>;

    async fn clan_by_tag(&self, tag: &str) -> Result<Option<Clan>>;

    async fn clan_by_name(&self, name: &str) -> Result<Option<Clan>>;

    async fn all_clans(&self) -> Result<Vec<Clan>>;

    async fn create_clan(&self, name: &str, tag: &str, owner: i32) -> Result<Clan>;

    async fn delete_clan(&self, id: i32) -> Result<()>;

    /// Users currently in the clan.
    async fn clan_members(&self, clan_id: i32) -> Result<Vec<User>>;
}
