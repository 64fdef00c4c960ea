use async_trait::async_trait;

use super::Result;
use crate::database::structs::{PoolMap, TourneyPool};

#[async_trait]
pub trait PoolQueries: Send + Sync {
    async fn all_pools(&self) -> Result<Vec<TourneyPool>>;

    async fn pool_by_name(&self, name: &str) -> Result<Option<TourneyPool>>;

    async fn create_pool(&self, name: &str, created_by: i32) -> Result<TourneyPool>;

    /// Delete a pool and all of its map assignments.
    async fn delete_pool(&self, id: i32) -> Result<()>;

    async fn pool_maps(&self, pool_id: i32) -> Result<Vec<PoolMap>>;

    /// The map assigned to a `(mods, slot)` pick, if any.
    async fn pool_pick(&self, pool_id: i32, mods: i32, slot: i32) -> Result<Option<PoolMap>>;

    async fn add_pool_map(&self, entry: PoolMap) -> Result<()>;

    async fn remove_pool_map(&self, pool_id: i32, map_id: i32) -> Result<()>;
}
