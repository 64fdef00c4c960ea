use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, Runtime};

use crate::gamemode::GameMode;

/// The pp leaderboards: one global sorted set per mode, plus one per
/// country, member = user id, score = pp.
#[async_trait]
pub trait Leaderboard: Send + Sync {
    /// 1-based global rank, or 0 when unranked.
    async fn global_rank(&self, user_id: i32, mode: GameMode) -> Result<i32>;

    /// 1-based rank within a country, or 0 when unranked.
    async fn country_rank(&self, user_id: i32, mode: GameMode, country: &str) -> Result<i32>;

    /// Write the user's pp into both sorted sets.
    async fn update_rank(&self, user_id: i32, mode: GameMode, country: &str, pp: u32)
        -> Result<()>;
}

fn global_key(mode: GameMode) -> String {
    format!("leaderboard:{}", mode as u8)
}

fn country_key(mode: GameMode, country: &str) -> String {
    format!("leaderboard:{}:{}", mode as u8, country)
}

/// The production leaderboard over redis sorted sets.
pub struct RedisLeaderboard {
    pool: Pool,
}

impl RedisLeaderboard {
    pub fn connect(url: &str) -> Result<RedisLeaderboard> {
        let pool = Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(RedisLeaderboard { pool })
    }

    async fn zrevrank(&self, key: &str, user_id: i32) -> Result<i32> {
        let mut conn = self.pool.get().await?;
        let rank: Option<i64> = cmd("ZREVRANK")
            .arg(key)
            .arg(user_id)
            .query_async(&mut conn)
            .await?;
        Ok(rank.map(|r| r as i32 + 1).unwrap_or(0))
    }
}

#[async_trait]
impl Leaderboard for RedisLeaderboard {
    async fn global_rank(&self, user_id: i32, mode: GameMode) -> Result<i32> {
        self.zrevrank(&global_key(mode), user_id).await
    }

    async fn country_rank(&self, user_id: i32, mode: GameMode, country: &str) -> Result<i32> {
        self.zrevrank(&country_key(mode, country), user_id).await
    }

    async fn update_rank(
        &self,
        user_id: i32,
        mode: GameMode,
        country: &str,
        pp: u32,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        cmd("ZADD")
            .arg(global_key(mode))
            .arg(pp)
            .arg(user_id)
            .query_async::<_, ()>(&mut conn)
            .await?;
        cmd("ZADD")
            .arg(country_key(mode, country))
            .arg(pp)
            .arg(user_id)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// In-memory leaderboard for tests.
#[derive(Default)]
pub struct MockLeaderboard {
    scores: Mutex<HashMap<String, HashMap<i32, u32>>>,
}

impl MockLeaderboard {
    pub fn new() -> Self {
        MockLeaderboard::default()
    }

    fn rank_in(&self, key: &str, user_id: i32) -> i32 {
        let scores = self.scores.lock().unwrap();
        let Some(set) = scores.get(key) else {
            return 0;
        };
        let Some(own) = set.get(&user_id) else {
            return 0;
        };
        set.values().filter(|pp| *pp > own).count() as i32 + 1
    }
}

#[async_trait]
impl Leaderboard for MockLeaderboard {
    async fn global_rank(&self, user_id: i32, mode: GameMode) -> Result<i32> {
        Ok(self.rank_in(&global_key(mode), user_id))
    }

    async fn country_rank(&self, user_id: i32, mode: GameMode, country: &str) -> Result<i32> {
        Ok(self.rank_in(&country_key(mode, country), user_id))
    }

    async fn update_rank(
        &self,
        user_id: i32,
        mode: GameMode,
        country: &str,
        pp: u32,
    ) -> Result<()> {
        let mut scores = self.scores.lock().unwrap();
        scores
            .entry(global_key(mode))
            .or_default()
            .insert(user_id, pp);
        scores
            .entry(country_key(mode, country))
            .or_default()
            .insert(user_id, pp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_ranks_by_pp() {
        let board = MockLeaderboard::new();
        board
            .update_rank(3, GameMode::VanillaOsu, "ca", 7000)
            .await
            .unwrap();
        board
            .update_rank(4, GameMode::VanillaOsu, "us", 8000)
            .await
            .unwrap();

        assert_eq!(board.global_rank(4, GameMode::VanillaOsu).await.unwrap(), 1);
        assert_eq!(board.global_rank(3, GameMode::VanillaOsu).await.unwrap(), 2);
        assert_eq!(
            board.country_rank(3, GameMode::VanillaOsu, "ca").await.unwrap(),
            1
        );
        assert_eq!(board.global_rank(5, GameMode::VanillaOsu).await.unwrap(), 0);
    }
}
