use async_trait::async_trait;

use super::Result;
use crate::database::structs::{Relationship, RelationshipKind};

#[async_trait]
pub trait RelationshipQueries: Send + Sync {
    /// Every friend/block edge originating at `user_id`.
    async fn relationships_for(&self, user_id: i32) -> Result<Vec<Relationship>>;

    /// Insert or replace an edge.
    async fn upsert_relationship(
        &self,
        user_id: i32,
        target_id: i32,
        kind: RelationshipKind,
    ) -> Result<()>;

    async fn delete_relationship(&self, user_id: i32, target_id: i32) -> Result<()>;
}
