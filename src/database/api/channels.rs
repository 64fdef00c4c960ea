use async_trait::async_trait;

use super::Result;
use crate::database::structs::ChannelRow;

#[async_trait]
pub trait ChannelQueries: Send + Sync {
    /// Every static channel definition, loaded once at startup.
    async fn all_channels(&self) -> Result<Vec<ChannelRow>>;
}
