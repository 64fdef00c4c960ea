use async_trait::async_trait;

use super::Result;
use crate::database::structs::HardwareMatch;

#[async_trait]
pub trait AuditQueries: Send + Sync {
    /// Record a login attempt (ip, client version, release stream).
    async fn create_login(
        &self,
        user_id: i32,
        ip: &str,
        osu_version: &str,
        osu_stream: &str,
    ) -> Result<()>;

    /// Record the client's hardware fingerprint set.
    async fn create_client_hashes(
        &self,
        user_id: i32,
        osu_path_md5: &str,
        adapters_md5: &str,
        uninstall_md5: &str,
        disk_signature_md5: &str,
    ) -> Result<()>;

    /// Other users sharing hardware identifiers with this one. Under wine
    /// only the uninstall id is reliable; `disk_signature_md5` is `None`
    /// when the value is a known manufacturer constant.
    async fn hardware_matches(
        &self,
        user_id: i32,
        running_under_wine: bool,
        adapters_md5: &str,
        uninstall_md5: &str,
        disk_signature_md5: Option<&str>,
    ) -> Result<Vec<HardwareMatch>>;
}
