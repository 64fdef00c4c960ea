use anyhow::Result;
use serde_json::json;

/// Discord webhook for audit events (restrictions, silences).
pub struct AuditWebhook {
    client: reqwest::Client,
    url: String,
}

impl AuditWebhook {
    /// `None` when no webhook url is configured.
    pub fn from_config(client: reqwest::Client, url: &str) -> Option<AuditWebhook> {
        if url.is_empty() {
            return None;
        }
        Some(AuditWebhook {
            client,
            url: url.to_string(),
        })
    }

    pub async fn post(&self, content: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
