use async_trait::async_trait;

use super::Result;
use crate::database::structs::Mail;

#[async_trait]
pub trait MailQueries: Send + Sync {
    /// Unread mail for a user, oldest first, with names joined in.
    async fn unread_mail(&self, to_id: i32) -> Result<Vec<Mail>>;

    /// Store a message for an offline (or any) recipient, marked unread.
    async fn create_mail(&self, from_id: i32, to_id: i32, msg: &str) -> Result<()>;

    /// Flag everything addressed to a user as read.
    async fn mark_mail_read(&self, to_id: i32) -> Result<()>;
}
