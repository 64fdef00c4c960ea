pub use audit::AuditQueries;
pub use channels::ChannelQueries;
pub use clans::ClanQueries;
pub use logs::LogQueries;
pub use mail::MailQueries;
pub use pools::PoolQueries;
pub use relationships::RelationshipQueries;
pub use users::UserQueries;

mod audit;
mod channels;
mod clans;
mod logs;
mod mail;
mod pools;
mod relationships;
mod users;

pub type Result<T> = anyhow::Result<T>;
