pub use api::*;
pub use mock::MockDatabase;
pub use postgres::{pg_connect, PgDatabase};
pub use structs::*;

mod api;
mod mock;
mod postgres;
mod structs;

/// Everything the server persists or reads back, as one object-safe trait.
/// Production uses [`PgDatabase`]; tests use [`MockDatabase`].
pub trait Database:
    UserQueries
    + RelationshipQueries
    + MailQueries
    + ChannelQueries
    + LogQueries
    + ClanQueries
    + PoolQueries
    + AuditQueries
    + Send
    + Sync
{
}

impl<T> Database for T where
    T: UserQueries
        + RelationshipQueries
        + MailQueries
        + ChannelQueries
        + LogQueries
        + ClanQueries
        + PoolQueries
        + AuditQueries
        + Send
        + Sync
{
}
