use chrono::NaiveDateTime;

/// A row of the users table.
#[derive(Clone, Debug)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub safe_name: String,
    pub pw_bcrypt: String,
    pub privileges: i32,
    pub country: String,
    pub silence_end: i64,
    pub donor_end: i64,
    pub clan_id: i32,
    pub clan_priv: i32,
    pub api_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipKind {
    Friend,
    Block,
}

/// One edge of the relationships table, fetched per user.
#[derive(Clone, Copy, Debug)]
pub struct Relationship {
    pub target_id: i32,
    pub kind: RelationshipKind,
}

/// Offline mail, joined with sender/recipient names for replay at login.
#[derive(Clone, Debug)]
pub struct Mail {
    pub from_id: i32,
    pub from_name: String,
    pub to_id: i32,
    pub to_name: String,
    pub msg: String,
    pub sent_at: i64,
}

/// A static channel definition.
#[derive(Clone, Debug)]
pub struct ChannelRow {
    pub name: String,
    pub topic: String,
    pub read_priv: i32,
    pub write_priv: i32,
    pub auto_join: bool,
}

/// One mode's stats row for a user.
#[derive(Clone, Copy, Debug)]
pub struct ModeStatsRow {
    pub mode: i16,
    pub total_score: i64,
    pub ranked_score: i64,
    pub pp: i32,
    pub accuracy: f32,
    pub plays: i32,
    pub playtime: i32,
    pub max_combo: i32,
}

/// Another account sharing hardware identifiers with a logging-in user.
#[derive(Clone, Copy, Debug)]
pub struct HardwareMatch {
    pub user_id: i32,
    pub privileges: i32,
}

/// Administrative actions recorded to the logs table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogAction {
    Restrict,
    Unrestrict,
    Silence,
    Unsilence,
    Note,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LogAction::Restrict => "restrict",
            LogAction::Unrestrict => "unrestrict",
            LogAction::Silence => "silence",
            LogAction::Unsilence => "unsilence",
            LogAction::Note => "note",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Clan {
    pub id: i32,
    pub name: String,
    pub tag: String,
    pub owner: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug)]
pub struct TourneyPool {
    pub id: i32,
    pub name: String,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

/// A (mods, slot) -> beatmap assignment within a pool.
#[derive(Clone, Copy, Debug)]
pub struct PoolMap {
    pub pool_id: i32,
    pub map_id: i32,
    pub mods: i32,
    pub slot: i32,
}
