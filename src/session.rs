use std::collections::{HashMap, HashSet};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::constants::BOT_USER_ID;
use crate::gamemode::GameMode;
use crate::mods::Mods;
use crate::privileges::{ClanPrivileges, ClientPrivileges, Privileges};

/// What the client is currently doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    #[default]
    Idle = 0,
    Afk = 1,
    Playing = 2,
    Editing = 3,
    Modding = 4,
    Multiplayer = 5,
    Watching = 6,
    Unknown = 7,
    Testing = 8,
    Submitting = 9,
    Paused = 10,
    Lobby = 11,
    Multiplaying = 12,
    OsuDirect = 13,
}

impl Action {
    pub fn from_u8(v: u8) -> Action {
        use Action::*;
        match v {
            0 => Idle,
            1 => Afk,
            2 => Playing,
            3 => Editing,
            4 => Modding,
            5 => Multiplayer,
            6 => Watching,
            8 => Testing,
            9 => Submitting,
            10 => Paused,
            11 => Lobby,
            12 => Multiplaying,
            13 => OsuDirect,
            _ => Unknown,
        }
    }
}

/// Which other users' presence the client wants pushed to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresenceFilter {
    #[default]
    Nil,
    All,
    Friends,
}

/// The client's self-reported status, broadcast with user stats.
#[derive(Clone, Debug, Default)]
pub struct Status {
    pub action: Action,
    pub info_text: String,
    pub map_md5: String,
    pub mods: Mods,
    pub mode: GameMode,
    pub map_id: i32,
}

/// A user's stats in a single mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModeStats {
    pub total_score: i64,
    pub ranked_score: i64,
    pub pp: u32,
    pub accuracy: f32,
    pub plays: i32,
    pub playtime: i32,
    pub max_combo: i32,
    pub global_rank: i32,
}

/// The most recent score a user set in some mode. Kept per session so scrim
/// aggregation can poll it; the score-submission subsystem writes it.
#[derive(Clone, Debug)]
pub struct RecentScore {
    pub beatmap_md5: String,
    pub score: i64,
    pub pp: f32,
    pub accuracy: f32,
    pub max_combo: i32,
    pub mods: Mods,
    pub mode: GameMode,
    pub server_time: DateTime<Utc>,
}

/// The beatmap a user last previewed via /np, with its five-minute window.
#[derive(Clone, Debug)]
pub struct LastNp {
    pub beatmap_id: i32,
    pub mode_vanilla: u8,
    pub mods: Option<Mods>,
    pub expires_at: Instant,
}

/// Where the user is on the planet, for the presence packet.
#[derive(Clone, Debug)]
pub struct Geolocation {
    pub latitude: f32,
    pub longitude: f32,
    pub country_acronym: String,
    pub country_numeric: u8,
}

impl Default for Geolocation {
    fn default() -> Geolocation {
        Geolocation {
            latitude: 0.0,
            longitude: 0.0,
            country_acronym: "xx".to_string(),
            country_numeric: 0,
        }
    }
}

/// A logged-in user.
///
/// Identity (id, name, safe name) is immutable for the session's lifetime.
/// The `token` is the opaque string the client echoes in its `osu-token`
/// header; an empty token means the session has been logged out.
#[derive(Debug)]
pub struct Session {
    pub id: i32,
    pub name: String,
    pub safe_name: String,
    pub token: String,
    pub privileges: Privileges,
    pub pw_bcrypt: Option<String>,

    pub utc_offset: i8,
    pub geolocation: Geolocation,
    pub status: Status,

    /// User ids; disjoint from `blocks`, and always containing the bot.
    pub friends: HashSet<i32>,
    pub blocks: HashSet<i32>,

    /// Real names of joined channels.
    pub channels: HashSet<String>,

    /// Ids of users spectating this one, in join order.
    pub spectators: Vec<i32>,
    /// The id of the user this one is spectating.
    pub spectating: Option<i32>,
    pub match_id: Option<u16>,

    /// Staff-only: hides this session from joins/leaves it observes.
    pub stealth: bool,
    pub in_lobby: bool,
    pub away_message: Option<String>,
    pub presence_filter: PresenceFilter,
    pub pm_private: bool,

    /// UNIX timestamp at which an active silence ends.
    pub silence_end: i64,
    /// UNIX timestamp at which donor perks end.
    pub donor_end: i64,

    pub clan_id: Option<i32>,
    pub clan_priv: Option<ClanPrivileges>,
    pub api_key: Option<String>,

    pub login_time: Instant,
    pub last_recv_time: Instant,

    pub is_bot: bool,
    pub is_tourney_client: bool,

    pub last_np: Option<LastNp>,
    pub stats: HashMap<GameMode, ModeStats>,
    pub recent_scores: HashMap<GameMode, RecentScore>,

    buffer: BytesMut,
}

impl Session {
    pub fn new(id: i32, name: &str, privileges: Privileges) -> Session {
        let now = Instant::now();
        let mut friends = HashSet::new();
        friends.insert(BOT_USER_ID);

        Session {
            id,
            name: name.to_string(),
            safe_name: make_safe_name(name),
            token: generate_token(),
            privileges,
            pw_bcrypt: None,
            utc_offset: 0,
            geolocation: Geolocation::default(),
            status: Status::default(),
            friends,
            blocks: HashSet::new(),
            channels: HashSet::new(),
            spectators: Vec::new(),
            spectating: None,
            match_id: None,
            stealth: false,
            in_lobby: false,
            away_message: None,
            presence_filter: PresenceFilter::Nil,
            pm_private: false,
            silence_end: 0,
            donor_end: 0,
            clan_id: None,
            clan_priv: None,
            api_key: None,
            login_time: now,
            last_recv_time: now,
            is_bot: false,
            is_tourney_client: false,
            last_np: None,
            stats: HashMap::new(),
            recent_scores: HashMap::new(),
            buffer: BytesMut::new(),
        }
    }

    /// Seconds of silence remaining, zero when not silenced.
    pub fn remaining_silence(&self) -> i64 {
        (self.silence_end - Utc::now().timestamp()).max(0)
    }

    pub fn silenced(&self) -> bool {
        self.remaining_silence() > 0
    }

    pub fn restricted(&self) -> bool {
        !self.privileges.contains(Privileges::UNRESTRICTED)
    }

    pub fn client_privileges(&self) -> ClientPrivileges {
        self.privileges.client_privileges()
    }

    /// The user's stats in their currently selected mode.
    pub fn current_stats(&self) -> ModeStats {
        self.stats.get(&self.status.mode).copied().unwrap_or_default()
    }

    /// The most recently set score across all modes.
    pub fn recent_score(&self) -> Option<&RecentScore> {
        self.recent_scores.values().max_by_key(|s| s.server_time)
    }

    /// The /np context, if it hasn't expired.
    pub fn active_np(&self) -> Option<&LastNp> {
        self.last_np
            .as_ref()
            .filter(|np| np.expires_at > Instant::now())
    }

    /// A chat embed linking the user's profile.
    pub fn embed(&self, domain: &str) -> String {
        format!("[https://{}/u/{} {}]", domain, self.id, self.name)
    }

    /// Append data to be sent on the session's next request. The bot's
    /// enqueue drops bytes; nothing ever connects to read them.
    pub fn enqueue(&mut self, data: &[u8]) {
        if !self.is_bot {
            self.buffer.extend_from_slice(data);
        }
    }

    /// Take everything enqueued so far.
    pub fn dequeue(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// The stable lookup key for a display name: lowercase, spaces to
/// underscores.
pub fn make_safe_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// A fresh opaque session token.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_names() {
        assert_eq!(make_safe_name("Best Player"), "best_player");
        assert_eq!(make_safe_name("under_scores"), "under_scores");
    }

    #[test]
    fn new_sessions_befriend_the_bot() {
        let session = Session::new(3, "someone", Privileges::UNRESTRICTED);
        assert!(session.friends.contains(&BOT_USER_ID));
        assert!(!session.token.is_empty());
    }

    #[test]
    fn bot_enqueue_drops_bytes() {
        let mut bot = Session::new(BOT_USER_ID, "Tomoko", Privileges::all());
        bot.is_bot = true;
        bot.enqueue(b"data");
        assert!(!bot.has_pending());

        let mut user = Session::new(3, "someone", Privileges::UNRESTRICTED);
        user.enqueue(b"data");
        assert_eq!(user.dequeue().as_ref(), b"data");
        assert!(!user.has_pending());
    }

    #[test]
    fn silence_window() {
        let mut session = Session::new(3, "someone", Privileges::UNRESTRICTED);
        assert!(!session.silenced());
        session.silence_end = Utc::now().timestamp() + 60;
        assert!(session.silenced());
    }
}
