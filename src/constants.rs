use lazy_static::lazy_static;
use regex::Regex;

/// The user id reserved for the built-in bot.
pub const BOT_USER_ID: i32 = 1;

/// The first real account; granted full privileges on first login.
pub const FIRST_USER_ID: i32 = 3;

/// The client pings at least every 300s; anything quieter is a ghost.
pub const GHOST_TIMEOUT_SECS: u64 = 300;

/// How often the ghost sweep runs.
pub const GHOST_SWEEP_INTERVAL_SECS: u64 = GHOST_TIMEOUT_SECS / 3;

/// How often expired donor perks are stripped.
pub const DONOR_EXPIRY_INTERVAL_SECS: u64 = 30 * 60;

/// How often the bot's flavour status is rerolled.
pub const BOT_STATUS_INTERVAL_SECS: u64 = 5 * 60;

/// An existing session blocks a second login for this long after its last
/// received packet.
pub const LOGIN_REPLACE_THRESHOLD_SECS: u64 = 10;

/// The client tends to fire a stray logout 300-800ms after logging in;
/// logouts within this window are dropped.
pub const LOGOUT_GUARD_SECS: u64 = 1;

/// How long a /np context stays usable by later commands.
pub const NP_EXPIRY_SECS: u64 = 300;

/// Total time a scrim waits for score submissions, across all players.
pub const SCRIM_SUBMISSION_WAIT_SECS: f64 = 10.0;

/// Chat alerts before a timed match start, in seconds-before-fire.
pub const START_ALERT_LADDER: [u64; 8] = [60, 30, 10, 5, 4, 3, 2, 1];

/// Messages beyond this length are truncated with a notice to the sender.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Match names beyond this length are invalid client data.
pub const MAX_MATCH_NAME_LENGTH: usize = 50;

/// Channels the client uses internally; never routed.
pub const IGNORED_CHANNELS: [&str; 2] = ["#highlight", "#userlog"];

/// Flavour statuses for the bot, (action, info text) pairs.
pub const BOT_STATUSES: &[(u8, &str)] = &[
    (3, "the source code.."),     // editing
    (6, "over the server.."),     // watching
    (6, "the queue go by.."),     // watching
    (8, "out new features.."),    // testing
    (9, "a pull request.."),      // submitting
];

/// User-Agent header for outgoing requests.
pub const USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
);

lazy_static! {
    /// The client version line of a login body:
    /// `b20220330.2beta` = date, optional revision, optional stream.
    pub static ref OSU_VERSION: Regex = Regex::new(
        r"^b(?P<date>\d{8})(?:\.(?P<revision>\d))?(?P<stream>beta|cuttingedge|tourney|dev)?$"
    )
    .expect("failed to compile version regex");

    /// 2-15 characters; word characters, spaces, brackets and dashes.
    pub static ref USERNAME: Regex =
        Regex::new(r"^[\w \[\]-]{2,15}$").expect("failed to compile username regex");

    /// `bo5`-style best-of argument for !mp scrim.
    pub static ref BEST_OF: Regex =
        Regex::new(r"^(?:bo)?(\d{1,2})$").expect("failed to compile best-of regex");

    /// Mappool picks like `HD2` or `NM1`.
    pub static ref MAPPOOL_PICK: Regex =
        Regex::new(r"^([a-zA-Z]+)([0-9]+)$").expect("failed to compile pick regex");

    /// Tourney-style match titles: `OWC2020: (Team1) vs. (Team2)`.
    pub static ref TOURNEY_MATCH_NAME: Regex = Regex::new(
        r"^(?P<name>.+): \((?P<t1>.+)\) vs\.? \((?P<t2>.+)\)$"
    )
    .expect("failed to compile match name regex");
}

/// Build the /np matcher for a given server domain. The client's
/// "now playing" action embeds a beatmap link on either the server's own
/// domain or the official one.
pub fn now_playing_regex(domain: &str) -> Regex {
    Regex::new(&format!(
        "^\\x01ACTION is (?:playing|editing|watching|listening to) \
         \\[https://osu\\.(?:{}|ppy\\.sh)/beatmapsets/(?P<sid>\\d{{1,10}})#/?(?:osu|taiko|fruits|mania)?/(?P<bid>\\d{{1,10}})/? .+\\]\
         (?: <(?P<mode>Taiko|CatchTheBeat|osu!mania)>)?\
         (?P<mods>(?: (?:-|\\+|~|\\|)\\w+(?:~|\\|)?)+)?\\x01$",
        regex::escape(domain)
    ))
    .expect("failed to compile /np regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_regex_streams() {
        let caps = OSU_VERSION.captures("b20220330.2beta").unwrap();
        assert_eq!(&caps["date"], "20220330");
        assert_eq!(&caps["revision"], "2");
        assert_eq!(&caps["stream"], "beta");

        let caps = OSU_VERSION.captures("b20240102").unwrap();
        assert_eq!(&caps["date"], "20240102");
        assert!(caps.name("stream").is_none());

        assert!(OSU_VERSION.captures("20220330").is_none());
        assert!(OSU_VERSION.captures("b2022033").is_none());
    }

    #[test]
    fn now_playing_captures() {
        let re = now_playing_regex("example.com");
        let msg = "\x01ACTION is playing [https://osu.ppy.sh/beatmapsets/1971037#/osu/4080502 Name - Title [Diff]] +HardRock\x01";
        let caps = re.captures(msg).unwrap();
        assert_eq!(&caps["bid"], "4080502");
        assert_eq!(&caps["sid"], "1971037");
        assert!(caps.name("mode").is_none());
        assert_eq!(caps.name("mods").unwrap().as_str(), " +HardRock");
    }

    #[test]
    fn best_of_and_pick_patterns() {
        assert_eq!(&BEST_OF.captures("bo7").unwrap()[1], "7");
        assert_eq!(&BEST_OF.captures("11").unwrap()[1], "11");
        assert!(BEST_OF.captures("bo").is_none());

        let caps = MAPPOOL_PICK.captures("HD2").unwrap();
        assert_eq!(&caps[1], "HD");
        assert_eq!(&caps[2], "2");
    }

    #[test]
    fn tourney_match_name() {
        let caps = TOURNEY_MATCH_NAME
            .captures("OWC2015: (United States) vs. (China)")
            .unwrap();
        assert_eq!(&caps["name"], "OWC2015");
        assert_eq!(&caps["t1"], "United States");
        assert_eq!(&caps["t2"], "China");
    }
}
