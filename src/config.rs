use std::path::PathBuf;

use serde::Deserialize;

/// Server config, read once at startup.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// The address the HTTP endpoint binds to, f.e. "0.0.0.0:8080".
    pub bind_address: String,

    /// The server's base domain, used in chat embeds and client switch
    /// instructions, f.e. "example.com" for "osu.example.com".
    pub domain: String,

    /// The prefix that turns a chat message into a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// The display name of the built-in bot account (user id 1).
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Image shown as the client's main menu icon, and the URL opened
    /// when it is clicked.
    pub menu_icon_url: String,
    pub menu_onclick_url: String,

    /// Usernames that may not be taken via !changename.
    #[serde(default)]
    pub disallowed_names: Vec<String>,

    /// Number of (bcrypt hash -> known-good password) entries kept to skip
    /// repeated bcrypt work on reconnects.
    #[serde(default = "default_bcrypt_cache_size")]
    pub bcrypt_cache_size: usize,

    /// Extra per-packet/debug logging.
    #[serde(default)]
    pub debug: bool,

    /// The upstream changelog endpoint used to vet client versions, and
    /// whether failing the check rejects the login. When the endpoint is
    /// unreachable, clients are allowed through regardless.
    #[serde(default = "default_changelog_url")]
    pub changelog_url: String,
    #[serde(default)]
    pub disallow_old_clients: bool,

    /// Discord webhook receiving audit messages (restrictions, silences).
    /// Disabled when empty.
    #[serde(default)]
    pub audit_webhook_url: String,

    /// Beatmap catalog endpoint for metadata lookups by id/md5.
    pub beatmap_api_url: String,

    /// Mirror used for beatmapset download links in chat.
    #[serde(default = "default_mirror_url")]
    pub mirror_download_url: String,

    /// Directory holding downloaded .osu files for the pp calculator.
    pub beatmaps_path: PathBuf,

    /// Path to the pp calculator binary.
    pub pp_calculator_path: PathBuf,

    /// libpq-style connection string, f.e.
    /// `host=127.0.0.1 port=5432 user=postgres password=123`.
    pub postgres_connection: String,

    /// Redis URL for the leaderboard sorted sets, f.e. "redis://127.0.0.1".
    pub redis_url: String,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_bot_name() -> String {
    "Tomoko".to_string()
}

fn default_bcrypt_cache_size() -> usize {
    256
}

fn default_changelog_url() -> String {
    "https://osu.ppy.sh/api/v2/changelog".to_string()
}

fn default_mirror_url() -> String {
    "https://catboy.best/d".to_string()
}

impl Config {
    /// Read the config file listed in the `TORII_CONFIG` environment
    /// variable.
    ///
    /// # Panics
    /// - when `TORII_CONFIG` is not set or does not point to a file
    /// - when the file cannot be parsed
    pub fn load() -> Config {
        let f = Self::path().unwrap_or_else(|| {
            panic!("cannot locate config: use the '{}' env var", CONFIG_ENV_VAR)
        });
        let f_str = std::fs::read_to_string(f).expect("failed to read config file");
        toml::from_str(&f_str).expect("failed to parse config file")
    }

    fn path() -> Option<PathBuf> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(f) => Some(PathBuf::from(f)).filter(|p| p.is_file()),
            Err(_) => None,
        }
    }

    /// The osu! web URL for a beatmap id on this server.
    pub fn beatmap_url(&self, map_id: i32) -> String {
        format!("https://osu.{}/b/{}", self.domain, map_id)
    }

    /// The profile URL for a user id on this server.
    pub fn user_url(&self, user_id: i32) -> String {
        format!("https://{}/u/{}", self.domain, user_id)
    }
}

const CONFIG_ENV_VAR: &str = "TORII_CONFIG";

impl Default for Config {
    /// A config that reaches no external service; integration tests and the
    /// mock ports rely on it.
    fn default() -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            domain: "example.com".to_string(),
            command_prefix: default_command_prefix(),
            bot_name: default_bot_name(),
            menu_icon_url: "https://a.example.com/menu.png".to_string(),
            menu_onclick_url: "https://example.com".to_string(),
            disallowed_names: vec!["peppy".to_string()],
            bcrypt_cache_size: default_bcrypt_cache_size(),
            debug: false,
            changelog_url: default_changelog_url(),
            disallow_old_clients: false,
            audit_webhook_url: String::new(),
            beatmap_api_url: "https://osu.direct/api".to_string(),
            mirror_download_url: default_mirror_url(),
            beatmaps_path: PathBuf::from(".data/osu"),
            pp_calculator_path: PathBuf::from("osu-tools"),
            postgres_connection: String::new(),
            redis_url: "redis://127.0.0.1".to_string(),
        }
    }
}
