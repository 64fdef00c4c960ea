use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use tokio::sync::{Notify, RwLock};

use bancho::server as out;

use crate::bot::{bot_privileges, BotStatusCache};
use crate::config::Config;
use crate::constants::{now_playing_regex, BOT_USER_ID};
use crate::database::{Database, LogAction};
use crate::leaderboard::Leaderboard;
use crate::network::{AuditWebhook, BeatmapSource, Geolocator};
use crate::performance::PerformanceCalculator;
use crate::privileges::Privileges;
use crate::registry::{BcryptCache, Channel};
use crate::session::Session;
use crate::world::World;

/// The server: the in-memory world plus every external port. Cheap to
/// clone; background tasks hold their own copy.
#[derive(Clone)]
pub struct Server {
    pub world: Arc<RwLock<World>>,
    pub db: Arc<dyn Database>,
    pub leaderboard: Arc<dyn Leaderboard>,
    pub geolocator: Arc<dyn Geolocator>,
    pub beatmaps: Arc<dyn BeatmapSource>,
    pub performance: Arc<dyn PerformanceCalculator>,
    pub webhook: Option<Arc<AuditWebhook>>,
    pub config: Arc<Config>,
    pub np_regex: Arc<Regex>,
    pub bcrypt_cache: Arc<Mutex<BcryptCache>>,
    pub bot_status: Arc<BotStatusCache>,
    /// Signalled by the !shutdown command; main awaits it.
    pub shutdown: Arc<Notify>,
}

impl Server {
    /// Build the server: load static channels, seat the bot session.
    pub async fn init(
        config: Config,
        db: Arc<dyn Database>,
        leaderboard: Arc<dyn Leaderboard>,
        geolocator: Arc<dyn Geolocator>,
        beatmaps: Arc<dyn BeatmapSource>,
        performance: Arc<dyn PerformanceCalculator>,
        webhook: Option<AuditWebhook>,
    ) -> Result<Server> {
        let mut world = World::init();

        log::info!("loading channels");
        for row in db.all_channels().await? {
            world.channels.append(Channel::new(
                &row.name,
                &row.topic,
                Privileges::from_bits_retain(row.read_priv),
                Privileges::from_bits_retain(row.write_priv),
                row.auto_join,
                false,
            ));
        }

        let mut bot = Session::new(BOT_USER_ID, &config.bot_name, bot_privileges());
        bot.is_bot = true;
        world.players.insert(bot);

        let np_regex = Arc::new(now_playing_regex(&config.domain));
        let bcrypt_cache = Arc::new(Mutex::new(BcryptCache::new(config.bcrypt_cache_size)));
        let bot_status = Arc::new(BotStatusCache::new(&config.bot_name));

        Ok(Server {
            world: Arc::new(RwLock::new(world)),
            db,
            leaderboard,
            geolocator,
            beatmaps,
            performance,
            webhook: webhook.map(Arc::new),
            config: Arc::new(config),
            np_regex,
            bcrypt_cache,
            bot_status,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Queue a latest-activity stamp without blocking the caller.
    pub fn touch_latest_activity(&self, user_id: i32) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(err) = db.touch_latest_activity(user_id).await {
                log::error!("failed to update latest activity: {}", err);
            }
        });
    }

    /// Record an administrative action to the logs table and, when
    /// configured, the audit webhook.
    pub async fn audit(&self, from: i32, to: i32, action: LogAction, msg: &str) {
        if let Err(err) = self.db.create_log(from, to, action, msg).await {
            log::error!("failed to write log entry: {}", err);
        }
        if let Some(webhook) = &self.webhook {
            if let Err(err) = webhook.post(msg).await {
                log::error!("audit webhook failed: {}", err);
            }
        }
    }

    /// Resolve a user name to (id, name), online first, then the store.
    pub async fn resolve_user(&self, name: &str) -> Result<Option<(i32, String)>> {
        {
            let world = self.world.read().await;
            if let Some(session) = world.players.get_by_name(name) {
                return Ok(Some((session.id, session.name.clone())));
            }
        }
        let user = self
            .db
            .user_by_safe_name(&crate::session::make_safe_name(name))
            .await?;
        Ok(user.map(|u| (u.id, u.name)))
    }

    /// Strip a user's unrestricted bit, log, inform and disconnect them.
    pub async fn restrict(&self, admin_id: i32, target_id: i32, reason: &str) -> Result<()> {
        let new_privileges = {
            let mut world = self.world.write().await;
            match world.players.get_mut(target_id) {
                Some(session) => {
                    session.privileges &= !Privileges::UNRESTRICTED;
                    Some(session.privileges)
                }
                None => None,
            }
        };

        let privileges = match new_privileges {
            Some(p) => p,
            None => {
                let Some(user) = self.db.user_by_id(target_id).await? else {
                    anyhow::bail!("no such user: {}", target_id);
                };
                Privileges::from_bits_retain(user.privileges) & !Privileges::UNRESTRICTED
            }
        };
        self.db.update_privileges(target_id, privileges.bits()).await?;

        let msg = format!("{} restricted {} for: {}", admin_id, target_id, reason);
        self.audit(admin_id, target_id, LogAction::Restrict, &msg).await;
        log::info!("{}", msg);

        // relog the user so they pick up the restricted state
        let mut world = self.world.write().await;
        if world.players.contains(target_id) {
            world.logout(target_id);
        }
        Ok(())
    }

    /// Give back the unrestricted bit; the user rejoins at next login.
    pub async fn unrestrict(&self, admin_id: i32, target_id: i32, reason: &str) -> Result<()> {
        let Some(user) = self.db.user_by_id(target_id).await? else {
            anyhow::bail!("no such user: {}", target_id);
        };
        let privileges = Privileges::from_bits_retain(user.privileges) | Privileges::UNRESTRICTED;
        self.db.update_privileges(target_id, privileges.bits()).await?;

        let msg = format!("{} unrestricted {} for: {}", admin_id, target_id, reason);
        self.audit(admin_id, target_id, LogAction::Unrestrict, &msg).await;
        log::info!("{}", msg);

        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(target_id) {
            session.privileges = privileges;
            world.logout(target_id);
        }
        Ok(())
    }

    /// Silence a user for `duration` seconds.
    pub async fn silence(
        &self,
        admin_id: i32,
        target_id: i32,
        duration: i64,
        reason: &str,
    ) -> Result<()> {
        let silence_end = Utc::now().timestamp() + duration;
        self.db.update_silence_end(target_id, silence_end).await?;

        let msg = format!("{} silenced {} ({}s) for: {}", admin_id, target_id, duration, reason);
        self.audit(admin_id, target_id, LogAction::Silence, &msg).await;

        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(target_id) {
            session.silence_end = silence_end;
            session.enqueue(&out::silence_end(duration as i32));
        }
        world
            .players
            .enqueue_all(&out::user_silenced(target_id), &[]);
        if world
            .players
            .get(target_id)
            .is_some_and(|s| s.match_id.is_some())
        {
            world.leave_match(target_id);
        }
        Ok(())
    }

    pub async fn unsilence(&self, admin_id: i32, target_id: i32) -> Result<()> {
        let now = Utc::now().timestamp();
        self.db.update_silence_end(target_id, now).await?;

        let msg = format!("{} unsilenced {}", admin_id, target_id);
        self.audit(admin_id, target_id, LogAction::Unsilence, &msg).await;

        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(target_id) {
            session.silence_end = now;
            session.enqueue(&out::silence_end(0));
        }
        Ok(())
    }

    /// Start a match now: flip slots to playing and broadcast the start.
    /// Match-scoped packets stay out of `#lobby`.
    pub fn start_match(world: &mut World, match_id: u16) {
        let (no_map, wire) = match world.matches.get_mut(match_id) {
            Some(m) => {
                let no_map = m.start();
                (no_map, m.to_wire())
            }
            None => return,
        };
        world.match_enqueue(match_id, &out::match_start(&wire), false, &no_map);
        world.match_enqueue_state(match_id, true);
    }

    /// How long this user has been quiet, in seconds.
    pub async fn seconds_since_recv(&self, user_id: i32) -> Option<u64> {
        let world = self.world.read().await;
        world
            .players
            .get(user_id)
            .map(|s| Instant::now().duration_since(s.last_recv_time).as_secs())
    }
}
