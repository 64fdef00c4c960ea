use std::sync::Mutex;

use bytes::Bytes;
use rand::seq::SliceRandom;

use bancho::server as out;

use crate::constants::{BOT_STATUSES, BOT_USER_ID};
use crate::privileges::Privileges;

/// The bot's full privilege set.
pub fn bot_privileges() -> Privileges {
    Privileges::UNRESTRICTED
        | Privileges::DONATOR
        | Privileges::MODERATOR
        | Privileges::ADMINISTRATOR
        | Privileges::DEVELOPER
}

// lat/long far off-screen for the in-game world map
const BOT_LATITUDE: f32 = 1234.0;
const BOT_LONGITUDE: f32 = 4321.0;
const BOT_UTC_OFFSET: i8 = -5;
const BOT_COUNTRY_CODE: u8 = 245; // satellite provider

/// Cached presence/stats frames for the bot.
///
/// The bot sits in everyone's friends list, so its stats are requested very
/// frequently; the frames are built once and rerolled periodically by
/// housekeeping for a fresh flavour status.
pub struct BotStatusCache {
    bot_name: String,
    cached: Mutex<Option<CachedPackets>>,
}

#[derive(Clone)]
struct CachedPackets {
    presence: Bytes,
    stats: Bytes,
}

impl BotStatusCache {
    pub fn new(bot_name: &str) -> Self {
        BotStatusCache {
            bot_name: bot_name.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn presence(&self) -> Bytes {
        self.packets().presence
    }

    pub fn stats(&self) -> Bytes {
        self.packets().stats
    }

    /// Drop the cache so the next read picks a new random status.
    pub fn invalidate(&self) {
        self.cached.lock().unwrap().take();
    }

    fn packets(&self) -> CachedPackets {
        let mut cached = self.cached.lock().unwrap();
        cached
            .get_or_insert_with(|| {
                let (action, info_text) = *BOT_STATUSES
                    .choose(&mut rand::thread_rng())
                    .expect("bot status list is non-empty");

                CachedPackets {
                    presence: out::user_presence(
                        BOT_USER_ID,
                        &self.bot_name,
                        BOT_UTC_OFFSET,
                        BOT_COUNTRY_CODE,
                        bot_privileges().client_privileges().bits(),
                        0,
                        BOT_LONGITUDE,
                        BOT_LATITUDE,
                        0,
                    ),
                    stats: out::user_stats(
                        BOT_USER_ID,
                        action,
                        info_text,
                        "",
                        0,
                        0,
                        0,
                        0,
                        0.0,
                        0,
                        0,
                        0,
                        0,
                    ),
                }
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_stable_until_invalidated() {
        let cache = BotStatusCache::new("Tomoko");
        let first = cache.stats();
        assert_eq!(first, cache.stats());

        cache.invalidate();
        // after invalidation the frame is regenerated (possibly identical
        // bytes if the same status is drawn; the presence must still parse)
        let presence = cache.presence();
        let frames: Vec<_> = bancho::PacketStream::new(&presence)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 83);
    }
}
