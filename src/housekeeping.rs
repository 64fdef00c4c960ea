//! Periodic background work: donor expiry, bot status rerolls, and ghost
//! disconnects. Every task is owned by `main` and aborted at shutdown.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;

use bancho::server as out;

use crate::constants::{
    BOT_STATUS_INTERVAL_SECS, DONOR_EXPIRY_INTERVAL_SECS, GHOST_SWEEP_INTERVAL_SECS,
    GHOST_TIMEOUT_SECS,
};
use crate::privileges::Privileges;
use crate::server::Server;

/// Spawn all housekeeping loops; the returned handles are aborted and
/// awaited at shutdown.
pub fn start(server: &Server) -> Vec<JoinHandle<()>> {
    log::info!("initializing housekeeping tasks");
    vec![
        tokio::spawn(expire_donor_privileges(server.clone())),
        tokio::spawn(reroll_bot_status(server.clone())),
        tokio::spawn(disconnect_ghosts(server.clone())),
    ]
}

/// Strip donor perks from users whose donor time has lapsed.
async fn expire_donor_privileges(server: Server) {
    let mut interval = tokio::time::interval(Duration::from_secs(DONOR_EXPIRY_INTERVAL_SECS));
    loop {
        interval.tick().await;
        log::debug!("checking for expired donor privileges");

        let expired = match server.db.expired_donors(Utc::now().timestamp()).await {
            Ok(users) => users,
            Err(err) => {
                log::error!("failed to query expired donors: {}", err);
                continue;
            }
        };

        for user in expired {
            let privileges = Privileges::from_bits_retain(user.privileges) & !Privileges::DONATOR;
            if let Err(err) = server.db.update_privileges(user.id, privileges.bits()).await {
                log::error!("failed to strip donor privileges: {}", err);
                continue;
            }
            if let Err(err) = server.db.update_donor_end(user.id, 0).await {
                log::error!("failed to reset donor end: {}", err);
            }

            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(user.id) {
                session.privileges = privileges;
                session.donor_end = 0;
                session.enqueue(&out::notification("Your supporter status has expired."));
            }
            log::info!("{}'s supporter status has expired", user.name);
        }
    }
}

/// Invalidate the cached bot frames so the next read rolls a fresh status.
async fn reroll_bot_status(server: Server) {
    let mut interval = tokio::time::interval(Duration::from_secs(BOT_STATUS_INTERVAL_SECS));
    // the first tick fires immediately; the cache is already fresh
    interval.tick().await;
    loop {
        interval.tick().await;
        server.bot_status.invalidate();
    }
}

/// Log out sessions that have gone quiet past the client's ping interval.
async fn disconnect_ghosts(server: Server) {
    let mut interval = tokio::time::interval(Duration::from_secs(GHOST_SWEEP_INTERVAL_SECS));
    interval.tick().await;
    loop {
        interval.tick().await;

        let now = Instant::now();
        let mut world = server.world.write().await;
        let ghosts: Vec<i32> = world
            .players
            .iter()
            .filter(|s| !s.is_bot)
            .filter(|s| now.duration_since(s.last_recv_time).as_secs() > GHOST_TIMEOUT_SECS)
            .map(|s| s.id)
            .collect();
        for ghost in ghosts {
            log::info!("auto-disconnected ghost session {}", ghost);
            world.logout(ghost);
        }
    }
}
