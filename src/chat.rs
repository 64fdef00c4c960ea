use std::time::{Duration, Instant};

use bancho::Message;

use bancho::server as out;

use crate::commands;
use crate::commands::CommandTarget;
use crate::constants::{
    BOT_USER_ID, IGNORED_CHANNELS, MAX_MESSAGE_LENGTH, NP_EXPIRY_SECS,
};
use crate::performance::ScoreParams;
use crate::server::Server;
use crate::session::{Action, LastNp};

/// Accuracies the /np reply quotes pp values for.
const NP_ACCURACIES: [f32; 4] = [95.0, 98.0, 99.0, 100.0];

/// A /np action parsed out of a chat message.
struct NpContext {
    beatmap_id: i32,
    mode_vanilla: Option<u8>,
    mods_str: Option<String>,
}

fn parse_np(server: &Server, text: &str) -> Option<NpContext> {
    let caps = server.np_regex.captures(text)?;
    Some(NpContext {
        beatmap_id: caps["bid"].parse().ok()?,
        mode_vanilla: caps.name("mode").map(|m| match m.as_str() {
            "Taiko" => 1,
            "CatchTheBeat" => 2,
            _ => 3, // osu!mania
        }),
        mods_str: caps.name("mods").map(|m| m.as_str().trim().to_string()),
    })
}

impl Server {
    /// Route a public chat message: validation, truncation, command
    /// handling, /np capture, then channel delivery.
    pub async fn handle_public_message(&self, sender_id: i32, msg: Message) {
        let text = msg.text.trim();
        if text.is_empty() {
            return;
        }

        let recipient = msg.recipient.as_str();
        if IGNORED_CHANNELS.contains(&recipient) {
            return;
        }

        // resolve the wire name to a real channel and validate the sender
        let (real_name, truncated) = {
            let world = self.world.read().await;
            let Some(sender) = world.players.get(sender_id) else {
                return;
            };
            if sender.silenced() {
                log::warn!("{} sent a message while silenced", sender.name);
                return;
            }

            let real_name = match recipient {
                "#spectator" => {
                    let spec_host = sender.spectating.or_else(|| {
                        (!sender.spectators.is_empty()).then_some(sender.id)
                    });
                    match spec_host {
                        Some(host_id) => format!("#spec_{}", host_id),
                        None => return,
                    }
                }
                "#multiplayer" => match sender.match_id {
                    Some(match_id) => format!("#multi_{}", match_id),
                    None => return,
                },
                name => name.to_string(),
            };

            let Some(channel) = world.channels.get(&real_name) else {
                log::warn!("{} wrote to non-existent {}", sender.name, recipient);
                return;
            };
            if !channel.contains(sender_id) {
                log::warn!("{} wrote to {} without being in it", sender.name, recipient);
                return;
            }
            if !channel.can_write(sender.privileges) {
                log::warn!(
                    "{} wrote to {} with insufficient privileges",
                    sender.name,
                    recipient
                );
                return;
            }

            (real_name, text.chars().count() > MAX_MESSAGE_LENGTH)
        };

        let text = if truncated {
            let short: String = text.chars().take(MAX_MESSAGE_LENGTH).collect();
            let mut world = self.world.write().await;
            world.enqueue_to(
                sender_id,
                &out::notification("Your message was truncated\n(exceeded 2000 characters)."),
            );
            format!("{}... (truncated)", short)
        } else {
            text.to_string()
        };

        if text.starts_with(&self.config.command_prefix) {
            let response =
                commands::process(self, sender_id, CommandTarget::Channel(real_name.clone()), &text)
                    .await;
            if let Some(response) = response {
                let mut world = self.world.write().await;
                if !response.hidden {
                    world.channel_send(&real_name, &text, sender_id, false);
                    if let Some(reply) = &response.text {
                        world.channel_send_bot(&real_name, reply);
                    }
                } else {
                    // the command and its reply are only visible to staff
                    let mut staff = world.players.staff_ids();
                    staff.retain(|id| *id != sender_id);
                    world.channel_send_selective(&real_name, &text, sender_id, &staff);
                    if let Some(reply) = &response.text {
                        staff.push(sender_id);
                        world.channel_send_selective(&real_name, reply, BOT_USER_ID, &staff);
                    }
                }
                self.touch_latest_activity(sender_id);
                return;
            }
        }

        // no command hit: remember /np context if present, then deliver
        if let Some(np) = parse_np(self, &text) {
            let _ = self.store_np(sender_id, &np).await;
        }

        let mut world = self.world.write().await;
        world.channel_send(&real_name, &text, sender_id, false);
        drop(world);

        self.touch_latest_activity(sender_id);
        log::info!("{} @ {}: {}", sender_id, recipient, text);
    }

    /// Route a private message: block/privacy checks, away messages,
    /// offline mail, and bot conversations.
    pub async fn handle_private_message(&self, sender_id: i32, msg: Message) {
        let text = msg.text.trim();
        if text.is_empty() {
            return;
        }
        let target_name = msg.recipient.as_str();

        enum Gate {
            DmBlocked,
            TargetSilenced,
            Online(i32),
            Lookup,
        }

        enum Target {
            Online(i32),
            Offline(i32),
        }

        let (gate, truncated) = {
            let world = self.world.read().await;
            let Some(sender) = world.players.get(sender_id) else {
                return;
            };
            if sender.silenced() {
                log::debug!("{} tried to dm while silenced", sender.name);
                return;
            }

            let gate = match world.players.get_by_name(target_name) {
                Some(target) => {
                    if target.blocks.contains(&sender_id)
                        || (target.pm_private && !target.friends.contains(&sender_id))
                    {
                        Gate::DmBlocked
                    } else if target.silenced() {
                        Gate::TargetSilenced
                    } else {
                        Gate::Online(target.id)
                    }
                }
                None => Gate::Lookup,
            };
            (gate, text.chars().count() > MAX_MESSAGE_LENGTH)
        };

        let target = match gate {
            Gate::DmBlocked => {
                let mut world = self.world.write().await;
                world.enqueue_to(sender_id, &out::user_dm_blocked(target_name));
                return;
            }
            Gate::TargetSilenced => {
                let mut world = self.world.write().await;
                world.enqueue_to(sender_id, &out::target_silenced(target_name));
                return;
            }
            Gate::Online(id) => Target::Online(id),
            // the mail system can reach offline players
            Gate::Lookup => match self.resolve_user(target_name).await {
                Ok(Some((id, _))) => Target::Offline(id),
                _ => {
                    log::debug!("{} wrote to non-existent {}", sender_id, target_name);
                    return;
                }
            },
        };

        let text = if truncated {
            let short: String = text.chars().take(MAX_MESSAGE_LENGTH).collect();
            let mut world = self.world.write().await;
            world.enqueue_to(
                sender_id,
                &out::notification("Your message was truncated\n(exceeded 2000 characters)."),
            );
            format!("{}... (truncated)", short)
        } else {
            text.to_string()
        };

        match target {
            Target::Online(target_id) if target_id == BOT_USER_ID => {
                self.handle_bot_dm(sender_id, &text).await;
            }
            Target::Online(target_id) => {
                let mut world = self.world.write().await;

                // echo the away message back if the target is afk
                let away = world.players.get(target_id).and_then(|t| {
                    (t.status.action == Action::Afk)
                        .then(|| t.away_message.clone())
                        .flatten()
                        .map(|msg| (t.name.clone(), msg))
                });
                if let Some((target_name, away_msg)) = away {
                    let sender_name = world
                        .players
                        .get(sender_id)
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    world.enqueue_to(
                        sender_id,
                        &out::send_message(&target_name, &away_msg, &sender_name, target_id),
                    );
                }

                let sender_name = world
                    .players
                    .get(sender_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                let target_session_name = world
                    .players
                    .get(target_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                world.enqueue_to(
                    target_id,
                    &out::send_message(&sender_name, &text, &target_session_name, sender_id),
                );
                drop(world);

                if let Err(err) = self.db.create_mail(sender_id, target_id, &text).await {
                    log::error!("failed to persist mail: {}", err);
                }
                // delivered live; don't redeliver at next login
                let _ = self.db.mark_mail_read(target_id).await;
            }
            Target::Offline(target_id) => {
                if let Err(err) = self.db.create_mail(sender_id, target_id, &text).await {
                    log::error!("failed to persist mail: {}", err);
                }
                let mut world = self.world.write().await;
                world.enqueue_to(
                    sender_id,
                    &out::notification(&format!(
                        "{} is currently offline, but will receive your message on their next login.",
                        target_name
                    )),
                );
            }
        }

        self.touch_latest_activity(sender_id);
        log::info!("{} @ {}: {}", sender_id, target_name, text);
    }

    /// A dm to the bot is either a command or a /np.
    async fn handle_bot_dm(&self, sender_id: i32, text: &str) {
        if text.starts_with(&self.config.command_prefix) {
            let response = commands::process(self, sender_id, CommandTarget::Private, text).await;
            if let Some(response) = response {
                if let Some(reply) = response.text {
                    let mut world = self.world.write().await;
                    world.send_bot_to(sender_id, &reply);
                }
                return;
            }
        }

        let Some(np) = parse_np(self, text) else {
            return;
        };
        let reply = self.np_reply(sender_id, &np).await;
        let mut world = self.world.write().await;
        world.send_bot_to(sender_id, &reply);
    }

    /// Remember the /np'd map on the session for later commands.
    async fn store_np(&self, sender_id: i32, np: &NpContext) -> Option<()> {
        let beatmap = match self.beatmaps.by_id(np.beatmap_id).await {
            Ok(Some(map)) => map,
            _ => {
                let mut world = self.world.write().await;
                if let Some(session) = world.players.get_mut(sender_id) {
                    session.last_np = None;
                }
                return None;
            }
        };

        let mut world = self.world.write().await;
        let session = world.players.get_mut(sender_id)?;
        let mode_vanilla = np
            .mode_vanilla
            .unwrap_or_else(|| session.status.mode.as_vanilla());
        let mods = np
            .mods_str
            .as_deref()
            .map(|s| crate::mods::Mods::from_np(s, mode_vanilla));
        session.last_np = Some(LastNp {
            beatmap_id: beatmap.id,
            mode_vanilla,
            mods,
            expires_at: Instant::now() + Duration::from_secs(NP_EXPIRY_SECS),
        });
        Some(())
    }

    /// The pp breakdown the bot answers a /np with.
    async fn np_reply(&self, sender_id: i32, np: &NpContext) -> String {
        let beatmap = match self.beatmaps.by_id(np.beatmap_id).await {
            Ok(Some(map)) => map,
            _ => {
                let mut world = self.world.write().await;
                if let Some(session) = world.players.get_mut(sender_id) {
                    session.last_np = None;
                }
                return "Could not find map.".to_string();
            }
        };

        // remember the context for !with and pool commands
        let _ = self.store_np(sender_id, np).await;

        let mode_vanilla = match np.mode_vanilla {
            Some(m) => m,
            None => {
                let world = self.world.read().await;
                world
                    .players
                    .get(sender_id)
                    .map(|s| s.status.mode.as_vanilla())
                    .unwrap_or(0)
            }
        };
        let mods = np
            .mods_str
            .as_deref()
            .map(|s| crate::mods::Mods::from_np(s, mode_vanilla));

        let osu_file = self.config.beatmaps_path.join(format!("{}.osu", beatmap.id));
        let params: Vec<ScoreParams> = NP_ACCURACIES
            .iter()
            .map(|acc| ScoreParams {
                mode_vanilla,
                mods: mods.map(|m| m.bits()),
                accuracy: Some(*acc),
                ..ScoreParams::default()
            })
            .collect();

        match self.performance.calculate(&osu_file, &params).await {
            Ok(results) => NP_ACCURACIES
                .iter()
                .zip(results)
                .map(|(acc, rating)| format!("{}%: {:.2}pp", acc, rating.pp))
                .collect::<Vec<_>>()
                .join(" | "),
            Err(err) => {
                log::error!("pp calculation failed: {}", err);
                "Mapfile could not be found; this incident has been reported.".to_string()
            }
        }
    }
}
