use bytes::Bytes;

use bancho::server as out;

use crate::constants::BOT_USER_ID;
use crate::matches::{MatchRegistry, MatchTeam, SlotStatus, TeamType};
use crate::privileges::Privileges;
use crate::registry::{Channel, ChannelRegistry, PlayerRegistry};
use crate::session::Session;

/// The server's entire in-memory state: every session, channel and match.
///
/// Lives behind a single `RwLock`; mutations never suspend, so handlers
/// lock, mutate, enqueue outbound bytes and release before doing I/O. Every
/// cross-object operation (channel membership, spectating, match
/// membership) goes through here so both sides stay consistent.
pub struct World {
    pub players: PlayerRegistry,
    pub channels: ChannelRegistry,
    pub matches: MatchRegistry,
}

/// The user stats packet for a session, from its live status.
pub fn stats_packet(s: &Session) -> Bytes {
    let stats = s.current_stats();
    out::user_stats(
        s.id,
        s.status.action as u8,
        &s.status.info_text,
        &s.status.map_md5,
        s.status.mods.bits() as i32,
        s.status.mode.as_vanilla(),
        s.status.map_id,
        stats.ranked_score,
        stats.accuracy,
        stats.plays,
        stats.total_score,
        stats.global_rank,
        stats.pp,
    )
}

/// The presence packet for a session.
pub fn presence_packet(s: &Session) -> Bytes {
    out::user_presence(
        s.id,
        &s.name,
        s.utc_offset,
        s.geolocation.country_numeric,
        s.client_privileges().bits(),
        s.status.mode.as_vanilla(),
        s.geolocation.longitude,
        s.geolocation.latitude,
        s.current_stats().global_rank,
    )
}

impl World {
    pub fn init() -> World {
        World {
            players: PlayerRegistry::init(),
            channels: ChannelRegistry::init(),
            matches: MatchRegistry::init(),
        }
    }

    pub fn bot_name(&self) -> String {
        self.players
            .get(BOT_USER_ID)
            .map(|bot| bot.name.clone())
            .unwrap_or_else(|| "bot".to_string())
    }

    pub fn enqueue_to(&mut self, user_id: i32, data: &[u8]) {
        if let Some(session) = self.players.get_mut(user_id) {
            session.enqueue(data);
        } else {
            log::debug!("enqueue to missing session {}", user_id);
        }
    }

    /// Send `msg` to `user_id` as a private message from the bot.
    pub fn send_bot_to(&mut self, user_id: i32, msg: &str) {
        let bot_name = self.bot_name();
        if let Some(session) = self.players.get_mut(user_id) {
            let data = out::send_message(&bot_name, msg, &session.name, BOT_USER_ID);
            session.enqueue(&data);
        }
    }

    // ------------------------------------------------------------------
    // channels

    /// Push the channel's updated member count to everyone who can see it:
    /// members only for instanced channels, every reader otherwise.
    pub fn broadcast_channel_info(&mut self, real_name: &str) {
        let (data, instance, members, read_priv) = match self.channels.get(real_name) {
            Some(chan) => (
                out::channel_info(chan.wire_name(), &chan.topic, chan.member_count()),
                chan.instance,
                chan.members.clone(),
                chan.read_priv,
            ),
            None => return,
        };

        if instance {
            for id in members {
                self.enqueue_to(id, &data);
            }
        } else {
            for session in self.players.iter_mut() {
                if read_priv.is_empty() || session.privileges.intersects(read_priv) {
                    session.enqueue(&data);
                }
            }
        }
    }

    /// Add a user to a channel. Fails when already joined, lacking read
    /// privileges, or trying to sit in `#lobby` without being in the lobby.
    pub fn join_channel(&mut self, user_id: i32, real_name: &str) -> bool {
        let wire_name = {
            let Some(chan) = self.channels.get(real_name) else {
                return false;
            };
            let Some(session) = self.players.get(user_id) else {
                return false;
            };
            if chan.contains(user_id)
                || !chan.can_read(session.privileges)
                || (chan.real_name == "#lobby" && !session.in_lobby)
            {
                return false;
            }
            chan.wire_name().to_string()
        };

        self.channels
            .get_mut(real_name)
            .expect("channel disappeared mid-join")
            .members
            .push(user_id);

        let session = self
            .players
            .get_mut(user_id)
            .expect("session disappeared mid-join");
        session.channels.insert(real_name.to_string());
        session.enqueue(&out::channel_join_success(&wire_name));

        self.broadcast_channel_info(real_name);
        true
    }

    /// Remove a user from a channel, destroying instanced channels on last
    /// leave. `kick` additionally tells the client to drop its tab.
    pub fn leave_channel(&mut self, user_id: i32, real_name: &str, kick: bool) {
        let wire_name = {
            let Some(chan) = self.channels.get(real_name) else {
                return;
            };
            if !chan.contains(user_id) {
                return;
            }
            chan.wire_name().to_string()
        };

        let chan = self
            .channels
            .get_mut(real_name)
            .expect("channel disappeared mid-leave");
        chan.members.retain(|id| *id != user_id);
        let destroy = chan.instance && chan.members.is_empty();

        if let Some(session) = self.players.get_mut(user_id) {
            session.channels.remove(real_name);
            if kick {
                session.enqueue(&out::channel_kick(&wire_name));
            }
        }

        if destroy {
            self.channels.remove(real_name);
        } else {
            self.broadcast_channel_info(real_name);
        }
    }

    /// Enqueue raw data to a channel's members, except the immune ids.
    pub fn channel_enqueue(&mut self, real_name: &str, data: &[u8], immune: &[i32]) {
        let members = match self.channels.get(real_name) {
            Some(chan) => chan.members.clone(),
            None => return,
        };
        for id in members {
            if !immune.contains(&id) {
                self.enqueue_to(id, data);
            }
        }
    }

    /// Deliver a user's message to a channel, skipping members who blocked
    /// the sender and (unless `to_self`) the sender themselves.
    pub fn channel_send(&mut self, real_name: &str, text: &str, sender_id: i32, to_self: bool) {
        let (wire_name, members) = match self.channels.get(real_name) {
            Some(chan) => (chan.wire_name().to_string(), chan.members.clone()),
            None => return,
        };
        let sender_name = match self.players.get(sender_id) {
            Some(s) => s.name.clone(),
            None => return,
        };
        let data = out::send_message(&sender_name, text, &wire_name, sender_id);

        for id in members {
            if id == sender_id && !to_self {
                continue;
            }
            if let Some(recipient) = self.players.get_mut(id) {
                if !recipient.blocks.contains(&sender_id) {
                    recipient.enqueue(&data);
                }
            }
        }
    }

    /// Deliver a message to the subset of `recipients` that are members.
    pub fn channel_send_selective(
        &mut self,
        real_name: &str,
        text: &str,
        sender_id: i32,
        recipients: &[i32],
    ) {
        let (wire_name, members) = match self.channels.get(real_name) {
            Some(chan) => (chan.wire_name().to_string(), chan.members.clone()),
            None => return,
        };
        let sender_name = match self.players.get(sender_id) {
            Some(s) => s.name.clone(),
            None => return,
        };
        let data = out::send_message(&sender_name, text, &wire_name, sender_id);

        for id in recipients {
            if members.contains(id) {
                self.enqueue_to(*id, &data);
            }
        }
    }

    /// Say something in a channel as the bot.
    pub fn channel_send_bot(&mut self, real_name: &str, text: &str) {
        let (wire_name, members) = match self.channels.get(real_name) {
            Some(chan) => (chan.wire_name().to_string(), chan.members.clone()),
            None => return,
        };
        let bot_name = self.bot_name();

        // a message this long would crash receiving clients
        let text = if text.len() >= 31979 {
            format!("message would have crashed games ({} chars)", text.len())
        } else {
            text.to_string()
        };

        let data = out::send_message(&bot_name, &text, &wire_name, BOT_USER_ID);
        for id in members {
            self.enqueue_to(id, &data);
        }
    }

    // ------------------------------------------------------------------
    // spectating

    fn spectator_channel_name(host_id: i32) -> String {
        format!("#spec_{}", host_id)
    }

    /// Attach `spectator_id` to `host_id`'s spectator group, creating the
    /// instanced channel (and silently joining the host) on first use.
    pub fn add_spectator(&mut self, host_id: i32, spectator_id: i32) {
        let chan_name = Self::spectator_channel_name(host_id);

        if !self.channels.contains(&chan_name) {
            let host_name = match self.players.get(host_id) {
                Some(host) => host.name.clone(),
                None => return,
            };
            self.channels.append(Channel::instanced(
                &chan_name,
                &format!("{}'s spectator channel", host_name),
            ));
            self.join_channel(host_id, &chan_name);
        }

        if !self.join_channel(spectator_id, &chan_name) {
            log::warn!("{} failed to join {}", spectator_id, chan_name);
            return;
        }

        let stealth = self
            .players
            .get(spectator_id)
            .map(|s| s.stealth)
            .unwrap_or(false);
        let fellows: Vec<i32> = self
            .players
            .get(host_id)
            .map(|h| h.spectators.clone())
            .unwrap_or_default();

        if !stealth {
            let joined = out::fellow_spectator_joined(spectator_id);
            for fellow_id in &fellows {
                self.enqueue_to(*fellow_id, &joined);
                let fellow_packet = out::fellow_spectator_joined(*fellow_id);
                self.enqueue_to(spectator_id, &fellow_packet);
            }
            self.enqueue_to(host_id, &out::spectator_joined(spectator_id));
        } else {
            // one-way: the stealth spectator learns of the others, not
            // vice-versa
            for fellow_id in &fellows {
                let fellow_packet = out::fellow_spectator_joined(*fellow_id);
                self.enqueue_to(spectator_id, &fellow_packet);
            }
        }

        if let Some(host) = self.players.get_mut(host_id) {
            host.spectators.push(spectator_id);
        }
        if let Some(spectator) = self.players.get_mut(spectator_id) {
            spectator.spectating = Some(host_id);
        }

        log::info!("{} is now spectating {}", spectator_id, host_id);
    }

    /// Detach a spectator; tears down the channel when the last one leaves.
    pub fn remove_spectator(&mut self, host_id: i32, spectator_id: i32) {
        if let Some(host) = self.players.get_mut(host_id) {
            host.spectators.retain(|id| *id != spectator_id);
        }
        if let Some(spectator) = self.players.get_mut(spectator_id) {
            spectator.spectating = None;
        }

        let chan_name = Self::spectator_channel_name(host_id);
        self.leave_channel(spectator_id, &chan_name, true);

        let remaining: Vec<i32> = self
            .players
            .get(host_id)
            .map(|h| h.spectators.clone())
            .unwrap_or_default();

        if remaining.is_empty() {
            // the host leaving destroys the instanced channel
            self.leave_channel(host_id, &chan_name, true);
        } else if let Some(chan) = self.channels.get(&chan_name) {
            let info = out::channel_info(chan.wire_name(), &chan.topic, chan.member_count());
            let left = out::fellow_spectator_left(spectator_id);
            self.enqueue_to(host_id, &info);
            for fellow_id in remaining {
                self.enqueue_to(fellow_id, &left);
                self.enqueue_to(fellow_id, &info);
            }
        }

        self.enqueue_to(host_id, &out::spectator_left(spectator_id));
        log::info!("{} is no longer spectating {}", spectator_id, host_id);
    }

    // ------------------------------------------------------------------
    // matches

    /// Enqueue match-scoped data to everyone in the match chat and, when
    /// `lobby` is set, to `#lobby` as well.
    pub fn match_enqueue(&mut self, match_id: u16, data: &[u8], lobby: bool, immune: &[i32]) {
        let chat_name = match self.matches.get(match_id) {
            Some(m) => m.chat_name(),
            None => return,
        };
        self.channel_enqueue(&chat_name, data, immune);

        if lobby {
            self.channel_enqueue("#lobby", data, &[]);
        }
    }

    /// Broadcast the match state: with password to members, without to the
    /// lobby.
    pub fn match_enqueue_state(&mut self, match_id: u16, lobby: bool) {
        let (chat_name, wire) = match self.matches.get(match_id) {
            Some(m) => (m.chat_name(), m.to_wire()),
            None => return,
        };
        self.channel_enqueue(&chat_name, &out::update_match(&wire, true), &[]);

        if lobby {
            self.channel_enqueue("#lobby", &out::update_match(&wire, false), &[]);
        }
    }

    /// Say something in a match's chat as the bot.
    pub fn match_send_bot(&mut self, match_id: u16, text: &str) {
        let chat_name = match self.matches.get(match_id) {
            Some(m) => m.chat_name(),
            None => return,
        };
        self.channel_send_bot(&chat_name, text);
    }

    /// Seat a user in a match. The password check is bypassed for staff and
    /// for the match's own host (fresh creation).
    pub fn join_match(&mut self, user_id: i32, match_id: u16, password: &str) -> bool {
        let fail = out::match_join_fail();

        let Some(session) = self.players.get(user_id) else {
            return false;
        };
        if session.match_id.is_some() {
            log::warn!("{} tried to join multiple matches", user_id);
            self.enqueue_to(user_id, &fail);
            return false;
        }
        let is_staff = session.privileges.intersects(Privileges::STAFF);

        let (chat_name, slot_id, team_mode) = {
            let Some(m) = self.matches.get(match_id) else {
                self.enqueue_to(user_id, &fail);
                return false;
            };
            if m.tourney_clients.contains(&user_id) {
                // observing through a tourney client; playing too is
                // impossible
                self.enqueue_to(user_id, &fail);
                return false;
            }

            let slot_id = if m.host_id != user_id {
                if password != m.password && !is_staff {
                    log::warn!("{} tried to join match {} with a bad password", user_id, match_id);
                    self.enqueue_to(user_id, &fail);
                    return false;
                }
                match m.first_free_slot() {
                    Some(id) => id,
                    None => {
                        self.enqueue_to(user_id, &fail);
                        return false;
                    }
                }
            } else {
                0
            };
            (m.chat_name(), slot_id, m.team_type)
        };

        if !self.join_channel(user_id, &chat_name) {
            log::warn!("{} failed to join {}", user_id, chat_name);
            return false;
        }
        if self
            .players
            .get(user_id)
            .is_some_and(|s| s.channels.contains("#lobby"))
        {
            self.leave_channel(user_id, "#lobby", true);
        }

        let wire = {
            let m = self
                .matches
                .get_mut(match_id)
                .expect("match disappeared mid-join");
            let slot = &mut m.slots[slot_id];
            if matches!(team_mode, TeamType::TeamVs | TeamType::TagTeamVs) {
                slot.team = MatchTeam::Red;
            }
            slot.status = SlotStatus::NotReady;
            slot.user_id = Some(user_id);
            m.to_wire()
        };

        if let Some(session) = self.players.get_mut(user_id) {
            session.match_id = Some(match_id);
            session.enqueue(&out::match_join_success(&wire));
        }
        self.match_enqueue_state(match_id, true);
        true
    }

    /// Remove a user from their match: open (or keep locked) their slot,
    /// transfer host if needed, and destroy the match once deserted.
    pub fn leave_match(&mut self, user_id: i32) {
        let Some(match_id) = self.players.get(user_id).and_then(|s| s.match_id) else {
            log::debug!("{} tried to leave a match they're not in", user_id);
            return;
        };

        let (chat_name, deserted, was_host) = {
            let Some(m) = self.matches.get_mut(match_id) else {
                return;
            };
            if let Some(slot) = m.slot_of_mut(user_id) {
                // kicked players leave their slot locked behind them
                let new_status = if slot.status == SlotStatus::Locked {
                    SlotStatus::Locked
                } else {
                    SlotStatus::Open
                };
                slot.reset(new_status);
            }
            (m.chat_name(), m.is_deserted(), m.host_id == user_id)
        };

        self.leave_channel(user_id, &chat_name, true);

        if deserted {
            log::info!("match {} finished", match_id);
            self.matches.remove(match_id);
            self.channel_enqueue("#lobby", &out::dispose_match(match_id as i32), &[]);
        } else {
            let mut new_host = None;
            let mut ref_removed = false;
            let mut start_cancelled = false;
            if let Some(m) = self.matches.get_mut(match_id) {
                if was_host {
                    // transfer host to the first occupied slot
                    if let Some(id) = m
                        .slots
                        .iter()
                        .find_map(|s| if s.status.has_player() { s.user_id } else { None })
                    {
                        m.host_id = id;
                        new_host = Some(id);
                    }
                }
                ref_removed = m.referees.remove(&user_id);
                if m.starting.as_ref().is_some_and(|p| p.armed_by == user_id) {
                    m.cancel_pending_start();
                    start_cancelled = true;
                }
            }

            if let Some(id) = new_host {
                self.enqueue_to(id, &out::match_transfer_host());
            }
            if start_cancelled {
                self.match_send_bot(match_id, "Match start cancelled (host left).");
            }
            if ref_removed {
                let name = self
                    .players
                    .get(user_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                self.match_send_bot(match_id, &format!("{} removed from match referees.", name));
            }
            self.match_enqueue_state(match_id, true);
        }

        if let Some(session) = self.players.get_mut(user_id) {
            session.match_id = None;
        }
    }

    // ------------------------------------------------------------------
    // lifecycle

    /// Tear down a session completely: match, spectating, channels, then
    /// the registry entry itself. Broadcasts the logout unless restricted.
    pub fn logout(&mut self, user_id: i32) {
        if !self.players.contains(user_id) {
            return;
        }

        if self.players.get(user_id).is_some_and(|s| s.match_id.is_some()) {
            self.leave_match(user_id);
        }

        if let Some(host_id) = self.players.get(user_id).and_then(|s| s.spectating) {
            self.remove_spectator(host_id, user_id);
        }

        let channels: Vec<String> = self
            .players
            .get(user_id)
            .map(|s| s.channels.iter().cloned().collect())
            .unwrap_or_default();
        for chan in channels {
            self.leave_channel(user_id, &chan, false);
        }

        if let Some(removed) = self.players.remove(user_id) {
            if !removed.restricted() {
                self.players.enqueue_all(&out::logout(user_id), &[]);
            }
            log::info!("{} ({}) logged out", removed.name, removed.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn world_with_users(ids: &[i32]) -> World {
        let mut world = World::init();
        let mut bot = Session::new(BOT_USER_ID, "Tomoko", Privileges::all());
        bot.is_bot = true;
        world.players.insert(bot);
        for id in ids {
            world
                .players
                .insert(Session::new(*id, &format!("user{}", id), Privileges::UNRESTRICTED));
        }
        world.channels.append(Channel::new(
            "#osu",
            "general",
            Privileges::UNRESTRICTED,
            Privileges::UNRESTRICTED,
            true,
            false,
        ));
        world
    }

    #[test]
    fn channel_membership_is_symmetric() {
        let mut world = world_with_users(&[3, 4]);

        assert!(world.join_channel(3, "#osu"));
        assert!(world.channels.get("#osu").unwrap().contains(3));
        assert!(world.players.get(3).unwrap().channels.contains("#osu"));

        // double-join fails
        assert!(!world.join_channel(3, "#osu"));

        world.leave_channel(3, "#osu", true);
        assert!(!world.channels.get("#osu").unwrap().contains(3));
        assert!(!world.players.get(3).unwrap().channels.contains("#osu"));
    }

    #[test]
    fn lobby_needs_lobby_state() {
        let mut world = world_with_users(&[3]);
        world.channels.append(Channel::new(
            "#lobby",
            "",
            Privileges::UNRESTRICTED,
            Privileges::UNRESTRICTED,
            false,
            false,
        ));

        assert!(!world.join_channel(3, "#lobby"));
        world.players.get_mut(3).unwrap().in_lobby = true;
        assert!(world.join_channel(3, "#lobby"));
    }

    #[test]
    fn spectator_fanout_counts() {
        let mut world = world_with_users(&[10, 11, 12, 13]);

        world.add_spectator(10, 11);
        world.add_spectator(10, 12);

        // drain buffers before the interesting join
        for id in [10, 11, 12, 13] {
            world.players.get_mut(id).unwrap().dequeue();
        }

        world.add_spectator(10, 13);

        // X and Y each get exactly one FELLOW_SPECTATOR_JOINED(Z)
        let x = world.players.get_mut(11).unwrap().dequeue();
        let count = |buf: &[u8], id: u16| {
            bancho::PacketStream::new(buf)
                .filter_map(Result::ok)
                .filter(|f| f.id == id)
                .count()
        };
        assert_eq!(count(&x, 42), 1);
        let y = world.players.get_mut(12).unwrap().dequeue();
        assert_eq!(count(&y, 42), 1);

        // Z gets one per existing fellow
        let z = world.players.get_mut(13).unwrap().dequeue();
        assert_eq!(count(&z, 42), 2);

        // the host gets SPECTATOR_JOINED
        let h = world.players.get_mut(10).unwrap().dequeue();
        assert_eq!(count(&h, 13), 1);
    }

    #[test]
    fn last_spectator_leaving_destroys_channel() {
        let mut world = world_with_users(&[10, 11]);
        world.add_spectator(10, 11);
        assert!(world.channels.contains("#spec_10"));

        world.remove_spectator(10, 11);
        assert!(!world.channels.contains("#spec_10"));
        assert!(world.players.get(10).unwrap().spectators.is_empty());
        assert!(world.players.get(11).unwrap().spectating.is_none());
    }

    #[test]
    fn logout_clears_all_membership() {
        let mut world = world_with_users(&[3, 4]);
        world.join_channel(3, "#osu");
        world.join_channel(4, "#osu");
        world.add_spectator(4, 3);

        world.logout(3);

        assert!(world.players.get(3).is_none());
        assert!(!world.channels.get("#osu").unwrap().contains(3));
        assert!(world.players.get(4).unwrap().spectators.is_empty());
    }
}
