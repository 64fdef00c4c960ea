//! Per-packet handlers. Each locks the world, mutates, enqueues, and
//! releases before any I/O; state-precondition failures drop with a debug
//! log line, per-protocol misbehaviour logs a warning.

use bancho::{MatchData, ReplayFrameBundle};

use bancho::server as out;

use crate::constants::{IGNORED_CHANNELS, LOGOUT_GUARD_SECS, MAX_MATCH_NAME_LENGTH};
use crate::gamemode::GameMode;
use crate::matches::{Match, MatchTeam, SlotStatus, TeamType, WinCondition, MAX_MATCHES};
use crate::mods::Mods;
use crate::privileges::Privileges;
use crate::registry::Channel;
use crate::server::Server;
use crate::session::{Action, PresenceFilter};
use crate::world::{presence_packet, stats_packet};

const MAX_MATCHES_U16: u16 = MAX_MATCHES as u16;

fn validate_match_data(data: &MatchData, expected_host_id: i32) -> bool {
    data.host_id == expected_host_id && data.name.chars().count() <= MAX_MATCH_NAME_LENGTH
}

impl Server {
    pub async fn handle_change_action(
        &self,
        user_id: i32,
        action: u8,
        info_text: String,
        map_md5: String,
        mods: u32,
        mode: u8,
        map_id: i32,
    ) {
        let mut mods = Mods::from_bits_retain(mods);
        let mode = GameMode::from_vanilla(mode, &mut mods);

        let mut world = self.world.write().await;
        let Some(session) = world.players.get_mut(user_id) else {
            return;
        };
        session.status.action = Action::from_u8(action);
        session.status.info_text = info_text;
        session.status.map_md5 = map_md5;
        session.status.mods = mods;
        session.status.mode = mode;
        session.status.map_id = map_id;

        if !session.restricted() {
            let stats = stats_packet(session);
            world.players.enqueue_all(&stats, &[]);
        }
    }

    pub async fn handle_logout(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(session) = world.players.get(user_id) else {
            return;
        };
        // the client tends to fire a stray logout right after login
        if session.login_time.elapsed().as_secs() < LOGOUT_GUARD_SECS {
            return;
        }
        world.logout(user_id);
        drop(world);
        self.touch_latest_activity(user_id);
    }

    pub async fn handle_stats_update_request(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(session) = world.players.get(user_id) else {
            return;
        };
        let stats = stats_packet(session);
        world.enqueue_to(user_id, &stats);
    }

    pub async fn handle_start_spectating(&self, user_id: i32, target_id: i32) {
        let mut world = self.world.write().await;
        if !world.players.contains(target_id) {
            log::warn!("{} tried to spectate nonexistent id {}", user_id, target_id);
            return;
        }

        let current_host = world.players.get(user_id).and_then(|s| s.spectating);
        match current_host {
            Some(host_id) if host_id == target_id => {
                // the host didn't change: the spectator had to re-request
                // after downloading the map; re-announce them
                let stealth = world
                    .players
                    .get(user_id)
                    .map(|s| s.stealth)
                    .unwrap_or(false);
                if !stealth {
                    world.enqueue_to(host_id, &out::spectator_joined(user_id));
                    let fellows: Vec<i32> = world
                        .players
                        .get(host_id)
                        .map(|h| h.spectators.clone())
                        .unwrap_or_default();
                    let joined = out::fellow_spectator_joined(user_id);
                    for fellow in fellows {
                        if fellow != user_id {
                            world.enqueue_to(fellow, &joined);
                        }
                    }
                }
                return;
            }
            Some(host_id) => world.remove_spectator(host_id, user_id),
            None => {}
        }

        world.add_spectator(target_id, user_id);
    }

    pub async fn handle_stop_spectating(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(host_id) = world.players.get(user_id).and_then(|s| s.spectating) else {
            log::debug!("{} tried to stop spectating while not spectating", user_id);
            return;
        };
        world.remove_spectator(host_id, user_id);
    }

    pub async fn handle_spectate_frames(&self, user_id: i32, bundle: ReplayFrameBundle) {
        // relay the original bytes; these arrive too often to re-encode
        let data = out::spectate_frames(&bundle.raw);

        let mut world = self.world.write().await;
        let spectators: Vec<i32> = world
            .players
            .get(user_id)
            .map(|s| s.spectators.clone())
            .unwrap_or_default();
        for spectator in spectators {
            world.enqueue_to(spectator, &data);
        }
    }

    pub async fn handle_cant_spectate(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(session) = world.players.get(user_id) else {
            return;
        };
        let Some(host_id) = session.spectating else {
            log::debug!("{} sent can't-spectate while not spectating", user_id);
            return;
        };
        if session.stealth {
            return;
        }

        let data = out::spectator_cant_spectate(user_id);
        let fellows: Vec<i32> = world
            .players
            .get(host_id)
            .map(|h| h.spectators.clone())
            .unwrap_or_default();
        world.enqueue_to(host_id, &data);
        for fellow in fellows {
            world.enqueue_to(fellow, &data);
        }
    }

    pub async fn handle_lobby_part(&self, user_id: i32) {
        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(user_id) {
            session.in_lobby = false;
        }
    }

    pub async fn handle_lobby_join(&self, user_id: i32) {
        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(user_id) {
            session.in_lobby = true;
        }
        let frames: Vec<bytes::Bytes> = world
            .matches
            .iter()
            .map(|m| out::new_match(&m.to_wire()))
            .collect();
        for frame in frames {
            world.enqueue_to(user_id, &frame);
        }
    }

    pub async fn handle_match_create(&self, user_id: i32, data: MatchData) {
        if !validate_match_data(&data, user_id) {
            log::warn!("{} tried to create a match with invalid data", user_id);
            return;
        }

        let mut world = self.world.write().await;
        let Some(session) = world.players.get(user_id) else {
            return;
        };
        if session.restricted() {
            world.enqueue_to(user_id, &out::match_join_fail());
            world.enqueue_to(
                user_id,
                &out::notification("Multiplayer is not available while restricted."),
            );
            return;
        }
        if session.silenced() {
            world.enqueue_to(user_id, &out::match_join_fail());
            world.enqueue_to(
                user_id,
                &out::notification("Multiplayer is not available while silenced."),
            );
            return;
        }

        let Some(match_id) = world.matches.first_free_id() else {
            world.send_bot_to(user_id, "Failed to create match (no slots available).");
            world.enqueue_to(user_id, &out::match_join_fail());
            return;
        };

        // a `//private` suffix keeps the match out of public history
        let password = data.password.trim_end_matches("//private").to_string();
        let has_public_history = !data.password.ends_with("//private");

        let mut mods = Mods::from_bits_retain(data.mods);
        let mode = GameMode::from_vanilla(data.mode, &mut mods);

        let m = Match {
            id: match_id,
            name: data.name.clone(),
            password: password.clone(),
            has_public_history,
            map_name: data.map_name.clone(),
            map_id: data.map_id,
            map_md5: data.map_md5.clone(),
            host_id: user_id,
            mode,
            mods,
            freemods: data.freemods,
            win_condition: WinCondition::from_u8(data.win_condition),
            team_type: TeamType::from_u8(data.team_type),
            seed: data.seed,
            ..Match::default()
        };
        let chat_name = m.chat_name();

        world.channels.append(Channel::instanced(
            &chat_name,
            &format!("Multiplayer match #{}.", match_id),
        ));
        world.matches.insert(m);

        let creator_name = world
            .players
            .get(user_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        if world.join_match(user_id, match_id, &password) {
            let wire = world_match_wire(&world, match_id);
            world.channel_enqueue("#lobby", &out::new_match(&wire), &[]);
            world.match_send_bot(match_id, &format!("Match created by {}.", creator_name));
            log::info!("{} created match {}", creator_name, match_id);
        } else {
            // nobody made it in; tear the shell down
            world.matches.remove(match_id);
            world.channels.remove(&chat_name);
        }
        drop(world);
        self.touch_latest_activity(user_id);
    }

    pub async fn handle_match_join(&self, user_id: i32, match_id: i32, password: String) {
        if !(0..MAX_MATCHES_U16 as i32).contains(&match_id) {
            let mut world = self.world.write().await;
            world.enqueue_to(user_id, &out::match_join_fail());
            return;
        }

        let mut world = self.world.write().await;
        let Some(session) = world.players.get(user_id) else {
            return;
        };
        if session.restricted() {
            world.enqueue_to(user_id, &out::match_join_fail());
            world.enqueue_to(
                user_id,
                &out::notification("Multiplayer is not available while restricted."),
            );
            return;
        }
        if session.silenced() {
            world.enqueue_to(user_id, &out::match_join_fail());
            world.enqueue_to(
                user_id,
                &out::notification("Multiplayer is not available while silenced."),
            );
            return;
        }

        world.join_match(user_id, match_id as u16, &password);
        drop(world);
        self.touch_latest_activity(user_id);
    }

    pub async fn handle_match_part(&self, user_id: i32) {
        let mut world = self.world.write().await;
        world.leave_match(user_id);
        drop(world);
        self.touch_latest_activity(user_id);
    }

    pub async fn handle_match_change_slot(&self, user_id: i32, slot_id: i32) {
        if !(0..16).contains(&slot_id) {
            return;
        }
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(m) = world.matches.get_mut(match_id) else {
            return;
        };
        if m.slots[slot_id as usize].status != SlotStatus::Open {
            log::warn!("{} tried to move into a non-open slot", user_id);
            return;
        }
        let Some(current) = m.slot_id_of(user_id) else {
            return;
        };

        let occupied = m.slots[current];
        m.slots[slot_id as usize].copy_from(&occupied);
        m.slots[current].reset(SlotStatus::Open);

        world.match_enqueue_state(match_id, true);
    }

    pub async fn handle_match_ready(&self, user_id: i32) {
        self.set_own_slot_status(user_id, SlotStatus::Ready).await;
    }

    pub async fn handle_match_not_ready(&self, user_id: i32) {
        self.set_own_slot_status(user_id, SlotStatus::NotReady).await;
    }

    pub async fn handle_match_no_beatmap(&self, user_id: i32) {
        self.set_own_slot_status(user_id, SlotStatus::NoMap).await;
    }

    pub async fn handle_match_has_beatmap(&self, user_id: i32) {
        self.set_own_slot_status(user_id, SlotStatus::NotReady).await;
    }

    async fn set_own_slot_status(&self, user_id: i32, status: SlotStatus) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            log::debug!("{} adjusted a slot while not in a match", user_id);
            return;
        };
        let Some(m) = world.matches.get_mut(match_id) else {
            return;
        };
        let Some(slot) = m.slot_of_mut(user_id) else {
            return;
        };
        slot.status = status;
        world.match_enqueue_state(match_id, false);
    }

    pub async fn handle_match_lock(&self, user_id: i32, slot_id: i32) {
        if !(0..16).contains(&slot_id) {
            return;
        }
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(m) = world.matches.get_mut(match_id) else {
            return;
        };
        if m.host_id != user_id {
            log::warn!("{} attempted to lock a match as non-host", user_id);
            return;
        }

        let slot = &mut m.slots[slot_id as usize];
        if slot.status == SlotStatus::Locked {
            slot.status = SlotStatus::Open;
        } else {
            if slot.user_id == Some(user_id) {
                // the host can't lock themselves out by clicking their crown
                return;
            }
            slot.status = SlotStatus::Locked;
        }

        world.match_enqueue_state(match_id, true);
    }

    pub async fn handle_match_change_settings(&self, user_id: i32, data: MatchData) {
        if !validate_match_data(&data, user_id) {
            log::warn!("{} tried to change match settings with invalid data", user_id);
            return;
        }

        // a fresh map selection resolves against the catalog, which can't
        // happen under the world lock
        let (needs_map_lookup, host_mode_vanilla) = {
            let world = self.world.read().await;
            let Some(session) = world.players.get(user_id) else {
                return;
            };
            let Some(match_id) = session.match_id else {
                return;
            };
            let Some(m) = world.matches.get(match_id) else {
                return;
            };
            if m.host_id != user_id {
                log::warn!("{} attempted to change settings as non-host", user_id);
                return;
            }
            (
                data.map_id != -1 && m.map_id == -1,
                session.status.mode.as_vanilla(),
            )
        };
        let resolved_map = if needs_map_lookup {
            self.beatmaps.by_md5(&data.map_md5).await.ok().flatten()
        } else {
            None
        };

        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };

        let mut selected_embed = None;
        let mut scrim_hint = None;
        {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            if m.host_id != user_id {
                return;
            }

            if data.freemods != m.freemods {
                m.freemods = data.freemods;
                if data.freemods {
                    // match mods -> active slot mods, speed mods stay
                    let shared = m.mods & !Mods::SPEED_CHANGING;
                    for slot in m.slots.iter_mut() {
                        if slot.user_id.is_some() {
                            slot.mods = shared;
                        }
                    }
                    m.mods &= Mods::SPEED_CHANGING;
                } else {
                    // host mods -> match mods
                    let host_mods = m.host_slot_mut().map(|s| s.mods).unwrap_or(Mods::empty());
                    m.mods &= Mods::SPEED_CHANGING;
                    m.mods |= host_mods;
                    for slot in m.slots.iter_mut() {
                        if slot.user_id.is_some() {
                            slot.mods = Mods::empty();
                        }
                    }
                }
            }

            if data.map_id == -1 {
                // map is being changed; unready and remember the old one
                m.unready_players(SlotStatus::Ready);
                if m.map_id != -1 {
                    m.prev_map_id = m.map_id;
                }
                m.map_id = -1;
                m.map_md5.clear();
                m.map_name.clear();
            } else if m.map_id == -1 {
                if m.prev_map_id != data.map_id {
                    selected_embed = Some(format!(
                        "[{} {}]",
                        format!("https://osu.{}/b/{}", self.config.domain, data.map_id),
                        data.map_name
                    ));
                }

                match &resolved_map {
                    Some(beatmap) => {
                        m.map_id = beatmap.id;
                        m.map_md5 = beatmap.md5.clone();
                        m.map_name = beatmap.full_name();
                        // the host's selected mode wins for known maps
                        m.mode = GameMode::from_u8(host_mode_vanilla).unwrap_or_default();
                    }
                    None => {
                        // unknown to the catalog; trust the client
                        m.map_id = data.map_id;
                        m.map_md5 = data.map_md5.clone();
                        m.map_name = data.map_name.clone();
                        m.mode = GameMode::from_u8(data.mode).unwrap_or_default();
                    }
                }
            }

            let new_team_type = TeamType::from_u8(data.team_type);
            if m.team_type != new_team_type {
                if m.is_scrimming {
                    // team layout is part of the running score; refuse
                    let label = match new_team_type {
                        TeamType::HeadToHead => "head-to-head",
                        TeamType::TagCoop => "tag-coop",
                        TeamType::TeamVs => "team-vs",
                        TeamType::TagTeamVs => "tag-team-vs",
                    };
                    scrim_hint = Some(format!(
                        "Changing team type while scrimming will reset the overall score - \
                         to do so, please use the !mp teams {} command.",
                        label
                    ));
                } else {
                    let default_team = if new_team_type.is_ffa() {
                        MatchTeam::Neutral
                    } else {
                        MatchTeam::Red
                    };
                    for slot in m.slots.iter_mut() {
                        if slot.user_id.is_some() {
                            slot.team = default_team;
                        }
                    }
                    m.team_type = new_team_type;
                }
            }

            let new_win_condition = WinCondition::from_u8(data.win_condition);
            if m.win_condition != new_win_condition {
                if m.use_pp_scoring {
                    m.use_pp_scoring = false;
                }
                m.win_condition = new_win_condition;
            }

            m.name = data.name.clone();
        }

        if let Some(embed) = selected_embed {
            world.match_send_bot(match_id, &format!("Selected: {}.", embed));
        }
        if let Some(hint) = scrim_hint {
            world.match_send_bot(match_id, &hint);
        }
        world.match_enqueue_state(match_id, true);
    }

    pub async fn handle_match_start(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(m) = world.matches.get(match_id) else {
            return;
        };
        if m.host_id != user_id {
            log::warn!("{} attempted to start a match as non-host", user_id);
            return;
        }
        Server::start_match(&mut world, match_id);
    }

    pub async fn handle_match_score_update(&self, user_id: i32, payload: Vec<u8>) {
        // runs extremely frequently while a match plays; keep it lean
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(slot_id) = world
            .matches
            .get(match_id)
            .and_then(|m| m.slot_id_of(user_id))
        else {
            return;
        };

        let data = out::match_score_update_raw(payload, slot_id as u8);
        world.match_enqueue(match_id, &data, false, &[]);
    }

    pub async fn handle_match_complete(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            log::debug!("{} sent match-complete outside a match", user_id);
            return;
        };

        let scrim_players = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            let Some(slot) = m.slot_of_mut(user_id) else {
                return;
            };
            slot.status = SlotStatus::Complete;

            if m.slots.iter().any(|s| s.status == SlotStatus::Playing) {
                return;
            }

            // those still seated but not playing only need the new state,
            // not the completion packet
            let not_playing: Vec<i32> = m
                .slots
                .iter()
                .filter_map(|s| {
                    s.user_id
                        .filter(|_| s.status != SlotStatus::Complete)
                })
                .collect();
            let was_playing: Vec<(i32, MatchTeam)> = m
                .slots
                .iter()
                .filter_map(|s| {
                    s.user_id
                        .filter(|id| !not_playing.contains(id))
                        .map(|id| (id, s.team))
                })
                .collect();

            m.unready_players(SlotStatus::Complete);
            m.reset_loaded_flags();
            m.in_progress = false;

            let scrim = m.is_scrimming;
            world.match_enqueue(match_id, &out::match_complete(), false, &not_playing);
            world.match_enqueue_state(match_id, true);

            if scrim {
                Some(was_playing)
            } else {
                None
            }
        };
        drop(world);

        if let Some(was_playing) = scrim_players {
            // score submissions trickle in; settle the point off-loop
            self.spawn_scrim_scoring(match_id, was_playing);
        }
    }

    pub async fn handle_match_change_mods(&self, user_id: i32, mods: u32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(m) = world.matches.get_mut(match_id) else {
            return;
        };
        let mods = Mods::from_bits_retain(mods);

        if m.freemods {
            if m.host_id == user_id {
                m.mods = mods & Mods::SPEED_CHANGING;
            }
            if let Some(slot) = m.slot_of_mut(user_id) {
                slot.mods = mods & !Mods::SPEED_CHANGING;
            }
        } else {
            if m.host_id != user_id {
                log::warn!("{} attempted to change mods as non-host", user_id);
                return;
            }
            m.mods = mods;
        }

        world.match_enqueue_state(match_id, true);
    }

    pub async fn handle_match_load_complete(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let all_loaded = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            let Some(slot) = m.slot_of_mut(user_id) else {
                return;
            };
            slot.loaded = true;
            !m.slots
                .iter()
                .any(|s| s.status == SlotStatus::Playing && !s.loaded)
        };

        if all_loaded {
            world.match_enqueue(match_id, &out::match_all_players_loaded(), false, &[]);
        }
    }

    pub async fn handle_match_failed(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(slot_id) = world
            .matches
            .get(match_id)
            .and_then(|m| m.slot_id_of(user_id))
        else {
            return;
        };
        world.match_enqueue(match_id, &out::match_player_failed(slot_id as i32), false, &[]);
    }

    pub async fn handle_match_skip_request(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let all_skipped = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            let Some(slot) = m.slot_of_mut(user_id) else {
                return;
            };
            slot.skipped = true;
            !m.slots
                .iter()
                .any(|s| s.status == SlotStatus::Playing && !s.skipped)
        };

        world.match_enqueue(match_id, &out::match_player_skipped(user_id), false, &[]);
        if all_skipped {
            world.match_enqueue(match_id, &out::match_skip(), false, &[]);
        }
    }

    pub async fn handle_channel_join(&self, user_id: i32, name: String) {
        if IGNORED_CHANNELS.contains(&name.as_str()) {
            return;
        }
        let mut world = self.world.write().await;
        if !world.join_channel(user_id, &name) {
            log::warn!("{} failed to join {}", user_id, name);
        }
    }

    pub async fn handle_channel_part(&self, user_id: i32, name: String) {
        if IGNORED_CHANNELS.contains(&name.as_str()) {
            return;
        }
        let mut world = self.world.write().await;
        if !world.channels.contains(&name) {
            log::warn!("{} failed to leave {}", user_id, name);
            return;
        }
        world.leave_channel(user_id, &name, true);
    }

    pub async fn handle_match_transfer_host(&self, user_id: i32, slot_id: i32) {
        if !(0..16).contains(&slot_id) {
            return;
        }
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let target = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            if m.host_id != user_id {
                log::warn!("{} attempted to transfer host as non-host", user_id);
                return;
            }
            let Some(target) = m.slots[slot_id as usize].user_id else {
                log::warn!("{} tried to transfer host to an empty slot", user_id);
                return;
            };
            m.host_id = target;
            target
        };

        world.enqueue_to(target, &out::match_transfer_host());
        world.match_enqueue_state(match_id, true);
    }

    pub async fn handle_friend_add(&self, user_id: i32, target_id: i32) {
        {
            let mut world = self.world.write().await;
            if !world.players.contains(target_id) {
                log::warn!("{} tried to friend offline user {}", user_id, target_id);
                return;
            }
            if target_id == crate::constants::BOT_USER_ID {
                return;
            }
            let Some(session) = world.players.get_mut(user_id) else {
                return;
            };
            if session.friends.contains(&target_id) {
                log::warn!("{} tried to friend {} twice", user_id, target_id);
                return;
            }
            session.blocks.remove(&target_id);
            session.friends.insert(target_id);
        }

        if let Err(err) = self
            .db
            .upsert_relationship(user_id, target_id, crate::database::RelationshipKind::Friend)
            .await
        {
            log::error!("failed to persist friendship: {}", err);
        }
        self.touch_latest_activity(user_id);
    }

    pub async fn handle_friend_remove(&self, user_id: i32, target_id: i32) {
        {
            let mut world = self.world.write().await;
            if !world.players.contains(target_id) {
                log::warn!("{} tried to unfriend offline user {}", user_id, target_id);
                return;
            }
            if target_id == crate::constants::BOT_USER_ID {
                return;
            }
            let Some(session) = world.players.get_mut(user_id) else {
                return;
            };
            if !session.friends.remove(&target_id) {
                log::warn!("{} tried to unfriend non-friend {}", user_id, target_id);
                return;
            }
        }

        if let Err(err) = self.db.delete_relationship(user_id, target_id).await {
            log::error!("failed to delete friendship: {}", err);
        }
        self.touch_latest_activity(user_id);
    }

    pub async fn handle_match_change_team(&self, user_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        let Some(m) = world.matches.get_mut(match_id) else {
            return;
        };
        let Some(slot) = m.slot_of_mut(user_id) else {
            return;
        };
        slot.team = match slot.team {
            MatchTeam::Blue => MatchTeam::Red,
            _ => MatchTeam::Blue,
        };
        world.match_enqueue_state(match_id, false);
    }

    pub async fn handle_receive_updates(&self, user_id: i32, value: i32) {
        let filter = match value {
            0 => PresenceFilter::Nil,
            1 => PresenceFilter::All,
            2 => PresenceFilter::Friends,
            _ => {
                log::warn!("{} sent an invalid presence filter {}", user_id, value);
                return;
            }
        };
        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(user_id) {
            session.presence_filter = filter;
        }
    }

    pub async fn handle_set_away_message(&self, user_id: i32, text: String) {
        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(user_id) {
            session.away_message = (!text.is_empty()).then_some(text);
        }
    }

    pub async fn handle_user_stats_request(&self, user_id: i32, user_ids: Vec<i32>) {
        let mut world = self.world.write().await;
        for target_id in user_ids {
            if target_id == user_id {
                continue;
            }
            let packet = match world.players.get(target_id) {
                Some(target) if target.is_bot => self.bot_status.stats(),
                Some(target) if !target.restricted() => stats_packet(target),
                _ => continue,
            };
            world.enqueue_to(user_id, &packet);
        }
    }

    pub async fn handle_match_invite(&self, user_id: i32, target_id: i32) {
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        if !world.players.contains(target_id) {
            log::warn!("{} tried to invite offline user {}", user_id, target_id);
            return;
        }
        if target_id == crate::constants::BOT_USER_ID {
            world.send_bot_to(user_id, "I'm too busy!");
            return;
        }

        let (sender_name, embed) = {
            let Some(m) = world.matches.get(match_id) else {
                return;
            };
            let name = world
                .players
                .get(user_id)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            (name, m.embed())
        };
        let target_name = world
            .players
            .get(target_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();

        world.enqueue_to(
            target_id,
            &out::match_invite(&sender_name, user_id, &target_name, &embed),
        );
        drop(world);
        self.touch_latest_activity(user_id);
        log::info!("{} invited {} to their match", user_id, target_id);
    }

    pub async fn handle_match_change_password(&self, user_id: i32, data: MatchData) {
        if !validate_match_data(&data, user_id) {
            log::warn!("{} tried to change match password with invalid data", user_id);
            return;
        }
        let mut world = self.world.write().await;
        let Some(match_id) = world.players.get(user_id).and_then(|s| s.match_id) else {
            return;
        };
        {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            if m.host_id != user_id {
                log::warn!("{} attempted to change the password as non-host", user_id);
                return;
            }
            m.password = data.password.clone();
        }
        world.match_enqueue_state(match_id, true);
    }

    pub async fn handle_tourney_match_info(&self, user_id: i32, match_id: i32) {
        if !(0..MAX_MATCHES_U16 as i32).contains(&match_id) {
            return;
        }
        let mut world = self.world.write().await;
        let allowed = world
            .players
            .get(user_id)
            .is_some_and(|s| s.privileges.intersects(Privileges::DONATOR));
        if !allowed {
            return;
        }
        let Some(wire) = world.matches.get(match_id as u16).map(Match::to_wire) else {
            return;
        };
        world.enqueue_to(user_id, &out::update_match(&wire, false));
    }

    pub async fn handle_tourney_join_channel(&self, user_id: i32, match_id: i32) {
        if !(0..MAX_MATCHES_U16 as i32).contains(&match_id) {
            return;
        }
        let match_id = match_id as u16;

        let mut world = self.world.write().await;
        let allowed = world
            .players
            .get(user_id)
            .is_some_and(|s| s.privileges.intersects(Privileges::DONATOR));
        if !allowed {
            return;
        }
        let chat_name = {
            let Some(m) = world.matches.get(match_id) else {
                return;
            };
            if m.slot_of(user_id).is_some() {
                // already playing in this match
                return;
            }
            m.chat_name()
        };

        if world.join_channel(user_id, &chat_name) {
            if let Some(m) = world.matches.get_mut(match_id) {
                m.tourney_clients.insert(user_id);
            }
        }
    }

    pub async fn handle_tourney_leave_channel(&self, user_id: i32, match_id: i32) {
        if !(0..MAX_MATCHES_U16 as i32).contains(&match_id) {
            return;
        }
        let match_id = match_id as u16;

        let mut world = self.world.write().await;
        let chat_name = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return;
            };
            if !m.tourney_clients.remove(&user_id) {
                return;
            }
            m.chat_name()
        };
        world.leave_channel(user_id, &chat_name, true);
    }

    pub async fn handle_user_presence_request(&self, user_id: i32, user_ids: Vec<i32>) {
        let mut world = self.world.write().await;
        for target_id in user_ids {
            let packet = match world.players.get(target_id) {
                Some(target) if target.is_bot => self.bot_status.presence(),
                Some(target) => presence_packet(target),
                None => continue,
            };
            world.enqueue_to(user_id, &packet);
        }
    }

    pub async fn handle_user_presence_request_all(&self, user_id: i32) {
        // only sent when >256 players are visible to the client
        let mut world = self.world.write().await;
        let packets: Vec<bytes::Bytes> = world
            .players
            .iter()
            .filter(|s| !s.restricted())
            .map(presence_packet)
            .collect();
        for packet in packets {
            world.enqueue_to(user_id, &packet);
        }
    }

    pub async fn handle_toggle_block_dms(&self, user_id: i32, value: i32) {
        let mut world = self.world.write().await;
        if let Some(session) = world.players.get_mut(user_id) {
            session.pm_private = value == 1;
        }
        drop(world);
        self.touch_latest_activity(user_id);
    }
}

/// The wire snapshot of a match, for broadcast outside `Match` methods.
fn world_match_wire(world: &crate::world::World, match_id: u16) -> MatchData {
    world
        .matches
        .get(match_id)
        .map(Match::to_wire)
        .unwrap_or_default()
}
