//! The `!mp` set: match management for referees, the host, and tournament
//! managers. The dispatcher has already verified the sender may run these
//! and that the message came from the match's own channel.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use rand::distributions::Alphanumeric;
use rand::Rng;

use bancho::server as out;

use crate::constants::{BEST_OF, BOT_USER_ID, MAPPOOL_PICK, START_ALERT_LADDER};
use crate::gamemode::GameMode;
use crate::matches::{
    LoadedPool, MatchTeam, PendingStart, ScrimKey, SlotStatus, TeamType, WinCondition,
};
use crate::mods::Mods;
use crate::privileges::Privileges;
use crate::server::Server;

use super::{set_help, CmdResult, Command, Context};

pub static COMMANDS: &[Command] = &[
    Command {
        triggers: &["help", "h"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Show all documented multiplayer commands the player can access.",
        callback: mp_help,
    },
    Command {
        triggers: &["start", "st"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Start the current multiplayer match, with any players ready.",
        callback: mp_start,
    },
    Command {
        triggers: &["abort", "a"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Abort the current in-progress multiplayer match.",
        callback: mp_abort,
    },
    Command {
        triggers: &["map"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Set the current match's current map by id.",
        callback: mp_map,
    },
    Command {
        triggers: &["mods"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Set the current match's mods, from string form.",
        callback: mp_mods,
    },
    Command {
        triggers: &["freemods", "fm", "fmods"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Toggle freemods status for the match.",
        callback: mp_freemods,
    },
    Command {
        triggers: &["host"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Set the current match's current host by id.",
        callback: mp_host,
    },
    Command {
        triggers: &["randpw"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Randomize the current match's password.",
        callback: mp_randpw,
    },
    Command {
        triggers: &["invite", "inv"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Invite a player to the current match by name.",
        callback: mp_invite,
    },
    Command {
        triggers: &["addref"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Add a referee to the current match by name.",
        callback: mp_addref,
    },
    Command {
        triggers: &["rmref"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Remove a referee from the current match by name.",
        callback: mp_rmref,
    },
    Command {
        triggers: &["listref"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "List all referees from the current match.",
        callback: mp_listref,
    },
    Command {
        triggers: &["lock"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Lock all unused slots in the current match.",
        callback: mp_lock,
    },
    Command {
        triggers: &["unlock"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Unlock locked slots in the current match.",
        callback: mp_unlock,
    },
    Command {
        triggers: &["teams"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Change the team type for the current match.",
        callback: mp_teams,
    },
    Command {
        triggers: &["condition", "cond"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Change the win condition for the match.",
        callback: mp_condition,
    },
    Command {
        triggers: &["scrim", "autoref"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Start a scrim in the current match.",
        callback: mp_scrim,
    },
    Command {
        triggers: &["endscrim", "end"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "End the current matches ongoing scrim.",
        callback: mp_endscrim,
    },
    Command {
        triggers: &["rematch", "rm"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Restart a scrim, or roll back previous match point.",
        callback: mp_rematch,
    },
    Command {
        triggers: &["force", "f"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: true,
        doc: "Force a player into the current match by name.",
        callback: mp_force,
    },
    Command {
        triggers: &["loadpool", "lp"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Load a mappool into the current match.",
        callback: mp_loadpool,
    },
    Command {
        triggers: &["unloadpool", "ulp"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Unload the current matches mappool.",
        callback: mp_unloadpool,
    },
    Command {
        triggers: &["ban"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Ban a pick in the currently loaded mappool.",
        callback: mp_ban,
    },
    Command {
        triggers: &["unban"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Unban a pick in the currently loaded mappool.",
        callback: mp_unban,
    },
    Command {
        triggers: &["pick"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Pick a map from the currently loaded mappool.",
        callback: mp_pick,
    },
];

/// The sender's match id; the gate guarantees it exists, but sessions can
/// race, so re-check.
async fn sender_match(server: &Server, sender_id: i32) -> Option<u16> {
    let world = server.world.read().await;
    world.players.get(sender_id).and_then(|s| s.match_id)
}

async fn sender_is_host(server: &Server, sender_id: i32, match_id: u16) -> bool {
    let world = server.world.read().await;
    world
        .matches
        .get(match_id)
        .is_some_and(|m| m.host_id == sender_id)
}

fn mp_help<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let privileges = {
            let world = server.world.read().await;
            match world.players.get(ctx.sender_id) {
                Some(s) => s.privileges,
                None => return Ok(None),
            }
        };
        Ok(Some(set_help(
            &server.config.command_prefix,
            "mp",
            COMMANDS,
            privileges,
        )))
    })
}

/// Arm the `!mp start <seconds>` timer: one task owns the alert ladder and
/// the final fire, re-checking match liveness at every step.
fn arm_start_timer(server: &Server, match_id: u16, duration: u64, armed_by: i32) -> PendingStart {
    let fire_at = Instant::now() + Duration::from_secs(duration);
    let tokio_fire_at = tokio::time::Instant::now() + Duration::from_secs(duration);

    let task_server = server.clone();
    let task = tokio::spawn(async move {
        for alert in START_ALERT_LADDER.iter().filter(|t| **t < duration) {
            tokio::time::sleep_until(tokio_fire_at - Duration::from_secs(*alert)).await;

            let mut world = task_server.world.write().await;
            let alive = world
                .matches
                .get(match_id)
                .is_some_and(|m| m.starting.is_some());
            if !alive {
                return;
            }
            world.match_send_bot(match_id, &format!("Match starting in {} seconds.", alert));
        }

        tokio::time::sleep_until(tokio_fire_at).await;

        let mut world = task_server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return;
        };
        if m.starting.is_none() {
            return;
        }
        m.starting = None;

        // the player who queued this start may have left since
        if m.slot_of(armed_by).is_none() {
            world.match_send_bot(match_id, "Player left match? (cancelled)");
            return;
        }

        Server::start_match(&mut world, match_id);
        world.match_send_bot(match_id, "Starting match.");
    });

    PendingStart {
        task,
        fire_at,
        armed_by,
    }
}

fn mp_start<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() > 1 {
            return Ok(Some("Invalid syntax: !mp start <force/seconds>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        match ctx.args.first().map(String::as_str) {
            None => {
                let mut world = server.world.write().await;
                let Some(m) = world.matches.get(match_id) else {
                    return Ok(None);
                };
                if let Some(pending) = &m.starting {
                    let remaining = pending.fire_at.saturating_duration_since(Instant::now());
                    return Ok(Some(format!(
                        "Match starting in {} seconds.",
                        remaining.as_secs()
                    )));
                }
                if m.slots.iter().any(|s| s.status == SlotStatus::NotReady) {
                    return Ok(Some(
                        "Not all players are ready (`!mp start force` to override).".to_string(),
                    ));
                }
                Server::start_match(&mut world, match_id);
                Ok(Some("Good luck!".to_string()))
            }
            Some(arg) if arg.chars().all(|c| c.is_ascii_digit()) && !arg.is_empty() => {
                let duration: u64 = arg.parse().unwrap_or(0);
                if !(1..=300).contains(&duration) {
                    return Ok(Some("Timer range is 1-300 seconds.".to_string()));
                }

                let mut world = server.world.write().await;
                let Some(m) = world.matches.get(match_id) else {
                    return Ok(None);
                };
                if let Some(pending) = &m.starting {
                    let remaining = pending.fire_at.saturating_duration_since(Instant::now());
                    return Ok(Some(format!(
                        "Match starting in {} seconds.",
                        remaining.as_secs()
                    )));
                }

                let pending = arm_start_timer(server, match_id, duration, ctx.sender_id);
                if let Some(m) = world.matches.get_mut(match_id) {
                    m.starting = Some(pending);
                }
                Ok(Some(format!("Match will start in {} seconds.", duration)))
            }
            Some("cancel") | Some("c") => {
                let mut world = server.world.write().await;
                let Some(m) = world.matches.get_mut(match_id) else {
                    return Ok(None);
                };
                if !m.cancel_pending_start() {
                    return Ok(Some("Match timer not active!".to_string()));
                }
                Ok(Some("Match timer cancelled.".to_string()))
            }
            Some("force") | Some("f") => {
                let mut world = server.world.write().await;
                Server::start_match(&mut world, match_id);
                Ok(Some("Good luck!".to_string()))
            }
            Some(_) => Ok(Some("Invalid syntax: !mp start <force/seconds>".to_string())),
        }
    })
}

fn mp_abort<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if !m.in_progress {
            return Ok(Some("Abort what?".to_string()));
        }

        m.unready_players(SlotStatus::Playing);
        m.reset_loaded_flags();
        m.in_progress = false;

        world.match_enqueue(match_id, &out::match_abort(), false, &[]);
        world.match_enqueue_state(match_id, true);
        Ok(Some("Match aborted.".to_string()))
    })
}

fn mp_map<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(map_id) = ctx
            .args
            .first()
            .filter(|_| ctx.args.len() == 1)
            .and_then(|a| a.parse::<i32>().ok())
        else {
            return Ok(Some("Invalid syntax: !mp map <beatmapid>".to_string()));
        };
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        {
            let world = server.world.read().await;
            if world
                .matches
                .get(match_id)
                .is_some_and(|m| m.map_id == map_id)
            {
                return Ok(Some("Map already selected.".to_string()));
            }
        }

        let Some(beatmap) = server.beatmaps.by_id(map_id).await? else {
            return Ok(Some("Beatmap not found.".to_string()));
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        m.map_id = beatmap.id;
        m.map_md5 = beatmap.md5.clone();
        m.map_name = beatmap.full_name();
        m.mode = GameMode::from_u8(beatmap.mode_vanilla).unwrap_or_default();
        world.match_enqueue_state(match_id, true);

        Ok(Some(format!(
            "Selected: {}.",
            beatmap.embed(&server.config.domain)
        )))
    })
}

fn mp_mods<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(modstr) = ctx.args.first().filter(|a| a.len() % 2 == 0) else {
            return Ok(Some("Invalid syntax: !mp mods <mods>".to_string()));
        };
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        let mods = Mods::from_modstr(modstr).filter_invalid_combos(m.mode.as_vanilla());

        if m.freemods {
            if m.host_id == ctx.sender_id {
                m.mods = mods & Mods::SPEED_CHANGING;
            }
            if let Some(slot) = m.slot_of_mut(ctx.sender_id) {
                slot.mods = mods & !Mods::SPEED_CHANGING;
            }
        } else {
            m.mods = mods;
        }

        world.match_enqueue_state(match_id, true);
        Ok(Some("Match mods updated.".to_string()))
    })
}

fn mp_freemods<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let arg = ctx.args.first().map(String::as_str);
        if !matches!(arg, Some("on") | Some("off")) {
            return Ok(Some("Invalid syntax: !mp freemods <on/off>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };

        if arg == Some("on") {
            // the match keeps only speed mods; everything else moves to
            // the occupied slots
            m.freemods = true;
            let shared = m.mods & !Mods::SPEED_CHANGING;
            for slot in m.slots.iter_mut() {
                if slot.user_id.is_some() {
                    slot.mods = shared;
                }
            }
            m.mods &= Mods::SPEED_CHANGING;
        } else {
            m.freemods = false;
            let host_mods = m.host_slot_mut().map(|s| s.mods).unwrap_or(Mods::empty());
            m.mods &= Mods::SPEED_CHANGING;
            m.mods |= host_mods;
            for slot in m.slots.iter_mut() {
                if slot.user_id.is_some() {
                    slot.mods = Mods::empty();
                }
            }
        }

        world.match_enqueue_state(match_id, true);
        Ok(Some("Match freemod status updated.".to_string()))
    })
}

fn mp_host<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp host <name>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(target_id) = world.players.id_by_name(&ctx.args[0]) else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if m.host_id == target_id {
            return Ok(Some("They're already host, silly!".to_string()));
        }
        if m.slot_of(target_id).is_none() {
            return Ok(Some("Found no such player in the match.".to_string()));
        }

        m.host_id = target_id;
        world.enqueue_to(target_id, &out::match_transfer_host());
        world.match_enqueue_state(match_id, true);
        Ok(Some("Match host updated.".to_string()))
    })
}

fn mp_randpw<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        let mut world = server.world.write().await;
        if let Some(m) = world.matches.get_mut(match_id) {
            m.password = password;
        }
        Ok(Some("Match password randomized.".to_string()))
    })
}

fn mp_invite<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp invite <name>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(target_id) = world.players.id_by_name(&ctx.args[0]) else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        if target_id == BOT_USER_ID {
            return Ok(Some("I'm too busy!".to_string()));
        }
        if target_id == ctx.sender_id {
            return Ok(Some("You can't invite yourself!".to_string()));
        }

        let (sender_name, embed) = {
            let Some(m) = world.matches.get(match_id) else {
                return Ok(None);
            };
            let sender_name = world
                .players
                .get(ctx.sender_id)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            (sender_name, m.embed())
        };
        let target_name = world
            .players
            .get(target_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        world.enqueue_to(
            target_id,
            &out::match_invite(&sender_name, ctx.sender_id, &target_name, &embed),
        );
        Ok(Some(format!("Invited {} to the match.", target_name)))
    })
}

fn mp_addref<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp addref <name>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(target_id) = world.players.id_by_name(&ctx.args[0]) else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let target_name = world
            .players
            .get(target_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if m.slot_of(target_id).is_none() {
            return Ok(Some("User must be in the current match!".to_string()));
        }
        if m.referees().contains(&target_id) {
            return Ok(Some(format!("{} is already a match referee!", target_name)));
        }
        m.referees.insert(target_id);
        Ok(Some(format!("{} added to match referees.", target_name)))
    })
}

fn mp_rmref<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp rmref <name>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(target_id) = world.players.id_by_name(&ctx.args[0]) else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let target_name = world
            .players
            .get(target_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if m.host_id == target_id {
            return Ok(Some("The host is always a referee!".to_string()));
        }
        if !m.referees.remove(&target_id) {
            return Ok(Some(format!("{} is not a match referee!", target_name)));
        }
        Ok(Some(format!("{} removed from match referees.", target_name)))
    })
}

fn mp_listref<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let world = server.world.read().await;
        let Some(m) = world.matches.get(match_id) else {
            return Ok(None);
        };
        let mut names: Vec<String> = m
            .referees()
            .iter()
            .filter_map(|id| world.players.get(*id).map(|s| s.name.clone()))
            .collect();
        names.sort();
        Ok(Some(format!("{}.", names.join(", "))))
    })
}

fn mp_lock<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let mut world = server.world.write().await;
        if let Some(m) = world.matches.get_mut(match_id) {
            for slot in m.slots.iter_mut() {
                if slot.status == SlotStatus::Open {
                    slot.status = SlotStatus::Locked;
                }
            }
        }
        world.match_enqueue_state(match_id, true);
        Ok(Some("All unused slots locked.".to_string()))
    })
}

fn mp_unlock<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let mut world = server.world.write().await;
        if let Some(m) = world.matches.get_mut(match_id) {
            for slot in m.slots.iter_mut() {
                if slot.status == SlotStatus::Locked {
                    slot.status = SlotStatus::Open;
                }
            }
        }
        world.match_enqueue_state(match_id, true);
        Ok(Some("All locked slots unlocked.".to_string()))
    })
}

fn mp_teams<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp teams <type>".to_string()));
        }
        let team_type = match ctx.args[0].as_str() {
            "ffa" | "freeforall" | "head-to-head" => TeamType::HeadToHead,
            "tag" | "coop" | "co-op" | "tag-coop" => TeamType::TagCoop,
            "teams" | "team-vs" | "teams-vs" => TeamType::TeamVs,
            "tag-teams" | "tag-team-vs" | "tag-teams-vs" => TeamType::TagTeamVs,
            _ => return Ok(Some("Unknown team type. (ffa, tag, teams, tag-teams)".to_string())),
        };
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        m.team_type = team_type;

        let default_team = if team_type.is_ffa() {
            MatchTeam::Neutral
        } else {
            MatchTeam::Red
        };
        for slot in m.slots.iter_mut() {
            if slot.user_id.is_some() {
                slot.team = default_team;
            }
        }

        if m.is_scrimming {
            // changing team structure invalidates accumulated points
            m.reset_scrim();
        }

        world.match_enqueue_state(match_id, true);
        Ok(Some("Match team type updated.".to_string()))
    })
}

fn mp_condition<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp condition <type>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };

        match ctx.args[0].as_str() {
            "pp" => {
                // pp can't be a real client win condition, but works as a
                // scrim-scoring override
                if !m.is_scrimming {
                    return Ok(Some(
                        "PP is only useful as a win condition during scrims.".to_string(),
                    ));
                }
                if m.use_pp_scoring {
                    return Ok(Some("PP scoring already enabled.".to_string()));
                }
                m.use_pp_scoring = true;
            }
            cond => {
                m.use_pp_scoring = false;
                m.win_condition = match cond {
                    "score" => WinCondition::Score,
                    "accuracy" | "acc" => WinCondition::Accuracy,
                    "combo" => WinCondition::Combo,
                    "scorev2" | "v2" => WinCondition::ScoreV2,
                    _ => {
                        return Ok(Some(
                            "Invalid win condition. (score, acc, combo, scorev2, *pp)".to_string(),
                        ))
                    }
                };
            }
        }

        world.match_enqueue_state(match_id, false);
        Ok(Some("Match win condition updated.".to_string()))
    })
}

fn mp_scrim<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp scrim <bo#>".to_string()));
        }
        let Some(caps) = BEST_OF.captures(&ctx.args[0]) else {
            return Ok(Some("Invalid syntax: !mp scrim <bo#>".to_string()));
        };
        let best_of: i32 = caps[1].parse().unwrap_or(-1);
        if !(0..16).contains(&best_of) {
            return Ok(Some("Best of must be in range 0-15.".to_string()));
        }

        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let sender_name = {
            let world = server.world.read().await;
            world
                .players
                .get(ctx.sender_id)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };

        if best_of > 0 {
            if m.is_scrimming {
                return Ok(Some("Already scrimming!".to_string()));
            }
            if best_of % 2 == 0 {
                return Ok(Some("Best of must be an odd number!".to_string()));
            }
            let winning_points = best_of / 2 + 1;
            m.is_scrimming = true;
            m.winning_points = winning_points;
            Ok(Some(format!(
                "A scrimmage has been started by {}; first to {} points wins. Best of luck!",
                sender_name, winning_points
            )))
        } else {
            if !m.is_scrimming {
                return Ok(Some("Not currently scrimming!".to_string()));
            }
            m.is_scrimming = false;
            m.winning_points = 0;
            m.reset_scrim();
            Ok(Some("Scrimming cancelled.".to_string()))
        }
    })
}

fn mp_endscrim<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if !m.is_scrimming {
            return Ok(Some("Not currently scrimming!".to_string()));
        }
        m.is_scrimming = false;
        m.reset_scrim();
        Ok(Some("Scrimmage ended.".to_string()))
    })
}

fn mp_rematch<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if !ctx.args.is_empty() {
            return Ok(Some("Invalid syntax: !mp rematch".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        if !sender_is_host(server, ctx.sender_id, match_id).await {
            return Ok(Some("Only available to the host.".to_string()));
        }

        let sender_name = {
            let world = server.world.read().await;
            world
                .players
                .get(ctx.sender_id)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        };

        let mut world = server.world.write().await;

        enum Outcome {
            NoScrim,
            Restarted(i32),
            NoPoints,
            Tie,
            Deducted(ScrimKey),
        }

        let outcome = {
            let Some(m) = world.matches.get_mut(match_id) else {
                return Ok(None);
            };
            if !m.is_scrimming {
                if m.winning_points == 0 {
                    Outcome::NoScrim
                } else {
                    m.is_scrimming = true;
                    Outcome::Restarted(m.winning_points)
                }
            } else {
                match m.winners.last() {
                    None => Outcome::NoPoints,
                    Some(None) => Outcome::Tie,
                    Some(Some(winner)) => {
                        let winner = *winner;
                        *m.match_points.entry(winner).or_insert(0) -= 1;
                        m.winners.pop();
                        Outcome::Deducted(winner)
                    }
                }
            }
        };

        Ok(Some(match outcome {
            Outcome::NoScrim => "No scrim to rematch; to start one, use !mp scrim.".to_string(),
            Outcome::Restarted(points) => format!(
                "A rematch has been started by {}; first to {} points wins. Best of luck!",
                sender_name, points
            ),
            Outcome::NoPoints => "No match points have yet been awarded!".to_string(),
            Outcome::Tie => "The last point was a tie!".to_string(),
            Outcome::Deducted(winner) => {
                let label = scrim_key_label(&world, winner);
                format!("A point has been deducted from {}.", label)
            }
        }))
    })
}

/// Human label for a scrim scoring key.
pub(crate) fn scrim_key_label(world: &crate::world::World, key: ScrimKey) -> String {
    match key {
        ScrimKey::User(id) => world
            .players
            .get(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("user {}", id)),
        ScrimKey::Team(MatchTeam::Blue) => "Blue".to_string(),
        ScrimKey::Team(MatchTeam::Red) => "Red".to_string(),
        ScrimKey::Team(MatchTeam::Neutral) => "Neutral".to_string(),
    }
}

fn mp_force<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp force <name>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let mut world = server.world.write().await;
        let Some(target_id) = world.players.id_by_name(&ctx.args[0]) else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let password = match world.matches.get(match_id) {
            Some(m) => m.password.clone(),
            None => return Ok(None),
        };
        world.join_match(target_id, match_id, &password);
        Ok(Some("Welcome.".to_string()))
    })
}

fn mp_loadpool<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp loadpool <name>".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        if !sender_is_host(server, ctx.sender_id, match_id).await {
            return Ok(Some("Only available to the host.".to_string()));
        }

        let Some(pool) = server.db.pool_by_name(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a pool by that name!".to_string()));
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if m.pool.as_ref().is_some_and(|p| p.id == pool.id) {
            return Ok(Some(format!("{} already selected!", pool.name)));
        }
        m.pool = Some(LoadedPool {
            id: pool.id,
            name: pool.name.clone(),
        });
        Ok(Some(format!("{} selected.", pool.name)))
    })
}

fn mp_unloadpool<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if !ctx.args.is_empty() {
            return Ok(Some("Invalid syntax: !mp unloadpool".to_string()));
        }
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };
        if !sender_is_host(server, ctx.sender_id, match_id).await {
            return Ok(Some("Only available to the host.".to_string()));
        }

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if m.pool.is_none() {
            return Ok(Some("No mappool currently selected!".to_string()));
        }
        m.pool = None;
        Ok(Some("Mappool unloaded.".to_string()))
    })
}

/// Split a pick like `HD2` into mods and slot number.
fn parse_pick(pick: &str) -> Option<(Mods, i32)> {
    let caps = MAPPOOL_PICK.captures(pick)?;
    let mods = if caps[1].eq_ignore_ascii_case("NM") {
        Mods::empty()
    } else {
        Mods::from_modstr(&caps[1])
    };
    let slot: i32 = caps[2].parse().ok()?;
    Some((mods, slot))
}

fn mp_ban<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp ban <pick>".to_string()));
        }
        let pick_str = ctx.args[0].to_uppercase();
        let Some((mods, slot)) = parse_pick(&pick_str) else {
            return Ok(Some("Invalid pick syntax; correct example: HD2".to_string()));
        };
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let pool_id = {
            let world = server.world.read().await;
            match world.matches.get(match_id).and_then(|m| m.pool.as_ref()) {
                Some(pool) => pool.id,
                None => return Ok(Some("No pool currently selected!".to_string())),
            }
        };
        if server.db.pool_pick(pool_id, mods.bits() as i32, slot).await?.is_none() {
            return Ok(Some(format!("Found no {} pick in the pool.", pick_str)));
        }

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if !m.bans.insert((mods, slot)) {
            return Ok(Some("That pick is already banned!".to_string()));
        }
        Ok(Some(format!("{} banned.", pick_str)))
    })
}

fn mp_unban<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp unban <pick>".to_string()));
        }
        let pick_str = ctx.args[0].to_uppercase();
        let Some((mods, slot)) = parse_pick(&pick_str) else {
            return Ok(Some("Invalid pick syntax; correct example: HD2".to_string()));
        };
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let pool_id = {
            let world = server.world.read().await;
            match world.matches.get(match_id).and_then(|m| m.pool.as_ref()) {
                Some(pool) => pool.id,
                None => return Ok(Some("No pool currently selected!".to_string())),
            }
        };
        if server.db.pool_pick(pool_id, mods.bits() as i32, slot).await?.is_none() {
            return Ok(Some(format!("Found no {} pick in the pool.", pick_str)));
        }

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        if !m.bans.remove(&(mods, slot)) {
            return Ok(Some("That pick is not currently banned!".to_string()));
        }
        Ok(Some(format!("{} unbanned.", pick_str)))
    })
}

fn mp_pick<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !mp pick <pick>".to_string()));
        }
        let pick_str = ctx.args[0].to_uppercase();
        let Some((mods, slot)) = parse_pick(&pick_str) else {
            return Ok(Some("Invalid pick syntax; correct example: HD2".to_string()));
        };
        let Some(match_id) = sender_match(server, ctx.sender_id).await else {
            return Ok(None);
        };

        let (pool_id, banned) = {
            let world = server.world.read().await;
            let Some(m) = world.matches.get(match_id) else {
                return Ok(None);
            };
            match &m.pool {
                Some(pool) => (pool.id, m.bans.contains(&(mods, slot))),
                None => return Ok(Some("No pool currently loaded!".to_string())),
            }
        };
        if banned {
            return Ok(Some(format!(
                "{} has been banned from being picked.",
                pick_str
            )));
        }

        let Some(map_pick) = server.db.pool_pick(pool_id, mods.bits() as i32, slot).await? else {
            return Ok(Some(format!("Found no {} pick in the pool.", pick_str)));
        };
        let Some(beatmap) = server.beatmaps.by_id(map_pick.map_id).await? else {
            return Ok(Some(format!("Found no beatmap for {} pick.", pick_str)));
        };

        let mut world = server.world.write().await;
        let Some(m) = world.matches.get_mut(match_id) else {
            return Ok(None);
        };
        m.map_md5 = beatmap.md5.clone();
        m.map_id = beatmap.id;
        m.map_name = beatmap.full_name();

        if m.freemods {
            // picks carry their own mods; freemods no longer applies
            m.freemods = false;
            for s in m.slots.iter_mut() {
                if s.user_id.is_some() {
                    s.mods = Mods::empty();
                }
            }
        }
        m.mods = mods;

        world.match_enqueue_state(match_id, true);
        Ok(Some(format!(
            "Picked {}. ({})",
            beatmap.embed(&server.config.domain),
            pick_str
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_parsing() {
        let (mods, slot) = parse_pick("HD2").unwrap();
        assert_eq!(mods, Mods::HIDDEN);
        assert_eq!(slot, 2);

        let (mods, slot) = parse_pick("NM1").unwrap();
        assert!(mods.is_empty());
        assert_eq!(slot, 1);

        assert!(parse_pick("2HD").is_none());
    }
}
