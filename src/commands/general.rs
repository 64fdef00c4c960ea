//! Commands available outside any set: player conveniences plus the
//! moderation surface.

use futures::future::BoxFuture;
use rand::Rng;

use bancho::server as out;

use crate::constants::{BOT_USER_ID, NP_EXPIRY_SECS, USERNAME};
use crate::database::{LogAction, RelationshipKind};
use crate::performance::ScoreParams;
use crate::privileges::Privileges;
use crate::server::Server;

use super::{CmdResult, Command, Context};

pub static COMMANDS: &[Command] = &[
    Command {
        triggers: &["help", "h", ""],
        privileges: Privileges::UNRESTRICTED,
        hidden: true,
        doc: "Show all documented commands the player can access.",
        callback: help,
    },
    Command {
        triggers: &["roll"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Roll an n-sided die where n is the number you write (100 default).",
        callback: roll,
    },
    Command {
        triggers: &["block"],
        privileges: Privileges::UNRESTRICTED,
        hidden: true,
        doc: "Block another user from communicating with you.",
        callback: block,
    },
    Command {
        triggers: &["unblock"],
        privileges: Privileges::UNRESTRICTED,
        hidden: true,
        doc: "Unblock another user from communicating with you.",
        callback: unblock,
    },
    Command {
        triggers: &["reconnect"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Disconnect and reconnect a given player (or self) to the server.",
        callback: reconnect,
    },
    Command {
        triggers: &["changename"],
        privileges: Privileges::SUPPORTER,
        hidden: false,
        doc: "Change your username.",
        callback: changename,
    },
    Command {
        triggers: &["maplink", "m"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Return a download link to the user's current map (situation dependant).",
        callback: maplink,
    },
    Command {
        triggers: &["recent", "last", "r"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Show information about a player's most recent score.",
        callback: recent,
    },
    Command {
        triggers: &["with", "w"],
        privileges: Privileges::UNRESTRICTED,
        hidden: true,
        doc: "Specify custom accuracy & mod combinations with a previously /np'ed map.",
        callback: with,
    },
    Command {
        triggers: &["apikey"],
        privileges: Privileges::UNRESTRICTED,
        hidden: true,
        doc: "Generate a new api key & assign it to the player.",
        callback: apikey,
    },
    Command {
        triggers: &["silence"],
        privileges: Privileges::MODERATOR,
        hidden: true,
        doc: "Silence a specified player with a specified duration & reason.",
        callback: silence,
    },
    Command {
        triggers: &["unsilence"],
        privileges: Privileges::MODERATOR,
        hidden: true,
        doc: "Unsilence a specified player.",
        callback: unsilence,
    },
    Command {
        triggers: &["notes"],
        privileges: Privileges::MODERATOR,
        hidden: true,
        doc: "Retrieve the logs of a specified player by name.",
        callback: notes,
    },
    Command {
        triggers: &["addnote"],
        privileges: Privileges::MODERATOR,
        hidden: true,
        doc: "Add a note to a specified player by name.",
        callback: addnote,
    },
    Command {
        triggers: &["restrict"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: true,
        doc: "Restrict a specified player's account, with a reason.",
        callback: restrict,
    },
    Command {
        triggers: &["unrestrict"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: true,
        doc: "Unrestrict a specified player's account, with a reason.",
        callback: unrestrict,
    },
    Command {
        triggers: &["alert"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: true,
        doc: "Send a notification to all players.",
        callback: alert,
    },
    Command {
        triggers: &["alertuser", "alertu"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: true,
        doc: "Send a notification to a specified player by name.",
        callback: alertuser,
    },
    Command {
        triggers: &["switchserv"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: true,
        doc: "Switch your client's internal endpoints to a specified server IP.",
        callback: switchserv,
    },
    Command {
        triggers: &["shutdown"],
        privileges: Privileges::ADMINISTRATOR,
        hidden: false,
        doc: "Gracefully shutdown the server.",
        callback: shutdown,
    },
    Command {
        triggers: &["stealth"],
        privileges: Privileges::DEVELOPER,
        hidden: false,
        doc: "Toggle the developer's stealth, allowing them to be hidden.",
        callback: stealth,
    },
    Command {
        triggers: &["addpriv"],
        privileges: Privileges::DEVELOPER,
        hidden: true,
        doc: "Set privileges for a specified player (by name).",
        callback: addpriv,
    },
    Command {
        triggers: &["rmpriv"],
        privileges: Privileges::DEVELOPER,
        hidden: true,
        doc: "Remove privileges from a specified player (by name).",
        callback: rmpriv,
    },
    Command {
        triggers: &["givedonator"],
        privileges: Privileges::DEVELOPER,
        hidden: true,
        doc: "Give donator status to a specified player for a specified duration.",
        callback: givedonator,
    },
];

fn help<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let privileges = {
            let world = server.world.read().await;
            match world.players.get(ctx.sender_id) {
                Some(s) => s.privileges,
                None => return Ok(None),
            }
        };

        let prefix = &server.config.command_prefix;
        let mut lines = vec!["Individual commands".to_string(), "-----------".to_string()];
        for cmd in COMMANDS {
            if cmd.doc.is_empty() || !privileges.contains(cmd.privileges) {
                continue;
            }
            lines.push(format!("{}{}: {}", prefix, cmd.triggers[0], cmd.doc));
        }
        lines.push(String::new());
        lines.push("Command sets".to_string());
        lines.push("-----------".to_string());
        lines.push(format!("{}mp: Multiplayer commands.", prefix));
        lines.push(format!("{}pool: Mappool commands.", prefix));
        lines.push(format!("{}clan: Clan commands.", prefix));
        Ok(Some(lines.join("\n")))
    })
}

fn roll<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let max_roll = ctx
            .args
            .first()
            .and_then(|a| a.parse::<u32>().ok())
            .map(|n| n.min(0x7fff))
            .unwrap_or(100);
        if max_roll == 0 {
            return Ok(Some("Roll what?".to_string()));
        }

        let points = rand::thread_rng().gen_range(0..max_roll);
        let name = {
            let world = server.world.read().await;
            world
                .players
                .get(ctx.sender_id)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        };
        Ok(Some(format!("{} rolls {} points!", name, points)))
    })
}

fn block<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let name = ctx.args.join(" ");
        let Some((target_id, target_name)) = server.resolve_user(&name).await? else {
            return Ok(Some("User not found.".to_string()));
        };
        if target_id == BOT_USER_ID || target_id == ctx.sender_id {
            return Ok(Some("What?".to_string()));
        }

        {
            let mut world = server.world.write().await;
            let Some(sender) = world.players.get_mut(ctx.sender_id) else {
                return Ok(None);
            };
            if sender.blocks.contains(&target_id) {
                return Ok(Some(format!("{} already blocked!", target_name)));
            }
            sender.friends.remove(&target_id);
            sender.blocks.insert(target_id);
        }

        server
            .db
            .upsert_relationship(ctx.sender_id, target_id, RelationshipKind::Block)
            .await?;
        Ok(Some(format!("Added {} to blocked users.", target_name)))
    })
}

fn unblock<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let name = ctx.args.join(" ");
        let Some((target_id, target_name)) = server.resolve_user(&name).await? else {
            return Ok(Some("User not found.".to_string()));
        };
        if target_id == BOT_USER_ID || target_id == ctx.sender_id {
            return Ok(Some("What?".to_string()));
        }

        {
            let mut world = server.world.write().await;
            let Some(sender) = world.players.get_mut(ctx.sender_id) else {
                return Ok(None);
            };
            if !sender.blocks.remove(&target_id) {
                return Ok(Some(format!("{} not blocked!", target_name)));
            }
        }

        server
            .db
            .delete_relationship(ctx.sender_id, target_id)
            .await?;
        Ok(Some(format!("Removed {} from blocked users.", target_name)))
    })
}

fn reconnect<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let mut world = server.world.write().await;
        let target_id = if ctx.args.is_empty() {
            ctx.sender_id
        } else {
            let allowed = world
                .players
                .get(ctx.sender_id)
                .is_some_and(|s| s.privileges.contains(Privileges::ADMINISTRATOR));
            if !allowed {
                return Ok(None);
            }
            match world.players.id_by_name(&ctx.args.join(" ")) {
                Some(id) => id,
                None => return Ok(Some("Player not found.".to_string())),
            }
        };
        world.logout(target_id);
        Ok(None)
    })
}

fn changename<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let name = ctx.args.join(" ").trim().to_string();

        if !USERNAME.is_match(&name) {
            return Ok(Some("Must be 2-15 characters in length.".to_string()));
        }
        if name.contains('_') && name.contains(' ') {
            return Ok(Some("May contain \"_\" and \" \", but not both.".to_string()));
        }
        if server
            .config
            .disallowed_names
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&name))
        {
            return Ok(Some("Disallowed username; pick another.".to_string()));
        }
        if server.db.username_taken(&name).await? {
            return Ok(Some("Username already taken by another player.".to_string()));
        }

        server
            .db
            .update_username(ctx.sender_id, &name, &crate::session::make_safe_name(&name))
            .await?;

        let mut world = server.world.write().await;
        world.enqueue_to(
            ctx.sender_id,
            &out::notification(&format!("Your username has been changed to {}!", name)),
        );
        world.logout(ctx.sender_id);
        Ok(None)
    })
}

fn maplink<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        // priority: match -> spectated host -> last /np
        let (match_md5, spec_md5, np_id) = {
            let world = server.world.read().await;
            let Some(sender) = world.players.get(ctx.sender_id) else {
                return Ok(None);
            };
            let match_md5 = sender
                .match_id
                .and_then(|id| world.matches.get(id))
                .filter(|m| m.map_id > 0)
                .map(|m| m.map_md5.clone());
            let spec_md5 = sender
                .spectating
                .and_then(|host_id| world.players.get(host_id))
                .filter(|h| h.status.map_id > 0)
                .map(|h| h.status.map_md5.clone());
            let np_id = sender.active_np().map(|np| np.beatmap_id);
            (match_md5, spec_md5, np_id)
        };

        let beatmap = if let Some(md5) = match_md5 {
            server.beatmaps.by_md5(&md5).await?
        } else if let Some(md5) = spec_md5 {
            server.beatmaps.by_md5(&md5).await?
        } else if let Some(id) = np_id {
            server.beatmaps.by_id(id).await?
        } else {
            None
        };

        match beatmap {
            Some(map) => Ok(Some(format!(
                "[{}/{} {}]",
                server.config.mirror_download_url,
                map.set_id,
                map.full_name()
            ))),
            None => Ok(Some("No map found!".to_string())),
        }
    })
}

fn recent<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let score = {
            let world = server.world.read().await;
            let target = if ctx.args.is_empty() {
                world.players.get(ctx.sender_id)
            } else {
                world.players.get_by_name(&ctx.args.join(" "))
            };
            let Some(target) = target else {
                return Ok(Some("Player not found.".to_string()));
            };
            target.recent_score().cloned()
        };

        let Some(score) = score else {
            return Ok(Some(
                "No scores found (only saves per play session).".to_string(),
            ));
        };

        let Some(beatmap) = server.beatmaps.by_md5(&score.beatmap_md5).await? else {
            return Ok(Some(
                "We don't have a beatmap on file for your recent score.".to_string(),
            ));
        };

        let mut parts = vec![format!(
            "[{}] {}",
            score.mode.label(),
            beatmap.embed(&server.config.domain)
        )];
        if !score.mods.is_empty() {
            parts.push(format!("+{}", score.mods));
        }
        parts.push(format!("{:.2}%", score.accuracy));
        parts.push(format!("{{{:.2}pp, {}x}}", score.pp, score.max_combo));
        Ok(Some(parts.join(" ")))
    })
}

fn with<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.target != super::CommandTarget::Private {
            return Ok(Some("This command can only be used in DM with the bot.".to_string()));
        }

        let np = {
            let world = server.world.read().await;
            world
                .players
                .get(ctx.sender_id)
                .and_then(|s| s.active_np().cloned())
        };
        let Some(np) = np else {
            return Ok(Some(format!(
                "Please /np a map first! (lasts {}s)",
                NP_EXPIRY_SECS
            )));
        };

        let mut params = ScoreParams {
            mode_vanilla: np.mode_vanilla,
            mods: np.mods.map(|m| m.bits()),
            ..ScoreParams::default()
        };
        for arg in &ctx.args {
            let lower = arg.to_lowercase();
            if let Some(acc) = lower.strip_suffix('%') {
                match acc.parse() {
                    Ok(acc) => params.accuracy = Some(acc),
                    Err(_) => return Ok(Some(format!("Invalid argument: {}", arg))),
                }
            } else if let Some(combo) = lower.strip_suffix('x') {
                if let Ok(combo) = combo.parse() {
                    params.combo = Some(combo);
                } else {
                    return Ok(Some(format!("Invalid argument: {}", arg)));
                }
            } else if let Some(misses) = lower.strip_suffix('m') {
                if let Ok(misses) = misses.parse() {
                    params.misses = Some(misses);
                } else {
                    return Ok(Some(format!("Invalid argument: {}", arg)));
                }
            } else {
                let modstr = lower.trim_start_matches('+');
                if modstr.len() % 2 != 0 {
                    return Ok(Some("Invalid mods.".to_string()));
                }
                let mods = crate::mods::Mods::from_modstr(modstr)
                    .filter_invalid_combos(np.mode_vanilla);
                params.mods = Some(mods.bits());
            }
        }

        let osu_file = server
            .config
            .beatmaps_path
            .join(format!("{}.osu", np.beatmap_id));
        let results = server.performance.calculate(&osu_file, &[params]).await?;
        let Some(rating) = results.first() else {
            return Ok(Some("Could not calculate pp.".to_string()));
        };

        Ok(Some(match params.accuracy {
            Some(acc) => format!("{:.2}%: {:.2}pp", acc, rating.pp),
            None => format!("{:.2}pp ({:.2} stars)", rating.pp, rating.star_rating),
        }))
    })
}

fn apikey<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.target != super::CommandTarget::Private {
            return Ok(Some("Command only available in DMs with the bot.".to_string()));
        }
        let key = uuid::Uuid::new_v4().to_string();
        server.db.update_api_key(ctx.sender_id, &key).await?;
        {
            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(ctx.sender_id) {
                session.api_key = Some(key.clone());
            }
        }
        Ok(Some(format!("Your new API key is {}.", key)))
    })
}

/// Parse durations like `30s`, `10m`, `2h`, `7d`, `1w` into seconds.
fn parse_duration_secs(s: &str) -> Option<i64> {
    let split_point = s.len().checked_sub(1)?;
    if !s.is_char_boundary(split_point) {
        return None;
    }
    let (value, unit) = s.split_at(split_point);
    let value: i64 = value.parse().ok()?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        "w" => 60 * 60 * 24 * 7,
        _ => return None,
    };
    Some(value * scale)
}

fn silence<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 3 {
            return Ok(Some("Invalid syntax: !silence <name> <duration> <reason>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let Some(duration) = parse_duration_secs(&ctx.args[1]) else {
            return Ok(Some("Invalid timespan.".to_string()));
        };
        let reason = ctx.args[2..].join(" ");

        let target_is_staff = {
            let world = server.world.read().await;
            world
                .players
                .get(target_id)
                .is_some_and(|t| t.privileges.intersects(Privileges::STAFF))
        };
        if target_is_staff {
            return Ok(Some("Only developers can manage staff members.".to_string()));
        }

        server
            .silence(ctx.sender_id, target_id, duration, &reason)
            .await?;
        Ok(Some(format!("{} was silenced.", target_name)))
    })
}

fn unsilence<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.is_empty() {
            return Ok(Some("Invalid syntax: !unsilence <name>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args.join(" ")).await?
        else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        server.unsilence(ctx.sender_id, target_id).await?;
        Ok(Some(format!("{} was unsilenced.", target_name)))
    })
}

fn notes<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 2 {
            return Ok(Some("Invalid syntax: !notes <name> <days_back>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let Ok(days) = ctx.args[1].parse::<i64>() else {
            return Ok(Some("Invalid syntax: !notes <name> <days_back>".to_string()));
        };
        if days > 365 || days < 1 {
            return Ok(Some("Days must be in range 1-365.".to_string()));
        }

        let notes = server.db.recent_notes(target_id, days).await?;
        if notes.is_empty() {
            return Ok(Some(format!(
                "No notes found on {} in the past {} days.",
                target_name, days
            )));
        }
        Ok(Some(notes.join("\n")))
    })
}

fn addnote<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !addnote <name> <note>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let note = ctx.args[1..].join(" ");
        server
            .db
            .create_log(ctx.sender_id, target_id, LogAction::Note, &note)
            .await?;
        Ok(Some(format!("Added note to {}.", target_name)))
    })
}

fn restrict<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !restrict <name> <reason>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };

        let (is_staff, already_restricted) = {
            let world = server.world.read().await;
            match world.players.get(target_id) {
                Some(t) => (
                    t.privileges.intersects(Privileges::STAFF),
                    t.restricted(),
                ),
                None => {
                    let user = server.db.user_by_id(target_id).await?;
                    let privileges = user
                        .map(|u| Privileges::from_bits_retain(u.privileges))
                        .unwrap_or(Privileges::empty());
                    (
                        privileges.intersects(Privileges::STAFF),
                        !privileges.contains(Privileges::UNRESTRICTED),
                    )
                }
            }
        };
        if is_staff {
            return Ok(Some("Only developers can manage staff members.".to_string()));
        }
        if already_restricted {
            return Ok(Some(format!("{} is already restricted!", target_name)));
        }

        let reason = ctx.args[1..].join(" ");
        server.restrict(ctx.sender_id, target_id, &reason).await?;
        Ok(Some(format!("{} was restricted.", target_name)))
    })
}

fn unrestrict<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !unrestrict <name> <reason>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };

        let Some(user) = server.db.user_by_id(target_id).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let privileges = Privileges::from_bits_retain(user.privileges);
        if privileges.intersects(Privileges::STAFF) {
            return Ok(Some("Only developers can manage staff members.".to_string()));
        }
        if privileges.contains(Privileges::UNRESTRICTED) {
            return Ok(Some(format!("{} is not restricted!", target_name)));
        }

        let reason = ctx.args[1..].join(" ");
        server.unrestrict(ctx.sender_id, target_id, &reason).await?;
        Ok(Some(format!("{} was unrestricted.", target_name)))
    })
}

fn alert<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.is_empty() {
            return Ok(Some("Invalid syntax: !alert <msg>".to_string()));
        }
        let msg = ctx.args.join(" ");
        let mut world = server.world.write().await;
        world.players.enqueue_all(&out::notification(&msg), &[]);
        Ok(Some("Alert sent.".to_string()))
    })
}

fn alertuser<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !alertu <name> <msg>".to_string()));
        }
        let mut world = server.world.write().await;
        let Some(target_id) = world.players.id_by_name(&ctx.args[0]) else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let msg = ctx.args[1..].join(" ");
        world.enqueue_to(target_id, &out::notification(&msg));
        Ok(Some("Alert sent.".to_string()))
    })
}

fn switchserv<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !switch <endpoint>".to_string()));
        }
        let mut world = server.world.write().await;
        world.enqueue_to(ctx.sender_id, &out::switch_tournament_server(&ctx.args[0]));
        Ok(Some("Have a nice journey..".to_string()))
    })
}

fn shutdown<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if !ctx.args.is_empty() {
            let msg = ctx.args.join(" ");
            let mut world = server.world.write().await;
            world.players.enqueue_all(&out::notification(&msg), &[]);
        }
        log::warn!("shutdown requested by {}", ctx.sender_id);
        server.shutdown.notify_waiters();
        Ok(Some("Night night..".to_string()))
    })
}

fn stealth<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let mut world = server.world.write().await;
        let Some(session) = world.players.get_mut(ctx.sender_id) else {
            return Ok(None);
        };
        session.stealth = !session.stealth;
        let state = if session.stealth { "on" } else { "off" };
        Ok(Some(format!("Stealth {}.", state)))
    })
}

/// Map privilege names used by !addpriv/!rmpriv to their bits.
fn privilege_by_name(name: &str) -> Option<Privileges> {
    Some(match name {
        "normal" | "unrestricted" => Privileges::UNRESTRICTED,
        "verified" => Privileges::VERIFIED,
        "whitelisted" => Privileges::WHITELISTED,
        "supporter" => Privileges::SUPPORTER,
        "premium" => Privileges::PREMIUM,
        "alumni" => Privileges::ALUMNI,
        "tourney" | "tmanager" => Privileges::TOURNEY_MANAGER,
        "nominator" => Privileges::NOMINATOR,
        "mod" | "moderator" => Privileges::MODERATOR,
        "admin" | "administrator" => Privileges::ADMINISTRATOR,
        "developer" | "dev" => Privileges::DEVELOPER,
        _ => return None,
    })
}

fn addpriv<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !addpriv <name> <privs...>".to_string()));
        }
        let mut bits = Privileges::empty();
        for name in &ctx.args[1..] {
            match privilege_by_name(&name.to_lowercase()) {
                Some(p) => bits |= p,
                None => return Ok(Some(format!("Not found: {}.", name))),
            }
        }

        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let Some(user) = server.db.user_by_id(target_id).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };

        let privileges = Privileges::from_bits_retain(user.privileges) | bits;
        server.db.update_privileges(target_id, privileges.bits()).await?;
        {
            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(target_id) {
                session.privileges = privileges;
            }
        }
        Ok(Some(format!("Updated {}'s privileges.", target_name)))
    })
}

fn rmpriv<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !rmpriv <name> <privs...>".to_string()));
        }
        let mut bits = Privileges::empty();
        for name in &ctx.args[1..] {
            match privilege_by_name(&name.to_lowercase()) {
                Some(p) => bits |= p,
                None => return Ok(Some(format!("Not found: {}.", name))),
            }
        }

        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let Some(user) = server.db.user_by_id(target_id).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };

        let privileges = Privileges::from_bits_retain(user.privileges) & !bits;
        server.db.update_privileges(target_id, privileges.bits()).await?;
        {
            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(target_id) {
                session.privileges = privileges;
            }
        }
        Ok(Some(format!("Updated {}'s privileges.", target_name)))
    })
}

fn givedonator<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 2 {
            return Ok(Some("Invalid syntax: !givedonator <name> <duration>".to_string()));
        }
        let Some((target_id, target_name)) = server.resolve_user(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };
        let Some(duration) = parse_duration_secs(&ctx.args[1]) else {
            return Ok(Some("Invalid timespan.".to_string()));
        };
        let Some(user) = server.db.user_by_id(target_id).await? else {
            return Ok(Some("Could not find a user by that name.".to_string()));
        };

        // extend from the current expiry when still active
        let now = chrono::Utc::now().timestamp();
        let donor_end = user.donor_end.max(now) + duration;
        let privileges = Privileges::from_bits_retain(user.privileges) | Privileges::SUPPORTER;

        server.db.update_donor_end(target_id, donor_end).await?;
        server.db.update_privileges(target_id, privileges.bits()).await?;
        {
            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(target_id) {
                session.privileges = privileges;
                session.donor_end = donor_end;
            }
        }
        Ok(Some(format!(
            "Gave {} donator status for {}.",
            target_name, ctx.args[1]
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration_secs("30s"), Some(30));
        assert_eq!(parse_duration_secs("10m"), Some(600));
        assert_eq!(parse_duration_secs("2h"), Some(7200));
        assert_eq!(parse_duration_secs("1d"), Some(86400));
        assert_eq!(parse_duration_secs("1w"), Some(604800));
        assert_eq!(parse_duration_secs("5"), None);
        assert_eq!(parse_duration_secs(""), None);
    }

    #[test]
    fn privilege_names() {
        assert_eq!(privilege_by_name("dev"), Some(Privileges::DEVELOPER));
        assert_eq!(privilege_by_name("nope"), None);
    }
}
