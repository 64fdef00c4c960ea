//! The `!pool` set: mappool management for tournament managers.

use futures::future::BoxFuture;

use crate::constants::MAPPOOL_PICK;
use crate::database::PoolMap;
use crate::mods::Mods;
use crate::privileges::Privileges;
use crate::server::Server;

use super::{set_help, CmdResult, Command, Context};

pub static COMMANDS: &[Command] = &[
    Command {
        triggers: &["help", "h"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "Show all documented mappool commands the player can access.",
        callback: pool_help,
    },
    Command {
        triggers: &["create", "c"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "Add a new mappool to the database.",
        callback: pool_create,
    },
    Command {
        triggers: &["delete", "del", "d"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "Remove a mappool from the database.",
        callback: pool_delete,
    },
    Command {
        triggers: &["add", "a"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "Add a new map to a mappool in the database.",
        callback: pool_add,
    },
    Command {
        triggers: &["remove", "rm", "r"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "Remove a map from a mappool in the database.",
        callback: pool_remove,
    },
    Command {
        triggers: &["list", "l"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "List all existing mappools information.",
        callback: pool_list,
    },
    Command {
        triggers: &["info", "i"],
        privileges: Privileges::TOURNEY_MANAGER,
        hidden: true,
        doc: "Get all information for a specific mappool.",
        callback: pool_info,
    },
];

fn pool_help<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
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
            "pool",
            COMMANDS,
            privileges,
        )))
    })
}

fn pool_create<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !pool create <name>".to_string()));
        }
        let name = &ctx.args[0];

        if server.db.pool_by_name(name).await?.is_some() {
            return Ok(Some("Pool already exists by that name!".to_string()));
        }
        server.db.create_pool(name, ctx.sender_id).await?;
        Ok(Some(format!("{} created.", name)))
    })
}

fn pool_delete<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !pool delete <name>".to_string()));
        }
        let name = &ctx.args[0];

        let Some(pool) = server.db.pool_by_name(name).await? else {
            return Ok(Some("Could not find a pool by that name!".to_string()));
        };
        server.db.delete_pool(pool.id).await?;
        Ok(Some(format!("{} deleted.", name)))
    })
}

fn pool_add<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 2 {
            return Ok(Some("Invalid syntax: !pool add <name> <pick>".to_string()));
        }

        let np = {
            let world = server.world.read().await;
            world
                .players
                .get(ctx.sender_id)
                .and_then(|s| s.active_np().cloned())
        };
        let Some(np) = np else {
            return Ok(Some("Please /np a map first!".to_string()));
        };

        let name = &ctx.args[0];
        let pick_str = ctx.args[1].to_uppercase();
        let Some(caps) = MAPPOOL_PICK.captures(&pick_str) else {
            return Ok(Some("Invalid pick syntax; correct example: HD2".to_string()));
        };
        if caps[1].len() % 2 != 0 {
            return Ok(Some("Invalid mods.".to_string()));
        }
        let mods = if caps[1].eq_ignore_ascii_case("NM") {
            Mods::empty()
        } else {
            Mods::from_modstr(&caps[1])
        };
        let slot: i32 = caps[2].parse().unwrap_or(0);

        let Some(beatmap) = server.beatmaps.by_id(np.beatmap_id).await? else {
            return Ok(Some("Could not find your /np'ed map.".to_string()));
        };

        let Some(pool) = server.db.pool_by_name(name).await? else {
            return Ok(Some("Could not find a pool by that name!".to_string()));
        };

        for entry in server.db.pool_maps(pool.id).await? {
            if entry.mods == mods.bits() as i32 && entry.slot == slot {
                return Ok(Some(format!("{} is already taken in the pool!", pick_str)));
            }
            if entry.map_id == beatmap.id {
                return Ok(Some(format!(
                    "{} is already in the pool!",
                    beatmap.embed(&server.config.domain)
                )));
            }
        }

        server
            .db
            .add_pool_map(PoolMap {
                pool_id: pool.id,
                map_id: beatmap.id,
                mods: mods.bits() as i32,
                slot,
            })
            .await?;

        Ok(Some(format!(
            "{} added to {} as {}.",
            beatmap.embed(&server.config.domain),
            name,
            pick_str
        )))
    })
}

fn pool_remove<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 2 {
            return Ok(Some("Invalid syntax: !pool remove <name> <pick>".to_string()));
        }
        let name = &ctx.args[0];
        let pick_str = ctx.args[1].to_uppercase();
        let Some(caps) = MAPPOOL_PICK.captures(&pick_str) else {
            return Ok(Some("Invalid pick syntax; correct example: HD2".to_string()));
        };
        let mods = if caps[1].eq_ignore_ascii_case("NM") {
            Mods::empty()
        } else {
            Mods::from_modstr(&caps[1])
        };
        let slot: i32 = caps[2].parse().unwrap_or(0);

        let Some(pool) = server.db.pool_by_name(name).await? else {
            return Ok(Some("Could not find a pool by that name!".to_string()));
        };
        let Some(entry) = server.db.pool_pick(pool.id, mods.bits() as i32, slot).await? else {
            return Ok(Some(format!("Found no {} pick in the pool.", pick_str)));
        };

        server.db.remove_pool_map(entry.pool_id, entry.map_id).await?;
        Ok(Some(format!("{} removed from {}.", pick_str, name)))
    })
}

fn pool_list<'a>(server: &'a Server, _ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let pools = server.db.all_pools().await?;
        if pools.is_empty() {
            return Ok(Some("There are currently no pools!".to_string()));
        }

        let mut lines = vec![format!("Mappools ({})", pools.len())];
        for pool in pools {
            let creator = server
                .db
                .user_by_id(pool.created_by)
                .await?
                .map(|u| u.name)
                .unwrap_or_else(|| format!("user {}", pool.created_by));
            lines.push(format!(
                "[{}] {}, by {}.",
                pool.created_at.format("%Y-%m-%d"),
                pool.name,
                creator
            ));
        }
        Ok(Some(lines.join("\n")))
    })
}

fn pool_info<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() != 1 {
            return Ok(Some("Invalid syntax: !pool info <name>".to_string()));
        }
        let Some(pool) = server.db.pool_by_name(&ctx.args[0]).await? else {
            return Ok(Some("Could not find a pool by that name!".to_string()));
        };

        let mut lines = vec![format!(
            "{}. {}, by {} | Created at {}.",
            pool.id,
            pool.name,
            pool.created_by,
            pool.created_at.format("%Y-%m-%d %H:%M:%S")
        )];

        let mut entries = server.db.pool_maps(pool.id).await?;
        entries.sort_by_key(|e| (e.mods, e.slot));
        for entry in entries {
            let mods = Mods::from_bits_retain(entry.mods as u32);
            match server.beatmaps.by_id(entry.map_id).await? {
                Some(beatmap) => lines.push(format!(
                    "{}{}: {}",
                    mods,
                    entry.slot,
                    beatmap.embed(&server.config.domain)
                )),
                None => log::warn!("pool {} references unknown map {}", pool.name, entry.map_id),
            }
        }
        Ok(Some(lines.join("\n")))
    })
}
