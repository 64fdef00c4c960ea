//! The `!clan` set: clan management for players and staff.

use futures::future::BoxFuture;

use crate::privileges::{ClanPrivileges, Privileges};
use crate::server::Server;

use super::{set_help, CmdResult, Command, Context};

pub static COMMANDS: &[Command] = &[
    Command {
        triggers: &["help", "h"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Show all documented clan commands the player can access.",
        callback: clan_help,
    },
    Command {
        triggers: &["create", "c"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Create a clan with a given tag & name.",
        callback: clan_create,
    },
    Command {
        triggers: &["disband", "delete", "d"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Disband a clan (admins may disband others clans).",
        callback: clan_disband,
    },
    Command {
        triggers: &["info", "i"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Lookup information of a clan by tag.",
        callback: clan_info,
    },
    Command {
        triggers: &["leave"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "Leaves the clan you're in.",
        callback: clan_leave,
    },
    Command {
        triggers: &["list", "l"],
        privileges: Privileges::UNRESTRICTED,
        hidden: false,
        doc: "List all existing clans' information.",
        callback: clan_list,
    },
];

fn clan_help<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
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
            "clan",
            COMMANDS,
            privileges,
        )))
    })
}

fn clan_create<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.len() < 2 {
            return Ok(Some("Invalid syntax: !clan create <tag> <name>".to_string()));
        }
        let tag = ctx.args[0].to_uppercase();
        if !(1..=6).contains(&tag.len()) {
            return Ok(Some("Clan tag may be 1-6 characters long.".to_string()));
        }
        let name = ctx.args[1..].join(" ");
        if !(2..=16).contains(&name.chars().count()) {
            return Ok(Some("Clan name may be 2-16 characters long.".to_string()));
        }

        let existing_clan_id = {
            let world = server.world.read().await;
            world.players.get(ctx.sender_id).and_then(|s| s.clan_id)
        };
        if let Some(clan_id) = existing_clan_id {
            if let Some(clan) = server.db.clan_by_id(clan_id).await? {
                return Ok(Some(format!(
                    "You're already a member of [{}] {}!",
                    clan.tag, clan.name
                )));
            }
        }

        if server.db.clan_by_name(&name).await?.is_some() {
            return Ok(Some(
                "That name has already been claimed by another clan.".to_string(),
            ));
        }
        if server.db.clan_by_tag(&tag).await?.is_some() {
            return Ok(Some(
                "That tag has already been claimed by another clan.".to_string(),
            ));
        }

        let clan = server.db.create_clan(&name, &tag, ctx.sender_id).await?;
        server
            .db
            .update_clan(ctx.sender_id, clan.id, ClanPrivileges::Owner as i32)
            .await?;

        let display = format!("[{}] {}", clan.tag, clan.name);
        {
            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(ctx.sender_id) {
                session.clan_id = Some(clan.id);
                session.clan_priv = Some(ClanPrivileges::Owner);
            }
            if world.channels.contains("#announce") {
                world.channel_send(
                    "#announce",
                    &format!("\x01ACTION founded {}.", display),
                    ctx.sender_id,
                    true,
                );
            }
        }

        Ok(Some(format!("{} founded.", display)))
    })
}

fn clan_disband<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let clan = if !ctx.args.is_empty() {
            // disband another clan by tag; staff only
            let is_staff = {
                let world = server.world.read().await;
                world
                    .players
                    .get(ctx.sender_id)
                    .is_some_and(|s| s.privileges.intersects(Privileges::STAFF))
            };
            if !is_staff {
                return Ok(Some(
                    "Only staff members may disband the clans of others.".to_string(),
                ));
            }
            match server.db.clan_by_tag(&ctx.args.join(" ").to_uppercase()).await? {
                Some(clan) => clan,
                None => return Ok(Some("Could not find a clan by that tag.".to_string())),
            }
        } else {
            let clan_id = {
                let world = server.world.read().await;
                world.players.get(ctx.sender_id).and_then(|s| s.clan_id)
            };
            let Some(clan_id) = clan_id else {
                return Ok(Some("You're not a member of a clan!".to_string()));
            };
            match server.db.clan_by_id(clan_id).await? {
                Some(clan) => clan,
                None => return Ok(Some("You're not a member of a clan!".to_string())),
            }
        };

        let members = server.db.clan_members(clan.id).await?;
        server.db.delete_clan(clan.id).await?;
        for member in &members {
            server.db.update_clan(member.id, 0, 0).await?;
        }

        let display = format!("[{}] {}", clan.tag, clan.name);
        {
            let mut world = server.world.write().await;
            for member in &members {
                if let Some(session) = world.players.get_mut(member.id) {
                    session.clan_id = None;
                    session.clan_priv = None;
                }
            }
            if world.channels.contains("#announce") {
                world.channel_send(
                    "#announce",
                    &format!("\x01ACTION disbanded {}.", display),
                    ctx.sender_id,
                    true,
                );
            }
        }

        Ok(Some(format!("{} disbanded.", display)))
    })
}

fn clan_info<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        if ctx.args.is_empty() {
            return Ok(Some("Invalid syntax: !clan info <tag>".to_string()));
        }
        let Some(clan) = server
            .db
            .clan_by_tag(&ctx.args.join(" ").to_uppercase())
            .await?
        else {
            return Ok(Some("Could not find a clan by that tag.".to_string()));
        };

        let mut lines = vec![format!(
            "[{}] {} | Founded {}.",
            clan.tag,
            clan.name,
            clan.created_at.format("%b %d, %Y")
        )];

        let mut members = server.db.clan_members(clan.id).await?;
        members.sort_by_key(|m| std::cmp::Reverse(m.clan_priv));
        for member in members {
            let label = ClanPrivileges::from_i32(member.clan_priv)
                .map(|p| p.label())
                .unwrap_or("Member");
            lines.push(format!("[{}] {}", label, member.name));
        }
        Ok(Some(lines.join("\n")))
    })
}

fn clan_leave<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let (clan_id, clan_priv) = {
            let world = server.world.read().await;
            match world.players.get(ctx.sender_id) {
                Some(s) => (s.clan_id, s.clan_priv),
                None => return Ok(None),
            }
        };
        let Some(clan_id) = clan_id else {
            return Ok(Some("You're not in a clan.".to_string()));
        };
        if clan_priv == Some(ClanPrivileges::Owner) {
            return Ok(Some(
                "You must transfer your clan's ownership before leaving it. \
                 Alternatively, you can use !clan disband."
                    .to_string(),
            ));
        }

        let Some(clan) = server.db.clan_by_id(clan_id).await? else {
            return Ok(Some("You're not in a clan.".to_string()));
        };

        server.db.update_clan(ctx.sender_id, 0, 0).await?;
        {
            let mut world = server.world.write().await;
            if let Some(session) = world.players.get_mut(ctx.sender_id) {
                session.clan_id = None;
                session.clan_priv = None;
            }
        }

        let display = format!("[{}] {}", clan.tag, clan.name);
        if server.db.clan_members(clan.id).await?.is_empty() {
            server.db.delete_clan(clan.id).await?;
        }
        Ok(Some(format!("You have successfully left {}.", display)))
    })
}

fn clan_list<'a>(server: &'a Server, ctx: Context) -> BoxFuture<'a, CmdResult> {
    Box::pin(async move {
        let offset = match ctx.args.first() {
            None => 0,
            Some(page) => match page.parse::<usize>() {
                Ok(page) => 25 * page,
                Err(_) => return Ok(Some("Invalid syntax: !clan list (page)".to_string())),
            },
        };

        let clans = server.db.all_clans().await?;
        if offset >= clans.len() {
            return Ok(Some("No clans found.".to_string()));
        }

        let mut lines = vec![format!("Clans listing ({} total).", clans.len())];
        for (idx, clan) in clans.iter().enumerate().skip(offset).take(25) {
            lines.push(format!("{}. [{}] {}", idx + 1, clan.tag, clan.name));
        }
        Ok(Some(lines.join("\n")))
    })
}
