use std::time::Instant;

use bytes::{Bytes, BytesMut};
use chrono::{TimeZone, Utc};

use bancho::server as out;

use crate::constants::{
    BOT_USER_ID, FIRST_USER_ID, LOGIN_REPLACE_THRESHOLD_SECS, OSU_VERSION,
};
use crate::network::allowed_client_versions;
use crate::privileges::{ClanPrivileges, ClientPrivileges, Privileges};
use crate::server::Server;
use crate::session::{generate_token, Session};
use crate::world::{presence_packet, stats_packet};

/// A parsed login request body: three newline-separated lines of username,
/// password md5, and client details.
#[derive(Debug)]
pub struct LoginData {
    pub username: String,
    pub password_md5: String,
    pub osu_version: String,
    pub utc_offset: i8,
    pub pm_private: bool,
    pub osu_path_md5: String,
    pub adapters_str: String,
    pub adapters_md5: String,
    pub uninstall_md5: String,
    pub disk_signature_md5: String,
}

/// The validated client version line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsuVersion {
    /// Build date as `YYYYMMDD`.
    pub date: String,
    pub revision: Option<u32>,
    /// stable, beta, cuttingedge, tourney or dev.
    pub stream: String,
}

/// What the login endpoint hands back: the `cho-token` header value and the
/// response frames.
pub struct LoginResponse {
    pub token: String,
    pub body: Bytes,
}

fn failure(token: &str, body: Bytes) -> LoginResponse {
    LoginResponse {
        token: token.to_string(),
        body,
    }
}

pub fn parse_login_data(body: &[u8]) -> Option<LoginData> {
    let text = std::str::from_utf8(body).ok()?;
    let mut lines = text.splitn(3, '\n');
    let username = lines.next()?.to_string();
    let password_md5 = lines.next()?.to_string();
    let remainder = lines.next()?;

    let mut fields = remainder.trim_end_matches('\n').splitn(5, '|');
    let osu_version = fields.next()?.to_string();
    let utc_offset: i8 = fields.next()?.parse().ok()?;
    let _display_city = fields.next()?;
    let client_hashes = fields.next()?;
    let pm_private = fields.next()? == "1";

    let mut hashes = client_hashes.trim_end_matches(':').splitn(5, ':');
    let osu_path_md5 = hashes.next()?.to_string();
    let adapters_str = hashes.next()?.to_string();
    let adapters_md5 = hashes.next()?.to_string();
    let uninstall_md5 = hashes.next()?.to_string();
    let disk_signature_md5 = hashes.next()?.to_string();

    Some(LoginData {
        username,
        password_md5,
        osu_version,
        utc_offset,
        pm_private,
        osu_path_md5,
        adapters_str,
        adapters_md5,
        uninstall_md5,
        disk_signature_md5,
    })
}

pub fn parse_osu_version(version: &str) -> Option<OsuVersion> {
    let caps = OSU_VERSION.captures(version)?;
    Some(OsuVersion {
        date: caps["date"].to_string(),
        revision: caps.name("revision").and_then(|r| r.as_str().parse().ok()),
        stream: caps
            .name("stream")
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "stable".to_string()),
    })
}

/// Split the adapters field. A single `runningunderwine` sentinel replaces
/// the list under wine.
pub fn parse_adapters(adapters_str: &str) -> (Vec<String>, bool) {
    let running_under_wine = adapters_str == "runningunderwine";
    let adapters = adapters_str
        .trim_end_matches('.')
        .split('.')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    (adapters, running_under_wine)
}

/// A disk signature every client of some manufacturers reports; useless
/// for cross-referencing.
fn is_inactionable_disk_signature(md5: &str) -> bool {
    // md5("0")
    md5 == "cfcd208495d565ef66e7dff9f98764da"
}

/// The login pipeline. Runs once per session; everything the client needs
/// to boot (channels, friends, presences, mail) is composed into one
/// response body.
pub async fn handle_login(server: &Server, body: &[u8], ip: &str) -> LoginResponse {
    let restart_notice =
        || out::user_id(-1).as_ref().to_vec();

    let Some(login_data) = parse_login_data(body) else {
        return failure("invalid-request", Bytes::from(restart_notice()));
    };

    let Some(osu_version) = parse_osu_version(&login_data.osu_version) else {
        let mut body = BytesMut::new();
        body.extend_from_slice(&out::user_id(-1));
        body.extend_from_slice(&out::notification("Please restart your osu! and try again."));
        return failure("invalid-request", body.freeze());
    };

    if server.config.disallow_old_clients {
        let client = crate::network::http_client();
        match allowed_client_versions(&client, &server.config.changelog_url, &osu_version.stream)
            .await
        {
            Ok(Some(allowed)) if !allowed.contains(&osu_version.date) => {
                let mut body = BytesMut::new();
                body.extend_from_slice(&out::version_update());
                body.extend_from_slice(&out::user_id(-2));
                return failure("client-too-old", body.freeze());
            }
            // upstream unreachable; let the client through
            _ => {}
        }
    }

    let (_adapters, running_under_wine) = parse_adapters(&login_data.adapters_str);
    if !running_under_wine && login_data.adapters_str.trim_end_matches('.').is_empty() {
        let mut body = BytesMut::new();
        body.extend_from_slice(&out::user_id(-1));
        body.extend_from_slice(&out::notification("Please restart your osu! and try again."));
        return failure("empty-adapters", body.freeze());
    }

    // one session per user; only tourney clients skip the freshness gate
    {
        let mut world = server.world.write().await;
        if let Some(existing) = world.players.get_by_name(&login_data.username) {
            let quiet_for = Instant::now()
                .duration_since(existing.last_recv_time)
                .as_secs();
            if osu_version.stream != "tourney" && quiet_for < LOGIN_REPLACE_THRESHOLD_SECS {
                let mut body = BytesMut::new();
                body.extend_from_slice(&out::user_id(-1));
                body.extend_from_slice(&out::notification("User already logged in."));
                return failure("user-already-logged-in", body.freeze());
            }
            // the old session is stale (or a tourney relog); displace it
            let old_id = existing.id;
            world.logout(old_id);
        }
    }

    let user = match server
        .db
        .user_by_safe_name(&crate::session::make_safe_name(&login_data.username))
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            let mut body = BytesMut::new();
            body.extend_from_slice(&out::notification(&format!(
                "{}: Incorrect credentials",
                server.config.domain
            )));
            body.extend_from_slice(&out::user_id(-1));
            return failure("incorrect-credentials", body.freeze());
        }
        Err(err) => {
            log::error!("user lookup failed at login: {}", err);
            return failure("login-failed", Bytes::from(out::user_id(-5).as_ref().to_vec()));
        }
    };

    if !verify_password(server, &user.pw_bcrypt, &login_data.password_md5).await {
        let mut body = BytesMut::new();
        body.extend_from_slice(&out::notification(&format!(
            "{}: Incorrect credentials",
            server.config.domain
        )));
        body.extend_from_slice(&out::user_id(-1));
        return failure("incorrect-credentials", body.freeze());
    }

    let privileges = Privileges::from_bits_retain(user.privileges);
    if osu_version.stream == "tourney"
        && !(privileges.intersects(Privileges::DONATOR)
            && privileges.contains(Privileges::UNRESTRICTED))
    {
        return failure("no", Bytes::from(out::user_id(-1).as_ref().to_vec()));
    }

    // audit trail: login attempt and hardware fingerprints
    if let Err(err) = server
        .db
        .create_login(user.id, ip, &login_data.osu_version, &osu_version.stream)
        .await
    {
        log::error!("failed to record login: {}", err);
    }
    if let Err(err) = server
        .db
        .create_client_hashes(
            user.id,
            &login_data.osu_path_md5,
            &login_data.adapters_md5,
            &login_data.uninstall_md5,
            &login_data.disk_signature_md5,
        )
        .await
    {
        log::error!("failed to record client hashes: {}", err);
    }

    let disk_signature = if is_inactionable_disk_signature(&login_data.disk_signature_md5) {
        None
    } else {
        Some(login_data.disk_signature_md5.as_str())
    };

    let hw_matches = server
        .db
        .hardware_matches(
            user.id,
            running_under_wine,
            &login_data.adapters_md5,
            &login_data.uninstall_md5,
            disk_signature,
        )
        .await
        .unwrap_or_default();

    if !hw_matches.is_empty() && !privileges.contains(Privileges::VERIFIED) {
        // first-time connection sharing hardware with other accounts; any
        // banned match blocks the login
        let any_banned = hw_matches
            .iter()
            .any(|m| m.privileges & Privileges::UNRESTRICTED.bits() == 0);
        if any_banned {
            let mut body = BytesMut::new();
            body.extend_from_slice(&out::notification(
                "Please contact staff directly to create an account.",
            ));
            body.extend_from_slice(&out::user_id(-1));
            return failure("contact-staff", body.freeze());
        }
    }

    let geolocation = match server.geolocator.lookup(ip).await {
        Ok(Some(geo)) => geo,
        _ => {
            let mut body = BytesMut::new();
            body.extend_from_slice(&out::notification(&format!(
                "{}: Login failed. Please contact an admin.",
                server.config.domain
            )));
            body.extend_from_slice(&out::user_id(-1));
            return failure("login-failed", body.freeze());
        }
    };

    if user.country == "xx" {
        // country wasn't stored at registration; backfill it
        log::info!("fixing {}'s country", user.name);
        if let Err(err) = server
            .db
            .update_country(user.id, &geolocation.country_acronym)
            .await
        {
            log::error!("failed to backfill country: {}", err);
        }
    }

    // prefetch everything the welcome sequence needs before locking
    let stats_rows = server.db.stats_for_user(user.id).await.unwrap_or_default();
    let relationships = server
        .db
        .relationships_for(user.id)
        .await
        .unwrap_or_default();
    let mut privileges = privileges;
    let first_login = !privileges.contains(Privileges::VERIFIED);
    if first_login {
        privileges |= Privileges::VERIFIED;
        if user.id == FIRST_USER_ID {
            // the first account registered owns the place
            privileges |= Privileges::STAFF
                | Privileges::NOMINATOR
                | Privileges::WHITELISTED
                | Privileges::TOURNEY_MANAGER
                | Privileges::DONATOR
                | Privileges::ALUMNI;
        }
        if let Err(err) = server.db.update_privileges(user.id, privileges.bits()).await {
            log::error!("failed to persist first-login privileges: {}", err);
        }
    }
    let restricted = !privileges.contains(Privileges::UNRESTRICTED);
    let mail = if restricted {
        Vec::new()
    } else {
        server.db.unread_mail(user.id).await.unwrap_or_default()
    };

    let mut session = Session::new(user.id, &user.name, privileges);
    session.token = generate_token();
    session.pw_bcrypt = Some(user.pw_bcrypt.clone());
    session.utc_offset = login_data.utc_offset;
    session.pm_private = login_data.pm_private;
    session.silence_end = user.silence_end;
    session.donor_end = user.donor_end;
    session.geolocation = geolocation;
    session.api_key = user.api_key.clone();
    session.is_tourney_client = osu_version.stream == "tourney";
    if user.clan_id != 0 {
        session.clan_id = Some(user.clan_id);
        session.clan_priv = ClanPrivileges::from_i32(user.clan_priv);
    }
    for row in stats_rows {
        if let Some(mode) = crate::gamemode::GameMode::from_u8(row.mode as u8) {
            let rank = server
                .leaderboard
                .global_rank(user.id, mode)
                .await
                .unwrap_or(0);
            session.stats.insert(
                mode,
                crate::session::ModeStats {
                    total_score: row.total_score,
                    ranked_score: row.ranked_score,
                    pp: row.pp.max(0) as u32,
                    accuracy: row.accuracy,
                    plays: row.plays,
                    playtime: row.playtime,
                    max_combo: row.max_combo,
                    global_rank: if restricted { 0 } else { rank },
                },
            );
        }
    }
    for rel in relationships {
        match rel.kind {
            crate::database::RelationshipKind::Friend => {
                session.friends.insert(rel.target_id);
            }
            crate::database::RelationshipKind::Block => {
                session.blocks.insert(rel.target_id);
            }
        }
    }
    session.friends.insert(BOT_USER_ID);

    let token = session.token.clone();
    let user_os = if running_under_wine { "unix (wine)" } else { "win32" };

    // compose the welcome sequence and seat the session
    let mut world = server.world.write().await;

    let mut data = BytesMut::new();
    data.extend_from_slice(&out::protocol_version(bancho::PROTOCOL_VERSION));
    data.extend_from_slice(&out::user_id(session.id));
    // supporter is always flagged here so every client gets direct &
    // friend-ranking perks; presence packets show the real bits
    data.extend_from_slice(&out::bancho_privileges(
        (session.client_privileges() | ClientPrivileges::SUPPORTER).bits() as i32,
    ));
    data.extend_from_slice(&out::notification(&format!(
        "Welcome back to {}!",
        server.config.domain
    )));

    let channel_infos: Vec<(String, String, u16, Privileges)> = world
        .channels
        .iter()
        .filter(|c| c.auto_join && c.real_name != "#lobby")
        .filter(|c| c.can_read(session.privileges))
        .map(|c| {
            (
                c.real_name.clone(),
                c.topic.clone(),
                c.member_count(),
                c.read_priv,
            )
        })
        .collect();
    for (name, topic, count, read_priv) in channel_infos {
        let info = out::channel_info(&name, &topic, count);
        data.extend_from_slice(&info);
        // existing players see the count too
        for other in world.players.iter_mut() {
            if read_priv.is_empty() || other.privileges.intersects(read_priv) {
                other.enqueue(&info);
            }
        }
    }
    data.extend_from_slice(&out::channel_info_end());

    data.extend_from_slice(&out::main_menu_icon(
        &server.config.menu_icon_url,
        &server.config.menu_onclick_url,
    ));
    let friend_ids: Vec<i32> = session.friends.iter().copied().collect();
    data.extend_from_slice(&out::friends_list(&friend_ids));
    data.extend_from_slice(&out::silence_end(session.remaining_silence() as i32));

    let own_presence = presence_packet(&session);
    let own_stats = stats_packet(&session);
    data.extend_from_slice(&own_presence);
    data.extend_from_slice(&own_stats);

    if !restricted {
        let mut broadcast = BytesMut::new();
        broadcast.extend_from_slice(&own_presence);
        broadcast.extend_from_slice(&own_stats);
        for other in world.players.iter_mut() {
            other.enqueue(&broadcast);
        }
        for other in world.players.iter() {
            if other.restricted() {
                continue;
            }
            if other.is_bot {
                // the bot's frames are requested constantly; serve the cache
                data.extend_from_slice(&server.bot_status.presence());
                data.extend_from_slice(&server.bot_status.stats());
            } else {
                data.extend_from_slice(&presence_packet(other));
                data.extend_from_slice(&stats_packet(other));
            }
        }

        let mut seen_senders = std::collections::HashSet::new();
        for msg in &mail {
            if seen_senders.insert(msg.from_id) {
                data.extend_from_slice(&out::send_message(
                    &msg.from_name,
                    "Unread messages",
                    &msg.to_name,
                    msg.from_id,
                ));
            }
            let sent_at = Utc
                .timestamp_opt(msg.sent_at, 0)
                .single()
                .unwrap_or_else(Utc::now);
            data.extend_from_slice(&out::send_message(
                &msg.from_name,
                &format!("[{}] {}", sent_at.format("%a %b %d @ %H:%M%p"), msg.msg),
                &msg.to_name,
                msg.from_id,
            ));
        }

        if first_login {
            let welcome = format!(
                "Welcome to {}.\nTo see a list of commands, use {}help.\nEnjoy the server!",
                server.config.domain, server.config.command_prefix
            );
            data.extend_from_slice(&out::send_message(
                &world.bot_name(),
                &welcome,
                &session.name,
                BOT_USER_ID,
            ));
        }
    } else {
        for other in world.players.iter() {
            if other.restricted() {
                continue;
            }
            if other.is_bot {
                data.extend_from_slice(&server.bot_status.presence());
                data.extend_from_slice(&server.bot_status.stats());
            } else {
                data.extend_from_slice(&presence_packet(other));
                data.extend_from_slice(&stats_packet(other));
            }
        }
        data.extend_from_slice(&out::account_restricted());
        data.extend_from_slice(&out::send_message(
            &world.bot_name(),
            "Your account is currently in restricted mode. If you believe \
             this is a mistake, you may appeal via the form on the site.",
            &session.name,
            BOT_USER_ID,
        ));
    }

    log::info!(
        "{} logged in from {} using {} on {}",
        session.name,
        session.geolocation.country_acronym.to_uppercase(),
        login_data.osu_version,
        user_os
    );

    world.players.insert(session);
    drop(world);

    if !mail.is_empty() {
        if let Err(err) = server.db.mark_mail_read(user.id).await {
            log::error!("failed to mark mail read: {}", err);
        }
    }
    server.touch_latest_activity(user.id);

    LoginResponse {
        token,
        body: data.freeze(),
    }
}

/// Verify a password md5 against the stored bcrypt, via the per-hash cache;
/// the real bcrypt work runs on the blocking pool.
async fn verify_password(server: &Server, pw_bcrypt: &str, password_md5: &str) -> bool {
    if let Some(hit) = server
        .bcrypt_cache
        .lock()
        .unwrap()
        .check(pw_bcrypt, password_md5)
    {
        return hit;
    }

    let hash = pw_bcrypt.to_string();
    let password = password_md5.to_string();
    let verified = tokio::task::spawn_blocking(move || {
        bcrypt::verify(password.as_bytes(), &hash).unwrap_or(false)
    })
    .await
    .unwrap_or(false);

    if verified {
        server
            .bcrypt_cache
            .lock()
            .unwrap()
            .store(pw_bcrypt, password_md5);
    }
    verified
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_BODY: &str = "someone\n0123456789abcdef0123456789abcdef\n\
        b20220330.2|-5|1|dcfcd07e645d245babe887e5e2daa016:runningunderwine:\
        cd90b29b17a52a0b9ad82184ba4a5c38:a137c16ce1b5d6afcd01e24e74726da2:\
        b6f02a6ca1ed5bbbea8d1f9a5ab163b9:|0";

    #[test]
    fn parses_a_login_body() {
        let data = parse_login_data(LOGIN_BODY.as_bytes()).unwrap();
        assert_eq!(data.username, "someone");
        assert_eq!(data.utc_offset, -5);
        assert_eq!(data.osu_version, "b20220330.2");
        assert_eq!(data.adapters_str, "runningunderwine");
        assert!(!data.pm_private);
        assert_eq!(data.disk_signature_md5, "b6f02a6ca1ed5bbbea8d1f9a5ab163b9");
    }

    #[test]
    fn version_streams_default_to_stable() {
        let v = parse_osu_version("b20240101").unwrap();
        assert_eq!(v.stream, "stable");
        assert_eq!(v.revision, None);

        let v = parse_osu_version("b20220330.2tourney").unwrap();
        assert_eq!(v.stream, "tourney");
        assert_eq!(v.revision, Some(2));

        assert!(parse_osu_version("x123").is_none());
    }

    #[test]
    fn adapters_split() {
        let (adapters, wine) = parse_adapters("aa.bb.cc.");
        assert_eq!(adapters, vec!["aa", "bb", "cc"]);
        assert!(!wine);

        let (_, wine) = parse_adapters("runningunderwine");
        assert!(wine);
    }
}
