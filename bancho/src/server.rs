//! Constructors for every server-to-client packet.
//!
//! These return finished frames ([`Bytes`]) ready to append to a session's
//! outbound buffer; callers concatenate them freely.

use bytes::Bytes;

use crate::ids::ServerPacketId;
use crate::structs::{MatchData, Message, ScoreFrame};
use crate::writer::Writer;

/// Packet id 5. Negative ids signal a login failure:
/// -1 authentication failed, -2 old client, -3/-4 banned, -5 error,
/// -6 needs supporter, -7 password reset, -8 requires verification.
/// Any non-negative value is the logged-in user id.
pub fn user_id(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserId);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 7.
pub fn send_message(sender: &str, text: &str, recipient: &str, sender_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SendMessage);
    w.put_message(&Message {
        sender: sender.to_string(),
        text: text.to_string(),
        recipient: recipient.to_string(),
        sender_id,
    });
    w.finish()
}

/// Packet id 8.
pub fn pong() -> Bytes {
    Writer::new(ServerPacketId::Pong).finish()
}

/// Packet id 11.
#[allow(clippy::too_many_arguments)]
pub fn user_stats(
    user_id: i32,
    action: u8,
    info_text: &str,
    map_md5: &str,
    mods: i32,
    mode: u8,
    map_id: i32,
    ranked_score: i64,
    accuracy: f32,
    plays: i32,
    total_score: i64,
    global_rank: i32,
    pp: u32,
) -> Bytes {
    // the client caps pp at i16; larger values are shown via ranked score
    let (ranked_score, pp) = if pp > 0x7fff {
        (pp as i64, 0)
    } else {
        (ranked_score, pp as i16)
    };

    let mut w = Writer::new(ServerPacketId::UserStats);
    w.put_i32(user_id);
    w.put_u8(action);
    w.put_string(info_text);
    w.put_string(map_md5);
    w.put_i32(mods);
    w.put_u8(mode);
    w.put_i32(map_id);
    w.put_i64(ranked_score);
    w.put_f32(accuracy / 100.0);
    w.put_i32(plays);
    w.put_i64(total_score);
    w.put_i32(global_rank);
    w.put_i16(pp);
    w.finish()
}

/// Packet id 12.
pub fn logout(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserLogout);
    w.put_i32(user_id);
    w.put_u8(0);
    w.finish()
}

/// Packet id 13.
pub fn spectator_joined(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SpectatorJoined);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 14.
pub fn spectator_left(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SpectatorLeft);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 15. The bundle payload is forwarded verbatim; spectate frames
/// are far too frequent to re-encode.
pub fn spectate_frames(raw_bundle: &[u8]) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SpectateFrames);
    w.put_raw(raw_bundle);
    w.finish()
}

/// Packet id 19.
pub fn version_update() -> Bytes {
    Writer::new(ServerPacketId::VersionUpdate).finish()
}

/// Packet id 22.
pub fn spectator_cant_spectate(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SpectatorCantSpectate);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 24.
pub fn notification(msg: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::Notification);
    w.put_string(msg);
    w.finish()
}

/// Packet id 26.
pub fn update_match(m: &MatchData, send_password: bool) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UpdateMatch);
    w.put_match(m, send_password);
    w.finish()
}

/// Packet id 27.
pub fn new_match(m: &MatchData) -> Bytes {
    let mut w = Writer::new(ServerPacketId::NewMatch);
    w.put_match(m, true);
    w.finish()
}

/// Packet id 28.
pub fn dispose_match(match_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::DisposeMatch);
    w.put_i32(match_id);
    w.finish()
}

/// Packet id 36.
pub fn match_join_success(m: &MatchData) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MatchJoinSuccess);
    w.put_match(m, true);
    w.finish()
}

/// Packet id 37.
pub fn match_join_fail() -> Bytes {
    Writer::new(ServerPacketId::MatchJoinFail).finish()
}

/// Packet id 42.
pub fn fellow_spectator_joined(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::FellowSpectatorJoined);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 43.
pub fn fellow_spectator_left(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::FellowSpectatorLeft);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 46.
pub fn match_start(m: &MatchData) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MatchStart);
    w.put_match(m, true);
    w.finish()
}

/// Packet id 48, from a decoded frame.
pub fn match_score_update(frame: &ScoreFrame) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MatchScoreUpdate);
    w.put_score_frame(frame);
    w.finish()
}

/// Packet id 48, relaying the client's own bytes. The byte at offset 4 of a
/// score frame is the slot id, which the server stamps in.
pub fn match_score_update_raw(mut payload: Vec<u8>, slot_id: u8) -> Bytes {
    if payload.len() > 4 {
        payload[4] = slot_id;
    }
    let mut w = Writer::new(ServerPacketId::MatchScoreUpdate);
    w.put_raw(&payload);
    w.finish()
}

/// Packet id 50.
pub fn match_transfer_host() -> Bytes {
    Writer::new(ServerPacketId::MatchTransferHost).finish()
}

/// Packet id 53.
pub fn match_all_players_loaded() -> Bytes {
    Writer::new(ServerPacketId::MatchAllPlayersLoaded).finish()
}

/// Packet id 57.
pub fn match_player_failed(slot_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MatchPlayerFailed);
    w.put_i32(slot_id);
    w.finish()
}

/// Packet id 58.
pub fn match_complete() -> Bytes {
    Writer::new(ServerPacketId::MatchComplete).finish()
}

/// Packet id 61.
pub fn match_skip() -> Bytes {
    Writer::new(ServerPacketId::MatchSkip).finish()
}

/// Packet id 64.
pub fn channel_join_success(name: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::ChannelJoinSuccess);
    w.put_string(name);
    w.finish()
}

/// Packet id 65.
pub fn channel_info(name: &str, topic: &str, member_count: u16) -> Bytes {
    let mut w = Writer::new(ServerPacketId::ChannelInfo);
    w.put_string(name);
    w.put_string(topic);
    w.put_u16(member_count);
    w.finish()
}

/// Packet id 66.
pub fn channel_kick(name: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::ChannelKick);
    w.put_string(name);
    w.finish()
}

/// Packet id 67.
pub fn channel_auto_join(name: &str, topic: &str, member_count: u16) -> Bytes {
    let mut w = Writer::new(ServerPacketId::ChannelAutoJoin);
    w.put_string(name);
    w.put_string(topic);
    w.put_u16(member_count);
    w.finish()
}

/// Packet id 71.
pub fn bancho_privileges(privileges: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::Privileges);
    w.put_i32(privileges);
    w.finish()
}

/// Packet id 72.
pub fn friends_list(friend_ids: &[i32]) -> Bytes {
    let mut w = Writer::new(ServerPacketId::FriendsList);
    w.put_i32_list(friend_ids);
    w.finish()
}

/// Packet id 75.
pub fn protocol_version(version: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::ProtocolVersion);
    w.put_i32(version);
    w.finish()
}

/// Packet id 76.
pub fn main_menu_icon(icon_url: &str, onclick_url: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MainMenuIcon);
    w.put_string(&format!("{}|{}", icon_url, onclick_url));
    w.finish()
}

/// Packet id 81.
pub fn match_player_skipped(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MatchPlayerSkipped);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 83. The privilege byte also carries the selected mode in its
/// top bits; utc offsets are shifted by +24 on the wire.
#[allow(clippy::too_many_arguments)]
pub fn user_presence(
    user_id: i32,
    name: &str,
    utc_offset: i8,
    country_code: u8,
    client_privileges: u8,
    mode: u8,
    longitude: f32,
    latitude: f32,
    global_rank: i32,
) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserPresence);
    w.put_i32(user_id);
    w.put_string(name);
    w.put_u8((utc_offset + 24) as u8);
    w.put_u8(country_code);
    w.put_u8(client_privileges | (mode << 5));
    w.put_f32(longitude);
    w.put_f32(latitude);
    w.put_i32(global_rank);
    w.finish()
}

/// Packet id 86. A zero delay forces an immediate reconnect.
pub fn restart_server(delay_ms: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::Restart);
    w.put_i32(delay_ms);
    w.finish()
}

/// Packet id 88.
pub fn match_invite(sender: &str, sender_id: i32, target: &str, match_embed: &str) -> Bytes {
    let text = format!("Come join my game: {}.", match_embed);
    let mut w = Writer::new(ServerPacketId::MatchInvite);
    w.put_message(&Message {
        sender: sender.to_string(),
        text,
        recipient: target.to_string(),
        sender_id,
    });
    w.finish()
}

/// Packet id 89.
pub fn channel_info_end() -> Bytes {
    Writer::new(ServerPacketId::ChannelInfoEnd).finish()
}

/// Packet id 91.
pub fn match_change_password(new_password: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::MatchChangePassword);
    w.put_string(new_password);
    w.finish()
}

/// Packet id 92.
pub fn silence_end(delta_secs: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SilenceEnd);
    w.put_i32(delta_secs);
    w.finish()
}

/// Packet id 94.
pub fn user_silenced(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserSilenced);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 95.
pub fn user_presence_single(user_id: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserPresenceSingle);
    w.put_i32(user_id);
    w.finish()
}

/// Packet id 96.
pub fn user_presence_bundle(user_ids: &[i32]) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserPresenceBundle);
    w.put_i32_list(user_ids);
    w.finish()
}

/// Packet id 100.
pub fn user_dm_blocked(target: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::UserDmBlocked);
    w.put_message(&Message {
        sender: String::new(),
        text: String::new(),
        recipient: target.to_string(),
        sender_id: 0,
    });
    w.finish()
}

/// Packet id 101.
pub fn target_silenced(target: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::TargetIsSilenced);
    w.put_message(&Message {
        sender: String::new(),
        text: String::new(),
        recipient: target.to_string(),
        sender_id: 0,
    });
    w.finish()
}

/// Packet id 102.
pub fn version_update_forced() -> Bytes {
    Writer::new(ServerPacketId::VersionUpdateForced).finish()
}

/// Packet id 103.
pub fn switch_server(idle_secs: i32) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SwitchServer);
    w.put_i32(idle_secs);
    w.finish()
}

/// Packet id 104.
pub fn account_restricted() -> Bytes {
    Writer::new(ServerPacketId::AccountRestricted).finish()
}

/// Packet id 106.
pub fn match_abort() -> Bytes {
    Writer::new(ServerPacketId::MatchAbort).finish()
}

/// Packet id 107.
pub fn switch_tournament_server(host: &str) -> Bytes {
    let mut w = Writer::new(ServerPacketId::SwitchTournamentServer);
    w.put_string(host);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use crate::structs::SLOT_HAS_PLAYER;

    #[test]
    fn user_id_golden_bytes() {
        assert_eq!(
            user_id(0).as_ref(),
            b"\x05\x00\x00\x04\x00\x00\x00\x00\x00\x00\x00"
        );
        assert_eq!(
            user_id(2_147_483_647).as_ref(),
            b"\x05\x00\x00\x04\x00\x00\x00\xff\xff\xff\x7f"
        );
    }

    #[test]
    fn send_message_golden_bytes() {
        assert_eq!(
            send_message("cmyui", "woah woah crazy!!", "jacobian", 32).as_ref(),
            b"\x07\x00\x00\x28\x00\x00\x00\x0b\x05cmyui\x0b\x11woah woah crazy!!\x0b\x08jacobian\x20\x00\x00\x00".as_ref()
        );
        assert_eq!(
            send_message("", "", "", 0).as_ref(),
            b"\x07\x00\x00\x07\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"
        );
    }

    #[test]
    fn pong_and_logout_golden_bytes() {
        assert_eq!(pong().as_ref(), b"\x08\x00\x00\x00\x00\x00\x00");
        assert_eq!(
            logout(0).as_ref(),
            b"\x0c\x00\x00\x05\x00\x00\x00\x00\x00\x00\x00\x00"
        );
        assert_eq!(
            logout(2_147_483_647).as_ref(),
            b"\x0c\x00\x00\x05\x00\x00\x00\xff\xff\xff\x7f\x00"
        );
    }

    #[test]
    fn user_stats_oversized_pp_moves_to_ranked_score() {
        let frame = user_stats(3, 0, "", "", 0, 0, 0, 1000, 0.0, 0, 0, 1, 40_000);
        let mut r = Reader::new(&frame[7..]);
        assert_eq!(r.read_i32().unwrap(), 3);
        r.read_u8().unwrap(); // action
        r.read_string().unwrap();
        r.read_string().unwrap();
        r.read_i32().unwrap(); // mods
        r.read_u8().unwrap(); // mode
        r.read_i32().unwrap(); // map id
        assert_eq!(r.read_i64().unwrap(), 40_000); // pp shown as ranked score
        r.read_f32().unwrap();
        r.read_i32().unwrap();
        r.read_i64().unwrap();
        r.read_i32().unwrap();
        assert_eq!(r.read_i16().unwrap(), 0); // pp cleared
    }

    #[test]
    fn match_round_trip() {
        let mut m = MatchData {
            id: 7,
            in_progress: true,
            mods: 72,
            name: "kitten cup: (tora) vs. (shiro)".to_string(),
            password: "secret".to_string(),
            map_name: "some map".to_string(),
            map_id: 1723723,
            map_md5: "60b725f10c9c85c70d97880dfe8191b3".to_string(),
            host_id: 3,
            mode: 0,
            win_condition: 1,
            team_type: 2,
            freemods: true,
            seed: 1234,
            ..MatchData::default()
        };
        m.slot_statuses[0] = 4; // not ready
        m.slot_statuses[1] = 32; // playing
        m.slot_teams[0] = 1;
        m.slot_teams[1] = 2;
        m.slot_ids = vec![3, 4];
        m.slot_mods[1] = 8;

        let encoded = update_match(&m, true);
        let decoded = Reader::new(&encoded[7..]).read_match().unwrap();
        assert_eq!(decoded, m);

        // elided password comes back as a present-but-empty string
        let hidden = update_match(&m, false);
        let decoded = Reader::new(&hidden[7..]).read_match().unwrap();
        assert_eq!(decoded.password, "");
        assert_eq!(decoded.slot_ids, vec![3, 4]);
        assert!(decoded.slot_statuses[1] & SLOT_HAS_PLAYER != 0);
    }

    #[test]
    fn score_frame_round_trip_v2() {
        let frame = ScoreFrame {
            time: 4242,
            id: 1,
            num300: 100,
            num100: 5,
            num50: 1,
            num_geki: 20,
            num_katu: 3,
            num_miss: 2,
            total_score: 1_000_000,
            current_combo: 50,
            max_combo: 120,
            perfect: false,
            current_hp: 200,
            tag_byte: 0,
            score_v2: true,
            combo_portion: Some(0.7),
            bonus_portion: Some(0.3),
        };
        let encoded = match_score_update(&frame);
        let decoded = Reader::new(&encoded[7..]).read_score_frame().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn raw_score_relay_stamps_slot_id() {
        let frame = ScoreFrame {
            time: 1,
            id: 0,
            ..ScoreFrame::default()
        };
        let encoded = match_score_update(&frame);
        let relayed = match_score_update_raw(encoded[7..].to_vec(), 9);
        let decoded = Reader::new(&relayed[7..]).read_score_frame().unwrap();
        assert_eq!(decoded.id, 9);
        assert_eq!(decoded.time, 1);
    }
}
