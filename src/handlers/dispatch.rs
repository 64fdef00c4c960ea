use bancho::{ClientPacketId, DecodeError, Frame, Reader};

use crate::server::Server;

/// The packets restricted users may still send: presence housekeeping and
/// channel membership, nothing social or competitive.
pub const RESTRICTED_ALLOWED: &[ClientPacketId] = &[
    ClientPacketId::Ping,
    ClientPacketId::ChangeAction,
    ClientPacketId::Logout,
    ClientPacketId::RequestStatusUpdate,
    ClientPacketId::UserStatsRequest,
    ClientPacketId::ChannelJoin,
    ClientPacketId::ChannelPart,
    ClientPacketId::ReceiveUpdates,
];

/// Decode one frame and run its handler. Unknown packet ids are skipped;
/// decode failures abort the caller's whole request.
pub async fn dispatch(
    server: &Server,
    user_id: i32,
    restricted: bool,
    frame: Frame<'_>,
) -> Result<(), DecodeError> {
    use ClientPacketId::*;

    let Some(id) = ClientPacketId::from_u16(frame.id) else {
        log::debug!("unhandled packet id {} from {}", frame.id, user_id);
        return Ok(());
    };

    if restricted && !RESTRICTED_ALLOWED.contains(&id) {
        return Ok(());
    }

    let mut r = Reader::new(frame.payload);
    match id {
        Ping => {} // ping be like

        ChangeAction => {
            let action = r.read_u8()?;
            let info_text = r.read_string()?;
            let map_md5 = r.read_string()?;
            let mods = r.read_u32()?;
            let mode = r.read_u8()?;
            let map_id = r.read_i32()?;
            server
                .handle_change_action(user_id, action, info_text, map_md5, mods, mode, map_id)
                .await;
        }

        SendPublicMessage => {
            let msg = r.read_message()?;
            server.handle_public_message(user_id, msg).await;
        }

        Logout => {
            r.read_i32()?; // reserved
            server.handle_logout(user_id).await;
        }

        RequestStatusUpdate => server.handle_stats_update_request(user_id).await,

        StartSpectating => {
            let target_id = r.read_i32()?;
            server.handle_start_spectating(user_id, target_id).await;
        }

        StopSpectating => server.handle_stop_spectating(user_id).await,

        SpectateFrames => {
            // parsed for validation; the raw bytes are what gets relayed
            let bundle = r.read_replay_frame_bundle()?;
            server.handle_spectate_frames(user_id, bundle).await;
        }

        ErrorReport => {
            log::debug!("error report from {}", user_id);
        }

        CantSpectate => server.handle_cant_spectate(user_id).await,

        SendPrivateMessage => {
            let msg = r.read_message()?;
            server.handle_private_message(user_id, msg).await;
        }

        PartLobby => server.handle_lobby_part(user_id).await,

        JoinLobby => server.handle_lobby_join(user_id).await,

        CreateMatch => {
            let match_data = r.read_match()?;
            server.handle_match_create(user_id, match_data).await;
        }

        JoinMatch => {
            let match_id = r.read_i32()?;
            let password = r.read_string()?;
            server.handle_match_join(user_id, match_id, password).await;
        }

        PartMatch => server.handle_match_part(user_id).await,

        MatchChangeSlot => {
            let slot_id = r.read_i32()?;
            server.handle_match_change_slot(user_id, slot_id).await;
        }

        MatchReady => server.handle_match_ready(user_id).await,

        MatchLock => {
            let slot_id = r.read_i32()?;
            server.handle_match_lock(user_id, slot_id).await;
        }

        MatchChangeSettings => {
            let match_data = r.read_match()?;
            server.handle_match_change_settings(user_id, match_data).await;
        }

        MatchStart => server.handle_match_start(user_id).await,

        MatchScoreUpdate => {
            server
                .handle_match_score_update(user_id, frame.payload.to_vec())
                .await;
        }

        MatchComplete => server.handle_match_complete(user_id).await,

        MatchChangeMods => {
            let mods = r.read_i32()?;
            server.handle_match_change_mods(user_id, mods as u32).await;
        }

        MatchLoadComplete => server.handle_match_load_complete(user_id).await,

        MatchNoBeatmap => server.handle_match_no_beatmap(user_id).await,

        MatchNotReady => server.handle_match_not_ready(user_id).await,

        MatchFailed => server.handle_match_failed(user_id).await,

        MatchHasBeatmap => server.handle_match_has_beatmap(user_id).await,

        MatchSkipRequest => server.handle_match_skip_request(user_id).await,

        ChannelJoin => {
            let name = r.read_string()?;
            server.handle_channel_join(user_id, name).await;
        }

        MatchTransferHost => {
            let slot_id = r.read_i32()?;
            server.handle_match_transfer_host(user_id, slot_id).await;
        }

        FriendAdd => {
            let target_id = r.read_i32()?;
            server.handle_friend_add(user_id, target_id).await;
        }

        FriendRemove => {
            let target_id = r.read_i32()?;
            server.handle_friend_remove(user_id, target_id).await;
        }

        MatchChangeTeam => server.handle_match_change_team(user_id).await,

        ChannelPart => {
            let name = r.read_string()?;
            server.handle_channel_part(user_id, name).await;
        }

        ReceiveUpdates => {
            let value = r.read_i32()?;
            server.handle_receive_updates(user_id, value).await;
        }

        SetAwayMessage => {
            let msg = r.read_message()?;
            server.handle_set_away_message(user_id, msg.text).await;
        }

        UserStatsRequest => {
            let user_ids = r.read_i32_list()?;
            server.handle_user_stats_request(user_id, user_ids).await;
        }

        MatchInvite => {
            let target_id = r.read_i32()?;
            server.handle_match_invite(user_id, target_id).await;
        }

        MatchChangePassword => {
            let match_data = r.read_match()?;
            server.handle_match_change_password(user_id, match_data).await;
        }

        TournamentMatchInfoRequest => {
            let match_id = r.read_i32()?;
            server.handle_tourney_match_info(user_id, match_id).await;
        }

        UserPresenceRequest => {
            let user_ids = r.read_i32_list()?;
            server.handle_user_presence_request(user_id, user_ids).await;
        }

        UserPresenceRequestAll => {
            r.read_i32()?; // ingame time
            server.handle_user_presence_request_all(user_id).await;
        }

        ToggleBlockNonFriendDms => {
            let value = r.read_i32()?;
            server.handle_toggle_block_dms(user_id, value).await;
        }

        TournamentJoinMatchChannel => {
            let match_id = r.read_i32()?;
            server.handle_tourney_join_channel(user_id, match_id).await;
        }

        TournamentLeaveMatchChannel => {
            let match_id = r.read_i32()?;
            server.handle_tourney_leave_channel(user_id, match_id).await;
        }
    }

    Ok(())
}
