//! End-to-end scenarios over the in-memory ports: the login pipeline,
//! match lifecycle with scrim scoring, host transfer, chat gating and
//! spectator fan-out, all driven through the same handlers the HTTP layer
//! uses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use bancho::{MatchData, PacketStream, Reader, ServerPacketId};

use torii::config::Config;
use torii::database::{ChannelRow, MockDatabase, User};
use torii::gamemode::GameMode;
use torii::leaderboard::MockLeaderboard;
use torii::login::handle_login;
use torii::matches::{ScrimKey, SlotStatus};
use torii::network::{Beatmap, MockBeatmapSource, MockGeolocator};
use torii::performance::MockCalculator;
use torii::privileges::Privileges;
use torii::server::Server;
use torii::session::{RecentScore, Session};

const MAP_MD5: &str = "60b725f10c9c85c70d97880dfe8191b3";

struct Harness {
    server: Server,
    db: Arc<MockDatabase>,
    beatmaps: Arc<MockBeatmapSource>,
}

async fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let db = Arc::new(MockDatabase::new());
    db.add_channel(ChannelRow {
        name: "#osu".to_string(),
        topic: "general discussion".to_string(),
        read_priv: Privileges::UNRESTRICTED.bits(),
        write_priv: Privileges::UNRESTRICTED.bits(),
        auto_join: true,
    });
    db.add_channel(ChannelRow {
        name: "#lobby".to_string(),
        topic: "multiplayer lobby".to_string(),
        read_priv: Privileges::UNRESTRICTED.bits(),
        write_priv: Privileges::UNRESTRICTED.bits(),
        auto_join: false,
    });

    let beatmaps = Arc::new(MockBeatmapSource::new());
    beatmaps.add(Beatmap {
        id: 1001,
        set_id: 500,
        md5: MAP_MD5.to_string(),
        artist: "Artist".to_string(),
        title: "Title".to_string(),
        version: "Expert".to_string(),
        total_length: 90,
        mode_vanilla: 0,
    });

    let server = Server::init(
        Config::default(),
        db.clone(),
        Arc::new(MockLeaderboard::new()),
        Arc::new(MockGeolocator::default()),
        beatmaps.clone(),
        Arc::new(MockCalculator),
        None,
    )
    .await
    .expect("failed to build test server");

    Harness {
        server,
        db,
        beatmaps,
    }
}

/// Seat a session directly, the way the login pipeline would.
async fn seat_player(server: &Server, id: i32, name: &str) {
    let mut world = server.world.write().await;
    let session = Session::new(id, name, Privileges::UNRESTRICTED | Privileges::VERIFIED);
    world.players.insert(session);
}

/// Packet ids currently buffered for a user.
async fn drain_ids(server: &Server, user_id: i32) -> Vec<u16> {
    let mut world = server.world.write().await;
    let data = match world.players.get_mut(user_id) {
        Some(s) => s.dequeue(),
        None => return Vec::new(),
    };
    PacketStream::new(&data)
        .filter_map(Result::ok)
        .map(|f| f.id)
        .collect()
}

/// The last UPDATE_MATCH frame buffered for a user, decoded.
async fn drain_last_match_update(server: &Server, user_id: i32) -> Option<MatchData> {
    let mut world = server.world.write().await;
    let data = world.players.get_mut(user_id)?.dequeue();
    PacketStream::new(&data)
        .filter_map(Result::ok)
        .filter(|f| f.id == ServerPacketId::UpdateMatch as u16)
        .last()
        .and_then(|f| Reader::new(f.payload).read_match().ok())
}

fn create_match_data(host_id: i32) -> MatchData {
    MatchData {
        name: "test match".to_string(),
        password: String::new(),
        map_name: "Artist - Title [Expert]".to_string(),
        map_id: 1001,
        map_md5: MAP_MD5.to_string(),
        host_id,
        seed: 42,
        ..MatchData::default()
    }
}

fn login_body(username: &str, password_md5: &str) -> Vec<u8> {
    format!(
        "{}\n{}\nb20220330.2|-5|1|\
         dcfcd07e645d245babe887e5e2daa016:runningunderwine:\
         cd90b29b17a52a0b9ad82184ba4a5c38:a137c16ce1b5d6afcd01e24e74726da2:\
         b6f02a6ca1ed5bbbea8d1f9a5ab163b9:|0",
        username, password_md5
    )
    .into_bytes()
}

fn stored_user(id: i32, name: &str, password_md5: &str) -> User {
    User {
        id,
        name: name.to_string(),
        safe_name: name.to_lowercase().replace(' ', "_"),
        pw_bcrypt: bcrypt::hash(password_md5, 4).expect("bcrypt hash"),
        privileges: (Privileges::UNRESTRICTED | Privileges::VERIFIED).bits(),
        country: "ca".to_string(),
        silence_end: 0,
        donor_end: 0,
        clan_id: 0,
        clan_priv: 0,
        api_key: None,
    }
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let h = harness().await;
    h.db.add_user(stored_user(3, "alpha", "aaaabbbbccccddddaaaabbbbccccdddd"));

    let response = handle_login(
        &h.server,
        &login_body("alpha", "11112222333344441111222233334444"),
        "1.2.3.4",
    )
    .await;
    assert_eq!(response.token, "incorrect-credentials");

    let ids: Vec<u16> = PacketStream::new(&response.body)
        .filter_map(Result::ok)
        .map(|f| f.id)
        .collect();
    assert!(ids.contains(&(ServerPacketId::UserId as u16)));
}

#[tokio::test]
async fn login_welcome_sequence() {
    let h = harness().await;
    let pw = "aaaabbbbccccddddaaaabbbbccccdddd";
    h.db.add_user(stored_user(3, "alpha", pw));

    let response = handle_login(&h.server, &login_body("alpha", pw), "1.2.3.4").await;
    assert_ne!(response.token, "incorrect-credentials");
    assert_eq!(h.db.login_count(), 1);

    let frames: Vec<_> = PacketStream::new(&response.body)
        .collect::<Result<Vec<_>, _>>()
        .expect("welcome frames decode");
    let ids: Vec<u16> = frames.iter().map(|f| f.id).collect();

    // protocol version, then our id, in order
    assert_eq!(ids[0], ServerPacketId::ProtocolVersion as u16);
    assert_eq!(ids[1], ServerPacketId::UserId as u16);
    assert!(ids.contains(&(ServerPacketId::ChannelInfo as u16)));
    assert!(ids.contains(&(ServerPacketId::ChannelInfoEnd as u16)));
    assert!(ids.contains(&(ServerPacketId::FriendsList as u16)));
    assert!(ids.contains(&(ServerPacketId::SilenceEnd as u16)));
    assert!(ids.contains(&(ServerPacketId::UserPresence as u16)));
    assert!(ids.contains(&(ServerPacketId::UserStats as u16)));

    let user_id = Reader::new(frames[1].payload).read_i32().unwrap();
    assert_eq!(user_id, 3);

    // the session is registered under the returned token
    let world = h.server.world.read().await;
    assert_eq!(world.players.get_by_token(&response.token).unwrap().id, 3);
}

#[tokio::test]
async fn login_replacement_threshold() {
    let h = harness().await;
    let pw = "aaaabbbbccccddddaaaabbbbccccdddd";
    h.db.add_user(stored_user(3, "alpha", pw));

    let first = handle_login(&h.server, &login_body("alpha", pw), "1.2.3.4").await;
    assert!(!first.token.is_empty());

    // half a second later: rejected, the old session is fresh
    let second = handle_login(&h.server, &login_body("alpha", pw), "1.2.3.4").await;
    assert_eq!(second.token, "user-already-logged-in");

    // pretend the first session has been quiet for twelve seconds
    {
        let mut world = h.server.world.write().await;
        let session = world.players.get_mut(3).unwrap();
        session.last_recv_time = Instant::now() - Duration::from_secs(12);
    }

    let third = handle_login(&h.server, &login_body("alpha", pw), "1.2.3.4").await;
    assert_ne!(third.token, "user-already-logged-in");

    let world = h.server.world.read().await;
    // the displaced token no longer resolves; the new one does
    assert!(world.players.get_by_token(&first.token).is_none());
    assert_eq!(world.players.get_by_token(&third.token).unwrap().id, 3);
}

#[tokio::test]
async fn match_lifecycle_with_scrim() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;

    h.server.handle_match_create(3, create_match_data(3)).await;
    h.server.handle_match_join(4, 0, String::new()).await;

    {
        let world = h.server.world.read().await;
        let m = world.matches.get(0).expect("match exists");
        assert_eq!(m.host_id, 3);
        assert_eq!(m.occupied_user_ids().len(), 2);
        assert!(world.channels.contains("#multi_0"));
    }

    // arm a bo1 scrim and give both players fresh scores to be collected
    {
        let mut world = h.server.world.write().await;
        let m = world.matches.get_mut(0).unwrap();
        m.is_scrimming = true;
        m.winning_points = 1;

        for (id, score) in [(3, 1_000_000_i64), (4, 500_000_i64)] {
            let session = world.players.get_mut(id).unwrap();
            session.recent_scores.insert(
                GameMode::VanillaOsu,
                RecentScore {
                    beatmap_md5: MAP_MD5.to_string(),
                    score,
                    pp: 321.0,
                    accuracy: 98.5,
                    max_combo: 1000,
                    mods: torii::mods::Mods::empty(),
                    mode: GameMode::VanillaOsu,
                    server_time: Utc::now(),
                },
            );
        }
    }

    h.server.handle_match_start(3).await;
    {
        let world = h.server.world.read().await;
        let m = world.matches.get(0).unwrap();
        assert!(m.in_progress);
        assert!(m
            .slots
            .iter()
            .filter(|s| s.user_id.is_some())
            .all(|s| s.status == SlotStatus::Playing));
    }

    h.server.handle_match_complete(3).await;
    {
        // one player still playing; nothing resolves yet
        let world = h.server.world.read().await;
        assert!(world.matches.get(0).unwrap().in_progress);
    }

    h.server.handle_match_complete(4).await;
    {
        let world = h.server.world.read().await;
        let m = world.matches.get(0).unwrap();
        assert!(!m.in_progress);
        assert!(m
            .slots
            .iter()
            .filter(|s| s.user_id.is_some())
            .all(|s| s.status == SlotStatus::NotReady));
    }

    // scrim settlement runs in the background; scores are already in
    tokio::time::sleep(Duration::from_millis(300)).await;
    {
        let world = h.server.world.read().await;
        let m = world.matches.get(0).unwrap();
        assert_eq!(m.winners, vec![Some(ScrimKey::User(3))]);
        assert!(!m.is_scrimming);
    }
}

#[tokio::test]
async fn host_transfer_on_leave() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;

    h.server.handle_match_create(3, create_match_data(3)).await;
    h.server.handle_match_join(4, 0, String::new()).await;

    // clear buffers so the assertions see only the part's effects
    drain_ids(&h.server, 3).await;
    drain_ids(&h.server, 4).await;

    h.server.handle_match_part(3).await;

    let world = h.server.world.read().await;
    let m = world.matches.get(0).expect("match survives");
    assert_eq!(m.host_id, 4);
    assert_eq!(m.occupied_user_ids(), vec![4]);
    drop(world);

    let update = drain_last_match_update(&h.server, 4)
        .await
        .expect("observer sees an update");
    assert_eq!(update.host_id, 4);

    // and the match dies once the last player leaves
    h.server.handle_match_part(4).await;
    let world = h.server.world.read().await;
    assert!(world.matches.get(0).is_none());
    assert!(!world.channels.contains("#multi_0"));
}

#[tokio::test]
async fn transfer_host_packet_reaches_new_host() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;

    h.server.handle_match_create(3, create_match_data(3)).await;
    h.server.handle_match_join(4, 0, String::new()).await;
    drain_ids(&h.server, 4).await;

    h.server.handle_match_part(3).await;

    let ids = drain_ids(&h.server, 4).await;
    assert!(ids.contains(&(ServerPacketId::MatchTransferHost as u16)));
    assert!(ids.contains(&(ServerPacketId::UpdateMatch as u16)));
}

#[tokio::test]
async fn silenced_public_message_is_dropped() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;

    {
        let mut world = h.server.world.write().await;
        world.join_channel(3, "#osu");
        world.join_channel(4, "#osu");
        world.players.get_mut(3).unwrap().silence_end = Utc::now().timestamp() + 600;
    }
    drain_ids(&h.server, 3).await;
    drain_ids(&h.server, 4).await;

    h.server
        .handle_public_message(
            3,
            bancho::Message {
                sender: "alpha".to_string(),
                text: "hello there".to_string(),
                recipient: "#osu".to_string(),
                sender_id: 3,
            },
        )
        .await;

    // nobody hears it, and no silence broadcast is re-emitted
    let ids = drain_ids(&h.server, 4).await;
    assert!(!ids.contains(&(ServerPacketId::SendMessage as u16)));
    assert!(!ids.contains(&(ServerPacketId::UserSilenced as u16)));
    let ids = drain_ids(&h.server, 3).await;
    assert!(ids.is_empty());
}

#[tokio::test]
async fn public_message_reaches_members_not_blockers() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;
    seat_player(&h.server, 5, "charlie").await;

    {
        let mut world = h.server.world.write().await;
        world.join_channel(3, "#osu");
        world.join_channel(4, "#osu");
        world.join_channel(5, "#osu");
        // charlie blocked alpha
        world.players.get_mut(5).unwrap().blocks.insert(3);
    }
    for id in [3, 4, 5] {
        drain_ids(&h.server, id).await;
    }

    h.server
        .handle_public_message(
            3,
            bancho::Message {
                sender: "alpha".to_string(),
                text: "hello there".to_string(),
                recipient: "#osu".to_string(),
                sender_id: 3,
            },
        )
        .await;

    assert!(drain_ids(&h.server, 4)
        .await
        .contains(&(ServerPacketId::SendMessage as u16)));
    assert!(!drain_ids(&h.server, 5)
        .await
        .contains(&(ServerPacketId::SendMessage as u16)));
}

#[tokio::test]
async fn spectator_fan_out() {
    let h = harness().await;
    for (id, name) in [(10, "host"), (11, "x"), (12, "y"), (13, "z")] {
        seat_player(&h.server, id, name).await;
    }

    h.server.handle_start_spectating(11, 10).await;
    h.server.handle_start_spectating(12, 10).await;
    for id in [10, 11, 12, 13] {
        drain_ids(&h.server, id).await;
    }

    h.server.handle_start_spectating(13, 10).await;

    let count = |ids: &[u16], id: ServerPacketId| {
        ids.iter().filter(|i| **i == id as u16).count()
    };

    let x = drain_ids(&h.server, 11).await;
    let y = drain_ids(&h.server, 12).await;
    let z = drain_ids(&h.server, 13).await;
    let host = drain_ids(&h.server, 10).await;

    assert_eq!(count(&x, ServerPacketId::FellowSpectatorJoined), 1);
    assert_eq!(count(&y, ServerPacketId::FellowSpectatorJoined), 1);
    assert_eq!(count(&z, ServerPacketId::FellowSpectatorJoined), 2);
    assert_eq!(count(&host, ServerPacketId::SpectatorJoined), 1);

    // frames from the host are relayed verbatim to every spectator
    let bundle_payload = spectate_bundle_payload();
    let mut reader = Reader::new(&bundle_payload);
    let bundle = reader.read_replay_frame_bundle().unwrap();
    h.server.handle_spectate_frames(10, bundle).await;

    for id in [11, 12, 13] {
        let mut world = h.server.world.write().await;
        let data = world.players.get_mut(id).unwrap().dequeue();
        drop(world);
        let frames: Vec<_> = PacketStream::new(&data).filter_map(Result::ok).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, ServerPacketId::SpectateFrames as u16);
        assert_eq!(frames[0].payload, &bundle_payload[..]);
    }
}

/// A minimal, valid spectate bundle: no frames, one score frame.
fn spectate_bundle_payload() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0i32.to_le_bytes()); // extra
    payload.extend_from_slice(&0u16.to_le_bytes()); // frame count
    payload.push(0); // action: standard
    // 29-byte score frame
    payload.extend_from_slice(&100i32.to_le_bytes());
    payload.push(0); // id
    payload.extend_from_slice(&[0u8; 12]); // 300/100/50/geki/katu/miss
    payload.extend_from_slice(&0i32.to_le_bytes()); // total score
    payload.extend_from_slice(&[0u8; 4]); // combo, max combo
    payload.push(0); // perfect
    payload.push(200); // hp
    payload.push(0); // tag byte
    payload.push(0); // score v2
    payload.extend_from_slice(&1u16.to_le_bytes()); // sequence
    payload
}

#[tokio::test]
async fn private_message_to_offline_user_becomes_mail() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    h.db.add_user(stored_user(4, "bravo", "aaaabbbbccccddddaaaabbbbccccdddd"));

    h.server
        .handle_private_message(
            3,
            bancho::Message {
                sender: "alpha".to_string(),
                text: "hello from the past".to_string(),
                recipient: "bravo".to_string(),
                sender_id: 3,
            },
        )
        .await;

    assert_eq!(h.db.mail_count(), 1);
    // the sender is told about the mail delivery
    let ids = drain_ids(&h.server, 3).await;
    assert!(ids.contains(&(ServerPacketId::Notification as u16)));
}

#[tokio::test]
async fn roll_command_responds_in_channel() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;
    {
        let mut world = h.server.world.write().await;
        world.join_channel(3, "#osu");
        world.join_channel(4, "#osu");
    }
    drain_ids(&h.server, 3).await;
    drain_ids(&h.server, 4).await;

    h.server
        .handle_public_message(
            3,
            bancho::Message {
                sender: "alpha".to_string(),
                text: "!roll 100".to_string(),
                recipient: "#osu".to_string(),
                sender_id: 3,
            },
        )
        .await;

    // a visible command: the text and the bot's response both reach others
    let ids = drain_ids(&h.server, 4).await;
    assert!(ids.iter().filter(|i| **i == ServerPacketId::SendMessage as u16).count() >= 2);
}

#[tokio::test]
async fn match_map_change_sentinel_remembers_previous_map() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;

    h.server.handle_match_create(3, create_match_data(3)).await;

    // host begins changing the map: id -1 sentinel
    let mut changing = create_match_data(3);
    changing.map_id = -1;
    changing.map_md5.clear();
    changing.map_name.clear();
    h.server.handle_match_change_settings(3, changing.clone()).await;

    {
        let world = h.server.world.read().await;
        let m = world.matches.get(0).unwrap();
        assert_eq!(m.map_id, -1);
        assert_eq!(m.prev_map_id, 1001);
    }

    // a second sentinel round keeps the remembered map
    h.server.handle_match_change_settings(3, changing).await;
    {
        let world = h.server.world.read().await;
        assert_eq!(world.matches.get(0).unwrap().prev_map_id, 1001);
    }

    // picking the known map resolves it through the catalog
    let chosen = create_match_data(3);
    h.server.handle_match_change_settings(3, chosen).await;
    let world = h.server.world.read().await;
    let m = world.matches.get(0).unwrap();
    assert_eq!(m.map_id, 1001);
    assert_eq!(m.map_name, "Artist - Title [Expert]");
}

#[tokio::test]
async fn ghost_sessions_vanish_but_fresh_ones_stay() {
    let h = harness().await;
    seat_player(&h.server, 3, "alpha").await;
    seat_player(&h.server, 4, "bravo").await;

    {
        let mut world = h.server.world.write().await;
        world.players.get_mut(3).unwrap().last_recv_time =
            Instant::now() - Duration::from_secs(400);
    }

    // the sweep body, inlined: collect and log out quiet sessions
    {
        let mut world = h.server.world.write().await;
        let ghosts: Vec<i32> = world
            .players
            .iter()
            .filter(|s| !s.is_bot)
            .filter(|s| s.last_recv_time.elapsed().as_secs() > 300)
            .map(|s| s.id)
            .collect();
        for ghost in ghosts {
            world.logout(ghost);
        }
    }

    let world = h.server.world.read().await;
    assert!(world.players.get(3).is_none());
    assert!(world.players.get(4).is_some());
}
