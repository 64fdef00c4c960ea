use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::{Bytes, BytesMut};

use bancho::server as out;
use bancho::PacketStream;

use crate::handlers::dispatch;
use crate::server::Server;

/// The whole wire surface: one endpoint, POST for the protocol, GET for a
/// plain status page.
pub fn router(server: Server) -> Router {
    Router::new()
        .route("/", get(index_page).post(bancho_handler))
        .with_state(server)
}

/// The client ip, honouring the forwarded-for chain.
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return ip.to_string();
    }
    if let Some(chain) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = chain.split(',').next() {
            return first.trim().to_string();
        }
    }
    "127.0.0.1".to_string()
}

/// Every POST is either a login (no `osu-token` header) or a stream of
/// client packets for an existing session.
async fn bancho_handler(
    State(server): State<Server>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let is_osu = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|agent| agent == "osu!");
    if !is_osu {
        return (StatusCode::BAD_REQUEST, "").into_response();
    }

    let token = headers
        .get("osu-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(token) = token else {
        let ip = client_ip(&headers);
        let login = crate::login::handle_login(&server, &body, &ip).await;
        return ([("cho-token", login.token)], login.body).into_response();
    };

    let session_info = {
        let world = server.world.read().await;
        world
            .players
            .get_by_token(&token)
            .map(|s| (s.id, s.restricted()))
    };

    let Some((user_id, restricted)) = session_info else {
        // most likely a server restart; tell the client to reconnect now
        let mut data = BytesMut::new();
        data.extend_from_slice(&out::notification("Server has restarted."));
        data.extend_from_slice(&out::restart_server(0));
        return data.freeze().into_response();
    };

    for frame in PacketStream::new(&body) {
        match frame {
            Ok(frame) => {
                if let Err(err) = dispatch(&server, user_id, restricted, frame).await {
                    // abort the request; whatever was already enqueued is
                    // still delivered below
                    log::warn!("decode failure from {}: {}", user_id, err);
                    break;
                }
            }
            Err(err) => {
                log::warn!("malformed request body from {}: {}", user_id, err);
                break;
            }
        }
    }

    let response = {
        let mut world = server.world.write().await;
        match world.players.get_mut(user_id) {
            Some(session) => {
                session.last_recv_time = Instant::now();
                session.dequeue()
            }
            // logged out mid-request (logout packet, kick, replacement)
            None => Bytes::new(),
        }
    };
    response.into_response()
}

/// A plain-text-ish overview for anyone poking the endpoint with a
/// browser.
async fn index_page(State(server): State<Server>) -> Html<String> {
    let world = server.world.read().await;

    let players: Vec<String> = world
        .players
        .iter()
        .filter(|s| !s.is_bot)
        .map(|s| format!("({}) {}", s.id, s.safe_name))
        .collect();
    let matches: Vec<String> = world
        .matches
        .iter()
        .map(|m| {
            let status = if m.in_progress { "ongoing" } else { "idle" };
            format!("{} ({}): {}", status, m.id, m.name)
        })
        .collect();

    Html(format!(
        "<!DOCTYPE html>\
         <body style=\"font-family: monospace; white-space: pre-wrap;\">\
         Running {} v{}\n\n\
         {} online players:\n{}\n\n\
         {} matches:\n{}\n\
         </body>",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        players.len(),
        players.join("\n"),
        matches.len(),
        matches.join("\n"),
    ))
}
