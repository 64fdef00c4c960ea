use std::sync::Arc;

use torii::config::Config;
use torii::database::pg_connect;
use torii::leaderboard::RedisLeaderboard;
use torii::matches::MAX_MATCHES;
use torii::network::{self, AuditWebhook, HttpBeatmapSource, IpApiGeolocator};
use torii::performance::SubprocessCalculator;
use torii::server::Server;
use torii::{housekeeping, http};

#[tokio::main]
async fn main() {
    env_logger::init(); // use log::* to write to stdout/err

    let config = Config::load();
    let http_client = network::http_client();

    let db = Arc::new(
        pg_connect(&config.postgres_connection)
            .await
            .expect("failed to connect to postgres"),
    );
    let leaderboard =
        Arc::new(RedisLeaderboard::connect(&config.redis_url).expect("failed to connect to redis"));
    let geolocator = Arc::new(IpApiGeolocator::new(http_client.clone()));
    let beatmaps = Arc::new(HttpBeatmapSource::new(
        http_client.clone(),
        &config.beatmap_api_url,
    ));
    let performance = Arc::new(SubprocessCalculator::new(&config.pp_calculator_path));
    let webhook = AuditWebhook::from_config(http_client, &config.audit_webhook_url);

    let server = Server::init(
        config,
        db,
        leaderboard,
        geolocator,
        beatmaps,
        performance,
        webhook,
    )
    .await
    .expect("failed to initialize server");

    let housekeeping_tasks = housekeeping::start(&server);

    let listener = tokio::net::TcpListener::bind(&server.config.bind_address)
        .await
        .expect("failed to bind http listener");
    log::info!("listening on {}", server.config.bind_address);

    let app = http::router(server.clone());
    let shutdown = server.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => log::info!("interrupted; shutting down"),
                _ = shutdown.notified() => log::info!("shutdown requested in-game"),
            }
        })
        .await
        .expect("http server failed");

    // cancel housekeeping and any armed match timers, then drain
    log::info!("cancelling {} housekeeping tasks", housekeeping_tasks.len());
    for task in &housekeeping_tasks {
        task.abort();
    }
    for task in housekeeping_tasks {
        let _ = task.await;
    }

    let mut world = server.world.write().await;
    for match_id in 0..MAX_MATCHES as u16 {
        if let Some(m) = world.matches.get_mut(match_id) {
            m.cancel_pending_start();
        }
    }
}
