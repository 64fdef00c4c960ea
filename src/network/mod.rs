pub use beatmaps::{Beatmap, BeatmapSource, HttpBeatmapSource, MockBeatmapSource};
pub use builds::allowed_client_versions;
pub use geolocation::{country_code, Geolocator, IpApiGeolocator, MockGeolocator};
pub use webhook::AuditWebhook;

mod beatmaps;
mod builds;
mod geolocation;
mod webhook;

use crate::constants::USER_AGENT;

/// The shared client for all outgoing requests.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .expect("failed to build http client")
}
