use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The beatmap metadata the core needs; everything else about maps lives in
/// the web half of the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Beatmap {
    pub id: i32,
    pub set_id: i32,
    pub md5: String,
    pub artist: String,
    pub title: String,
    pub version: String,
    /// Map length in seconds; bounds the scrim submission window.
    pub total_length: i32,
    pub mode_vanilla: u8,
}

impl Beatmap {
    pub fn full_name(&self) -> String {
        format!("{} - {} [{}]", self.artist, self.title, self.version)
    }

    /// A chat embed linking the map on this server.
    pub fn embed(&self, domain: &str) -> String {
        format!("[https://osu.{}/b/{} {}]", domain, self.id, self.full_name())
    }
}

/// Metadata lookups against the beatmap catalog.
#[async_trait]
pub trait BeatmapSource: Send + Sync {
    async fn by_id(&self, map_id: i32) -> Result<Option<Beatmap>>;

    async fn by_md5(&self, md5: &str) -> Result<Option<Beatmap>>;
}

/// Catalog client over a configured HTTP endpoint.
pub struct HttpBeatmapSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBeatmapSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        HttpBeatmapSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Option<Beatmap>> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let body: Value = response.json().await?;
        Ok(parse_beatmap(&body))
    }
}

fn parse_beatmap(v: &Value) -> Option<Beatmap> {
    // the catalog nests set metadata under "beatmapset"
    let set = v.get("beatmapset");
    let str_field = |obj: Option<&Value>, key: &str| -> String {
        obj.and_then(|o| o.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Some(Beatmap {
        id: v.get("id")?.as_i64()? as i32,
        set_id: v.get("beatmapset_id").and_then(Value::as_i64).unwrap_or(0) as i32,
        md5: str_field(Some(v), "checksum"),
        artist: str_field(set, "artist"),
        title: str_field(set, "title"),
        version: str_field(Some(v), "version"),
        total_length: v.get("total_length").and_then(Value::as_i64).unwrap_or(0) as i32,
        mode_vanilla: v.get("mode_int").and_then(Value::as_u64).unwrap_or(0) as u8,
    })
}

#[async_trait]
impl BeatmapSource for HttpBeatmapSource {
    async fn by_id(&self, map_id: i32) -> Result<Option<Beatmap>> {
        self.fetch(&format!("v2/b/{}", map_id)).await
    }

    async fn by_md5(&self, md5: &str) -> Result<Option<Beatmap>> {
        self.fetch(&format!("v2/md5/{}", md5)).await
    }
}

/// Seeded in-memory catalog for tests.
#[derive(Default)]
pub struct MockBeatmapSource {
    maps: Mutex<HashMap<i32, Beatmap>>,
}

impl MockBeatmapSource {
    pub fn new() -> Self {
        MockBeatmapSource::default()
    }

    pub fn add(&self, map: Beatmap) {
        self.maps.lock().unwrap().insert(map.id, map);
    }
}

#[async_trait]
impl BeatmapSource for MockBeatmapSource {
    async fn by_id(&self, map_id: i32) -> Result<Option<Beatmap>> {
        Ok(self.maps.lock().unwrap().get(&map_id).cloned())
    }

    async fn by_md5(&self, md5: &str) -> Result<Option<Beatmap>> {
        Ok(self
            .maps
            .lock()
            .unwrap()
            .values()
            .find(|m| m.md5 == md5)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_json() {
        let body: Value = serde_json::from_str(
            r#"{
                "id": 4080502,
                "beatmapset_id": 1971037,
                "checksum": "60b725f10c9c85c70d97880dfe8191b3",
                "version": "Expert",
                "total_length": 213,
                "mode_int": 0,
                "beatmapset": {"artist": "Artist", "title": "Title"}
            }"#,
        )
        .unwrap();

        let map = parse_beatmap(&body).unwrap();
        assert_eq!(map.id, 4080502);
        assert_eq!(map.full_name(), "Artist - Title [Expert]");
        assert_eq!(map.total_length, 213);
    }
}
