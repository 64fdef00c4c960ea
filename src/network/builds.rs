use std::collections::HashSet;

use anyhow::Result;
use serde_json::Value;

/// The acceptable client build dates for a release stream, from the
/// upstream changelog. `None` means the endpoint was unreachable, in which
/// case logins are allowed through.
pub async fn allowed_client_versions(
    client: &reqwest::Client,
    changelog_url: &str,
    stream: &str,
) -> Result<Option<HashSet<String>>> {
    let stream_param = match stream {
        // upstream quirk: these two streams carry a "40" suffix
        "stable" | "beta" => format!("{}40", stream),
        other => other.to_string(),
    };

    let response = match client
        .get(changelog_url)
        .query(&[("stream", stream_param.as_str())])
        .send()
        .await
    {
        Ok(r) if r.status().is_success() => r,
        _ => return Ok(None),
    };

    let body: Value = response.json().await?;
    let Some(builds) = body.get("builds").and_then(Value::as_array) else {
        return Ok(None);
    };

    let mut allowed = HashSet::new();
    for build in builds {
        let Some(version) = build.get("version").and_then(Value::as_str) else {
            continue;
        };
        // versions look like "20220330.2"; the date prefix identifies the
        // build
        allowed.insert(version.chars().take(8).collect());

        let is_major = build
            .get("changelog_entries")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .any(|e| e.get("major").and_then(Value::as_bool).unwrap_or(false))
            })
            .unwrap_or(false);
        if is_major {
            // nothing older than the last major iteration is allowed
            break;
        }
    }

    Ok(Some(allowed))
}
