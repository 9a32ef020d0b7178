//! mc-domain-proxy/src/identity.rs
//! Username -> UUID resolution against the public Mojang/Ashcon profile
//! APIs, with retries against the primary provider and a one-shot fallback
//! to a secondary provider.

use crate::config::ProxyConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const UNRESOLVED: &str = "UNRESOLVED";

#[derive(Deserialize)]
struct MojangProfile {
    id: String,
}

#[derive(Deserialize)]
struct AshconProfile {
    uuid: String,
}

/// Resolves `username` to a 32-char lowercase hex UUID (dashes removed), or
/// `UNRESOLVED`. Never called for status pings (no username to resolve).
pub async fn resolve_uuid(username: &str, client: &reqwest::Client, config: &ProxyConfig) -> String {
    let timeout = Duration::from_secs(config.external_http_timeout_secs);

    for attempt in 0..=config.identity_max_retries {
        match fetch_primary(username, client, timeout).await {
            Ok(uuid) => return uuid,
            Err(e) => {
                warn!(
                    username,
                    attempt, "primary identity provider lookup failed: {}", e
                );
            }
        }
        if attempt < config.identity_max_retries {
            tokio::time::sleep(Duration::from_secs(config.identity_retry_delay_secs)).await;
        }
    }

    match fetch_secondary(username, client, timeout).await {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!(username, "secondary identity provider lookup failed: {}", e);
            UNRESOLVED.to_string()
        }
    }
}

async fn fetch_primary(
    username: &str,
    client: &reqwest::Client,
    timeout: Duration,
) -> Result<String, reqwest::Error> {
    let url = format!("https://api.mojang.com/users/profiles/minecraft/{username}");
    let profile: MojangProfile = client.get(url).timeout(timeout).send().await?.json().await?;
    Ok(normalize_uuid(&profile.id))
}

async fn fetch_secondary(
    username: &str,
    client: &reqwest::Client,
    timeout: Duration,
) -> Result<String, reqwest::Error> {
    let url = format!("https://api.ashcon.app/mojang/v2/user/{username}");
    let profile: AshconProfile = client.get(url).timeout(timeout).send().await?.json().await?;
    Ok(normalize_uuid(&profile.uuid))
}

fn normalize_uuid(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_dashes_and_lowercases() {
        assert_eq!(
            normalize_uuid("0A0B0C0D-0000-0000-0000-000000000001"),
            "0a0b0c0d000000000000000000000001"
        );
    }
}
