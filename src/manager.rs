//! mc-domain-proxy/src/manager.rs
//! Fire-and-forget reporting of accepted connections to the manager. Never
//! affects session lifecycle: failures are logged and dropped.

use crate::config::ProxyConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Serialize)]
struct ConnectionReport<'a> {
    #[serde(rename = "fullDomain")]
    full_domain: &'a str,
    #[serde(rename = "playerName")]
    player_name: &'a str,
    #[serde(rename = "playerIp")]
    player_ip: &'a str,
    #[serde(rename = "playerUuid")]
    player_uuid: &'a str,
}

/// Spawns a background POST of the connection's admission metadata. Returns
/// immediately; the caller never awaits network I/O.
pub fn report(
    domain: String,
    username: String,
    ip: String,
    uuid: String,
    client: reqwest::Client,
    config: &ProxyConfig,
) {
    let (Some(base), Some(api_key)) = (config.manager_address.clone(), config.manager_api_key.clone()) else {
        return;
    };
    let timeout = Duration::from_secs(config.external_http_timeout_secs);

    tokio::spawn(async move {
        let report = ConnectionReport {
            full_domain: &domain,
            player_name: &username,
            player_ip: &ip,
            player_uuid: &uuid,
        };
        let url = format!("{base}/connections");
        let result = client
            .post(url)
            .timeout(timeout)
            .header("X-Api-Key", api_key)
            .json(&report)
            .send()
            .await;
        if let Err(e) = result {
            warn!(domain, "manager report failed: {}", e);
        }
    });
}
