//! mc-domain-proxy/src/routes.rs
//! The routing table: a normalised-domain -> upstream map, persisted to disk
//! as JSON on every mutation the way the spec's data model requires.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub host: String,
    pub port: u16,
}

/// Strips characters outside `[A-Za-z0-9.-]`, strips a trailing `FML\d*`
/// suffix, trims whitespace, strips trailing dots, and lowercases. Idempotent.
pub fn normalize_domain(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    let without_fml = strip_trailing_fml_suffix(&filtered);
    let trimmed = without_fml.trim();
    let without_dots = trimmed.trim_end_matches('.');
    without_dots.to_lowercase()
}

fn strip_trailing_fml_suffix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = s.len();
    while end > 0 && bytes[end - 1].is_ascii_digit() {
        end -= 1;
    }
    if end >= 3 && s[end - 3..end].eq_ignore_ascii_case("FML") {
        &s[..end - 3]
    } else {
        s
    }
}

pub struct RoutingTable {
    routes: DashMap<String, Route>,
    store_path: PathBuf,
}

impl RoutingTable {
    /// Loads the table from `store_path` if it exists, else starts empty.
    pub async fn load(store_path: impl AsRef<Path>) -> Self {
        let store_path = store_path.as_ref().to_path_buf();
        let routes = DashMap::new();
        match tokio::fs::read(&store_path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, Route>>(&bytes) {
                Ok(map) => {
                    for (domain, route) in map {
                        routes.insert(domain, route);
                    }
                }
                Err(e) => error!("Failed to parse routing table at {:?}: {}", store_path, e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read routing table at {:?}: {}", store_path, e),
        }
        Self { routes, store_path }
    }

    pub fn list(&self) -> HashMap<String, Route> {
        self.routes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get(&self, domain: &str) -> Option<Route> {
        let domain = normalize_domain(domain);
        self.routes.get(&domain).map(|entry| entry.value().clone())
    }

    pub async fn upsert(&self, domain: &str, host: String, port: u16) -> std::io::Result<()> {
        let domain = normalize_domain(domain);
        self.routes.insert(domain, Route { host, port });
        self.persist().await
    }

    /// Returns `true` if a route existed and was removed.
    pub async fn remove(&self, domain: &str) -> std::io::Result<bool> {
        let domain = normalize_domain(domain);
        let removed = self.routes.remove(&domain).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.routes.contains_key(&normalize_domain(domain))
    }

    /// Rewrites the whole table to `store_path` via a temp file + rename so
    /// readers never observe a torn write.
    async fn persist(&self) -> std::io::Result<()> {
        let snapshot = self.list();
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.store_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "Example.COM",
            "  example.com.  ",
            "example.comFML2",
            "exa*mple.com",
            "EXAMPLE.COM.",
        ] {
            let once = normalize_domain(raw);
            let twice = normalize_domain(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn normalize_strips_fml_suffix() {
        assert_eq!(normalize_domain("play.example.comFML3"), "play.example.com");
        assert_eq!(normalize_domain("play.example.comFML"), "play.example.com");
    }

    #[test]
    fn normalize_does_not_strip_bare_digits() {
        assert_eq!(normalize_domain("example.com123"), "example.com123");
    }

    #[test]
    fn normalize_strips_invalid_chars_and_lowercases() {
        assert_eq!(normalize_domain(" Example.COM \u{0}"), "example.com");
    }

    #[tokio::test]
    async fn upsert_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        let table = RoutingTable::load(&path).await;

        table
            .upsert("Example.com", "10.0.0.1".to_string(), 25565)
            .await
            .unwrap();
        assert_eq!(
            table.get("example.com"),
            Some(Route {
                host: "10.0.0.1".to_string(),
                port: 25565
            })
        );

        assert!(table.remove("example.com").await.unwrap());
        assert_eq!(table.get("example.com"), None);
    }

    #[tokio::test]
    async fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        {
            let table = RoutingTable::load(&path).await;
            table
                .upsert("persisted.example", "10.0.0.2".to_string(), 25566)
                .await
                .unwrap();
        }
        let reloaded = RoutingTable::load(&path).await;
        assert_eq!(
            reloaded.get("persisted.example"),
            Some(Route {
                host: "10.0.0.2".to_string(),
                port: 25566
            })
        );
    }
}
