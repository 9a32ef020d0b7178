//! mc-domain-proxy/src/state.rs
//! Shared application state, built once in `main` and reaching the listener
//! and the control-plane server as a cloned `Arc`.

use crate::config::ProxyConfig;
use crate::registry::Registry;
use crate::routes::RoutingTable;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Process-wide counters surfaced for observability; not part of any
/// external contract.
#[derive(Default)]
pub struct Metrics {
    pub total_conn: AtomicU64,
    pub active_conn: AtomicU64,
}

pub struct AppState {
    pub routes: RoutingTable,
    pub registry: Registry,
    pub config: ProxyConfig,
    pub http: reqwest::Client,
    pub metrics: Metrics,
}

impl AppState {
    pub async fn new(config: ProxyConfig) -> Arc<Self> {
        let routes = RoutingTable::load(&config.routes_path).await;
        Arc::new(Self {
            routes,
            registry: Registry::new(),
            http: reqwest::Client::new(),
            metrics: Metrics::default(),
            config,
        })
    }
}
