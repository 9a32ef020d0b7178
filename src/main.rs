//! mc-domain-proxy/src/main.rs
//! Process bootstrap: parse configuration, initialise logging, build shared
//! state, then run the client-facing listener and the control-plane server
//! concurrently for the life of the process.

mod config;
mod control;
mod error;
mod firewall;
mod identity;
mod listener;
mod logging;
mod manager;
mod protocol;
mod registry;
mod routes;
mod session;
mod state;

use config::ProxyConfig;
use state::AppState;
use tracing::error;

#[tokio::main]
async fn main() {
    logging::init_logging("info");

    let config = match ProxyConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let app = AppState::new(config).await;

    let api_addr = (app.config.api_host.clone(), app.config.api_port);
    let control_router = control::router(app.clone());

    let control_server = async {
        let listener = match tokio::net::TcpListener::bind(api_addr.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("control plane failed to bind {}:{}: {}", api_addr.0, api_addr.1, e);
                return;
            }
        };
        if let Err(e) = axum::serve(listener, control_router).await {
            error!("control plane server stopped: {}", e);
        }
    };

    let proxy_listener = async {
        if let Err(e) = listener::run(app).await {
            error!("proxy listener stopped: {}", e);
        }
    };

    tokio::join!(proxy_listener, control_server);
}
