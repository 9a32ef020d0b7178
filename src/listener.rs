//! mc-domain-proxy/src/listener.rs
//! Accepts client connections and spawns one independent session per accept.
//! The listener owns no session state; a session task failing (panic or
//! error) cannot take down the listener or any other session because tokio
//! isolates spawned tasks from each other.

use crate::session::handle_session;
use crate::state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub async fn run(app: Arc<AppState>) -> std::io::Result<()> {
    let addr = (app.config.proxy_host.as_str(), app.config.proxy_port);
    let listener = TcpListener::bind(addr).await?;
    info!(
        "mc-domain-proxy listening on {}:{}",
        app.config.proxy_host, app.config.proxy_port
    );

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept failed: {}", e);
                continue;
            }
        };

        debug!(peer = %peer, "accepted connection");
        let app = app.clone();
        tokio::spawn(async move {
            handle_session(socket, app).await;
        });
    }
}
