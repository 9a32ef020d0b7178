//! mc-domain-proxy/src/session.rs
//! The per-connection state machine: buffer -> parse -> resolve -> authorise
//! -> dial -> splice -> teardown.

use crate::error::SessionError;
use crate::protocol::{self, CodecError, PacketClass};
use crate::state::AppState;
use crate::{firewall, identity, manager};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::ProtocolMalformed(e.to_string())
    }
}

/// Runs one session to completion. Never panics the caller: any unexpected
/// failure is contained within this future (the listener spawns it as its
/// own task, so a panic here cannot take down the listener or other
/// sessions).
pub async fn handle_session(mut client: TcpStream, app: Arc<AppState>) {
    app.metrics.total_conn.fetch_add(1, Ordering::SeqCst);
    app.metrics.active_conn.fetch_add(1, Ordering::SeqCst);

    if let Err(e) = run_session(&mut client, &app).await {
        if let Some(diagnostic) = e.client_diagnostic() {
            let packet = protocol::build_disconnect_packet(&diagnostic);
            let _ = client.write_all(&packet).await;
        }
        let _ = client.shutdown().await;
        match &e {
            SessionError::PeerClosed => debug!("session ended: peer closed"),
            SessionError::TransportError(io_err) => warn!("session transport error: {}", io_err),
            other => info!("session rejected: {}", other),
        }
    }

    app.metrics.active_conn.fetch_sub(1, Ordering::SeqCst);
}

async fn run_session(client: &mut TcpStream, app: &Arc<AppState>) -> Result<(), SessionError> {
    let peer_addr = client
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // READ_INITIAL
    let initial = read_initial(client, &app.config).await?;

    // EXTRACT_IP
    let (client_ip, residual) = protocol::strip_injected_ip_header(&initial)?;
    let initial_payload = residual.to_vec();

    // CLASSIFY
    match protocol::classify(residual)? {
        PacketClass::Legacy => return Err(SessionError::UnsupportedProtocol),
        PacketClass::Modern => {}
    }

    // PARSE_HANDSHAKE (mandatory)
    let hs = protocol::parse_handshake(residual)?;

    // PARSE_LOGIN (best-effort per next_state)
    let username = match hs.next_state {
        1 => None,
        2 => {
            let login_slice = &residual[hs.consumed..];
            let (username, _consumed) = protocol::parse_login_start(login_slice)?;
            Some(username)
        }
        _ => {
            return Err(SessionError::ProtocolMalformed(
                "unsupported handshake nextState".to_string(),
            ));
        }
    };

    info!(
        peer = %peer_addr,
        client_ip = %client_ip,
        domain = %hs.server_address,
        username = username.as_deref().unwrap_or(""),
        "session handshake parsed"
    );

    // RESOLVE_UUID
    let uuid = match &username {
        Some(name) => {
            let resolved = identity::resolve_uuid(name, &app.http, &app.config).await;
            if resolved == identity::UNRESOLVED {
                return Err(SessionError::UnresolvedIdentity);
            }
            Some(resolved)
        }
        None => None,
    };

    // RESOLVE_ROUTE
    let domain = crate::routes::normalize_domain(&hs.server_address);
    let route = app
        .routes
        .get(&domain)
        .ok_or(SessionError::UnknownDomain)?;

    // AUTHORISE
    let rules = firewall::fetch_rules(&domain, &app.http, &app.config).await;
    if firewall::is_blocked(&rules, &client_ip, username.as_deref(), uuid.as_deref()) {
        return Err(SessionError::FirewallBlocked);
    }

    // Manager report (fire-and-forget, does not block the pipeline). Status
    // pings never reach this: there is no username to report.
    if let Some(name) = &username {
        if app.config.manager_enabled() {
            manager::report(
                domain.clone(),
                name.clone(),
                client_ip.clone(),
                uuid.clone().unwrap_or_default(),
                app.http.clone(),
                &app.config,
            );
        }
    }

    // DIAL_UPSTREAM
    let dial_timeout = Duration::from_secs(app.config.dial_timeout_secs);
    let mut upstream = tokio::time::timeout(
        dial_timeout,
        TcpStream::connect((route.host.as_str(), route.port)),
    )
    .await
    .map_err(|_| SessionError::UpstreamUnreachable)?
    .map_err(|_| SessionError::UpstreamUnreachable)?;

    // REGISTER
    let (kill_tx, kill_rx) = oneshot::channel();
    let conn_id = app.registry.insert(
        client_ip.clone(),
        domain.clone(),
        username.clone(),
        uuid.clone(),
        route.host.clone(),
        route.port,
        kill_tx,
    );

    // Replay the exact bytes the client already sent, verbatim, before any
    // further client byte is forwarded.
    upstream.write_all(&initial_payload).await?;

    info!(
        conn = conn_id,
        domain = %domain,
        upstream = %format!("{}:{}", route.host, route.port),
        "session registered, splicing"
    );

    // SPLICE
    let splice_result = splice(client, &mut upstream, kill_rx, app.config.name_passed_marker.as_deref()).await;

    // TEARDOWN
    app.registry.remove(conn_id);
    info!(conn = conn_id, "session torn down");

    splice_result
}

/// Coalesces the initial bytes: waits up to `initial_read_grace_ms` for the
/// first byte to drain whatever's already buffered on the socket, then reads
/// until `initial_read_idle_ms` passes with nothing new.
async fn read_initial(
    client: &mut TcpStream,
    config: &crate::config::ProxyConfig,
) -> Result<Vec<u8>, SessionError> {
    let grace = Duration::from_millis(config.initial_read_grace_ms);
    let idle = Duration::from_millis(config.initial_read_idle_ms);
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    match tokio::time::timeout(grace, client.read(&mut chunk)).await {
        Ok(Ok(0)) => return Err(SessionError::PeerClosed),
        Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
        Ok(Err(e)) => return Err(SessionError::TransportError(e)),
        Err(_) => {} // nothing arrived within the initial grace, keep waiting below
    }

    loop {
        match tokio::time::timeout(idle, client.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(SessionError::TransportError(e)),
            Err(_) => break, // idle window elapsed, stop coalescing
        }
    }

    if buf.is_empty() {
        return Err(SessionError::PeerClosed);
    }
    Ok(buf)
}

/// Full-duplex verbatim byte forwarding with half-close semantics: EOF on one
/// side shuts down the write half of the other and keeps relaying the
/// remaining direction; an error on either side closes both immediately.
async fn splice(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
    mut kill_rx: oneshot::Receiver<()>,
    name_passed_marker: Option<&str>,
) -> Result<(), SessionError> {
    let (mut client_r, mut client_w) = client.split();
    let (mut upstream_r, mut upstream_w) = upstream.split();

    let mut client_buf = [0u8; 4096];
    let mut upstream_buf = [0u8; 4096];
    let mut client_closed = false;
    let mut upstream_closed = false;
    let mut name_passed = false;

    loop {
        if client_closed && upstream_closed {
            return Ok(());
        }
        tokio::select! {
            biased;

            _ = &mut kill_rx => {
                let _ = client_w.shutdown().await;
                let _ = upstream_w.shutdown().await;
                return Ok(());
            }

            result = client_r.read(&mut client_buf), if !client_closed => {
                let n = result?;
                if n == 0 {
                    client_closed = true;
                    if !upstream_closed {
                        upstream_w.shutdown().await?;
                    }
                } else {
                    check_name_passed(&client_buf[..n], name_passed_marker, &mut name_passed);
                    upstream_w.write_all(&client_buf[..n]).await?;
                }
            }

            result = upstream_r.read(&mut upstream_buf), if !upstream_closed => {
                let n = result?;
                if n == 0 {
                    upstream_closed = true;
                    if !client_closed {
                        client_w.shutdown().await?;
                    }
                } else {
                    check_name_passed(&upstream_buf[..n], name_passed_marker, &mut name_passed);
                    client_w.write_all(&upstream_buf[..n]).await?;
                }
            }
        }
    }
}

/// Dev-only diagnostic: the first time a configured marker literal is seen in
/// either direction, hex-dump the frame it appeared in. Purely observational.
fn check_name_passed(frame: &[u8], marker: Option<&str>, name_passed: &mut bool) {
    let Some(marker) = marker else { return };
    if *name_passed {
        return;
    }
    if frame
        .windows(marker.len().max(1))
        .any(|w| w == marker.as_bytes())
    {
        *name_passed = true;
        debug!("namePassed marker observed:\n{}", hex_dump(frame));
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_passed_fires_once() {
        let mut fired = false;
        check_name_passed(b"hello codingbear world", Some("codingbear"), &mut fired);
        assert!(fired);

        let mut already_fired = true;
        check_name_passed(b"codingbear again", Some("codingbear"), &mut already_fired);
        assert!(already_fired);
    }

    #[test]
    fn name_passed_ignores_non_matching_frames() {
        let mut fired = false;
        check_name_passed(b"nothing interesting here", Some("codingbear"), &mut fired);
        assert!(!fired);
    }

    #[test]
    fn name_passed_disabled_without_marker() {
        let mut fired = false;
        check_name_passed(b"codingbear", None, &mut fired);
        assert!(!fired);
    }
}
