//! mc-domain-proxy/src/error.rs
//! Error kinds shared across the codec, session pipeline, and control plane.

use thiserror::Error;

/// The session-scoped error kinds named by the spec's error handling design.
///
/// Every variant that can surface before splicing begins carries the ASCII
/// diagnostic string written back to the client socket prior to close.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    ProtocolMalformed(String),

    #[error("Legacy protocol not supported")]
    UnsupportedProtocol,

    #[error("Could not resolve player identity")]
    UnresolvedIdentity,

    #[error("Unknown domain")]
    UnknownDomain,

    #[error("Connection blocked by firewall")]
    FirewallBlocked,

    #[error("Failed to connect to remote server")]
    UpstreamUnreachable,

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("transport error: {0}")]
    TransportError(#[from] std::io::Error),
}

impl SessionError {
    /// The diagnostic string written to the client before closing, for the
    /// variants that occur before splicing begins. `PeerClosed` and mid-splice
    /// `TransportError`s are never surfaced to the client (splicing has
    /// already committed the connection to being a silent byte pipe).
    pub fn client_diagnostic(&self) -> Option<String> {
        match self {
            SessionError::ProtocolMalformed(msg) => Some(msg.clone()),
            SessionError::UnsupportedProtocol => Some(self.to_string()),
            SessionError::UnresolvedIdentity => Some(self.to_string()),
            SessionError::UnknownDomain => Some(self.to_string()),
            SessionError::FirewallBlocked => Some(self.to_string()),
            SessionError::UpstreamUnreachable => Some(self.to_string()),
            SessionError::PeerClosed | SessionError::TransportError(_) => None,
        }
    }
}

/// Errors returned by the control-plane adapter, mapped to HTTP status codes
/// by the axum layer in `control.rs`.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorised")]
    MissingApiKey,

    #[error("forbidden")]
    BadApiKey,

    #[error("not found")]
    NotFound,

    #[error("duplicate route for domain")]
    Duplicate,
}

/// Errors loading `config.toml` and merging it with CLI/env overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("api_key must be set via --api-key, API_KEY, or config.toml")]
    MissingApiKey,
}
