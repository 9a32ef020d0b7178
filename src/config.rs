//! mc-domain-proxy/src/config.rs
//! Process configuration: a `config.toml` file in matscan's `Config` shape
//! (`#[serde(deny_unknown_fields)]`, `Option<T>` fields with documented
//! defaults), with individual values overridable from the CLI/environment
//! the way Magma's `CommandLineArguments` does it.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// CLI/env overrides. Every field is optional; an unset field falls back to
/// `config.toml`, and an unset file field falls back to its documented
/// default.
#[derive(Parser, Clone, Debug)]
#[command(name = "mc-domain-proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[clap(long, env = "CONFIG_PATH", default_value = "config.toml")]
    config: PathBuf,

    #[clap(long, env = "PROXY_HOST")]
    proxy_host: Option<String>,
    #[clap(long, env = "PROXY_PORT")]
    proxy_port: Option<u16>,
    #[clap(long, env = "API_HOST")]
    api_host: Option<String>,
    #[clap(long, env = "API_PORT")]
    api_port: Option<u16>,
    #[clap(long, env = "API_KEY")]
    api_key: Option<String>,
    #[clap(long, env = "MANAGER_ADDRESS")]
    manager_address: Option<String>,
    #[clap(long, env = "MANAGER_API_KEY")]
    manager_api_key: Option<String>,
    #[clap(long, env = "ROUTES_PATH")]
    routes_path: Option<PathBuf>,
    #[clap(long, env = "NAME_PASSED_MARKER")]
    name_passed_marker: Option<String>,
    #[clap(long, env = "INITIAL_READ_IDLE_MS")]
    initial_read_idle_ms: Option<u64>,
    #[clap(long, env = "INITIAL_READ_GRACE_MS")]
    initial_read_grace_ms: Option<u64>,
    #[clap(long, env = "DIAL_TIMEOUT_SECS")]
    dial_timeout_secs: Option<u64>,
    #[clap(long, env = "EXTERNAL_HTTP_TIMEOUT_SECS")]
    external_http_timeout_secs: Option<u64>,
    #[clap(long, env = "IDENTITY_RETRY_DELAY_SECS")]
    identity_retry_delay_secs: Option<u64>,
    #[clap(long, env = "IDENTITY_MAX_RETRIES")]
    identity_max_retries: Option<u32>,
}

/// The on-disk shape of `config.toml`. Unknown keys are a hard error, the
/// same stance matscan takes on its own config file.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields, default)]
struct FileConfig {
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
    api_host: Option<String>,
    api_port: Option<u16>,
    api_key: Option<String>,
    manager_address: Option<String>,
    manager_api_key: Option<String>,
    routes_path: Option<PathBuf>,
    name_passed_marker: Option<String>,
    initial_read_idle_ms: Option<u64>,
    initial_read_grace_ms: Option<u64>,
    dial_timeout_secs: Option<u64>,
    external_http_timeout_secs: Option<u64>,
    identity_retry_delay_secs: Option<u64>,
    identity_max_retries: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Host the client-facing listener binds to. Defaults to `0.0.0.0`.
    pub proxy_host: String,
    /// Port the client-facing listener binds to. Defaults to `25565`.
    pub proxy_port: u16,
    /// Host the control-plane HTTP server binds to. Defaults to `127.0.0.1`.
    pub api_host: String,
    /// Port the control-plane HTTP server binds to. Defaults to `8080`.
    pub api_port: u16,
    /// Shared secret the control plane requires on every request.
    pub api_key: String,
    /// Base URL of the manager service. Absence disables the firewall client
    /// and the manager reporter.
    pub manager_address: Option<String>,
    /// API key presented to the manager service.
    pub manager_api_key: Option<String>,
    /// File the routing table is persisted to and loaded from at startup.
    /// Defaults to `routes.json`.
    pub routes_path: PathBuf,
    /// Developer probe literal for the `namePassed` diagnostic hex dump.
    /// Unset disables the diagnostic entirely.
    pub name_passed_marker: Option<String>,
    /// How long the initial-read coalescer waits for the stream to go idle
    /// before it stops accumulating bytes. Defaults to `250`.
    pub initial_read_idle_ms: u64,
    /// Initial grace period the coalescer waits for the first byte before
    /// arming the idle window. Defaults to `5`.
    pub initial_read_grace_ms: u64,
    /// Upper bound on how long dialing the upstream may take. Defaults to
    /// `10`.
    pub dial_timeout_secs: u64,
    /// Upper bound on a single identity-resolver or firewall HTTP call.
    /// Defaults to `5`.
    pub external_http_timeout_secs: u64,
    /// Delay between identity-resolver retries against the primary
    /// provider. Defaults to `1`.
    pub identity_retry_delay_secs: u64,
    /// Number of retries against the primary identity provider before
    /// falling back to the secondary provider. Defaults to `3`.
    pub identity_max_retries: u32,
}

impl ProxyConfig {
    /// Parses CLI/env overrides, loads `config.toml` if present (a missing
    /// file is not an error, matching an all-env-driven deployment), and
    /// merges overrides on top of file values on top of documented defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = Cli::parse();
        Self::from_cli_and_file(cli)
    }

    fn from_cli_and_file(cli: Cli) -> Result<Self, ConfigError> {
        let file: FileConfig = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: cli.config.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: cli.config.clone(),
                    source,
                });
            }
        };

        let api_key = cli.api_key.or(file.api_key).ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            proxy_host: cli.proxy_host.or(file.proxy_host).unwrap_or_else(|| "0.0.0.0".to_string()),
            proxy_port: cli.proxy_port.or(file.proxy_port).unwrap_or(25565),
            api_host: cli.api_host.or(file.api_host).unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: cli.api_port.or(file.api_port).unwrap_or(8080),
            api_key,
            manager_address: cli.manager_address.or(file.manager_address),
            manager_api_key: cli.manager_api_key.or(file.manager_api_key),
            routes_path: cli.routes_path.or(file.routes_path).unwrap_or_else(|| PathBuf::from("routes.json")),
            name_passed_marker: cli.name_passed_marker.or(file.name_passed_marker),
            initial_read_idle_ms: cli.initial_read_idle_ms.or(file.initial_read_idle_ms).unwrap_or(250),
            initial_read_grace_ms: cli.initial_read_grace_ms.or(file.initial_read_grace_ms).unwrap_or(5),
            dial_timeout_secs: cli.dial_timeout_secs.or(file.dial_timeout_secs).unwrap_or(10),
            external_http_timeout_secs: cli
                .external_http_timeout_secs
                .or(file.external_http_timeout_secs)
                .unwrap_or(5),
            identity_retry_delay_secs: cli
                .identity_retry_delay_secs
                .or(file.identity_retry_delay_secs)
                .unwrap_or(1),
            identity_max_retries: cli.identity_max_retries.or(file.identity_max_retries).unwrap_or(3),
        })
    }

    pub fn manager_enabled(&self) -> bool {
        self.manager_address.is_some() && self.manager_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(config: &str) -> Cli {
        Cli {
            config: PathBuf::from(config),
            proxy_host: None,
            proxy_port: None,
            api_host: None,
            api_port: None,
            api_key: Some("test-key".to_string()),
            manager_address: None,
            manager_api_key: None,
            routes_path: None,
            name_passed_marker: None,
            initial_read_idle_ms: None,
            initial_read_grace_ms: None,
            dial_timeout_secs: None,
            external_http_timeout_secs: None,
            identity_retry_delay_secs: None,
            identity_max_retries: None,
        }
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ProxyConfig::from_cli_and_file(cli("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.proxy_port, 25565);
        assert_eq!(config.api_key, "test-key");
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let mut c = cli("/nonexistent/config.toml");
        c.api_key = None;
        assert!(ProxyConfig::from_cli_and_file(c).is_err());
    }

    #[test]
    fn file_values_load_and_cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "proxy_port = 30000\napi_key = \"from-file\"\n").unwrap();

        let loaded = ProxyConfig::from_cli_and_file(cli(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.proxy_port, 30000);
        // CLI-provided api_key still wins over the file's value.
        assert_eq!(loaded.api_key, "test-key");
    }

    #[test]
    fn unknown_field_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not_a_real_field = 1\n").unwrap();

        assert!(ProxyConfig::from_cli_and_file(cli(path.to_str().unwrap())).is_err());
    }
}
