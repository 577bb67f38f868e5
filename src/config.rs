//! Hub configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to defaults, except `LISTEN_ADDR`, which must parse if set.

use std::net::SocketAddr;
use std::time::Duration;

use crate::hub::HubSettings;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Top-level server configuration.
///
/// Loaded once at startup via [`HubConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Route that upgrades to a WebSocket.
    pub ws_path: String,

    /// Connections silent for this long are evicted.
    pub idle_timeout: Duration,

    /// Upper bound for one outbound frame write.
    pub write_timeout: Duration,

    /// Delay before a crashed supervised loop is restarted.
    pub restart_backoff: Duration,

    /// Largest inbound message accepted by the WebSocket layer.
    pub max_message_bytes: usize,

    /// Registers a handler that echoes every inbound frame back.
    pub echo_enabled: bool,

    /// Tracing output format.
    pub log_format: LogFormat,
}

impl HubConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let ws_path = std::env::var("WS_PATH")
            .ok()
            .filter(|path| path.starts_with('/'))
            .unwrap_or_else(|| "/ws".to_string());

        let idle_timeout = parse_env_millis("WS_IDLE_TIMEOUT_MS", 60_000);
        let write_timeout = parse_env_millis("WS_WRITE_TIMEOUT_MS", 10_000);
        let restart_backoff = parse_env_millis("SUPERVISOR_BACKOFF_MS", 3_000);
        let max_message_bytes = parse_env("WS_MAX_MESSAGE_BYTES", 1 << 20);
        let echo_enabled = parse_env_bool("WS_ECHO_ENABLED", false);

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            ws_path,
            idle_timeout,
            write_timeout,
            restart_backoff,
            max_message_bytes,
            echo_enabled,
            log_format,
        })
    }

    /// Timing knobs for the hub.
    #[must_use]
    pub const fn hub_settings(&self) -> HubSettings {
        HubSettings {
            idle_timeout: self.idle_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a millisecond count. Zero falls back to `default_ms`:
/// `tokio::time::interval` rejects a zero period.
fn parse_env_millis(key: &str, default_ms: u64) -> Duration {
    let ms = parse_env(key, default_ms);
    Duration::from_millis(if ms == 0 { default_ms } else { ms })
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
