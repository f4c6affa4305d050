//! Relay configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Default relay port.
pub const DEFAULT_PORT: u16 = 2222;

/// Default bind / connect host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default maximum frame length (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Default number of frames a session may have queued before it counts as stalled.
pub const DEFAULT_OUTBOUND_QUEUE_LEN: usize = 64;

/// Default time allowed for the handshake frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Default pause between the termination notice and force-closing sessions.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 100;

/// Default wait for a directed-message acknowledgment or roster reply.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;

/// Default keyword that ends an interactive session.
pub const DEFAULT_EXIT_KEYWORD: &str = "quit";

/// Handshake usernames that request the roster instead of joining.
pub const DEFAULT_ROSTER_SENTINELS: [&str; 2] = ["LIST_USERS_CMD", "LIST_CMD"];

/// What the server does with a first frame that is not a valid handshake.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandshakePolicy {
    /// Close the connection.
    #[default]
    Strict,
    /// Register the session as `user_<peer port>`.
    Lenient,
}

/// Configuration shared by the relay server and client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Host to bind (server) or connect to (client).
    pub host: String,

    /// TCP port; 0 lets the OS pick one for the server.
    pub port: u16,

    /// Display name of the room.
    pub alias: String,

    /// Handling of malformed handshakes.
    pub handshake_policy: HandshakePolicy,

    /// Reserved usernames that request the roster.
    pub roster_sentinels: Vec<String>,

    /// Time allowed for the handshake frame, in milliseconds.
    pub handshake_timeout_ms: u64,

    /// Grace period before force-closing sessions on shutdown, in milliseconds.
    pub shutdown_grace_ms: u64,

    /// Client-side wait for an acknowledgment frame, in milliseconds.
    pub ack_timeout_ms: u64,

    /// Largest accepted frame in bytes.
    pub max_frame_len: usize,

    /// Frames queued per session before the session is dropped as stalled.
    pub outbound_queue_len: usize,

    /// Line that ends an interactive session (case-insensitive).
    pub exit_keyword: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            alias: String::new(),
            handshake_policy: HandshakePolicy::default(),
            roster_sentinels: DEFAULT_ROSTER_SENTINELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbound_queue_len: DEFAULT_OUTBOUND_QUEUE_LEN,
            exit_keyword: DEFAULT_EXIT_KEYWORD.to_string(),
        }
    }
}

impl RelayConfig {
    /// Loads a configuration from a TOML file. Missing fields take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(content)?)
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the room alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Sets the handshake policy.
    pub fn with_handshake_policy(mut self, policy: HandshakePolicy) -> Self {
        self.handshake_policy = policy;
        self
    }

    /// `host:port` as a connect/bind target.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True if `name` is a reserved roster-request username.
    pub fn is_roster_sentinel(&self, name: &str) -> bool {
        self.roster_sentinels.iter().any(|s| s == name)
    }

    /// Sentinel the client sends to request the roster.
    pub fn roster_sentinel(&self) -> &str {
        self.roster_sentinels
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_ROSTER_SENTINELS[0])
    }

    /// Time allowed for the handshake frame.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Wait between the termination notice and closing sessions.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Client-side wait for an acknowledgment.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// True if `line` is the exit keyword, ignoring case and surrounding whitespace.
    pub fn is_exit_keyword(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(&self.exit_keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 2222);
        assert_eq!(config.handshake_policy, HandshakePolicy::Strict);
        assert!(config.is_roster_sentinel("LIST_USERS_CMD"));
        assert!(config.is_roster_sentinel("LIST_CMD"));
        assert!(!config.is_roster_sentinel("alice"));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(100));
        assert_eq!(config.max_frame_len, 1024 * 1024);
        assert_eq!(config.outbound_queue_len, 64);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            port = 4000
            alias = "basement"
            handshake_policy = "lenient"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.alias, "basement");
        assert_eq!(config.handshake_policy, HandshakePolicy::Lenient);
        assert_eq!(config.exit_keyword, "quit");
        assert_eq!(config.roster_sentinels.len(), 2);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(RelayConfig::from_toml("port = \"not a number\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "host = \"0.0.0.0\"\nroster_sentinels = [\"WHO\"]\n").unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.address(), "0.0.0.0:2222");
        assert_eq!(config.roster_sentinel(), "WHO");
        assert!(!config.is_roster_sentinel("LIST_CMD"));
    }

    #[test]
    fn test_exit_keyword_case_insensitive() {
        let config = RelayConfig::default();
        assert!(config.is_exit_keyword("quit"));
        assert!(config.is_exit_keyword("QUIT"));
        assert!(config.is_exit_keyword("  Quit \n"));
        assert!(!config.is_exit_keyword("quitting"));
    }
}
