//! Command module - Strategy pattern for CLI commands.
//!
//! Each command is a separate module implementing the `CommandExecutor` trait.

mod capacity;
mod embed;
mod extract;
mod join;
mod list;
mod send;
mod serve;

pub use capacity::CapacityCommand;
pub use embed::EmbedCommand;
pub use extract::ExtractCommand;
pub use join::JoinCommand;
pub use list::ListCommand;
pub use send::SendCommand;
pub use serve::ServeCommand;

use anyhow::{bail, Context, Result};
use clap::Args;

use ghostwire::crypto::Secret;
use ghostwire::relay::{RelayConfig, DEFAULT_PORT};
use ghostwire::store::{Profile, StoreError};

/// Trait for command execution - Strategy pattern.
///
/// Each command struct holds its parsed arguments and implements
/// this trait to define its execution logic.
pub trait CommandExecutor {
    /// Executes the command with its parsed arguments.
    fn execute(&self) -> Result<()>;
}

/// The three key fragments shared by every member of a room.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// First key fragment
    #[arg(long)]
    pub key1: Option<String>,

    /// Second key fragment
    #[arg(long)]
    pub key2: Option<String>,

    /// Third key fragment
    #[arg(long)]
    pub key3: Option<String>,
}

impl KeyArgs {
    /// The secret from the fragments, `None` when no fragment was given.
    pub fn secret(&self) -> Result<Option<Secret>> {
        match (&self.key1, &self.key2, &self.key3) {
            (Some(k1), Some(k2), Some(k3)) => Ok(Some(Secret::from_fragments(k1, k2, k3))),
            (None, None, None) => Ok(None),
            _ => bail!("--key1, --key2 and --key3 must be given together"),
        }
    }

    /// The secret from the fragments, falling back to the saved profile.
    pub fn secret_or_profile(&self, profile: Option<&Profile>) -> Result<Secret> {
        if let Some(secret) = self.secret()? {
            return Ok(secret);
        }
        let profile = profile.ok_or(StoreError::NoProfile)?;
        profile
            .secret()
            .context("Saved profile holds an unusable key")
    }
}

/// Where to find the relay.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Relay host (default: saved profile, then 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Relay port (default: saved profile, then 2222)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Relay configuration file (TOML)
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}

impl ConnectArgs {
    /// Builds the client configuration: file, then profile, then flags.
    pub fn relay_config(&self, profile: Option<&Profile>) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(profile) = profile {
            config = config
                .with_host(profile.host.clone())
                .with_port(profile.port)
                .with_alias(profile.alias.clone());
        }
        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        Ok(config)
    }
}

/// Loads the saved profile; a broken profile is reported and ignored.
pub fn load_profile() -> Option<Profile> {
    match Profile::load() {
        Ok(profile) => profile,
        Err(e) => {
            log::warn!("Ignoring saved profile: {}", e);
            None
        }
    }
}

/// Saves the profile, logging instead of failing.
pub fn save_profile(profile: &Profile) {
    if let Err(e) = profile.save() {
        log::warn!("Could not save profile: {}", e);
    }
}

/// Builds the tokio runtime for network commands.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create tokio runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(k1: Option<&str>, k2: Option<&str>, k3: Option<&str>) -> KeyArgs {
        KeyArgs {
            key1: k1.map(str::to_string),
            key2: k2.map(str::to_string),
            key3: k3.map(str::to_string),
        }
    }

    #[test]
    fn test_key_args_all_or_nothing() {
        assert!(keys(Some("a"), Some("b"), Some("c")).secret().unwrap().is_some());
        assert!(keys(None, None, None).secret().unwrap().is_none());
        assert!(keys(Some("a"), None, Some("c")).secret().is_err());
    }

    #[test]
    fn test_key_args_fall_back_to_profile() {
        let secret = Secret::from_fragments("x", "y", "z");
        let profile = Profile::new(&RelayConfig::default(), &secret, None);

        let resolved = keys(None, None, None).secret_or_profile(Some(&profile)).unwrap();
        assert_eq!(resolved, secret);
        assert!(keys(None, None, None).secret_or_profile(None).is_err());
    }

    #[test]
    fn test_connect_args_precedence() {
        let secret = Secret::from_fragments("x", "y", "z");
        let saved = RelayConfig::default().with_host("10.0.0.5").with_port(4000);
        let profile = Profile::new(&saved, &secret, None);

        let args = ConnectArgs {
            host: None,
            port: Some(5000),
            config: None,
        };
        let config = args.relay_config(Some(&profile)).unwrap();
        assert_eq!(config.address(), "10.0.0.5:5000");

        let config = args.relay_config(None).unwrap();
        assert_eq!(config.address(), "127.0.0.1:5000");
    }
}
