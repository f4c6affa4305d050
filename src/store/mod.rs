//! On-disk state for Ghostwire.
//!
//! Two TOML files live under `~/.ghostwire/`:
//! - `rosters/<port>.toml`: users that ever joined the room on that port.
//! - `profile.toml`: the last connection (host, port, alias, key, username),
//!   so client commands can omit the key fragments.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{CipherError, Secret};
use crate::relay::RelayConfig;

/// Errors that can occur when reading or writing stored state.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Config directory not found. Unable to determine home directory.")]
    NoConfigDir,

    #[error("No saved profile. Pass --key1/--key2/--key3 or run serve/join first.")]
    NoProfile,

    #[error("Invalid stored key: {0}")]
    InvalidKey(#[from] CipherError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Persisted list of known users for one room.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
struct RosterFile {
    #[serde(default)]
    users: Vec<String>,
}

/// Reads and writes a room's known-user roster.
#[derive(Debug, Clone)]
pub struct RosterStore {
    path: PathBuf,
}

impl RosterStore {
    /// Roster stored at an explicit path.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Roster for `port` under the default config directory.
    pub fn for_port(port: u16) -> Result<Self, StoreError> {
        let dir = get_config_dir()?.join("rosters");
        Ok(Self::new(dir.join(format!("{}.toml", port))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the roster. A missing file is an empty roster.
    pub fn load(&self) -> Result<Vec<String>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let roster: RosterFile = toml::from_str(&content)?;
        Ok(roster.users)
    }

    /// Replaces the stored roster.
    pub fn save(&self, users: &[String]) -> Result<(), StoreError> {
        let roster = RosterFile {
            users: users.to_vec(),
        };
        write_private(&self.path, &toml::to_string_pretty(&roster)?)
    }
}

/// A saved connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub alias: String,
    /// Room secret, base64.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Profile {
    pub fn new(config: &RelayConfig, secret: &Secret, username: Option<&str>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            alias: config.alias.clone(),
            key: secret.to_base64(),
            username: username.map(str::to_string),
        }
    }

    /// Restores the room secret.
    pub fn secret(&self) -> Result<Secret, StoreError> {
        Ok(Secret::from_base64(&self.key)?)
    }

    /// Default profile location.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        Ok(get_config_dir()?.join("profile.toml"))
    }

    /// Loads a profile, `None` if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&content)?))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        write_private(path, &toml::to_string_pretty(self)?)
    }

    /// Loads the profile from the default location.
    pub fn load() -> Result<Option<Self>, StoreError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Saves the profile to the default location.
    pub fn save(&self) -> Result<(), StoreError> {
        self.save_to(&Self::default_path()?)
    }
}

/// Get the Ghostwire config directory (`~/.ghostwire`).
pub fn get_config_dir() -> Result<PathBuf, StoreError> {
    dirs::home_dir()
        .map(|home| home.join(".ghostwire"))
        .ok_or(StoreError::NoConfigDir)
}

/// Writes `content` to `path`, creating parents; owner-only on Unix.
fn write_private(path: &Path, content: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roster_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = RosterStore::new(dir.path().join("nope.toml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_roster_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = RosterStore::new(dir.path().join("rosters").join("2222.toml"));

        let users = vec!["alice".to_string(), "bob".to_string()];
        store.save(&users).unwrap();
        assert_eq!(store.load().unwrap(), users);

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("alice"));
    }

    #[cfg(unix)]
    #[test]
    fn test_roster_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = RosterStore::new(dir.path().join("r.toml"));
        store.save(&["alice".to_string()]).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_roster_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "users = 42").unwrap();

        let result = RosterStore::new(&path).load();
        assert!(matches!(result, Err(StoreError::TomlParseError(_))));
    }

    #[test]
    fn test_profile_roundtrip_restores_secret() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.toml");

        let secret = Secret::from_fragments("k1", "k2", "k3");
        let config = RelayConfig::default().with_port(3333).with_alias("den");
        let profile = Profile::new(&config, &secret, Some("alice"));
        profile.save_to(&path).unwrap();

        let loaded = Profile::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(loaded.port, 3333);
        assert_eq!(loaded.secret().unwrap(), secret);
    }

    #[test]
    fn test_profile_missing() {
        let dir = TempDir::new().unwrap();
        assert!(Profile::load_from(&dir.path().join("none.toml")).unwrap().is_none());
    }

    #[test]
    fn test_profile_bad_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.toml");
        fs::write(&path, "host = \"127.0.0.1\"\nport = 2222\nkey = \"!!!\"\n").unwrap();

        let profile = Profile::load_from(&path).unwrap().unwrap();
        assert!(matches!(profile.secret(), Err(StoreError::InvalidKey(_))));
    }
}
