//! Configuration loaded from `config.toml` in the mochi home directory.
//!
//! ```toml
//! command_prefix = "/"
//!
//! [permissions.grants]
//! "console:*" = ["u123456"]
//!
//! [protocol]
//! version = "37 13"
//! session_key = "00 11 22 33 44 55 66 77 88 99 AA BB CC DD EE FF"
//!
//! [console]
//! owner_namespace = "console"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permission::{
    PermissionError, PermissionId, PermissionIdError, PermissionService, PermitteeId,
    PermitteeIdError,
};
use crate::protocol::{TeaError, TeaKey};

pub const CONFIG_FILE: &str = "config.toml";
pub const HOME_ENV: &str = "MOCHI_HOME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("home directory not found")]
    NoHomeDir,
    #[error("command prefix must not be blank or contain whitespace")]
    BadPrefix,
    #[error("protocol version must be 2 hex bytes, got '{0}'")]
    BadVersion(String),
    #[error("invalid session key: {0}")]
    BadSessionKey(#[from] TeaError),
    #[error("invalid permission id in grants: {0}")]
    BadPermission(#[from] PermissionIdError),
    #[error("invalid permittee in grants: {0}")]
    BadPermittee(#[from] PermitteeIdError),
    #[error("cannot apply grant: {0}")]
    Grant(#[from] PermissionError),
}

// ============================================================================
// Default Values
// ============================================================================

/// Central source of truth for configuration defaults.
pub struct ConfigDefaults;

impl ConfigDefaults {
    pub const COMMAND_PREFIX: &'static str = "/";
    pub const PROTOCOL_VERSION: &'static str = "37 13";
    pub const OWNER_NAMESPACE: &'static str = "console";
    pub const HOME_DIR: &'static str = ".mochi";
}

// Thin wrappers for serde's #[serde(default = "...")] requirement
fn default_command_prefix() -> String {
    ConfigDefaults::COMMAND_PREFIX.to_string()
}
fn default_protocol_version() -> String {
    ConfigDefaults::PROTOCOL_VERSION.to_string()
}
fn default_owner_namespace() -> String {
    ConfigDefaults::OWNER_NAMESPACE.to_string()
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Text a chat message must start with to count as a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Permission id -> permittee ids, granted at startup in file order.
    #[serde(default)]
    pub grants: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_protocol_version")]
    pub version: String,
    /// Fallback key for `mochi decode`.
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_owner_namespace")]
    pub owner_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            permissions: PermissionsConfig::default(),
            protocol: ProtocolConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: default_protocol_version(),
            session_key: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            owner_namespace: default_owner_namespace(),
        }
    }
}

/// Resolve the mochi home directory.
///
/// Precedence:
/// 1. `home_override` (from the --home CLI flag)
/// 2. `MOCHI_HOME` environment variable
/// 3. `~/.mochi`
pub fn resolve_home(home_override: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = home_override {
        return Ok(path);
    }
    if let Ok(home) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    dirs_next::home_dir()
        .map(|home| home.join(ConfigDefaults::HOME_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

impl Config {
    /// Load `config.toml` from `home`. A missing file gives the defaults.
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE);
        let config = match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::BadPrefix);
        }
        self.protocol_version()?;
        self.session_key()?;
        PermissionId::for_plugin(&self.console.owner_namespace, "*")?;
        self.grants()?;
        Ok(())
    }

    /// The two version bytes written into outgoing frames.
    pub fn protocol_version(&self) -> Result<[u8; 2], ConfigError> {
        let bad = || ConfigError::BadVersion(self.protocol.version.clone());
        let bytes = crate::protocol::parse_hex(&self.protocol.version).map_err(|_| bad())?;
        <[u8; 2]>::try_from(bytes.as_slice()).map_err(|_| bad())
    }

    pub fn session_key(&self) -> Result<Option<TeaKey>, ConfigError> {
        self.protocol
            .session_key
            .as_deref()
            .map(str::parse::<TeaKey>)
            .transpose()
            .map_err(ConfigError::from)
    }

    /// The configured grants as typed pairs, in file order.
    pub fn grants(&self) -> Result<Vec<(PermitteeId, PermissionId)>, ConfigError> {
        let mut out = Vec::new();
        for (permission, permittees) in &self.permissions.grants {
            let permission: PermissionId = permission.parse()?;
            for permittee in permittees {
                out.push((permittee.parse()?, permission.clone()));
            }
        }
        Ok(out)
    }

    /// Grant every configured pair. Permissions must already be registered.
    pub fn apply_grants(&self, permissions: &PermissionService) -> Result<usize, ConfigError> {
        let grants = self.grants()?;
        for (permittee, permission) in &grants {
            permissions.grant(*permittee, permission)?;
            tracing::debug!(permittee = %permittee, permission = %permission, "granted from config");
        }
        Ok(grants.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.command_prefix, "/");
        assert_eq!(config.protocol.version, "37 13");
        assert_eq!(config.protocol_version().unwrap(), [0x37, 0x13]);
        assert_eq!(config.session_key().unwrap(), None);
        assert_eq!(config.console.owner_namespace, "console");
        assert!(config.permissions.grants.is_empty());
        assert_eq!(Config::parse("").unwrap(), config);
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r##"
command_prefix = "#"

[permissions.grants]
"console:*" = ["u123", "g456"]
"*:*" = ["console"]

[protocol]
version = "3713"
session_key = "00112233445566778899aabbccddeeff"

[console]
owner_namespace = "Terminal"
"##,
        )
        .unwrap();
        assert_eq!(config.command_prefix, "#");
        assert_eq!(config.protocol_version().unwrap(), [0x37, 0x13]);
        assert!(config.session_key().unwrap().is_some());
        assert_eq!(config.console.owner_namespace, "Terminal");
        let grants = config.grants().unwrap();
        assert_eq!(
            grants,
            vec![
                (PermitteeId::ExactUser(123), "console:*".parse().unwrap()),
                (PermitteeId::ExactGroup(456), "console:*".parse().unwrap()),
                (PermitteeId::Console, PermissionId::root()),
            ]
        );
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Config::parse("command_prefix = \"\""),
            Err(ConfigError::BadPrefix)
        ));
        assert!(matches!(
            Config::parse("command_prefix = \"/ \""),
            Err(ConfigError::BadPrefix)
        ));
        assert!(matches!(
            Config::parse("[protocol]\nversion = \"37\""),
            Err(ConfigError::BadVersion(_))
        ));
        assert!(matches!(
            Config::parse("[protocol]\nsession_key = \"00 11\""),
            Err(ConfigError::BadSessionKey(TeaError::InvalidKeyLength(2)))
        ));
        assert!(matches!(
            Config::parse("[permissions.grants]\n\"nocolon\" = [\"u1\"]"),
            Err(ConfigError::BadPermission(_))
        ));
        assert!(matches!(
            Config::parse("[permissions.grants]\n\"a:b\" = [\"x1\"]"),
            Err(ConfigError::BadPermittee(_))
        ));
        assert!(matches!(
            Config::parse("command_prefix = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_and_present_file() {
        let home = TempDir::new().unwrap();
        assert_eq!(Config::load(home.path()).unwrap(), Config::default());

        fs::write(home.path().join(CONFIG_FILE), "command_prefix = \"!\"\n").unwrap();
        assert_eq!(Config::load(home.path()).unwrap().command_prefix, "!");
    }

    #[test]
    fn test_apply_grants() {
        let service = PermissionService::new();
        let config = Config::parse("[permissions.grants]\n\"*:*\" = [\"u42\"]").unwrap();
        assert_eq!(config.apply_grants(&service).unwrap(), 1);
        assert!(service.test_permission(PermitteeId::ExactUser(42), &PermissionId::root()));

        let config = Config::parse("[permissions.grants]\n\"demo:missing\" = [\"u42\"]").unwrap();
        assert!(matches!(
            config.apply_grants(&service),
            Err(ConfigError::Grant(_))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_home_precedence() {
        let explicit = PathBuf::from("/tmp/explicit-mochi");
        assert_eq!(resolve_home(Some(explicit.clone())).unwrap(), explicit);

        // SAFETY: serialized with the other tests touching MOCHI_HOME.
        unsafe { std::env::set_var(HOME_ENV, "/tmp/env-mochi") };
        assert_eq!(resolve_home(None).unwrap(), PathBuf::from("/tmp/env-mochi"));
        assert_eq!(resolve_home(Some(explicit.clone())).unwrap(), explicit);

        unsafe { std::env::remove_var(HOME_ENV) };
        if let Some(home) = dirs_next::home_dir() {
            assert_eq!(resolve_home(None).unwrap(), home.join(".mochi"));
        }
    }
}
