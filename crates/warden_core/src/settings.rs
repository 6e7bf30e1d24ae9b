//! Storage settings loaded from TOML.
//!
//! # Responsibility
//! - Describe which driver to load and how to reach its store.
//! - Carry the password hashing cost and the first administrator account.
//!
//! # Invariants
//! - A validated settings value names a non-empty driver and database path,
//!   and a bcrypt cost inside `4..=31`.

use crate::security::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_DRIVER: &str = "sqlite";
pub const DEFAULT_DATABASE_PATH: &str = "warden.sqlite3";

/// Settings consumed by the driver loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub first_admin: Option<FirstAdminSettings>,
    #[serde(default)]
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySettings {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

/// Account seeded by storage setup when no user has this email yet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirstAdminSettings {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            database: DatabaseSettings::default(),
            security: SecuritySettings::default(),
            first_admin: None,
            logging: None,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

impl Debug for FirstAdminSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirstAdminSettings")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl StorageSettings {
    /// Parses and validates settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates a TOML settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| SettingsError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.driver.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "driver name must not be empty".to_string(),
            ));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(SettingsError::Invalid(
                "database path must not be empty".to_string(),
            ));
        }
        let cost = self.security.bcrypt_cost;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(SettingsError::Invalid(format!(
                "bcrypt_cost {cost} is outside {MIN_BCRYPT_COST}..={MAX_BCRYPT_COST}"
            )));
        }
        if let Some(admin) = &self.first_admin {
            if admin.email.trim().is_empty() || admin.password.is_empty() {
                return Err(SettingsError::Invalid(
                    "first_admin requires both email and password".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum SettingsError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read settings `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid settings file: {err}"),
            Self::Invalid(message) => write!(f, "invalid settings: {message}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for SettingsError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_log_level() -> String {
    crate::logging::default_log_level().to_string()
}
