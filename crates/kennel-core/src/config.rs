use std::env;
use std::path::PathBuf;

use crate::error::{KennelError, Result};

pub const ENV_DB_USER: &str = "KENNEL_DB_USER";
pub const ENV_DB_PASS: &str = "KENNEL_DB_PASS";
pub const ENV_DB_DSN: &str = "KENNEL_DB_DSN";
pub const ENV_BACKUP_FILE: &str = "KENNEL_BACKUP_FILE";

pub const DEFAULT_BACKUP_FILE: &str = "pets_backup.json";

/// Connection parameters for the relational backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub user: String,
    pub password: String,
    pub dsn: String,
}

impl DbConfig {
    /// Build a config from optional parts. Fails if any part is missing or blank.
    pub fn from_parts(
        user: Option<String>,
        password: Option<String>,
        dsn: Option<String>,
    ) -> Result<Self> {
        let missing: Vec<&str> = [
            (ENV_DB_USER, &user),
            (ENV_DB_PASS, &password),
            (ENV_DB_DSN, &dsn),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(KennelError::Configuration(format!(
                "{} not configured",
                missing.join("/")
            )));
        }

        Ok(Self {
            user: user.unwrap_or_default(),
            password: password.unwrap_or_default(),
            dsn: dsn.unwrap_or_default(),
        })
    }
}

/// Process-level settings.
///
/// The database parts are kept raw so that a missing value only becomes an error
/// at the first connection attempt, not at process start.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_dsn: Option<String>,
    pub backup_file: PathBuf,
}

impl Settings {
    /// Load settings from the environment, after reading `.env` if one exists.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Could not read .env file: {}", e);
            }
        }

        Self {
            db_user: env::var(ENV_DB_USER).ok(),
            db_password: env::var(ENV_DB_PASS).ok(),
            db_dsn: env::var(ENV_DB_DSN).ok(),
            backup_file: env::var(ENV_BACKUP_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_BACKUP_FILE)),
        }
    }

    pub fn db_config(&self) -> Result<DbConfig> {
        DbConfig::from_parts(
            self.db_user.clone(),
            self.db_password.clone(),
            self.db_dsn.clone(),
        )
    }
}
