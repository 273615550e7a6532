//! Pet repository with database-first persistence and a local file fallback.
//!
//! Every operation runs against the database while the repository is in
//! [`BackendMode::Primary`]. The first failure switches the instance to
//! [`BackendMode::Fallback`] for good, and the failed request is completed against
//! the backup file before returning. The database is never tried again by that
//! instance.

use std::path::PathBuf;

use rusqlite::Connection;

use crate::backup::BackupStore;
use crate::db::queries;
use crate::db::ConnectionProvider;
use crate::error::{KennelError, Result};
use crate::models::Pet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Primary,
    Fallback,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Primary => "database",
            BackendMode::Fallback => "local backup",
        }
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct PetRepository<P: ConnectionProvider> {
    provider: P,
    backup: BackupStore,
    mode: BackendMode,
}

impl<P: ConnectionProvider> PetRepository<P> {
    /// Probe the database and pick the starting backend.
    ///
    /// Missing connection settings are returned as an error. Any other probe
    /// failure starts the repository in fallback mode and makes sure the backup
    /// file exists.
    pub fn open(provider: P, backup_path: impl Into<PathBuf>) -> Result<Self> {
        let backup = BackupStore::new(backup_path);

        let mode = match provider.get_connection() {
            Ok(conn) => {
                drop(conn);
                log::info!("Database reachable; using it as the pet store");
                BackendMode::Primary
            }
            Err(e @ KennelError::Configuration(_)) => return Err(e),
            Err(e) => {
                log::warn!(
                    "Could not connect to the database: {}. Using local backup ({}).",
                    e,
                    backup.path().display()
                );
                backup.initialize()?;
                BackendMode::Fallback
            }
        };

        Ok(Self {
            provider,
            backup,
            mode,
        })
    }

    /// Start directly in fallback mode without probing the database.
    pub fn fallback_only(provider: P, backup_path: impl Into<PathBuf>) -> Result<Self> {
        let backup = BackupStore::new(backup_path);
        backup.initialize()?;
        Ok(Self {
            provider,
            backup,
            mode: BackendMode::Fallback,
        })
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn backup(&self) -> &BackupStore {
        &self.backup
    }

    /// Run `f` against a fresh database connection while in primary mode.
    ///
    /// Returns `None` when the caller must use the backup file instead: either the
    /// repository was already in fallback mode, or this attempt failed and the
    /// repository has just been downgraded.
    fn try_primary<T>(
        &mut self,
        operation: &str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Option<T> {
        if self.mode == BackendMode::Fallback {
            return None;
        }

        log::debug!("{}: using database", operation);
        let outcome = self
            .provider
            .get_connection()
            .and_then(|mut conn| f(&mut conn));

        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("{} failed on the database: {}", operation, e);
                self.downgrade();
                None
            }
        }
    }

    fn downgrade(&mut self) {
        self.mode = BackendMode::Fallback;
        log::warn!(
            "Switching to local backup ({}) for the rest of this session",
            self.backup.path().display()
        );
        if let Err(e) = self.backup.initialize() {
            log::warn!("Could not create backup file: {}", e);
        }
    }

    /// Persist a new pet and return it with its assigned id and intake date.
    pub fn create(&mut self, pet: &Pet) -> Result<Pet> {
        if let Some(created) = self.try_primary("create", |conn| queries::insert_pet(conn, pet)) {
            return Ok(created);
        }
        self.backup.create(pet)
    }

    /// All pets, ascending by id.
    pub fn get_all(&mut self) -> Vec<Pet> {
        if let Some(pets) = self.try_primary("get_all", |conn| queries::list_pets(conn)) {
            return pets;
        }
        self.backup.get_all()
    }

    pub fn get_by_id(&mut self, id: i64) -> Option<Pet> {
        if let Some(found) = self.try_primary("get_by_id", |conn| queries::get_pet(conn, id)) {
            return found;
        }
        self.backup.get_by_id(id)
    }

    /// Replace all fields except `id` and `intake_date` of the pet with `pet.id`.
    ///
    /// Returns whether a record matched. A pet without an id matches nothing.
    pub fn update(&mut self, pet: &Pet) -> Result<bool> {
        let Some(id) = pet.id else {
            return Ok(false);
        };
        if let Some(updated) =
            self.try_primary("update", |conn| queries::update_pet(conn, id, pet))
        {
            return Ok(updated);
        }
        self.backup.update(id, pet)
    }

    pub fn delete(&mut self, id: i64) -> Result<bool> {
        if let Some(deleted) = self.try_primary("delete", |conn| queries::delete_pet(conn, id)) {
            return Ok(deleted);
        }
        self.backup.delete(id)
    }

    /// Pets whose name matches exactly, ascending by id.
    pub fn search_by_name(&mut self, name: &str) -> Vec<Pet> {
        if let Some(found) =
            self.try_primary("search_by_name", |conn| queries::find_pets_by_name(conn, name))
        {
            return found;
        }
        self.backup.find_by_name(name)
    }
}
