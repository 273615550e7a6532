use std::path::PathBuf;

use crate::config::Settings;
use crate::db::{ConnectionProvider, SqliteConnectionProvider};
use crate::error::Result;
use crate::models::{Pet, PetInput};
use crate::repository::{BackendMode, PetRepository};

/// Entry points for front ends. Validates input and delegates storage to the
/// repository; the active backend is never visible in the results.
pub struct PetService<P: ConnectionProvider> {
    repo: PetRepository<P>,
}

impl PetService<SqliteConnectionProvider> {
    /// Build a service from process settings, probing the configured database.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = SqliteConnectionProvider::from_settings(settings);
        let repo = PetRepository::open(provider, settings.backup_file.clone())?;
        Ok(Self::new(repo))
    }

    /// Build a service that only uses the backup file.
    pub fn offline(backup_file: impl Into<PathBuf>) -> Result<Self> {
        let repo =
            PetRepository::fallback_only(SqliteConnectionProvider::default(), backup_file)?;
        Ok(Self::new(repo))
    }
}

impl<P: ConnectionProvider> PetService<P> {
    pub fn new(repo: PetRepository<P>) -> Self {
        Self { repo }
    }

    pub fn backend_mode(&self) -> BackendMode {
        self.repo.mode()
    }

    pub fn create_pet(&mut self, input: PetInput) -> Result<Pet> {
        let pet = input.into_pet(None)?;
        self.repo.create(&pet)
    }

    pub fn list_pets(&mut self) -> Vec<Pet> {
        self.repo.get_all()
    }

    pub fn find_by_id(&mut self, id: i64) -> Option<Pet> {
        self.repo.get_by_id(id)
    }

    /// Replace the stored fields of pet `id` with `input`. Returns whether it existed.
    pub fn update_pet(&mut self, id: i64, input: PetInput) -> Result<bool> {
        let pet = input.into_pet(Some(id))?;
        self.repo.update(&pet)
    }

    pub fn delete_pet(&mut self, id: i64) -> Result<bool> {
        self.repo.delete(id)
    }

    pub fn search_by_name(&mut self, name: &str) -> Vec<Pet> {
        self.repo.search_by_name(name)
    }
}
