pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use backup::BackupStore;
pub use config::{DbConfig, Settings};
pub use db::{ConnectionProvider, SqliteConnectionProvider};
pub use error::{KennelError, Result};
pub use models::{Pet, PetInput};
pub use repository::{BackendMode, PetRepository};
pub use service::PetService;
