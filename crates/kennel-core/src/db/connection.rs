use rusqlite::{Connection, OpenFlags};

use crate::config::{DbConfig, Settings};
use crate::error::{KennelError, Result};

/// Source of connections to the relational backend.
///
/// Called once per operation. The caller owns the returned connection and it is
/// closed when dropped.
pub trait ConnectionProvider {
    fn get_connection(&self) -> Result<Connection>;
}

/// Opens the SQLite database named by the configured data source name.
///
/// The database must already exist: a missing file is reported as a rejected
/// connection rather than silently created, so an unreachable backend is
/// detectable. Connections never touch the schema; use
/// [`SqliteConnectionProvider::initialize`] to create the database and its tables.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnectionProvider {
    user: Option<String>,
    password: Option<String>,
    dsn: Option<String>,
}

impl SqliteConnectionProvider {
    pub fn new(config: DbConfig) -> Self {
        Self {
            user: Some(config.user),
            password: Some(config.password),
            dsn: Some(config.dsn),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            user: settings.db_user.clone(),
            password: settings.db_password.clone(),
            dsn: settings.db_dsn.clone(),
        }
    }

    fn config(&self) -> Result<DbConfig> {
        DbConfig::from_parts(self.user.clone(), self.password.clone(), self.dsn.clone())
    }

    /// Create the database file if needed and make sure the schema exists.
    pub fn initialize(&self) -> Result<()> {
        let config = self.config()?;
        let conn =
            Connection::open_with_flags(&config.dsn, open_flags() | OpenFlags::SQLITE_OPEN_CREATE)
                .map_err(|e| KennelError::Connection(format!("{}: {}", config.dsn, e)))?;
        crate::db::schema::create_tables(&conn)?;
        log::info!("Initialized database at {}", config.dsn);
        Ok(())
    }
}

impl ConnectionProvider for SqliteConnectionProvider {
    fn get_connection(&self) -> Result<Connection> {
        let config = self.config()?;

        let conn = Connection::open_with_flags(&config.dsn, open_flags())
            .map_err(|e| KennelError::Connection(format!("{}: {}", config.dsn, e)))?;

        // Opening is lazy; force a read so a bad file is rejected here.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| KennelError::Connection(format!("{}: {}", config.dsn, e)))?;

        log::debug!("Opened connection to {} as {}", config.dsn, config.user);
        Ok(conn)
    }
}

fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
}
