use rusqlite::Connection;

use crate::error::Result;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            species TEXT,
            breed TEXT,
            age INTEGER,
            weight REAL,
            intake_date TEXT,
            notes TEXT
        );
        ",
    )?;
    Ok(())
}
