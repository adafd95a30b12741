use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (creating if needed) the register database and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {:?}", path))?;
    setup_database(&conn)?;

    tracing::debug!(path = ?path, "Database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL lets a reader (auto-refresh, API) coexist with the guard's writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Vehicles (authorization store, soft delete through `active`)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vehicles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plate TEXT UNIQUE NOT NULL,
            owner TEXT NOT NULL,
            unit TEXT NOT NULL,
            make TEXT,
            model TEXT,
            color TEXT,
            phone TEXT,
            registered_at TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            notes TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Entries (append-only ledger, plate is not a foreign key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plate TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            guard TEXT NOT NULL,
            category TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vehicles_active ON vehicles(active)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_occurred_at ON entries(occurred_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_plate ON entries(plate)",
        [],
    )?;

    Ok(())
}

/// Row counts per table, used by `vehicle-access status`
pub fn table_counts(conn: &Connection) -> Result<(i64, i64)> {
    let vehicles: i64 = conn.query_row("SELECT COUNT(*) FROM vehicles", [], |row| row.get(0))?;
    let entries: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;

    Ok((vehicles, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        assert_eq!(table_counts(&conn).unwrap(), (0, 0));
    }

    #[test]
    fn test_plate_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let insert = "INSERT INTO vehicles (plate, owner, unit, registered_at)
                      VALUES ('BBBB22', 'Juan', '101', '2026-10-16 08:00:00')";
        conn.execute(insert, []).unwrap();

        match conn.execute(insert, []) {
            Err(rusqlite::Error::SqliteFailure(err, _)) => {
                assert_eq!(err.code, rusqlite::ErrorCode::ConstraintViolation)
            }
            other => panic!("expected constraint violation, got {:?}", other),
        }
    }

    #[test]
    fn test_open_database_creates_file() {
        let dir = std::env::temp_dir().join(format!("vehicle-access-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("register.db");

        let conn = open_database(&path).unwrap();
        assert_eq!(table_counts(&conn).unwrap(), (0, 0));
        assert!(path.exists());

        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
