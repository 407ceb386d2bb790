use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

/// Schema steps in apply order. Names are recorded in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0001_init.sql"
        )),
    ),
    (
        "0002_feedback.sql",
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0002_feedback.sql"
        )),
    ),
];

fn sql_err(
    code: &'static str,
    message: impl Into<String>,
) -> impl FnOnce(rusqlite::Error) -> AppError {
    let message = message.into();
    move |e| AppError::new(code, message).with_details(e.to_string())
}

/// Open (creating parent directories as needed) the SQLite database at `path`.
pub fn open(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::new("DB_OPEN_FAILED", "Failed to create database directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }
    Connection::open(path).map_err(sql_err("DB_OPEN_FAILED", "Failed to open SQLite database"))
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory()
        .map_err(sql_err("DB_OPEN_FAILED", "Failed to open in-memory SQLite database"))
}

pub fn open_and_migrate(path: &Path) -> Result<Connection, AppError> {
    let mut conn = open(path)?;
    migrate(&mut conn)?;
    Ok(conn)
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let mut stmt = conn
        .prepare("SELECT name FROM _migrations")
        .map_err(sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to query applied migrations"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<HashSet<_>, _>>())
        .map_err(sql_err("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migrations"))?;
    Ok(names)
}

/// Applies every pending migration, each in its own transaction.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS _migrations (
           name TEXT PRIMARY KEY NOT NULL,
           applied_at TEXT NOT NULL
         );",
    )
    .map_err(sql_err("DB_MIGRATIONS_TABLE_FAILED", "Failed to prepare migrations table"))?;

    let applied = applied_migrations(conn)?;
    let pending = MIGRATIONS.iter().filter(|(name, _)| !applied.contains(*name));

    for &(name, sql) in pending {
        let tx = conn
            .transaction()
            .map_err(sql_err("DB_TX_FAILED", "Failed to begin migration"))?;
        tx.execute_batch(sql)
            .map_err(sql_err("DB_MIGRATION_FAILED", format!("Migration {name} failed")))?;
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(sql_err("DB_MIGRATION_FAILED", format!("Could not record {name}")))?;
        tx.commit()
            .map_err(sql_err("DB_TX_FAILED", "Failed to commit migration"))?;
        tracing::debug!(migration = name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
            .unwrap();
        let name: Option<String> = stmt.query_row([table], |row| row.get(0)).optional().unwrap();
        name.as_deref() == Some(table)
    }

    #[test]
    fn migrations_create_expected_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        for table in ["decisions", "audit_logs", "feedback", "_migrations"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");
        migrate(&mut conn).expect("migrate again");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn migrate_skips_recorded_names() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");
        let applied = applied_migrations(&conn).expect("applied");
        let expected: HashSet<String> = MIGRATIONS.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(applied, expected);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("bda.sqlite");
        let mut conn = open(&path).expect("open");
        migrate(&mut conn).expect("migrate");
        assert!(path.exists());
    }
}
