// src/store/schema.rs

//! Schema migration registry for the snapshot store.
//!
//! Migrations are registered in strictly increasing order and applied
//! atomically; the applied version is mirrored to `PRAGMA user_version`.

use rusqlite::Connection;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "
        CREATE TABLE meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            observed_at TEXT NOT NULL
        );

        CREATE TABLE sections (
            section_id TEXT PRIMARY KEY,
            course_title TEXT NOT NULL,
            section_title TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE periods (
            period_id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (section_id) REFERENCES sections(section_id) ON DELETE CASCADE
        );

        CREATE TABLE categories (
            category_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight TEXT,
            PRIMARY KEY (category_id, period_id),
            FOREIGN KEY (period_id) REFERENCES periods(period_id) ON DELETE CASCADE
        );

        CREATE TABLE assignments (
            assignment_id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            title TEXT NOT NULL,
            earned_points TEXT,
            max_points TEXT,
            exception INTEGER NOT NULL DEFAULT 0,
            comment TEXT,
            due_date TEXT,
            FOREIGN KEY (category_id, period_id)
                REFERENCES categories(category_id, period_id) ON DELETE CASCADE
        );

        CREATE INDEX idx_periods_section ON periods(section_id);
        CREATE INDEX idx_categories_period ON categories(period_id);
        CREATE INDEX idx_assignments_category ON assignments(category_id, period_id);
    ",
}];

/// Latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Apply all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();

    if current > latest {
        return Err(AppError::config(format!(
            "store schema version {} is newer than supported {}",
            current, latest
        )));
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}
