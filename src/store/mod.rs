// src/store/mod.rs

//! Durable, ID-keyed storage of the current grade snapshot.
//!
//! The store holds exactly one logical snapshot: five tables mirroring the
//! data model plus a single-row `meta` table carrying the observation
//! timestamp. `replace_all` swaps the entire snapshot inside one
//! transaction, so readers observe either the old state or the new one,
//! never a mix.
//!
//! Decimal columns are TEXT with the upstream representation preserved, so
//! any value the source produces round-trips exactly.
//!
//! Single-writer: the store is mutated from one pipeline cycle at a time.
//! Running two processes against the same file is undefined; the busy
//! timeout only covers transient reader contention.

mod schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::models::{Assignment, Exception, Snapshot};

/// A stored assignment together with its parent keys.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAssignment {
    pub assignment: Assignment,
    pub category_id: String,
    pub period_id: String,
}

/// A stored category row, excluding its assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCategory {
    pub category_id: String,
    pub period_id: String,
    pub name: String,
    pub weight: Option<Decimal>,
}

/// SQLite-backed snapshot store.
pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    /// Open (or create) the store at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::apply_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory store (test support).
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Observation timestamp of the current snapshot, if any.
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT observed_at FROM meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        raw.map(|s| parse_timestamp(&s)).transpose()
    }

    /// Look up a stored assignment by its upstream identifier.
    pub fn get_assignment(&self, assignment_id: &str) -> Result<Option<StoredAssignment>> {
        self.conn
            .query_row(
                "SELECT assignment_id, category_id, period_id, title, earned_points,
                        max_points, exception, comment, due_date
                 FROM assignments WHERE assignment_id = ?1",
                [assignment_id],
                row_to_assignment,
            )
            .optional()?
            .transpose()
    }

    /// Look up a stored category by its compound key.
    pub fn get_category(&self, category_id: &str, period_id: &str) -> Result<Option<StoredCategory>> {
        let row = self
            .conn
            .query_row(
                "SELECT category_id, period_id, name, weight
                 FROM categories WHERE category_id = ?1 AND period_id = ?2",
                [category_id, period_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(category_id, period_id, name, weight)| {
            Ok(StoredCategory {
                category_id,
                period_id,
                name,
                weight: weight.as_deref().map(parse_decimal).transpose()?,
            })
        })
        .transpose()
    }

    /// All stored assignments, ordered by assignment identifier.
    pub fn all_assignments(&self) -> Result<Vec<StoredAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT assignment_id, category_id, period_id, title, earned_points,
                    max_points, exception, comment, due_date
             FROM assignments ORDER BY assignment_id",
        )?;

        let rows = stmt.query_map([], row_to_assignment)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Replace the entire stored snapshot atomically.
    ///
    /// Either the full new snapshot is visible after return, or the old
    /// one remains untouched. Assignments absent from the new snapshot
    /// are dropped without ceremony.
    pub fn replace_all(&mut self, snapshot: &Snapshot) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM assignments", [])?;
        tx.execute("DELETE FROM categories", [])?;
        tx.execute("DELETE FROM periods", [])?;
        tx.execute("DELETE FROM sections", [])?;

        for section in &snapshot.sections {
            tx.execute(
                "INSERT INTO sections (section_id, course_title, section_title)
                 VALUES (?1, ?2, ?3)",
                params![section.section_id, section.course_title, section.section_title],
            )?;

            for period in &section.periods {
                tx.execute(
                    "INSERT INTO periods (period_id, section_id, name) VALUES (?1, ?2, ?3)",
                    params![period.period_id, section.section_id, period.name],
                )?;

                for category in &period.categories {
                    tx.execute(
                        "INSERT INTO categories (category_id, period_id, name, weight)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            category.category_id,
                            period.period_id,
                            category.name,
                            category.weight.map(|w| w.to_string()),
                        ],
                    )?;

                    for assignment in &category.assignments {
                        tx.execute(
                            "INSERT INTO assignments
                             (assignment_id, category_id, period_id, title, earned_points,
                              max_points, exception, comment, due_date)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                            params![
                                assignment.assignment_id,
                                category.category_id,
                                period.period_id,
                                assignment.title,
                                assignment.earned_points.map(|p| p.to_string()),
                                assignment.max_points.map(|p| p.to_string()),
                                assignment.exception.code(),
                                assignment.comment,
                                assignment.due_date.map(|d| d.to_rfc3339()),
                            ],
                        )?;
                    }
                }
            }
        }

        tx.execute(
            "INSERT INTO meta (id, observed_at) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET observed_at = excluded.observed_at",
            [snapshot.timestamp.to_rfc3339()],
        )?;

        tx.commit()?;
        log::debug!(
            "Persisted snapshot at {} ({} sections, {} assignments)",
            snapshot.timestamp,
            snapshot.sections.len(),
            snapshot.assignment_count()
        );
        Ok(())
    }

    /// Wipe every row including the meta record (test support).
    pub fn clear_all(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM assignments", [])?;
        tx.execute("DELETE FROM categories", [])?;
        tx.execute("DELETE FROM periods", [])?;
        tx.execute("DELETE FROM sections", [])?;
        tx.execute("DELETE FROM meta", [])?;
        tx.commit()?;
        Ok(())
    }
}

type SqlResult<T> = std::result::Result<T, rusqlite::Error>;

/// Decode an assignment row. Field parse failures surface as `Result`
/// errors from the outer call, not panics.
fn row_to_assignment(row: &Row<'_>) -> SqlResult<Result<StoredAssignment>> {
    let assignment_id: String = row.get(0)?;
    let category_id: String = row.get(1)?;
    let period_id: String = row.get(2)?;
    let title: String = row.get(3)?;
    let earned: Option<String> = row.get(4)?;
    let max: Option<String> = row.get(5)?;
    let exception: i64 = row.get(6)?;
    let comment: Option<String> = row.get(7)?;
    let due_date: Option<String> = row.get(8)?;

    Ok(decode_assignment(
        assignment_id,
        category_id,
        period_id,
        title,
        earned,
        max,
        exception,
        comment,
        due_date,
    ))
}

#[allow(clippy::too_many_arguments)]
fn decode_assignment(
    assignment_id: String,
    category_id: String,
    period_id: String,
    title: String,
    earned: Option<String>,
    max: Option<String>,
    exception: i64,
    comment: Option<String>,
    due_date: Option<String>,
) -> Result<StoredAssignment> {
    Ok(StoredAssignment {
        assignment: Assignment {
            assignment_id,
            title,
            earned_points: earned.as_deref().map(parse_decimal).transpose()?,
            max_points: max.as_deref().map(parse_decimal).transpose()?,
            exception: Exception::from_code(exception),
            comment,
            due_date: due_date.as_deref().map(parse_timestamp).transpose()?,
        },
        category_id,
        period_id,
    })
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| AppError::validation(format!("stored decimal '{}' is corrupt: {}", raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::validation(format!("stored timestamp '{}' is corrupt: {}", raw, e)))
}
