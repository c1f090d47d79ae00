// src/pipeline/journal.rs

//! Append-only journal of change reports.
//!
//! One JSON record per line. Records are never rewritten; retention
//! pruning drops whole records older than the configured horizon and
//! runs on open, rewriting through a temp file + rename so a crash
//! mid-prune leaves either the old or the new file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Change, ChangeReport};

/// Record category: a change report, or a pipeline error entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Report,
    Error,
}

/// Counts block of a journal record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecordCounts {
    pub new_assignments: usize,
    pub grade_updates: usize,
    pub comment_updates: usize,
    pub total: usize,
}

/// Per-provider delivery outcome attached to a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub sent: bool,
    pub results: BTreeMap<String, bool>,
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    pub is_initial: bool,
    pub summary: String,
    pub counts: RecordCounts,
    pub changes: Vec<Change>,
    pub notification: NotificationOutcome,
}

impl JournalRecord {
    /// Build a record from a change report plus the notification results.
    pub fn from_report(report: &ChangeReport, results: BTreeMap<String, bool>) -> Self {
        Self {
            timestamp: report.timestamp,
            kind: RecordKind::Report,
            is_initial: report.is_initial,
            summary: report.summary(),
            counts: RecordCounts {
                new_assignments: report.counts.new_assignments,
                grade_updates: report.counts.grade_updates,
                comment_updates: report.counts.comment_updates,
                total: report.changes.len(),
            },
            changes: report.changes.clone(),
            notification: NotificationOutcome {
                sent: !results.is_empty(),
                results,
            },
        }
    }

    /// Build an error entry (zero changes, not initial).
    pub fn error(timestamp: DateTime<Utc>, summary: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind: RecordKind::Error,
            is_initial: false,
            summary: summary.into(),
            counts: RecordCounts::default(),
            changes: Vec::new(),
            notification: NotificationOutcome::default(),
        }
    }
}

/// Append-only journal file with time-based retention.
pub struct ChangeJournal {
    path: PathBuf,
    retention_days: u32,
}

impl ChangeJournal {
    /// Open the journal and prune entries older than the retention
    /// horizon. The file itself is created lazily on first append.
    pub fn open(path: impl Into<PathBuf>, retention_days: u32) -> Result<Self> {
        let journal = Self {
            path: path.into(),
            retention_days,
        };
        if let Some(parent) = journal.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        journal.prune()?;
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a JSON line.
    pub fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    /// Drop records older than the retention horizon.
    ///
    /// Idempotent; malformed lines are preserved rather than silently
    /// discarded.
    pub fn prune(&self) -> Result<()> {
        if self.retention_days == 0 || !self.path.exists() {
            return Ok(());
        }

        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let reader = BufReader::new(File::open(&self.path)?);

        let mut kept_lines = Vec::new();
        let mut removed = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(&line) {
                Ok(record) if record.timestamp < cutoff => removed += 1,
                _ => kept_lines.push(line),
            }
        }

        if removed == 0 {
            return Ok(());
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            for line in &kept_lines {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        log::info!(
            "Journal pruned: removed {} old entries, kept {}",
            removed,
            kept_lines.len()
        );
        Ok(())
    }

    /// Read back every record (test and tooling support).
    pub fn read_all(&self) -> Result<Vec<JournalRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str(&line) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeCounts, ChangeType};
    use tempfile::TempDir;

    fn sample_report(timestamp: DateTime<Utc>) -> ChangeReport {
        ChangeReport {
            timestamp,
            changes: vec![Change {
                change_type: ChangeType::GradeUpdated,
                section_title: "Math 7".to_string(),
                period_name: "T1".to_string(),
                category_name: "Homework".to_string(),
                assignment_title: "Quiz 1".to_string(),
                assignment_id: "100".to_string(),
                old: "5 / 5".to_string(),
                new: "4 / 5".to_string(),
                old_earned: None,
                old_max: None,
                new_earned: None,
                new_max: None,
            }],
            counts: ChangeCounts {
                new_assignments: 0,
                grade_updates: 1,
                comment_updates: 0,
            },
            is_initial: false,
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let journal = ChangeJournal::open(tmp.path().join("changes.log"), 90).unwrap();

        let mut results = BTreeMap::new();
        results.insert("pushover".to_string(), true);
        journal
            .append(&JournalRecord::from_report(&sample_report(Utc::now()), results))
            .unwrap();

        let records = journal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Report);
        assert_eq!(records[0].counts.total, 1);
        assert!(records[0].notification.sent);
        assert_eq!(records[0].notification.results.get("pushover"), Some(&true));
    }

    #[test]
    fn test_error_record_shape() {
        let record = JournalRecord::error(Utc::now(), "Failed to fetch grade data");
        assert_eq!(record.kind, RecordKind::Error);
        assert!(!record.is_initial);
        assert_eq!(record.counts.total, 0);
        assert!(record.changes.is_empty());
    }

    #[test]
    fn test_prune_drops_only_old_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("changes.log");

        let journal = ChangeJournal::open(&path, 90).unwrap();
        let old = Utc::now() - Duration::days(120);
        let recent = Utc::now() - Duration::days(5);
        journal
            .append(&JournalRecord::from_report(&sample_report(old), BTreeMap::new()))
            .unwrap();
        journal
            .append(&JournalRecord::from_report(&sample_report(recent), BTreeMap::new()))
            .unwrap();

        // reopening prunes
        let journal = ChangeJournal::open(&path, 90).unwrap();
        let records = journal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, recent);
    }

    #[test]
    fn test_prune_preserves_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("changes.log");

        let journal = ChangeJournal::open(&path, 90).unwrap();
        let old = Utc::now() - Duration::days(120);
        journal
            .append(&JournalRecord::from_report(&sample_report(old), BTreeMap::new()))
            .unwrap();
        std::fs::write(
            &path,
            format!("{}not json\n", std::fs::read_to_string(&path).unwrap()),
        )
        .unwrap();

        let _ = ChangeJournal::open(&path, 90).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("not json"));
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_zero_retention_disables_pruning() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("changes.log");

        let journal = ChangeJournal::open(&path, 0).unwrap();
        let ancient = Utc::now() - Duration::days(1000);
        journal
            .append(&JournalRecord::from_report(&sample_report(ancient), BTreeMap::new()))
            .unwrap();

        let journal = ChangeJournal::open(&path, 0).unwrap();
        assert_eq!(journal.read_all().unwrap().len(), 1);
    }
}
