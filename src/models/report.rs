// src/models/report.rs

//! Change report produced by one comparison cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of semantic delta detected for an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    NewAssignment,
    GradeUpdated,
    ExceptionUpdated,
    CommentUpdated,
}

/// A single detected change, with the display path to the assignment and
/// pre-formatted old/new values.
///
/// The raw point values ride along for display enrichment (percentages in
/// summary lines); they carry no diff signal of their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Change {
    pub change_type: ChangeType,
    pub section_title: String,
    pub period_name: String,
    pub category_name: String,
    pub assignment_title: String,
    pub assignment_id: String,
    /// Formatted previous value; `"—"` for new assignments
    pub old: String,
    /// Formatted new value
    pub new: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_earned: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_max: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_earned: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_max: Option<Decimal>,
}

impl Change {
    /// One-line human summary used in notification content. Point grades
    /// get a percentage and letter grade appended.
    pub fn summary(&self) -> String {
        match self.change_type {
            ChangeType::NewAssignment => {
                let grade = with_percentage(&self.new, percentage(self.new_earned, self.new_max));
                format!("New: {} = {}", self.assignment_title, grade)
            }
            ChangeType::GradeUpdated | ChangeType::ExceptionUpdated => {
                let old = with_percentage(&self.old, percentage(self.old_earned, self.old_max));
                let new = with_percentage(&self.new, percentage(self.new_earned, self.new_max));
                format!("{}: {} -> {}", self.assignment_title, old, new)
            }
            ChangeType::CommentUpdated => {
                format!("{}: Comment updated", self.assignment_title)
            }
        }
    }
}

fn percentage(earned: Option<Decimal>, max: Option<Decimal>) -> Option<f64> {
    match (earned, max) {
        (Some(earned), Some(max)) if max > Decimal::ZERO => {
            Some(earned.to_f64()? / max.to_f64()? * 100.0)
        }
        _ => None,
    }
}

fn with_percentage(grade: &str, pct: Option<f64>) -> String {
    match pct {
        Some(pct) => format!("{} ({:.0}% {})", grade, pct, letter_grade(pct)),
        None => grade.to_string(),
    }
}

/// Per-category change counts for one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub new_assignments: usize,
    pub grade_updates: usize,
    pub comment_updates: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.new_assignments + self.grade_updates + self.comment_updates
    }
}

/// Structured result of diffing one snapshot against the stored state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Observation timestamp of the compared snapshot
    pub timestamp: DateTime<Utc>,
    /// Detected changes in deterministic traversal order
    pub changes: Vec<Change>,
    pub counts: ChangeCounts,
    /// True when no prior state existed (or the comparison fail-safed)
    pub is_initial: bool,
}

impl ChangeReport {
    /// The empty report used for the first capture and as the diff
    /// fail-safe: no changes, nothing to notify.
    pub fn initial(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            changes: Vec::new(),
            counts: ChangeCounts::default(),
            is_initial: true,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Summary sentence: `"{n} new, {m} grade update(s), {k} comment
    /// update(s)"` with zero-count terms suppressed.
    pub fn summary(&self) -> String {
        if self.is_initial {
            return "Initial grade data captured".to_string();
        }
        if !self.has_changes() {
            return "No changes detected".to_string();
        }

        let mut parts = Vec::new();
        if self.counts.new_assignments > 0 {
            parts.push(format!("{} new", self.counts.new_assignments));
        }
        if self.counts.grade_updates > 0 {
            parts.push(format!("{} grade update(s)", self.counts.grade_updates));
        }
        if self.counts.comment_updates > 0 {
            parts.push(format!("{} comment update(s)", self.counts.comment_updates));
        }
        parts.join(", ")
    }

    /// Format the report as notification content: the summary sentence
    /// followed by changes grouped section → period → category.
    pub fn format_for_notification(&self) -> String {
        if self.is_initial || !self.has_changes() {
            return self.summary();
        }

        let mut message = format!("{}\n\n", self.summary());

        // Group by path, sorted at every level; changes keep report order.
        let mut tree: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, Vec<&Change>>>> =
            BTreeMap::new();
        for change in &self.changes {
            tree.entry(&change.section_title)
                .or_default()
                .entry(&change.period_name)
                .or_default()
                .entry(&change.category_name)
                .or_default()
                .push(change);
        }

        for (section, periods) in &tree {
            message.push_str(section);
            message.push('\n');
            for (period, categories) in periods {
                message.push_str(&format!("  {}\n", period));
                for (category, changes) in categories {
                    message.push_str(&format!("    {}\n", category));
                    for change in changes {
                        message.push_str(&format!("      {}\n", change.summary()));
                    }
                }
            }
        }

        message
    }
}

/// Convert a percentage to a letter grade on the plus/minus scale.
pub fn letter_grade(pct: f64) -> &'static str {
    const THRESHOLDS: &[(f64, &str)] = &[
        (97.0, "A+"),
        (93.0, "A"),
        (90.0, "A-"),
        (87.0, "B+"),
        (83.0, "B"),
        (80.0, "B-"),
        (77.0, "C+"),
        (73.0, "C"),
        (70.0, "C-"),
        (67.0, "D+"),
        (63.0, "D"),
        (60.0, "D-"),
    ];
    for (cutoff, grade) in THRESHOLDS {
        if pct >= *cutoff {
            return grade;
        }
    }
    "F"
}
