// src/models/snapshot.rs

//! Normalized grade snapshot tree with stable identifiers.
//!
//! Every level carries the identifier assigned by the upstream source;
//! the monitor never generates identifiers of its own. Change detection
//! matches assignments across cycles by `assignment_id` alone, so the
//! equality predicates here compare semantic content only and ignore
//! informational fields such as titles and names.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Grade exception status.
///
/// Upstream encodes these as integer codes `0..=3` in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Exception {
    #[default]
    None,
    Excused,
    Incomplete,
    Missing,
}

impl Exception {
    /// Map an upstream integer code to an exception status.
    ///
    /// Unknown codes collapse to `None` so a new upstream code never
    /// produces phantom change events.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Exception::Excused,
            2 => Exception::Incomplete,
            3 => Exception::Missing,
            _ => Exception::None,
        }
    }

    /// The upstream integer code for this status.
    pub fn code(&self) -> i64 {
        match self {
            Exception::None => 0,
            Exception::Excused => 1,
            Exception::Incomplete => 2,
            Exception::Missing => 3,
        }
    }

    /// Display form: the lowercase word, with `None` rendered as an em dash.
    pub fn label(&self) -> &'static str {
        match self {
            Exception::None => "—",
            Exception::Excused => "excused",
            Exception::Incomplete => "incomplete",
            Exception::Missing => "missing",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Exception::None)
    }
}

/// A single assignment with its grade state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    /// Upstream identifier, globally unique within a snapshot.
    pub assignment_id: String,

    /// Assignment title (informational, never diffed)
    pub title: String,

    /// Points earned, exact decimal
    pub earned_points: Option<Decimal>,

    /// Maximum points possible, exact decimal
    pub max_points: Option<Decimal>,

    /// Exception status
    #[serde(default)]
    pub exception: Exception,

    /// Teacher comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Due date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Assignment {
    /// An assignment is graded when it has both earned and positive max
    /// points, or carries any exception. Only graded assignments
    /// participate in change detection.
    pub fn is_graded(&self) -> bool {
        if !self.exception.is_none() {
            return true;
        }
        match (self.earned_points, self.max_points) {
            (Some(_), Some(max)) => max > Decimal::ZERO,
            _ => false,
        }
    }

    /// Numeric equality on points plus exact equality on exception.
    ///
    /// Decimal comparison is by value, so `5.0` equals `5.00`. Titles,
    /// comments and due dates are ignored.
    pub fn grade_equal(&self, other: &Assignment) -> bool {
        self.earned_points == other.earned_points
            && self.max_points == other.max_points
            && self.exception == other.exception
    }

    /// True when both comments normalize to the same text.
    pub fn comment_equivalent(&self, other: &Assignment) -> bool {
        normalize_comment(self.comment.as_deref()) == normalize_comment(other.comment.as_deref())
    }

    /// A comment change is substantive only when both sides normalize to
    /// non-empty text and differ. Adding or clearing a comment is not
    /// substantive.
    pub fn comment_change_substantive(&self, other: &Assignment) -> bool {
        let a = normalize_comment(self.comment.as_deref());
        let b = normalize_comment(other.comment.as_deref());
        !a.is_empty() && !b.is_empty() && a != b
    }

    /// Format the grade for display.
    ///
    /// An exception renders as its word; otherwise `"earned / max"` with
    /// an absent side rendered as `"—"` and trailing zeros stripped.
    pub fn grade_display(&self) -> String {
        if !self.exception.is_none() {
            return self.exception.label().to_string();
        }
        match (self.earned_points, self.max_points) {
            (None, None) => "—".to_string(),
            (earned, max) => format!(
                "{} / {}",
                earned.map_or_else(|| "—".to_string(), format_points),
                max.map_or_else(|| "—".to_string(), format_points)
            ),
        }
    }

    /// Percentage score when both sides are present and max is positive.
    pub fn percentage(&self) -> Option<f64> {
        match (self.earned_points, self.max_points) {
            (Some(earned), Some(max)) if max > Decimal::ZERO => {
                Some(earned.to_f64()? / max.to_f64()? * 100.0)
            }
            _ => None,
        }
    }
}

/// Normalize a comment: lowercase, trim, and map the no-comment sentinels
/// (`""` and `"No comment"`, case-insensitive) to the empty string.
pub fn normalize_comment(comment: Option<&str>) -> String {
    let trimmed = comment.unwrap_or("").trim().to_lowercase();
    if trimmed == "no comment" {
        return String::new();
    }
    trimmed
}

/// Format a point value with trailing zeros stripped (`5.00` → `5`).
pub fn format_points(points: Decimal) -> String {
    points.normalize().to_string()
}

/// A grading category within a period.
///
/// `category_id` is unique only within its period; the compound key
/// `(category_id, period_id)` identifies it across the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub category_id: String,
    pub name: String,
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

/// A grading period within a section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Period {
    pub period_id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// A course section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub section_id: String,
    pub course_title: String,
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub periods: Vec<Period>,
}

impl Section {
    /// Full display name: `"{course}: {section}"`, or just the course
    /// title when the section title is empty.
    pub fn full_name(&self) -> String {
        if self.section_title.is_empty() {
            self.course_title.clone()
        } else {
            format!("{}: {}", self.course_title, self.section_title)
        }
    }
}

/// A complete grade observation at an instant. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// When this snapshot was observed
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>, sections: Vec<Section>) -> Self {
        Self {
            timestamp,
            sections,
        }
    }

    /// Visit every assignment with its parent context, in document order.
    pub fn assignments(&self) -> Vec<(&Section, &Period, &Category, &Assignment)> {
        let mut out = Vec::new();
        for section in &self.sections {
            for period in &section.periods {
                for category in &period.categories {
                    for assignment in &category.assignments {
                        out.push((section, period, category, assignment));
                    }
                }
            }
        }
        out
    }

    /// Total assignment count across all sections.
    pub fn assignment_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| &s.periods)
            .flat_map(|p| &p.categories)
            .map(|c| c.assignments.len())
            .sum()
    }

    /// Check the identifier uniqueness invariants: section and period ids
    /// unique across the snapshot, `(category_id, period_id)` unique, and
    /// assignment ids unique regardless of nesting.
    pub fn validate(&self) -> Result<(), String> {
        let mut section_ids = HashSet::new();
        let mut period_ids = HashSet::new();
        let mut category_keys = HashSet::new();
        let mut assignment_ids = HashSet::new();

        for section in &self.sections {
            if !section_ids.insert(&section.section_id) {
                return Err(format!("duplicate section_id '{}'", section.section_id));
            }
            for period in &section.periods {
                if !period_ids.insert(&period.period_id) {
                    return Err(format!("duplicate period_id '{}'", period.period_id));
                }
                for category in &period.categories {
                    if !category_keys.insert((&category.category_id, &period.period_id)) {
                        return Err(format!(
                            "duplicate category key ('{}', '{}')",
                            category.category_id, period.period_id
                        ));
                    }
                    for assignment in &category.assignments {
                        if !assignment_ids.insert(&assignment.assignment_id) {
                            return Err(format!(
                                "duplicate assignment_id '{}'",
                                assignment.assignment_id
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
