// src/pipeline/diff.rs

//! ID-based change detection against the snapshot store.
//!
//! Every comparison goes through stable upstream identifiers; there is no
//! structural diffing. Formatting drift ("5" vs "5.00", "" vs "No comment")
//! carries no diff signal.
//!
//! Error semantics are deliberately fail-safe: if anything goes wrong while
//! reading previous state, the detector returns an empty initial report so
//! the orchestrator persists the snapshot without emitting spurious
//! notifications.

use crate::error::Result;
use crate::models::{Assignment, Change, ChangeCounts, ChangeReport, ChangeType, Snapshot};
use crate::store::SnapshotStore;

/// Computes a [`ChangeReport`] from the stored state and a new snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect changes in `snapshot` relative to the store.
    ///
    /// Never fails: internal errors degrade to the empty initial report.
    pub fn detect(&self, store: &SnapshotStore, snapshot: &Snapshot) -> ChangeReport {
        match self.try_detect(store, snapshot) {
            Ok(report) => report,
            Err(e) => {
                log::error!("Change detection failed, treating as initial capture: {}", e);
                ChangeReport::initial(snapshot.timestamp)
            }
        }
    }

    fn try_detect(&self, store: &SnapshotStore, snapshot: &Snapshot) -> Result<ChangeReport> {
        if store.latest_timestamp()?.is_none() {
            log::info!("No previous data found - treating as initial capture");
            return Ok(ChangeReport::initial(snapshot.timestamp));
        }

        let mut changes = Vec::new();
        let mut counts = ChangeCounts::default();

        for (section, period, category, new) in sorted_assignments(snapshot) {
            if !new.is_graded() {
                continue;
            }

            let old = store.get_assignment(&new.assignment_id)?;
            // A stored but ungraded row is no prior *graded* state: its
            // transition to graded reads as a new assignment.
            let old = old.filter(|stored| stored.assignment.is_graded());

            // point values ride along only where the summary line shows a
            // point grade
            let mut old_points = (None, None);
            let mut new_points = (None, None);
            let (change_type, old_value, new_value) = match &old {
                None => {
                    counts.new_assignments += 1;
                    new_points = (new.earned_points, new.max_points);
                    (
                        ChangeType::NewAssignment,
                        "—".to_string(),
                        new.grade_display(),
                    )
                }
                Some(stored) => {
                    let old = &stored.assignment;
                    if old.exception != new.exception {
                        counts.grade_updates += 1;
                        (
                            ChangeType::ExceptionUpdated,
                            old.exception.label().to_string(),
                            new.exception.label().to_string(),
                        )
                    } else if !old.grade_equal(new) {
                        counts.grade_updates += 1;
                        old_points = (old.earned_points, old.max_points);
                        new_points = (new.earned_points, new.max_points);
                        (
                            ChangeType::GradeUpdated,
                            old.grade_display(),
                            new.grade_display(),
                        )
                    } else if old.comment_change_substantive(new) {
                        counts.comment_updates += 1;
                        (
                            ChangeType::CommentUpdated,
                            old.comment.clone().unwrap_or_default(),
                            new.comment.clone().unwrap_or_default(),
                        )
                    } else {
                        continue;
                    }
                }
            };

            changes.push(Change {
                change_type,
                section_title: section.full_name(),
                period_name: period.name.clone(),
                category_name: category.name.clone(),
                assignment_title: new.title.clone(),
                assignment_id: new.assignment_id.clone(),
                old: old_value,
                new: new_value,
                old_earned: old_points.0,
                old_max: old_points.1,
                new_earned: new_points.0,
                new_max: new_points.1,
            });
        }

        Ok(ChangeReport {
            timestamp: snapshot.timestamp,
            changes,
            counts,
            is_initial: false,
        })
    }
}

/// All assignments in deterministic traversal order: section, period,
/// category, assignment, each level sorted by identifier. This fixes the
/// order of the change list for any given pair of snapshots.
fn sorted_assignments(
    snapshot: &Snapshot,
) -> Vec<(
    &crate::models::Section,
    &crate::models::Period,
    &crate::models::Category,
    &Assignment,
)> {
    let mut sections: Vec<_> = snapshot.sections.iter().collect();
    sections.sort_by(|a, b| a.section_id.cmp(&b.section_id));

    let mut out = Vec::new();
    for section in sections {
        let mut periods: Vec<_> = section.periods.iter().collect();
        periods.sort_by(|a, b| a.period_id.cmp(&b.period_id));
        for period in periods {
            let mut categories: Vec<_> = period.categories.iter().collect();
            categories.sort_by(|a, b| a.category_id.cmp(&b.category_id));
            for category in categories {
                let mut assignments: Vec<_> = category.assignments.iter().collect();
                assignments.sort_by(|a, b| a.assignment_id.cmp(&b.assignment_id));
                for assignment in assignments {
                    out.push((section, period, category, assignment));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Exception, Period, Section};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn assignment(id: &str, earned: Option<&str>, max: Option<&str>) -> Assignment {
        Assignment {
            assignment_id: id.to_string(),
            title: format!("Assignment {}", id),
            earned_points: earned.map(dec),
            max_points: max.map(dec),
            exception: Exception::None,
            comment: None,
            due_date: None,
        }
    }

    fn snapshot_at(minute: u32, assignments: Vec<Assignment>) -> Snapshot {
        Snapshot {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 21, minute, 0).unwrap(),
            sections: vec![Section {
                section_id: "s1".to_string(),
                course_title: "Math 7".to_string(),
                section_title: String::new(),
                periods: vec![Period {
                    period_id: "p1".to_string(),
                    name: "T1".to_string(),
                    categories: vec![Category {
                        category_id: "c1".to_string(),
                        name: "Homework".to_string(),
                        weight: None,
                        assignments,
                    }],
                }],
            }],
        }
    }

    fn store_with(snapshot: &Snapshot) -> SnapshotStore {
        let mut store = SnapshotStore::open_in_memory().unwrap();
        store.replace_all(snapshot).unwrap();
        store
    }

    #[test]
    fn test_initial_run_reports_no_changes() {
        // seed scenario 1
        let store = SnapshotStore::open_in_memory().unwrap();
        let snapshot = snapshot_at(0, vec![assignment("100", Some("5"), Some("5"))]);

        let report = ChangeDetector::new().detect(&store, &snapshot);
        assert!(report.is_initial);
        assert!(report.changes.is_empty());
        assert_eq!(report.counts.total(), 0);
    }

    #[test]
    fn test_identical_snapshot_is_silent() {
        // seed scenario 2
        let previous = snapshot_at(0, vec![assignment("100", Some("5"), Some("5"))]);
        let store = store_with(&previous);

        let resubmitted = snapshot_at(30, vec![assignment("100", Some("5"), Some("5"))]);
        let report = ChangeDetector::new().detect(&store, &resubmitted);

        assert!(!report.is_initial);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn test_grade_change_detected() {
        // seed scenario 3
        let store = store_with(&snapshot_at(0, vec![assignment("100", Some("5"), Some("5"))]));
        let snapshot = snapshot_at(30, vec![assignment("100", Some("4"), Some("5"))]);

        let report = ChangeDetector::new().detect(&store, &snapshot);
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.counts.grade_updates, 1);

        let change = &report.changes[0];
        assert_eq!(change.change_type, ChangeType::GradeUpdated);
        assert_eq!(change.old, "5 / 5");
        assert_eq!(change.new, "4 / 5");
        assert!(report.summary().contains("1 grade update(s)"));
    }

    #[test]
    fn test_new_graded_assignment_detected() {
        // seed scenario 4
        let store = store_with(&snapshot_at(0, vec![assignment("100", Some("5"), Some("5"))]));
        let snapshot = snapshot_at(
            30,
            vec![
                assignment("100", Some("5"), Some("5")),
                assignment("200", Some("10"), Some("10")),
            ],
        );

        let report = ChangeDetector::new().detect(&store, &snapshot);
        assert_eq!(report.counts.new_assignments, 1);
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].change_type, ChangeType::NewAssignment);
        assert_eq!(report.changes[0].assignment_id, "200");
        assert_eq!(report.changes[0].old, "—");
    }

    #[test]
    fn test_formatting_drift_is_silent() {
        // seed scenario 5
        let mut stored = assignment("100", Some("5"), Some("5"));
        stored.comment = Some("".to_string());
        let store = store_with(&snapshot_at(0, vec![stored]));

        let mut drifted = assignment("100", Some("5.00"), Some("5.0"));
        drifted.comment = Some("No comment".to_string());
        let report = ChangeDetector::new().detect(&store, &snapshot_at(30, vec![drifted]));

        assert!(report.changes.is_empty());
        assert_eq!(report.counts.total(), 0);
    }

    #[test]
    fn test_ungraded_to_exception_is_new_assignment() {
        // seed scenario 6: stored row existed but was never graded
        let store = store_with(&snapshot_at(0, vec![assignment("100", None, Some("10"))]));

        let mut now_missing = assignment("100", None, Some("10"));
        now_missing.exception = Exception::Missing;
        let report = ChangeDetector::new().detect(&store, &snapshot_at(30, vec![now_missing]));

        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].change_type, ChangeType::NewAssignment);
        assert_eq!(report.changes[0].new, "missing");
        assert_eq!(report.counts.new_assignments, 1);
    }

    #[test]
    fn test_exception_transition_detected() {
        let mut graded = assignment("100", Some("0"), Some("10"));
        graded.exception = Exception::None;
        let store = store_with(&snapshot_at(0, vec![graded]));

        let mut excused = assignment("100", Some("0"), Some("10"));
        excused.exception = Exception::Excused;
        let report = ChangeDetector::new().detect(&store, &snapshot_at(30, vec![excused]));

        assert_eq!(report.changes.len(), 1);
        let change = &report.changes[0];
        assert_eq!(change.change_type, ChangeType::ExceptionUpdated);
        assert_eq!(change.old, "—");
        assert_eq!(change.new, "excused");
        assert_eq!(report.counts.grade_updates, 1);
    }

    #[test]
    fn test_exception_wins_over_simultaneous_grade_change() {
        let store = store_with(&snapshot_at(0, vec![assignment("100", Some("5"), Some("10"))]));

        let mut both = assignment("100", Some("7"), Some("10"));
        both.exception = Exception::Incomplete;
        let report = ChangeDetector::new().detect(&store, &snapshot_at(30, vec![both]));

        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].change_type, ChangeType::ExceptionUpdated);
    }

    #[test]
    fn test_substantive_comment_change_detected() {
        let mut before = assignment("100", Some("5"), Some("5"));
        before.comment = Some("Good work".to_string());
        let store = store_with(&snapshot_at(0, vec![before]));

        let mut after = assignment("100", Some("5"), Some("5"));
        after.comment = Some("Great work".to_string());
        let report = ChangeDetector::new().detect(&store, &snapshot_at(30, vec![after]));

        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].change_type, ChangeType::CommentUpdated);
        assert_eq!(report.counts.comment_updates, 1);
    }

    #[test]
    fn test_comment_added_from_empty_is_silent() {
        let store = store_with(&snapshot_at(0, vec![assignment("100", Some("5"), Some("5"))]));

        let mut after = assignment("100", Some("5"), Some("5"));
        after.comment = Some("New comment".to_string());
        let report = ChangeDetector::new().detect(&store, &snapshot_at(30, vec![after]));

        assert!(report.changes.is_empty());
    }

    #[test]
    fn test_ungraded_assignments_are_skipped() {
        let store = store_with(&snapshot_at(0, vec![assignment("100", Some("5"), Some("5"))]));
        let snapshot = snapshot_at(
            30,
            vec![
                assignment("100", Some("5"), Some("5")),
                assignment("200", None, None),
                assignment("300", Some("5"), Some("0")),
            ],
        );

        let report = ChangeDetector::new().detect(&store, &snapshot);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn test_deletions_are_silent() {
        let store = store_with(&snapshot_at(
            0,
            vec![
                assignment("100", Some("5"), Some("5")),
                assignment("200", Some("3"), Some("4")),
            ],
        ));

        let report = ChangeDetector::new().detect(
            &store,
            &snapshot_at(30, vec![assignment("100", Some("5"), Some("5"))]),
        );
        assert!(report.changes.is_empty());
    }

    #[test]
    fn test_change_order_is_deterministic() {
        let store = store_with(&snapshot_at(0, vec![assignment("500", Some("1"), Some("1"))]));

        // presented out of order; report must sort by assignment id
        let snapshot = snapshot_at(
            30,
            vec![
                assignment("500", Some("1"), Some("1")),
                assignment("300", Some("9"), Some("10")),
                assignment("100", Some("8"), Some("10")),
            ],
        );

        let first = ChangeDetector::new().detect(&store, &snapshot);
        let ids: Vec<_> = first.changes.iter().map(|c| c.assignment_id.clone()).collect();
        assert_eq!(ids, vec!["100", "300"]);

        let second = ChangeDetector::new().detect(&store, &snapshot);
        assert_eq!(first.changes, second.changes);
    }
}
