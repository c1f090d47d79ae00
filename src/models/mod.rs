// src/models/mod.rs

//! Data structures for the grade monitor.

pub mod report;
pub mod snapshot;

pub use report::{letter_grade, Change, ChangeCounts, ChangeReport, ChangeType};
pub use snapshot::{
    format_points, normalize_comment, Assignment, Category, Exception, Period, Section, Snapshot,
};
