// src/fetch/rest.rs

//! REST fetcher decoding the normalized grade document.
//!
//! The upstream wire document mirrors the snapshot tree. Identifiers may
//! arrive as JSON numbers or strings; point values as numbers or decimal
//! strings; exceptions as integer codes 0–3. All of that is normalized
//! here so the rest of the pipeline only ever sees model types.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::{AppError, Result};
use crate::fetch::SnapshotFetcher;
use crate::models::{Assignment, Category, Exception, Period, Section, Snapshot};
use crate::utils::http::create_client;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    #[serde(default)]
    sections: Vec<WireSection>,
}

#[derive(Debug, Deserialize)]
struct WireSection {
    section_id: Value,
    #[serde(default)]
    course_title: String,
    #[serde(default)]
    section_title: String,
    #[serde(default)]
    periods: Vec<WirePeriod>,
}

#[derive(Debug, Deserialize)]
struct WirePeriod {
    period_id: Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    categories: Vec<WireCategory>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    category_id: Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    weight: Option<Value>,
    #[serde(default)]
    assignments: Vec<WireAssignment>,
}

#[derive(Debug, Deserialize)]
struct WireAssignment {
    assignment_id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    grade: Option<Value>,
    #[serde(default)]
    max_points: Option<Value>,
    #[serde(default)]
    exception: i64,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

/// Render a wire identifier (number or string) as an opaque string id.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a wire point value. Unparseable values degrade to `None` with a
/// warning rather than failing the whole snapshot.
fn decimal_opt(value: Option<&Value>) -> Option<Decimal> {
    let value = value?;
    let raw = match value {
        Value::String(s) if s.is_empty() => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    match Decimal::from_str(&raw) {
        Ok(d) => Some(d),
        Err(_) => {
            log::warn!("Could not parse point value: {}", raw);
            None
        }
    }
}

fn parse_due_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn convert(wire: WireSnapshot, timestamp: DateTime<Utc>) -> Snapshot {
    let sections = wire
        .sections
        .into_iter()
        .map(|section| Section {
            section_id: id_string(&section.section_id),
            course_title: section.course_title,
            section_title: section.section_title,
            periods: section
                .periods
                .into_iter()
                .map(|period| Period {
                    period_id: id_string(&period.period_id),
                    name: period.name,
                    categories: period
                        .categories
                        .into_iter()
                        .map(|category| Category {
                            category_id: id_string(&category.category_id),
                            name: category.name,
                            weight: decimal_opt(category.weight.as_ref()),
                            assignments: category
                                .assignments
                                .into_iter()
                                .map(convert_assignment)
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Snapshot::new(timestamp, sections)
}

fn convert_assignment(wire: WireAssignment) -> Assignment {
    let exception = Exception::from_code(wire.exception);
    // exception rows carry no point values upstream
    let (earned, max) = if exception.is_none() {
        (
            decimal_opt(wire.grade.as_ref()),
            decimal_opt(wire.max_points.as_ref()),
        )
    } else {
        (None, decimal_opt(wire.max_points.as_ref()))
    };

    Assignment {
        assignment_id: id_string(&wire.assignment_id),
        title: wire.title,
        earned_points: earned,
        max_points: max,
        exception,
        comment: wire.comment,
        due_date: parse_due_date(wire.due_date.as_deref()),
    }
}

/// Fetcher hitting the remote grade REST endpoint.
pub struct RestFetcher {
    client: reqwest::Client,
    domain: String,
    key: String,
    secret: String,
}

impl RestFetcher {
    /// Build a fetcher from validated API configuration.
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        let key = api.key.clone().unwrap_or_default();
        let secret = api.secret.clone().unwrap_or_default();
        let domain = api.domain.clone().unwrap_or_default();
        if key.is_empty() || secret.is_empty() || domain.is_empty() {
            return Err(AppError::config(
                "REST fetcher requires api.key, api.secret and api.domain",
            ));
        }

        Ok(Self {
            client: create_client(REQUEST_TIMEOUT)?,
            domain,
            key,
            secret,
        })
    }

    fn endpoint(&self) -> String {
        format!("https://{}/v1/users/me/grades", self.domain)
    }
}

#[async_trait]
impl SnapshotFetcher for RestFetcher {
    async fn fetch(&self) -> Result<Snapshot> {
        let url = self.endpoint();
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.key)
            .header("X-Api-Secret", &self.secret)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("HTTP {}", status)));
        }

        let wire: WireSnapshot = response.json().await?;
        let snapshot = convert(wire, Utc::now());
        if let Err(e) = snapshot.validate() {
            return Err(AppError::fetch(self.endpoint(), e));
        }
        log::info!(
            "Fetched snapshot: {} sections, {} assignments",
            snapshot.sections.len(),
            snapshot.assignment_count()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_document_converts() {
        let raw = r#"{
            "sections": [{
                "section_id": 4401,
                "course_title": "Science 7",
                "section_title": "Period 3",
                "periods": [{
                    "period_id": "2026-T2",
                    "name": "T2",
                    "categories": [{
                        "category_id": 12,
                        "name": "Labs",
                        "weight": "25",
                        "assignments": [{
                            "assignment_id": 987654,
                            "title": "Lab Report",
                            "grade": "4.67",
                            "max_points": 8,
                            "exception": 0,
                            "comment": "",
                            "due_date": "2026-03-15T15:00:00Z"
                        }]
                    }]
                }]
            }]
        }"#;

        let wire: WireSnapshot = serde_json::from_str(raw).unwrap();
        let snapshot = convert(wire, Utc::now());

        let section = &snapshot.sections[0];
        assert_eq!(section.section_id, "4401");
        assert_eq!(section.full_name(), "Science 7: Period 3");

        let category = &section.periods[0].categories[0];
        assert_eq!(category.category_id, "12");
        assert_eq!(category.weight, Some(Decimal::from_str("25").unwrap()));

        let assignment = &category.assignments[0];
        assert_eq!(assignment.assignment_id, "987654");
        assert_eq!(
            assignment.earned_points,
            Some(Decimal::from_str("4.67").unwrap())
        );
        assert_eq!(assignment.max_points, Some(Decimal::from_str("8").unwrap()));
        assert!(assignment.is_graded());
        assert!(assignment.due_date.is_some());
    }

    #[test]
    fn test_exception_code_clears_earned_points() {
        let raw = r#"{
            "assignment_id": "1",
            "title": "Quiz",
            "grade": "5",
            "max_points": "10",
            "exception": 3
        }"#;
        let wire: WireAssignment = serde_json::from_str(raw).unwrap();
        let assignment = convert_assignment(wire);

        assert_eq!(assignment.exception, Exception::Missing);
        assert_eq!(assignment.earned_points, None);
        assert_eq!(
            assignment.max_points,
            Some(Decimal::from_str("10").unwrap())
        );
        assert!(assignment.is_graded());
    }

    #[test]
    fn test_unparseable_grade_degrades_to_ungraded() {
        let raw = r#"{
            "assignment_id": "1",
            "title": "Quiz",
            "grade": "A+",
            "max_points": "10",
            "exception": 0
        }"#;
        let wire: WireAssignment = serde_json::from_str(raw).unwrap();
        let assignment = convert_assignment(wire);
        assert_eq!(assignment.earned_points, None);
        assert!(!assignment.is_graded());
    }

    #[test]
    fn test_due_date_formats() {
        assert!(parse_due_date(Some("2026-03-15T15:00:00Z")).is_some());
        assert!(parse_due_date(Some("2026-03-15 15:00:00")).is_some());
        assert!(parse_due_date(Some("")).is_none());
        assert!(parse_due_date(Some("next week")).is_none());
        assert!(parse_due_date(None).is_none());
    }

    #[test]
    fn test_fetcher_requires_full_credentials() {
        let api = ApiConfig {
            key: Some("k".to_string()),
            secret: None,
            domain: Some("grades.example.edu".to_string()),
        };
        assert!(RestFetcher::from_config(&api).is_err());
    }
}
