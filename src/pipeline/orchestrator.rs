// src/pipeline/orchestrator.rs

//! One pipeline cycle: fetch → diff → notify → journal → persist → health.
//!
//! Partial-failure policy: a failed notification or journal write never
//! stops the cycle; a failed persist is logged and the cycle continues,
//! accepting that the next cycle will re-diff against the old state and
//! re-emit identical changes. Persist runs strictly last among
//! state-mutating steps.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::SnapshotFetcher;
use crate::health::HealthPinger;
use crate::models::{ChangeReport, Snapshot};
use crate::notify::{NotificationManager, NotificationMessage, Priority};
use crate::pipeline::diff::ChangeDetector;
use crate::pipeline::journal::{ChangeJournal, JournalRecord};
use crate::store::SnapshotStore;

/// Result of one pipeline cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    OkNoChanges,
    OkChanges,
    FetchFailed,
    PersistFailed,
    /// Fetch and persist succeeded but notification or journal reported
    /// at least one failure.
    Partial,
}

impl CycleOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CycleOutcome::OkNoChanges | CycleOutcome::OkChanges)
    }
}

/// Drives the full monitoring cycle against its owned resources.
pub struct GradePipeline {
    fetcher: Box<dyn SnapshotFetcher>,
    store: SnapshotStore,
    detector: ChangeDetector,
    journal: ChangeJournal,
    notifier: NotificationManager,
    health: HealthPinger,
    max_attempts: u32,
    retry_delay: Duration,
}

impl GradePipeline {
    /// Wire the pipeline from configuration plus a snapshot fetcher.
    pub fn from_config(config: &Config, fetcher: Box<dyn SnapshotFetcher>) -> Result<Self> {
        let store = SnapshotStore::open(
            &config.storage.path,
            Duration::from_millis(config.storage.timeout_ms),
        )?;
        let journal = ChangeJournal::open(&config.journal.path, config.journal.retention_days)?;
        let notifier = NotificationManager::from_config(&config.notifications);
        let health = HealthPinger::from_config(&config.healthcheck);

        Ok(Self::new(
            fetcher,
            store,
            journal,
            notifier,
            health,
            config.retry.max_attempts,
            Duration::from_millis(config.retry.delay_ms),
        ))
    }

    /// Assemble a pipeline from explicit parts.
    pub fn new(
        fetcher: Box<dyn SnapshotFetcher>,
        store: SnapshotStore,
        journal: ChangeJournal,
        notifier: NotificationManager,
        health: HealthPinger,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            detector: ChangeDetector::new(),
            journal,
            notifier,
            health,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn journal(&self) -> &ChangeJournal {
        &self.journal
    }

    /// Execute one full cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        log::info!("Starting grade monitoring cycle");

        // Step 1: fetch
        let snapshot = match self.fetch_with_retries().await {
            Some(snapshot) => snapshot,
            None => {
                self.handle_fetch_failure().await;
                self.health.ping(false).await;
                return CycleOutcome::FetchFailed;
            }
        };

        // Step 2: diff
        let report = self.detector.detect(&self.store, &snapshot);
        log::info!("Change detection complete: {}", report.summary());

        // Step 3: notify (mandatory skip on initial or empty reports)
        let results = if !report.is_initial && report.has_changes() {
            self.send_change_notification(&report).await
        } else {
            BTreeMap::new()
        };
        let notify_failed = results.values().any(|ok| !ok);

        // Step 4: journal (only non-empty reports are recorded)
        let mut journal_failed = false;
        if report.has_changes() {
            let record = JournalRecord::from_report(&report, results);
            if let Err(e) = self.journal.append(&record) {
                log::warn!("Failed to write change journal: {}", e);
                journal_failed = true;
            }
        }

        // Step 5: persist, strictly last among state mutations
        let persist_ok = match self.store.replace_all(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                // next cycle re-diffs against the old state and re-emits
                // the same changes
                log::error!("Failed to persist snapshot: {}", e);
                false
            }
        };

        // Step 6: health hook
        self.health.ping(persist_ok).await;

        if !persist_ok {
            CycleOutcome::PersistFailed
        } else if notify_failed || journal_failed {
            CycleOutcome::Partial
        } else if report.has_changes() {
            CycleOutcome::OkChanges
        } else {
            CycleOutcome::OkNoChanges
        }
    }

    /// Fetch with bounded retries separated by a fixed delay.
    async fn fetch_with_retries(&self) -> Option<Snapshot> {
        for attempt in 1..=self.max_attempts {
            log::info!("Fetch attempt {}/{}", attempt, self.max_attempts);
            match self.fetcher.fetch().await {
                Ok(snapshot) => {
                    log::info!(
                        "Fetch successful: {} sections, {} assignments",
                        snapshot.sections.len(),
                        snapshot.assignment_count()
                    );
                    return Some(snapshot);
                }
                Err(e) => {
                    log::error!("Fetch attempt {} failed: {}", attempt, e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        log::error!("All fetch attempts failed");
        None
    }

    /// Best-effort error notification plus journal error entry.
    async fn handle_fetch_failure(&self) {
        let summary = format!(
            "Failed to fetch grade data after {} attempt(s)",
            self.max_attempts
        );

        if !self.notifier.is_empty() {
            let message = NotificationMessage::new(
                "Pipeline error",
                format!("{}. Check API credentials and network connectivity.", summary),
                Priority::High,
            );
            let results = self.notifier.dispatch(message).await;
            if results.values().any(|ok| !ok) {
                log::warn!("Failed to deliver error notification to every provider");
            }
        }

        if let Err(e) = self.journal.append(&JournalRecord::error(Utc::now(), summary)) {
            log::warn!("Failed to journal fetch failure: {}", e);
        }
    }

    async fn send_change_notification(&self, report: &ChangeReport) -> BTreeMap<String, bool> {
        if self.notifier.is_empty() {
            log::warn!("Changes detected but no notification providers configured");
            return BTreeMap::new();
        }

        let mut message = NotificationMessage::new(
            "Changes detected",
            report.format_for_notification(),
            Priority::Normal,
        );
        message.metadata.insert(
            "new_assignments".to_string(),
            report.counts.new_assignments.to_string(),
        );
        message.metadata.insert(
            "grade_updates".to_string(),
            report.counts.grade_updates.to_string(),
        );
        message.metadata.insert(
            "comment_updates".to_string(),
            report.counts.comment_updates.to_string(),
        );

        self.notifier.dispatch(message).await
    }
}
