// src/pipeline/scheduler.rs

//! Wall-clock scheduling for daemon mode.
//!
//! The schedule is a set of HH:MM times interpreted in the process-local
//! time zone. Cycles run strictly sequentially; when a cycle overruns the
//! next scheduled instant, that instant is skipped because the next
//! computation starts from "now".

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};

use crate::error::{AppError, Result};
use crate::pipeline::orchestrator::GradePipeline;

/// Parse a comma-separated HH:MM list. Malformed entries and empty lists
/// are configuration errors.
pub fn parse_times(spec: &str) -> Result<Vec<NaiveTime>> {
    let mut times = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let time = NaiveTime::parse_from_str(part, "%H:%M")
            .map_err(|_| AppError::config(format!("invalid schedule time '{}'", part)))?;
        if !times.contains(&time) {
            times.push(time);
        }
    }
    if times.is_empty() {
        return Err(AppError::config(format!(
            "no valid schedule times in '{}'",
            spec
        )));
    }
    times.sort();
    Ok(times)
}

/// Daemon-mode schedule over a non-empty set of wall-clock times.
#[derive(Debug, Clone)]
pub struct Scheduler {
    times: Vec<NaiveTime>,
}

impl Scheduler {
    pub fn from_spec(spec: &str) -> Result<Self> {
        Ok(Self {
            times: parse_times(spec)?,
        })
    }

    /// The smallest instant `>= now` whose local HH:MM is in the schedule;
    /// if every time today has passed, the smallest time tomorrow.
    pub fn next_from(&self, now: DateTime<Local>) -> DateTime<Local> {
        let mut candidates = Vec::new();
        for time in &self.times {
            for day_offset in 0..3 {
                let date = now.date_naive() + ChronoDuration::days(day_offset);
                // a nonexistent local time (DST gap) falls through to the
                // next day's candidate
                if let Some(candidate) = Local
                    .from_local_datetime(&date.and_time(*time))
                    .earliest()
                {
                    if candidate >= now {
                        candidates.push(candidate);
                        break;
                    }
                }
            }
        }
        candidates
            .into_iter()
            .min()
            .unwrap_or_else(|| now + ChronoDuration::days(1))
    }
}

/// Daemon loop: sleep until the next scheduled instant, run one cycle,
/// repeat. The sleep is interruptible by Ctrl-C; a signal arriving
/// mid-cycle lets the cycle finish and exits before the next sleep.
pub async fn run_daemon(pipeline: &mut GradePipeline, scheduler: &Scheduler) -> Result<()> {
    let mut shutdown = Box::pin(tokio::signal::ctrl_c());

    loop {
        let now = Local::now();
        let next = scheduler.next_from(now);
        let wait = (next - now).to_std().unwrap_or_default();
        log::info!(
            "Next run scheduled for {} (sleeping {}s)",
            next.format("%Y-%m-%d %H:%M:%S"),
            wait.as_secs()
        );

        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    log::error!("Shutdown signal handler failed: {}", e);
                }
                log::info!("Shutdown signal received, exiting scheduler");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {
                let outcome = pipeline.run_cycle().await;
                log::info!("Cycle finished: {:?}", outcome);
            }
        }
    }
}
