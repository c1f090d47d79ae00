// src/fetch/mod.rs

//! Snapshot acquisition boundary.
//!
//! The pipeline consumes snapshots through [`SnapshotFetcher`] only; how
//! they are obtained (REST API, fixtures in tests) is the fetcher's
//! business.

pub mod rest;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Snapshot;

pub use rest::RestFetcher;

/// Source of fully built grade snapshots.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch one complete snapshot. Transient and permanent failures are
    /// indistinguishable at this boundary; the orchestrator retries both.
    async fn fetch(&self) -> Result<Snapshot>;
}
