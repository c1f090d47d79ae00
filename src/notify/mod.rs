// src/notify/mod.rs

//! Notification providers and fan-out.

pub mod gemini;
pub mod manager;
pub mod pushover;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiProvider;
pub use manager::NotificationManager;
pub use pushover::PushoverProvider;

/// Delivery priority of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Standardized notification message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub content: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider-contributed and caller-supplied metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, content: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            priority,
            url: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// A notification transport.
///
/// `send` attempts exactly one delivery and must surface every internal
/// failure as `false`; the manager adds a timeout on top but providers
/// never raise.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Stable short identifier, used for ordering and result maps.
    fn name(&self) -> &'static str;

    /// Whether this provider is configured well enough to attempt sends.
    fn available(&self) -> bool;

    /// Attempt one delivery. Returns success.
    async fn send(&self, message: &NotificationMessage) -> bool;

    /// Optional enrichment capability. At most one enricher runs per
    /// cycle; see [`NotificationManager`].
    fn as_enricher(&self) -> Option<&dyn Enricher> {
        None
    }
}

/// Capability of augmenting a message before the send fan-out.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Return an augmented copy of the message, or `None` on failure.
    /// Failures degrade to the original message.
    async fn enrich(&self, message: &NotificationMessage) -> Option<NotificationMessage>;
}
