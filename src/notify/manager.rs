// src/notify/manager.rs

//! Ordered provider fan-out.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::NotificationsConfig;
use crate::notify::{GeminiProvider, NotificationMessage, NotificationProvider, PushoverProvider};

/// Per-send timeout; a provider that exceeds it is recorded as failed.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Central notification manager owning the active provider set.
///
/// Dispatch runs in two phases: the enricher (if any) first, then the
/// remaining providers sorted by name. One provider's failure never
/// short-circuits the rest, and dispatch itself never fails.
pub struct NotificationManager {
    providers: Vec<Box<dyn NotificationProvider>>,
    send_timeout: Duration,
}

impl NotificationManager {
    /// Build the active set from configuration. Providers whose
    /// configuration is incomplete are never instantiated.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let mut candidates: Vec<Box<dyn NotificationProvider>> = vec![
            Box::new(PushoverProvider::from_config(&config.pushover)),
            Box::new(GeminiProvider::from_config(&config.gemini)),
        ];
        candidates.retain(|p| {
            let available = p.available();
            if available {
                log::info!("Loaded notification provider: {}", p.name());
            } else {
                log::debug!("Notification provider {} is not configured", p.name());
            }
            available
        });
        Self::with_providers(candidates)
    }

    /// Build a manager from an explicit provider set (test support).
    pub fn with_providers(mut providers: Vec<Box<dyn NotificationProvider>>) -> Self {
        providers.sort_by_key(|p| p.name());
        Self {
            providers,
            send_timeout: SEND_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Names of the active providers, in dispatch order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Fan a message out across the active providers.
    ///
    /// The enricher (lexicographically first by name when several claim
    /// the capability) runs first; its output message is used for every
    /// subsequent send. Enrichment failure degrades to the original
    /// message. Returns the per-provider result map.
    pub async fn dispatch(&self, message: NotificationMessage) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        let mut message = message;

        let enricher_name = self
            .providers
            .iter()
            .filter(|p| p.as_enricher().is_some())
            .map(|p| p.name())
            .min();

        if let Some(name) = enricher_name {
            let provider = self
                .providers
                .iter()
                .find(|p| p.name() == name)
                .and_then(|p| p.as_enricher());
            // find above cannot miss: the name came from the same list
            if let Some(enricher) = provider {
                let outcome =
                    tokio::time::timeout(self.send_timeout, enricher.enrich(&message)).await;
                match outcome {
                    Ok(Some(enriched)) => {
                        log::info!("Message enriched by provider {}", name);
                        message = enriched;
                        results.insert(name.to_string(), true);
                    }
                    Ok(None) => {
                        log::warn!("Enrichment by {} failed, sending original message", name);
                        results.insert(name.to_string(), false);
                    }
                    Err(_) => {
                        log::warn!("Enrichment by {} timed out, sending original message", name);
                        results.insert(name.to_string(), false);
                    }
                }
            }
        }

        for provider in &self.providers {
            // Enrichment and send are distinct capabilities; providers
            // that enrich are not sent to.
            if provider.as_enricher().is_some() {
                continue;
            }
            let ok = match tokio::time::timeout(self.send_timeout, provider.send(&message)).await {
                Ok(ok) => ok,
                Err(_) => {
                    log::warn!("Provider {} timed out", provider.name());
                    false
                }
            };
            log::info!(
                "Notification sent via {}: {}",
                provider.name(),
                if ok { "Success" } else { "Failed" }
            );
            results.insert(provider.name().to_string(), ok);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Enricher, Priority};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Test double recording the messages it was asked to send.
    struct FakeProvider {
        name: &'static str,
        succeed: bool,
        seen: Arc<Mutex<Vec<NotificationMessage>>>,
    }

    impl FakeProvider {
        fn new(name: &'static str, succeed: bool) -> (Self, Arc<Mutex<Vec<NotificationMessage>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    succeed,
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    #[async_trait]
    impl NotificationProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        fn available(&self) -> bool {
            true
        }
        async fn send(&self, message: &NotificationMessage) -> bool {
            self.seen.lock().unwrap().push(message.clone());
            self.succeed
        }
    }

    /// Test enricher appending a marker to the content.
    struct FakeEnricher {
        name: &'static str,
        succeed: AtomicBool,
    }

    #[async_trait]
    impl NotificationProvider for FakeEnricher {
        fn name(&self) -> &'static str {
            self.name
        }
        fn available(&self) -> bool {
            true
        }
        async fn send(&self, _message: &NotificationMessage) -> bool {
            unreachable!("enricher must not be sent to")
        }
        fn as_enricher(&self) -> Option<&dyn Enricher> {
            Some(self)
        }
    }

    #[async_trait]
    impl Enricher for FakeEnricher {
        async fn enrich(&self, message: &NotificationMessage) -> Option<NotificationMessage> {
            if !self.succeed.load(Ordering::SeqCst) {
                return None;
            }
            let mut enriched = message.clone();
            enriched.content = format!("{} [enriched]", message.content);
            enriched
                .metadata
                .insert("ai_analysis".to_string(), "summary".to_string());
            Some(enriched)
        }
    }

    fn message() -> NotificationMessage {
        NotificationMessage::new("Changes detected", "1 new", Priority::Normal)
    }

    struct SlowProvider;

    #[async_trait]
    impl NotificationProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn available(&self) -> bool {
            true
        }
        async fn send(&self, _message: &NotificationMessage) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    #[tokio::test]
    async fn test_all_providers_receive_message() {
        let (a, seen_a) = FakeProvider::new("alpha", true);
        let (b, seen_b) = FakeProvider::new("beta", true);
        let manager = NotificationManager::with_providers(vec![Box::new(a), Box::new(b)]);

        let results = manager.dispatch(message()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results["alpha"], true);
        assert_eq!(results["beta"], true);
        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert_eq!(seen_b.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_short_circuit() {
        let (a, _) = FakeProvider::new("alpha", false);
        let (b, seen_b) = FakeProvider::new("beta", true);
        let manager = NotificationManager::with_providers(vec![Box::new(a), Box::new(b)]);

        let results = manager.dispatch(message()).await;
        assert_eq!(results["alpha"], false);
        assert_eq!(results["beta"], true);
        assert_eq!(seen_b.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enriched_message_reaches_other_providers() {
        let (sink, seen) = FakeProvider::new("sink", true);
        let enricher = FakeEnricher {
            name: "ai",
            succeed: AtomicBool::new(true),
        };
        let manager =
            NotificationManager::with_providers(vec![Box::new(sink), Box::new(enricher)]);

        let results = manager.dispatch(message()).await;
        assert_eq!(results["ai"], true);
        assert_eq!(results["sink"], true);

        let delivered = &seen.lock().unwrap()[0];
        assert!(delivered.content.ends_with("[enriched]"));
        assert_eq!(delivered.metadata.get("ai_analysis").unwrap(), "summary");
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_to_original() {
        let (sink, seen) = FakeProvider::new("sink", true);
        let enricher = FakeEnricher {
            name: "ai",
            succeed: AtomicBool::new(false),
        };
        let manager =
            NotificationManager::with_providers(vec![Box::new(sink), Box::new(enricher)]);

        let results = manager.dispatch(message()).await;
        assert_eq!(results["ai"], false);
        assert_eq!(results["sink"], true);
        assert_eq!(seen.lock().unwrap()[0].content, "1 new");
    }

    #[tokio::test]
    async fn test_single_enricher_chosen_by_name() {
        let (sink, _) = FakeProvider::new("sink", true);
        let first = FakeEnricher {
            name: "aaa",
            succeed: AtomicBool::new(true),
        };
        let second = FakeEnricher {
            name: "zzz",
            succeed: AtomicBool::new(true),
        };
        let manager = NotificationManager::with_providers(vec![
            Box::new(sink),
            Box::new(second),
            Box::new(first),
        ]);

        // "zzz" is neither enriched with nor sent to; it simply gets no
        // result entry this cycle.
        let results = manager.dispatch(message()).await;
        assert_eq!(results["aaa"], true);
        assert!(results.contains_key("sink"));
        assert!(!results.contains_key("zzz"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_records_failure() {
        let (sink, _) = FakeProvider::new("sink", true);
        let manager =
            NotificationManager::with_providers(vec![Box::new(sink), Box::new(SlowProvider)])
                .with_send_timeout(Duration::from_millis(50));

        let results = manager.dispatch(message()).await;
        assert_eq!(results["slow"], false);
        assert_eq!(results["sink"], true);
    }

    #[test]
    fn test_from_config_skips_unconfigured_providers() {
        let manager = NotificationManager::from_config(&NotificationsConfig::default());
        assert!(manager.is_empty());
    }
}
