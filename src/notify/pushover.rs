// src/notify/pushover.rs

//! Mobile push delivery via the Pushover REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PushoverConfig;
use crate::notify::{NotificationMessage, NotificationProvider, Priority};

const API_URL: &str = "https://api.pushover.net/1/messages.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimal response body: `status == 1` means accepted.
#[derive(Debug, Deserialize)]
struct PushoverResponse {
    status: i32,
}

pub struct PushoverProvider {
    client: reqwest::Client,
    token: String,
    user_key: String,
}

impl PushoverProvider {
    pub fn from_config(config: &PushoverConfig) -> Self {
        Self::new(
            config.token.clone().unwrap_or_default(),
            config.user_key.clone().unwrap_or_default(),
        )
    }

    pub fn new(token: String, user_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            token,
            user_key,
        }
    }

    fn priority_code(priority: Priority) -> i32 {
        match priority {
            Priority::Low => -2,
            Priority::Normal => 0,
            Priority::High => 1,
        }
    }

    async fn post(&self, message: &NotificationMessage) -> bool {
        let mut form = vec![
            ("token", self.token.clone()),
            ("user", self.user_key.clone()),
            ("message", message.content.clone()),
            ("title", message.title.clone()),
            (
                "priority",
                Self::priority_code(message.priority).to_string(),
            ),
        ];
        if let Some(url) = &message.url {
            form.push(("url", url.clone()));
        }

        let response = match self.client.post(API_URL).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Failed to send Pushover notification: {}", e);
                return false;
            }
        };

        if !response.status().is_success() {
            log::error!("Pushover returned HTTP {}", response.status());
            return false;
        }

        match response.json::<PushoverResponse>().await {
            Ok(body) if body.status == 1 => {
                log::info!("Pushover notification sent successfully");
                true
            }
            Ok(body) => {
                log::error!("Pushover rejected notification: status={}", body.status);
                false
            }
            Err(e) => {
                log::error!("Unreadable Pushover response: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl NotificationProvider for PushoverProvider {
    fn name(&self) -> &'static str {
        "pushover"
    }

    fn available(&self) -> bool {
        !self.token.is_empty() && !self.user_key.is_empty()
    }

    async fn send(&self, message: &NotificationMessage) -> bool {
        if !self.available() {
            log::error!("Pushover provider not properly configured");
            return false;
        }
        self.post(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_requires_both_credentials() {
        assert!(PushoverProvider::new("t".into(), "u".into()).available());
        assert!(!PushoverProvider::new("".into(), "u".into()).available());
        assert!(!PushoverProvider::new("t".into(), "".into()).available());
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(PushoverProvider::priority_code(Priority::Low), -2);
        assert_eq!(PushoverProvider::priority_code(Priority::Normal), 0);
        assert_eq!(PushoverProvider::priority_code(Priority::High), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_send_fails_fast() {
        let provider = PushoverProvider::new(String::new(), String::new());
        let message = NotificationMessage::new("t", "c", Priority::Normal);
        assert!(!provider.send(&message).await);
    }
}
