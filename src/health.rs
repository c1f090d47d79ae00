// src/health.rs

//! End-of-cycle ping to an external uptime service.

use std::time::Duration;

use crate::config::HealthcheckConfig;
use crate::utils::http::create_client;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Best-effort health reporter. Failures never affect the cycle.
pub struct HealthPinger {
    url: Option<String>,
    client: Option<reqwest::Client>,
}

impl HealthPinger {
    pub fn from_config(config: &HealthcheckConfig) -> Self {
        let url = config.url.clone().filter(|u| !u.is_empty());
        let client = url
            .as_ref()
            .and_then(|_| create_client(PING_TIMEOUT).ok());
        Self { url, client }
    }

    /// Report cycle status. A no-op when no URL is configured.
    pub async fn ping(&self, success: bool) {
        let (Some(url), Some(client)) = (&self.url, &self.client) else {
            return;
        };

        let status = if success { "ok" } else { "fail" };
        match client.get(url).query(&[("status", status)]).send().await {
            Ok(response) if response.status().is_success() => {
                log::debug!("Health ping delivered (status={})", status);
            }
            Ok(response) => {
                log::info!("Health ping returned HTTP {}", response.status());
            }
            Err(e) => {
                log::info!("Health ping failed: {}", e);
            }
        }
    }
}
