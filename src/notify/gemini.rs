// src/notify/gemini.rs

//! AI summarization enricher backed by the Gemini REST API.
//!
//! This provider does not deliver anything itself: it augments the
//! outgoing message with a natural-language summary of the detected
//! changes, which downstream providers then carry.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::GeminiConfig;
use crate::notify::{Enricher, NotificationMessage, NotificationProvider};

const API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiProvider {
    pub fn from_config(config: &GeminiConfig) -> Self {
        Self::new(config.api_key.clone().unwrap_or_default())
    }

    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }

    fn analysis_prompt(message: &NotificationMessage) -> String {
        format!(
            "Summarize these grade changes in natural, concise language. \
             Include assignment names and specific grade values.\n\n\
             Title: {}\nContent: {}\n\n\
             Report new graded assignments, grade changes, \
             missing/excused/incomplete status changes, and teacher comment \
             changes. Do not report assignments without grades or due-date \
             changes alone.",
            message.title, message.content
        )
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(API_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                log::error!("Failed to generate Gemini analysis: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            log::error!("Gemini returned HTTP {}", response.status());
            return None;
        }

        let parsed: GenerateResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                log::error!("Unreadable Gemini response: {}", e);
                return None;
            }
        };

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty());

        if text.is_none() {
            log::warn!("Gemini returned empty response");
        }
        text
    }
}

#[async_trait]
impl NotificationProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn send(&self, _message: &NotificationMessage) -> bool {
        // enrichment-only provider; the manager routes it through enrich
        false
    }

    fn as_enricher(&self) -> Option<&dyn Enricher> {
        Some(self)
    }
}

#[async_trait]
impl Enricher for GeminiProvider {
    async fn enrich(&self, message: &NotificationMessage) -> Option<NotificationMessage> {
        if !self.available() {
            return None;
        }

        let analysis = self.generate(&Self::analysis_prompt(message)).await?;

        let mut enriched = message.clone();
        enriched.content = format!(
            "{}\n\n--- AI Analysis ---\n{}",
            message.content, analysis
        );
        enriched
            .metadata
            .insert("ai_analysis".to_string(), analysis);
        log::info!("Gemini analysis generated successfully");
        Some(enriched)
    }
}
