// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;

const USER_AGENT: &str = concat!("gradewatch/", env!("CARGO_PKG_VERSION"));

/// Create a configured asynchronous HTTP client.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    Ok(client)
}
