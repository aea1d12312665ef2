use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Base URL of the question-answering backend.
///
/// Both the stream endpoint and the health endpoint hang off this URL. The
/// dispatcher holds the authoritative copy at runtime and can replace it via
/// a `SetConfig` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var("ASKTEXT_API_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self { api_url })
    }

    pub fn validate(&self) -> Result<()> {
        validate_api_url(&self.api_url)
    }
}

pub fn validate_api_url(api_url: &str) -> Result<()> {
    if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
        bail!(
            "Invalid API URL '{}': expected http:// or https:// URL",
            api_url
        );
    }
    Ok(())
}
