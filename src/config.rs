//! Environment-driven settings, loaded once at startup.

use anyhow::{Context, Result};

/// Candidate model resource names in preferred order.
pub const DEFAULT_MODELS: [&str; 4] = [
    "models/gemini-2.5-pro",
    "models/gemini-2.5-flash",
    "models/gemini-flash-latest",
    "models/gemini-flash-lite",
];

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    /// Immutable for the process lifetime; first entry is most preferred.
    pub candidates: Vec<String>,
    pub bind_addr: String,
}

impl Settings {
    /// Read settings from the environment. The API key comes from
    /// `GOOGLE_API_KEY` with `API_KEY` as a fallback; the candidate list can
    /// be overridden with a comma-separated `AURA_MODELS`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .context("GOOGLE_API_KEY (or API_KEY) environment variable not set")?;

        let candidates = match std::env::var("AURA_MODELS") {
            Ok(raw) => parse_candidates(&raw),
            Err(_) => DEFAULT_MODELS.iter().map(|s| s.to_string()).collect(),
        };

        let bind_addr =
            std::env::var("AURA_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            api_key,
            candidates,
            bind_addr,
        })
    }
}

/// Split a comma-separated model list, trimming whitespace and dropping empty
/// segments. An all-empty input yields an empty candidate list; the invoker
/// reports that as a configuration failure at request time.
pub fn parse_candidates(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
