use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::is_local_endpoint_url;

const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

const DEFAULT_DEBOUNCE_MS: u64 = 400;
const DEFAULT_HISTORY_CAP: usize = 100;
const DEFAULT_PASTE_PREVIEW_CHARS: usize = 200;
const PREVIEW_AFTER_INSERT_MS: u64 = 150;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url =
            std::env::var("INK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_key = std::env::var("INK_API_KEY").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let model = std::env::var("INK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            api_key,
            model,
            api_url,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid INK_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "INK_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

/// Fixed editing constants, resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    /// Quiet period before a live-typing write commits to history.
    pub debounce: Duration,
    /// Maximum retained history entries; the oldest is evicted beyond this.
    pub history_cap: usize,
    /// Pastes longer than this flip the session straight into preview.
    pub paste_preview_chars: usize,
    /// Delay between an AI insertion landing and the forced preview.
    pub preview_after_insert: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            history_cap: DEFAULT_HISTORY_CAP,
            paste_preview_chars: DEFAULT_PASTE_PREVIEW_CHARS,
            preview_after_insert: Duration::from_millis(PREVIEW_AFTER_INSERT_MS),
        }
    }
}

pub fn resolve_tunables() -> Tunables {
    Tunables {
        debounce: Duration::from_millis(env_override_u64(
            "INK_DEBOUNCE_MS",
            DEFAULT_DEBOUNCE_MS,
            50,
            5_000,
        )),
        history_cap: env_override_usize("INK_HISTORY_CAP", DEFAULT_HISTORY_CAP, 10, 1_000),
        paste_preview_chars: env_override_usize(
            "INK_PASTE_PREVIEW_CHARS",
            DEFAULT_PASTE_PREVIEW_CHARS,
            20,
            10_000,
        ),
        preview_after_insert: Duration::from_millis(PREVIEW_AFTER_INSERT_MS),
    }
}

fn env_override_usize(key: &str, default: usize, min: usize, max: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}

fn env_override_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}
