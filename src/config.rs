// runtime configuration read from env

use std::str::FromStr;

use crate::api::DEFAULT_MAX_SESSIONS;
use crate::candidates::{CandidateSelector, DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_DISTANCE_KM};

const DEFAULT_API_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_REASONING_TEMPERATURE: f64 = 0.3;
const DEFAULT_REASONING_MAX_TOKENS: u64 = 2048;

#[derive(Debug, thiserror::Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Variables copied from the secret store at startup.
pub const SECRET_KEYS: [&str; 8] = [
    "OPENAI_API_KEY",
    "EVENTS_API_URL",
    "API_TIMEOUT_SECONDS",
    "MAX_DISTANCE_KM",
    "MAX_CANDIDATES",
    "REASONING_TEMPERATURE",
    "REASONING_MAX_TOKENS",
    "MAX_SESSIONS",
];

pub const REQUIRED_KEYS: [&str; 2] = ["OPENAI_API_KEY", "EVENTS_API_URL"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReasoningSettings {
    pub temperature: f64,
    pub max_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub events_api_url: String,
    pub api_timeout_seconds: u64,
    pub selector: CandidateSelector,
    pub reasoning: ReasoningSettings,
    pub max_sessions: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            events_api_url: get_events_api_url()?,
            api_timeout_seconds: env_or("API_TIMEOUT_SECONDS", DEFAULT_API_TIMEOUT_SECONDS),
            selector: CandidateSelector::new(
                env_or("MAX_DISTANCE_KM", DEFAULT_MAX_DISTANCE_KM),
                env_or("MAX_CANDIDATES", DEFAULT_MAX_CANDIDATES),
            ),
            reasoning: ReasoningSettings {
                temperature: env_or("REASONING_TEMPERATURE", DEFAULT_REASONING_TEMPERATURE),
                max_tokens: env_or("REASONING_MAX_TOKENS", DEFAULT_REASONING_MAX_TOKENS),
            },
            max_sessions: env_or("MAX_SESSIONS", DEFAULT_MAX_SESSIONS),
        })
    }
}

// get events api url from env
fn get_events_api_url() -> Result<String, ConfigError> {
    std::env::var("EVENTS_API_URL")
        .map_err(|_| ConfigError("EVENTS_API_URL not found in environment".to_string()))
}

// parse a value with fallback
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

// names of required variables that are not set
pub fn missing_required_keys() -> Vec<&'static str> {
    REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| std::env::var(key).is_err())
        .collect()
}
