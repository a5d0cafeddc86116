use std::time::Duration;

use tracing::warn;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Local inference has to load the model before it can answer, so the
/// request timeout floor is much higher than for the cloud API.
const DEFAULT_OLLAMA_TIMEOUT_SECS: u64 = 60;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_HISTORY_WARN_TURNS: usize = 40;

/// Runtime configuration, read once at startup from the environment
/// (a `.env` file is loaded first when present).
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent key disables the OpenAI provider; it is not a startup failure.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_timeout: Duration,
    pub port: u16,
    /// Conversations longer than this many stored turns are logged on each
    /// request. The history itself is never truncated.
    pub history_warn_turns: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        if openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; OpenAI endpoints will not be available");
        }

        Self {
            openai_api_key,
            openai_model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            ollama_base_url: env_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            ollama_model: env_or("OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
            ollama_timeout: Duration::from_secs(parse_env(
                "OLLAMA_TIMEOUT_SECS",
                DEFAULT_OLLAMA_TIMEOUT_SECS,
            )),
            port: parse_env("PORT", DEFAULT_PORT),
            history_warn_turns: parse_env("HISTORY_WARN_TURNS", DEFAULT_HISTORY_WARN_TURNS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_timeout: Duration::from_secs(DEFAULT_OLLAMA_TIMEOUT_SECS),
            port: DEFAULT_PORT,
            history_warn_turns: DEFAULT_HISTORY_WARN_TURNS,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("ignoring unparseable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.ollama_timeout, Duration::from_secs(60));
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert!(config.openai_api_key.is_none());
    }
}
