use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, WrapErr};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::fetcher::DEFAULT_FALLBACK_LANGUAGES;
use crate::normalize::NormalizationRules;
use crate::retry::RetryPolicy;
use crate::server::{MAX_WORDS_LIMIT, RequestDefaults};
use crate::summarize::SummarizerSettings;

/// Environment variable that overrides `server.auth_token`
pub const TOKEN_ENV_VAR: &str = "YTDIGEST_API_TOKEN";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub captions: CaptionsConfig,
    pub normalize: NormalizationRules,
    pub chunking: ChunkingConfig,
    pub summarize: SummarizeConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub auth_token: Option<String>,
}

// The effective config is logged at debug level; the token must not be
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptionsConfig {
    /// Tried in order after the requested language
    pub fallback_languages: Vec<String>,
    pub default_lang: String,
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        Self {
            fallback_languages: DEFAULT_FALLBACK_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            default_lang: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 8000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummarizeConfig {
    pub model: String,
    pub target_lang: String,
    pub max_words: u32,
    pub extractive_sentences: usize,
    pub fallback_on_error: bool,
    pub chunk_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-6".to_string(),
            target_lang: "ja".to_string(),
            max_words: 300,
            extractive_sentences: 5,
            fallback_on_error: true,
            chunk_attempts: 2,
            retry_base_delay_ms: 500,
            request_timeout_secs: 120,
        }
    }
}

impl SummarizeConfig {
    pub fn settings(&self) -> SummarizerSettings {
        SummarizerSettings {
            extractive_sentences: self.extractive_sentences,
            fallback_on_error: self.fallback_on_error,
            chunk_retry: RetryPolicy::new(self.chunk_attempts, Duration::from_millis(self.retry_base_delay_ms)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            target_lang: self.target_lang.clone(),
            max_words: self.max_words,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            capacity: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load config from `path`, or ~/.config/ytdigest/config.toml if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content =
                std::fs::read_to_string(&path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).wrap_err_with(|| format!("failed to parse {}", path.display()))?;
            Ok(config)
        } else if explicit {
            eyre::bail!("config file not found: {}", path.display())
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    /// Apply a token from the environment, if one is set
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.server.auth_token = Some(token.trim().to_string());
        }
        self
    }

    /// Token to require on requests; blank values disable auth
    pub fn auth_token(&self) -> Option<String> {
        self.server
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return invalid("rate_limit.max_requests and rate_limit.window_secs must be positive");
        }
        if self.cache.capacity == 0 {
            return invalid("cache.capacity must be positive");
        }
        if self.chunking.max_chars == 0 {
            return invalid("chunking.max_chars must be positive");
        }
        if !(1..=MAX_WORDS_LIMIT).contains(&self.summarize.max_words) {
            return invalid("summarize.max_words is out of range");
        }
        if self.summarize.extractive_sentences == 0 {
            return invalid("summarize.extractive_sentences must be positive");
        }
        Ok(())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytdigest")
        .join("config.toml")
}
