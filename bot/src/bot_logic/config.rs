use anyhow::{bail, Result};
use clap::Parser;
use lib_common::assistant::{AssistantConfig, Provider};
use lib_common::markets::{default_currency_feed, default_gold_feeds, CurrencyFeedConfig, FeedSpec};
use lib_common::retrieve::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Telegram's message size limit, kept for every transport.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Gold price and exchange rate chat bot with an AI fallback", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "PRICEBOT_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "PRICEBOT_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "PRICEBOT_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "PRICEBOT_AI_PROVIDER", help = "AI backend: gemini, openai, azure or xai.")]
    pub provider: Option<Provider>,

    #[clap(long, env = "PRICEBOT_AI_API_KEY", hide_env_values = true, help = "API key for the AI backend. Falls back to the provider's own variable, e.g. GEMINI_API_KEY.")]
    pub api_key: Option<String>,

    #[clap(long, env = "PRICEBOT_AI_MODEL", help = "Model name (the deployment name for Azure).")]
    pub model: Option<String>,

    #[clap(long, env = "PRICEBOT_AI_ENDPOINT", help = "Base URL of the AI backend. Required for Azure.")]
    pub ai_endpoint: Option<String>,

    #[clap(long, env = "PRICEBOT_AZURE_API_VERSION", help = "Azure OpenAI REST API version.")]
    pub azure_api_version: Option<String>,

    #[clap(long, env = "PRICEBOT_REQUEST_TIMEOUT_SECONDS", help = "Per-attempt timeout for feed requests.")]
    pub request_timeout_seconds: Option<u64>,

    #[clap(long, env = "PRICEBOT_MAX_ATTEMPTS", help = "Attempts per feed request, the first one included.")]
    pub max_attempts: Option<u32>,

    #[clap(long, env = "PRICEBOT_BACKOFF_MS", help = "Backoff unit in milliseconds; attempt k waits k units.")]
    pub backoff_ms: Option<u64>,

    #[clap(long, env = "PRICEBOT_CURRENCY_URL", help = "Exchange rate feed URL.")]
    pub currency_url: Option<String>,

    #[clap(long, env = "PRICEBOT_CHUNK_SIZE", help = "Maximum characters per reply message.")]
    pub chunk_size: Option<usize>,

    #[clap(long, env = "PRICEBOT_TAGLINE", help = "Closing line of the gold report.")]
    pub tagline: Option<String>,

    // Feed definitions are structured; they come from the config file only.
    #[clap(skip)]
    pub gold_feeds: Option<Vec<FeedSpec>>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub assistant: AssistantConfig,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub gold_feeds: Vec<FeedSpec>,
    pub currency_feed: CurrencyFeedConfig,
    pub chunk_size: usize,
    pub tagline: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            provider: other.provider.or(self.provider),
            api_key: other.api_key.or(self.api_key),
            model: other.model.or(self.model),
            ai_endpoint: other.ai_endpoint.or(self.ai_endpoint),
            azure_api_version: other.azure_api_version.or(self.azure_api_version),
            request_timeout_seconds: other.request_timeout_seconds.or(self.request_timeout_seconds),
            max_attempts: other.max_attempts.or(self.max_attempts),
            backoff_ms: other.backoff_ms.or(self.backoff_ms),
            currency_url: other.currency_url.or(self.currency_url),
            chunk_size: other.chunk_size.or(self.chunk_size),
            tagline: other.tagline.or(self.tagline),
            gold_feeds: other.gold_feeds.or(self.gold_feeds),
        }
    }

    fn defaults() -> Config {
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            provider: Some(Provider::Gemini),
            request_timeout_seconds: Some(10),
            max_attempts: Some(5),
            backoff_ms: Some(1000),
            currency_url: Some(default_currency_feed().url),
            chunk_size: Some(DEFAULT_CHUNK_SIZE),
            gold_feeds: Some(default_gold_feeds()),
            ..Default::default()
        }
    }

    /// Turns the merged options into [`Settings`]. `env` looks up the provider's
    /// own key variable when no key was configured.
    pub fn resolve(self, env: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let provider = self.provider.unwrap_or_default();
        let api_key = self
            .api_key
            .or_else(|| env(provider.api_key_env()))
            .filter(|key| !key.trim().is_empty());
        let Some(api_key) = api_key else {
            bail!(
                "no API key for the {provider} backend; set PRICEBOT_AI_API_KEY or {}",
                provider.api_key_env()
            );
        };

        if provider == Provider::Azure && self.ai_endpoint.is_none() {
            bail!("the azure backend needs PRICEBOT_AI_ENDPOINT (https://<resource>.openai.azure.com)");
        }

        let mut currency_feed = default_currency_feed();
        if let Some(url) = self.currency_url {
            currency_feed.url = url;
        }

        Ok(Settings {
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            assistant: AssistantConfig {
                provider,
                api_key,
                model: self.model,
                endpoint: self.ai_endpoint,
                api_version: self.azure_api_version,
            },
            request_timeout: Duration::from_secs(self.request_timeout_seconds.unwrap_or(10).max(1)),
            retry: RetryPolicy::new(
                self.max_attempts.unwrap_or(5),
                Duration::from_millis(self.backoff_ms.unwrap_or(1000)),
            ),
            gold_feeds: self.gold_feeds.unwrap_or_else(default_gold_feeds),
            currency_feed,
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1),
            tagline: self.tagline,
        })
    }
}

/// Loads `BOT_TOKEN.env` and `.env` into the process environment, if present.
pub fn load_env_files() {
    for file in ["BOT_TOKEN.env", ".env"] {
        match dotenvy::from_filename(file) {
            Ok(path) => log::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("Failed to load {file}: {e}"),
        }
    }
}

pub fn load_config() -> Config {
    load_config_with(Config::parse())
}

/// Layers built-in defaults, the JSON config file and `cli` (which carries the
/// environment variables), later layers winning.
pub fn load_config_with(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("pricebot.conf"));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }

    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return None;
    }

    let config_str = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Failed to read config file {}: {e}. Falling back to other sources.", path.display());
            return None;
        }
    };

    match serde_json::from_str::<Config>(&config_str) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Failed to parse config file {}: {e}. Falling back to other sources.", path.display());
            None
        }
    }
}
