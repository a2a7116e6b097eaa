//! Worker configuration loaded from environment variables.
//!
//! Every knob has a default so a bare `clawreview stats` works against a
//! local database; the `worker` subcommand additionally requires the three
//! API credentials.

use std::path::PathBuf;

/// Runtime configuration for the review worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub API token (installation token or PAT).
    pub github_token: String,
    /// OpenAI API key.
    pub openai_api_key: String,
    /// Anthropic API key.
    pub anthropic_api_key: String,

    /// SQLite database backing the queue and review stores.
    pub database_path: PathBuf,

    /// Bounded-wait dequeue interval in seconds.
    pub worker_poll_interval_secs: u64,
    /// Retry ceiling; a task failing with `retry_count` at this value is
    /// dead-lettered instead of re-enqueued.
    pub max_retries: u32,
    /// Base retry delay in seconds; the actual delay is
    /// `retry_delay_secs * retry_count` (linear backoff).
    pub retry_delay_secs: u64,

    /// GitHub API requests per minute.
    pub github_rate_limit_per_minute: u32,
    /// OpenAI API requests per minute.
    pub openai_rate_limit_per_minute: u32,
    /// Anthropic API requests per minute.
    pub anthropic_rate_limit_per_minute: u32,

    /// Model used by the Scout stage.
    pub scout_model: String,
    /// Model used by the Guardian stage.
    pub guardian_model: String,
    /// Model used by the Architect stage.
    pub architect_model: String,
    /// Model used by the Stylist stage.
    pub stylist_model: String,
    /// Model used by the Synthesizer stage.
    pub synthesizer_model: String,

    /// Hard ceiling on raw diff size in bytes; larger diffs are truncated
    /// with a visible notice before parsing.
    pub max_diff_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: String::new(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            database_path: PathBuf::from("clawreview.db"),
            worker_poll_interval_secs: 5,
            max_retries: 3,
            retry_delay_secs: 5,
            github_rate_limit_per_minute: 30,
            openai_rate_limit_per_minute: 60,
            anthropic_rate_limit_per_minute: 50,
            scout_model: "gpt-4o-mini".into(),
            guardian_model: "claude-3-5-sonnet-20241022".into(),
            architect_model: "gpt-4o".into(),
            stylist_model: "gpt-4o-mini".into(),
            synthesizer_model: "gpt-4o".into(),
            max_diff_size: 100_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            github_token: env_or("GITHUB_TOKEN", ""),
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            anthropic_api_key: env_or("ANTHROPIC_API_KEY", ""),
            database_path: PathBuf::from(env_or("CLAWREVIEW_DB", "clawreview.db")),
            worker_poll_interval_secs: env_parse(
                "WORKER_POLL_INTERVAL",
                defaults.worker_poll_interval_secs,
            ),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries),
            retry_delay_secs: env_parse("RETRY_DELAY", defaults.retry_delay_secs),
            github_rate_limit_per_minute: env_parse(
                "GITHUB_RATE_LIMIT_PER_MINUTE",
                defaults.github_rate_limit_per_minute,
            ),
            openai_rate_limit_per_minute: env_parse(
                "OPENAI_RATE_LIMIT_PER_MINUTE",
                defaults.openai_rate_limit_per_minute,
            ),
            anthropic_rate_limit_per_minute: env_parse(
                "ANTHROPIC_RATE_LIMIT_PER_MINUTE",
                defaults.anthropic_rate_limit_per_minute,
            ),
            scout_model: env_or("SCOUT_MODEL", &defaults.scout_model),
            guardian_model: env_or("GUARDIAN_MODEL", &defaults.guardian_model),
            architect_model: env_or("ARCHITECT_MODEL", &defaults.architect_model),
            stylist_model: env_or("STYLIST_MODEL", &defaults.stylist_model),
            synthesizer_model: env_or("SYNTHESIZER_MODEL", &defaults.synthesizer_model),
            max_diff_size: env_parse("MAX_DIFF_SIZE", defaults.max_diff_size),
        }
    }

    /// Whether all credentials needed to run the worker are present.
    pub fn has_credentials(&self) -> bool {
        !self.github_token.is_empty()
            && !self.openai_api_key.is_empty()
            && !self.anthropic_api_key.is_empty()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
