use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::feed::{Significance, Topic};

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

const DEFAULT_API_BASE: &str = "https://www.moltbook.com/api/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    data_dir: PathBuf,
    output_dir: PathBuf,
    reputation_path: PathBuf,
    community_path: PathBuf,
    window_days: u32,
    min_significance: Significance,
    topics: Vec<Topic>,
    exclude_topics: Vec<Topic>,
    min_upvotes: i64,
    min_comments: i64,
    max_age_hours: Option<f64>,
    max_posts: usize,
    priority_topics: Vec<Topic>,
    diversify_topics: bool,
    hybrid_enabled: bool,
    max_fresh: usize,
    max_trending: usize,
    fresh_hours: f64,
    comments_per_post: usize,
    api_base: String,
    api_key: Option<String>,
    rate_limit_rpm: u32,
    api_connect_timeout: Duration,
    api_total_timeout: Duration,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から Digest Worker の設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `DIGEST_DATA_DIR` / `DIGEST_OUTPUT_DIR` が未設定、もしくは各種値の
    /// パースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(env_var("DIGEST_DATA_DIR")?);
        let output_dir = PathBuf::from(env_var("DIGEST_OUTPUT_DIR")?);
        let reputation_path = env::var("DIGEST_REPUTATION_PATH")
            .map_or_else(|_| data_dir.join("agent-reputation.json"), PathBuf::from);
        let community_path = env::var("DIGEST_COMMUNITY_PATH")
            .map_or_else(|_| data_dir.join("community-activity.json"), PathBuf::from);

        let window_days = parse_u32("DIGEST_WINDOW_DAYS", 1)?;

        // Curation surface
        let min_significance =
            parse_significance("DIGEST_MIN_SIGNIFICANCE", Significance::WorthWatching)?;
        let topics = parse_topic_csv("DIGEST_TOPICS", "")?;
        let exclude_topics = parse_topic_csv("DIGEST_EXCLUDE_TOPICS", "")?;
        let min_upvotes = parse_i64("DIGEST_MIN_UPVOTES", 0)?;
        let min_comments = parse_i64("DIGEST_MIN_COMMENTS", 0)?;
        let max_age_hours = if let Ok(raw) = env::var("DIGEST_MAX_AGE_HOURS") {
            Some(raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
                name: "DIGEST_MAX_AGE_HOURS",
                source: anyhow::Error::new(error),
            })?)
        } else {
            None
        };
        let max_posts = parse_usize("DIGEST_MAX_POSTS", 10)?;
        let priority_topics = parse_topic_csv("DIGEST_PRIORITY_TOPICS", "EXIST,HUMAN,ETHICS,META")?;
        let diversify_topics = parse_bool("DIGEST_DIVERSIFY_TOPICS", true)?;

        // Hybrid fresh/trending mode
        let hybrid_enabled = parse_bool("DIGEST_HYBRID_ENABLED", true)?;
        let max_fresh = parse_usize("DIGEST_MAX_FRESH", 5)?;
        let max_trending = parse_usize("DIGEST_MAX_TRENDING", 5)?;
        let fresh_hours = parse_f64("DIGEST_FRESH_HOURS", 24.0)?;
        let comments_per_post = parse_usize("DIGEST_COMMENTS_PER_POST", 3)?;

        // Feed API settings
        let api_base =
            env::var("MOLTBOOK_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = env::var("MOLTBOOK_API_KEY").ok().filter(|k| !k.is_empty());
        let rate_limit_rpm = parse_u32("MOLTBOOK_RATE_LIMIT_RPM", 100)?;
        let api_connect_timeout = parse_duration_ms("MOLTBOOK_CONNECT_TIMEOUT_MS", 3000)?;
        let api_total_timeout = parse_duration_ms("MOLTBOOK_TOTAL_TIMEOUT_MS", 30_000)?;

        // Retry settings (exponential backoff + jitter)
        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10_000)?;

        if rate_limit_rpm == 0 {
            return Err(ConfigError::Invalid {
                name: "MOLTBOOK_RATE_LIMIT_RPM",
                source: anyhow::anyhow!("must be greater than zero"),
            });
        }

        Ok(Self {
            data_dir,
            output_dir,
            reputation_path,
            community_path,
            window_days,
            min_significance,
            topics,
            exclude_topics,
            min_upvotes,
            min_comments,
            max_age_hours,
            max_posts,
            priority_topics,
            diversify_topics,
            hybrid_enabled,
            max_fresh,
            max_trending,
            fresh_hours,
            comments_per_post,
            api_base,
            api_key,
            rate_limit_rpm,
            api_connect_timeout,
            api_total_timeout,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    #[must_use]
    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    #[must_use]
    pub fn reputation_path(&self) -> &PathBuf {
        &self.reputation_path
    }

    #[must_use]
    pub fn community_path(&self) -> &PathBuf {
        &self.community_path
    }

    #[must_use]
    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    #[must_use]
    pub fn min_significance(&self) -> Significance {
        self.min_significance
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    #[must_use]
    pub fn exclude_topics(&self) -> &[Topic] {
        &self.exclude_topics
    }

    #[must_use]
    pub fn min_upvotes(&self) -> i64 {
        self.min_upvotes
    }

    #[must_use]
    pub fn min_comments(&self) -> i64 {
        self.min_comments
    }

    #[must_use]
    pub fn max_age_hours(&self) -> Option<f64> {
        self.max_age_hours
    }

    #[must_use]
    pub fn max_posts(&self) -> usize {
        self.max_posts
    }

    #[must_use]
    pub fn priority_topics(&self) -> &[Topic] {
        &self.priority_topics
    }

    #[must_use]
    pub fn diversify_topics(&self) -> bool {
        self.diversify_topics
    }

    #[must_use]
    pub fn hybrid_enabled(&self) -> bool {
        self.hybrid_enabled
    }

    #[must_use]
    pub fn max_fresh(&self) -> usize {
        self.max_fresh
    }

    #[must_use]
    pub fn max_trending(&self) -> usize {
        self.max_trending
    }

    #[must_use]
    pub fn fresh_hours(&self) -> f64 {
        self.fresh_hours
    }

    #[must_use]
    pub fn comments_per_post(&self) -> usize {
        self.comments_per_post
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit_rpm
    }

    #[must_use]
    pub fn api_connect_timeout(&self) -> Duration {
        self.api_connect_timeout
    }

    #[must_use]
    pub fn api_total_timeout(&self) -> Duration {
        self.api_total_timeout
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn http_backoff_base_ms(&self) -> u64 {
        self.http_backoff_base_ms
    }

    #[must_use]
    pub fn http_backoff_cap_ms(&self) -> u64 {
        self.http_backoff_cap_ms
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<i64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_significance(
    name: &'static str,
    default: Significance,
) -> Result<Significance, ConfigError> {
    if let Ok(raw) = env::var(name) {
        Significance::parse(&raw).ok_or_else(|| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("unknown significance tier: {raw}"),
        })
    } else {
        Ok(default)
    }
}

fn parse_topic_csv(name: &'static str, default: &str) -> Result<Vec<Topic>, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|code| {
            Topic::parse(code).ok_or_else(|| ConfigError::Invalid {
                name,
                source: anyhow::anyhow!("unknown topic code: {code}"),
            })
        })
        .collect()
}
