//! Configuration for the Sanctions Sentinel service.
//!
//! One immutable `Config` value is built from the environment at startup
//! and passed by reference to every component.

use crate::schema::Source;

use anyhow::{bail, Context, Result};
use std::collections::HashMap;

const OFAC_SDN_URL: &str = "https://www.treasury.gov/ofac/downloads/sdn.xml";
const UN_CONSOLIDATED_URL: &str = "https://scsanctions.un.org/resources/xml/en/consolidated.xml";
const EU_CONSOLIDATED_URL: &str =
    "https://webgate.ec.europa.eu/fsd/fsf/public/files/xmlFullSanctionsList_1_1/content";
const UK_SANCTIONS_URL: &str =
    "https://ofsistorage.blob.core.windows.net/publishlive/2022format/ConList.xml";

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Published URL of the list document.
    pub url: String,

    /// Scheduler cadence for this source.
    pub interval_hours: u64,

    /// Sanity floor: fewer parsed entities than this fails the run
    /// without touching prior data.
    pub min_expected_entities: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    /// Generic webhook endpoint; channel enabled iff set.
    pub webhook_url: Option<String>,

    /// Slack incoming-webhook endpoint; channel enabled iff set.
    pub slack_webhook_url: Option<String>,

    /// HTTP relay for email delivery; channel enabled iff set.
    pub email_relay_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Per-source settings, populated for every `Source` variant.
    pub sources: HashMap<Source, SourceConfig>,

    /// Global ceiling on concurrently executing runs.
    pub parallel_scrapers: usize,

    /// Per-run deadline in seconds (bounded at 3600).
    pub timeout_seconds: u64,

    /// Retry budget for transient failures.
    pub max_retries: u32,

    /// Exponential backoff base: backoff_factor * 2^attempt seconds.
    pub backoff_factor: f64,

    /// User-Agent sent with every fetch.
    pub user_agent: String,

    /// Reject downloads smaller than this many bytes.
    pub min_content_size: usize,

    /// Reject downloads larger than this many bytes.
    pub max_content_size: usize,

    /// Scheduler tick interval in seconds.
    pub tick_seconds: u64,

    pub notifier: NotifierConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut sources = HashMap::new();
        sources.insert(
            Source::Ofac,
            source_from_env("OFAC", OFAC_SDN_URL, 6)?,
        );
        sources.insert(Source::Un, source_from_env("UN", UN_CONSOLIDATED_URL, 24)?);
        sources.insert(Source::Eu, source_from_env("EU", EU_CONSOLIDATED_URL, 24)?);
        sources.insert(
            Source::UkHmt,
            source_from_env("UK", UK_SANCTIONS_URL, 24)?,
        );

        let config = Config {
            sources,
            parallel_scrapers: env_parse("SENTINEL_PARALLEL_SCRAPERS", 3usize)?,
            timeout_seconds: env_parse("SENTINEL_TIMEOUT_SECONDS", 120u64)?,
            max_retries: env_parse("SENTINEL_MAX_RETRIES", 3u32)?,
            backoff_factor: env_parse("SENTINEL_BACKOFF_FACTOR", 0.3f64)?,
            user_agent: std::env::var("SENTINEL_USER_AGENT").unwrap_or_else(|_| {
                "SanctionsSentinel/2.0 (+https://example.com/sentinel)".into()
            }),
            min_content_size: env_parse("SENTINEL_MIN_CONTENT_SIZE", 1000usize)?,
            max_content_size: env_parse("SENTINEL_MAX_CONTENT_SIZE", 100_000_000usize)?,
            tick_seconds: env_parse("SENTINEL_TICK_SECONDS", 60u64)?,
            notifier: NotifierConfig {
                webhook_url: env_opt("SENTINEL_WEBHOOK_URL"),
                slack_webhook_url: env_opt("SENTINEL_SLACK_WEBHOOK_URL"),
                email_relay_url: env_opt("SENTINEL_EMAIL_RELAY_URL"),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.parallel_scrapers == 0 {
            bail!("SENTINEL_PARALLEL_SCRAPERS must be at least 1");
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > 3600 {
            bail!("SENTINEL_TIMEOUT_SECONDS must be in 1..=3600");
        }
        if self.backoff_factor <= 0.0 {
            bail!("SENTINEL_BACKOFF_FACTOR must be positive");
        }
        if self.max_content_size < self.min_content_size {
            bail!("SENTINEL_MAX_CONTENT_SIZE must be >= SENTINEL_MIN_CONTENT_SIZE");
        }
        if self.tick_seconds == 0 {
            bail!("SENTINEL_TICK_SECONDS must be at least 1");
        }
        for (source, cfg) in &self.sources {
            if cfg.url.trim().is_empty() {
                bail!("URL for {source} is empty");
            }
            if cfg.interval_hours == 0 {
                bail!("interval for {source} must be at least 1 hour");
            }
        }
        Ok(())
    }

    /// Every `Source` variant is populated at construction.
    pub fn source(&self, source: Source) -> &SourceConfig {
        &self.sources[&source]
    }
}

fn source_from_env(prefix: &str, default_url: &str, default_interval: u64) -> Result<SourceConfig> {
    Ok(SourceConfig {
        url: std::env::var(format!("SENTINEL_{prefix}_URL"))
            .unwrap_or_else(|_| default_url.into()),
        interval_hours: env_parse(&format!("SENTINEL_{prefix}_INTERVAL_HOURS"), default_interval)?,
        min_expected_entities: env_parse(
            &format!("SENTINEL_{prefix}_MIN_EXPECTED_ENTITIES"),
            100usize,
        )?,
    })
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// In-memory config for unit tests; every source points at localhost and
/// the sanity floor is disabled.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let mut sources = HashMap::new();
    for source in Source::ALL {
        sources.insert(
            source,
            SourceConfig {
                url: format!("http://localhost/{source}"),
                interval_hours: 6,
                min_expected_entities: 0,
            },
        );
    }
    Config {
        sources,
        parallel_scrapers: 3,
        timeout_seconds: 120,
        max_retries: 3,
        backoff_factor: 0.3,
        user_agent: "test-agent/1.0".into(),
        min_content_size: 1,
        max_content_size: 100_000_000,
        tick_seconds: 60,
        notifier: NotifierConfig::default(),
    }
}
