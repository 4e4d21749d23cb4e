//! Source document fetcher.
//!
//! One HTTP GET per call with a shared client; computes the SHA-256
//! fingerprint over the raw bytes and validates size and shape before
//! anything downstream runs. Retries belong to the orchestrator; the
//! fetcher is pure once-through.

use crate::config::Config;
use crate::error::PipelineError;
use crate::repository::Store;
use crate::schema::{FetchResult, RunStatus, Source};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn fetch(&self, source: Source, url: &str) -> Result<FetchResult, PipelineError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    min_content_size: usize,
    max_content_size: usize,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpFetcher {
            client,
            min_content_size: config.min_content_size,
            max_content_size: config.max_content_size,
        })
    }

    fn validate(&self, source: Source, content: &[u8]) -> Result<(), PipelineError> {
        if content.is_empty() {
            return Err(PipelineError::Download {
                src: source,
                reason: "empty response body".into(),
            });
        }
        if content.len() < self.min_content_size {
            return Err(PipelineError::Download {
                src: source,
                reason: format!(
                    "content too small ({} bytes < {} minimum), likely an error page",
                    content.len(),
                    self.min_content_size
                ),
            });
        }
        if content.len() > self.max_content_size {
            return Err(PipelineError::Download {
                src: source,
                reason: format!(
                    "content too large ({} bytes > {} maximum)",
                    content.len(),
                    self.max_content_size
                ),
            });
        }
        if !looks_like_xml(content) {
            return Err(PipelineError::Download {
                src: source,
                reason: "content does not look like an XML document".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, source: Source, url: &str) -> Result<FetchResult, PipelineError> {
        info!(%source, url, "downloading source list");
        let started = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::Timeout(started.elapsed().as_secs())
            } else {
                PipelineError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Download {
                src: source,
                reason: format!("HTTP {status}"),
            });
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Network(e.to_string()))?
            .to_vec();
        let download_time_ms = started.elapsed().as_millis() as u64;

        self.validate(source, &content)?;

        let content_hash = sha256_hex(&content);
        let size_bytes = content.len() as u64;
        info!(
            %source,
            size_bytes,
            download_time_ms,
            hash = %content_hash,
            "download complete"
        );

        Ok(FetchResult {
            content,
            content_hash,
            size_bytes,
            download_time_ms,
        })
    }
}

/// Byte-identical content check against the source's most recent SUCCESS
/// run; a hit short-circuits the run into SKIPPED.
pub async fn should_skip<S: Store>(
    store: &S,
    source: Source,
    content_hash: &str,
) -> Result<bool, PipelineError> {
    let Some(last) = store.last_successful_run(source).await? else {
        return Ok(false);
    };
    debug_assert_eq!(last.status, RunStatus::Success);
    let skip = last.content_hash.as_deref() == Some(content_hash);
    if skip {
        debug!(%source, hash = content_hash, "content unchanged since last success");
    }
    Ok(skip)
}

pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Skip a UTF-8 BOM and leading whitespace, then require an XML opener.
fn looks_like_xml(content: &[u8]) -> bool {
    let body = content.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(content);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}
