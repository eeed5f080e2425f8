use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::warn;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 300;

// Server-side hiccups worth another attempt; everything else is permanent.
const RETRYABLE_STATUS: [u16; 3] = [500, 502, 504];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("transport failure for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct FetchConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        }
    }
}

/// Shared HTTP client with a per-request timeout and bounded retries.
#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    max_attempts: u32,
    base_backoff: Duration,
}

enum Attempt {
    Transient(String),
    Permanent(FetchError),
}

impl FetchClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(config: FetchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            max_attempts: config.max_attempts,
            base_backoff: config.base_backoff,
        })
    }

    /// Fetch a page body decoded per the charset the response declares
    /// (UTF-8 when the header names none), retrying {500, 502, 504} and
    /// connection-level errors with exponential backoff. Any other status
    /// fails immediately.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let (bytes, encoding) = self.fetch_raw(url).await?;
        let (text, _, _) = encoding.unwrap_or(UTF_8).decode(&bytes);
        Ok(text.into_owned())
    }

    /// Same retry behavior as `fetch`, but hands back the raw bytes so the
    /// caller can pick the decoding.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.fetch_raw(url).await?.0)
    }

    async fn fetch_raw(
        &self,
        url: &str,
    ) -> Result<(Vec<u8>, Option<&'static Encoding>), FetchError> {
        let mut last = String::new();
        for attempt in 1..=self.max_attempts {
            match self.try_once(url).await {
                Ok(payload) => return Ok(payload),
                Err(Attempt::Permanent(e)) => return Err(e),
                Err(Attempt::Transient(reason)) => {
                    last = reason;
                    if attempt < self.max_attempts {
                        let backoff = self.base_backoff * 2u32.pow(attempt - 1);
                        warn!(
                            "Retryable failure on {} (attempt {}/{}): {}; backing off {:.1}s",
                            url,
                            attempt,
                            self.max_attempts,
                            last,
                            backoff.as_secs_f64()
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
            last,
        })
    }

    async fn try_once(
        &self,
        url: &str,
    ) -> Result<(Vec<u8>, Option<&'static Encoding>), Attempt> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(Attempt::Transient(e.to_string()))
            }
            Err(e) => {
                return Err(Attempt::Permanent(FetchError::Transport {
                    url: url.to_string(),
                    source: e,
                }))
            }
        };

        let status = response.status();
        if RETRYABLE_STATUS.contains(&status.as_u16()) {
            return Err(Attempt::Transient(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(Attempt::Permanent(FetchError::Status {
                url: url.to_string(),
                status,
            }));
        }

        let encoding = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);

        match response.bytes().await {
            Ok(b) => Ok((b.to_vec(), encoding)),
            Err(e) if e.is_timeout() => Err(Attempt::Transient(e.to_string())),
            Err(e) => Err(Attempt::Permanent(FetchError::Transport {
                url: url.to_string(),
                source: e,
            })),
        }
    }
}

/// Charset named by a Content-Type header, resolved through the WHATWG
/// encoding labels (the same table reqwest's `text()` consults).
fn charset_from_content_type(value: &str) -> Option<&'static Encoding> {
    value.split(';').find_map(|param| {
        let (key, label) = param.trim().split_once('=')?;
        if !key.eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(label.trim().trim_matches('"').as_bytes())
    })
}
