//! Single measurement round through a candidate proxy
//!
//! A round is a liveness request (latency) followed by a bulk download
//! (throughput), both forwarded through the candidate. Retryable statuses and
//! transport failures are retried with exponential backoff before the round
//! gives up with a [`ProbeError`].

use crate::error::ProbeError;
use crate::proxy::models::RoundSample;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Small diagnostic endpoint used for the liveness check
pub const DEFAULT_LIVENESS_URL: &str = "http://mojeip.net.pl/asdfa/azenv.php";

/// Large fixed-size payload used for the throughput check
pub const DEFAULT_DOWNLOAD_URL: &str = "http://ipv4.download.thinkbroadband.com/5MB.zip";

const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 20;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(120);
const DEFAULT_STATUS_FORCELIST: [u16; 4] = [500, 502, 503, 504];

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Retry behaviour applied to every request of a round
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base of the exponential backoff between retries
    pub backoff_base: Duration,
    /// Response statuses that trigger a retry
    pub status_forcelist: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            status_forcelist: DEFAULT_STATUS_FORCELIST.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }

    /// Delay before the `retry`-th retry (1-based). The first retry is immediate.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.backoff_base
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

/// Endpoints, timeouts and retry policy for the HTTP probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Endpoint whose response time is the round's latency
    pub liveness_url: String,
    /// Payload whose transfer rate is the round's throughput
    pub download_url: String,
    /// Timeout for the whole liveness request
    pub liveness_timeout: Duration,
    /// Timeout for the download, body included
    pub download_timeout: Duration,
    /// Retry policy shared by both requests
    pub retry: RetryPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            liveness_url: DEFAULT_LIVENESS_URL.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            liveness_timeout: Duration::from_secs(DEFAULT_LIVENESS_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_liveness_url(mut self, url: String) -> Self {
        self.liveness_url = url;
        self
    }

    pub fn with_download_url(mut self, url: String) -> Self {
        self.download_url = url;
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// One measurement round against a candidate
///
/// `open` creates the per-candidate session that all of that candidate's
/// rounds share; sessions are never shared between candidates.
#[async_trait]
pub trait Probe: Send + Sync {
    type Session: Send + Sync;

    fn open(&self, address: &str) -> Result<Self::Session, ProbeError>;

    async fn round(&self, session: &Self::Session) -> Result<RoundSample, ProbeError>;
}

/// Probe that forwards real HTTP requests through the candidate
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    config: ProbeConfig,
}

/// Connection-pooled client routed through one candidate
pub struct HttpSession {
    address: String,
    client: Client,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Time to response headers of the liveness endpoint, unbounded on non-200
    async fn liveness(&self, session: &HttpSession) -> Result<Option<f64>, ProbeError> {
        let start = Instant::now();
        let response = self
            .send(
                &session.client,
                &self.config.liveness_url,
                self.config.liveness_timeout,
            )
            .await?;
        let elapsed = start.elapsed().as_secs_f64();

        if response.status() == StatusCode::OK {
            Ok(Some(elapsed))
        } else {
            debug!(
                "{}: liveness answered {}, latency unbounded",
                session.address,
                response.status()
            );
            Ok(None)
        }
    }

    /// MB/s over the full download, unbounded without a content-length
    async fn throughput(&self, session: &HttpSession) -> Result<Option<f64>, ProbeError> {
        let url = &self.config.download_url;
        let start = Instant::now();
        let mut response = self
            .send(&session.client, url, self.config.download_timeout)
            .await?;
        let content_length = response.content_length();

        let mut streamed: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProbeError::from_reqwest(url, e))?
        {
            streamed += chunk.len() as u64;
        }
        let elapsed = start.elapsed().as_secs_f64();

        // Streamed bytes are only logged; the reading comes from the header.
        debug!(
            "{}: downloaded {} bytes in {:.3}s (content-length: {:?})",
            session.address, streamed, elapsed, content_length
        );

        Ok(match content_length {
            Some(length) if length > 0 && elapsed > 0.0 => {
                Some(length as f64 / elapsed / BYTES_PER_MIB)
            }
            _ => None,
        })
    }

    /// GET with the configured retry policy
    async fn send(
        &self,
        client: &Client,
        url: &str,
        timeout: Duration,
    ) -> Result<Response, ProbeError> {
        let policy = &self.config.retry;
        let mut retries = 0;

        loop {
            let failure = match client.get(url).timeout(timeout).send().await {
                Ok(response) if policy.is_retryable_status(response.status()) => {
                    ProbeError::RetriesExhausted {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    }
                }
                Ok(response) => return Ok(response),
                Err(err) => match ProbeError::from_reqwest(url, err) {
                    err @ ProbeError::Client(_) => return Err(err),
                    err => err,
                },
            };

            if retries >= policy.max_retries {
                return Err(failure);
            }
            retries += 1;

            let delay = policy.backoff(retries);
            warn!(
                "Retrying {} ({}/{}) in {:?}: {}",
                url, retries, policy.max_retries, delay, failure
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    type Session = HttpSession;

    fn open(&self, address: &str) -> Result<HttpSession, ProbeError> {
        let proxy_url = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let proxy = ReqwestProxy::all(&proxy_url).map_err(|e| ProbeError::Client(e.to_string()))?;
        let client = Client::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(HttpSession {
            address: address.to_string(),
            client,
        })
    }

    async fn round(&self, session: &HttpSession) -> Result<RoundSample, ProbeError> {
        let latency = self.liveness(session).await?;
        let throughput = self.throughput(session).await?;
        Ok(RoundSample::new(latency, throughput))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.liveness_url, DEFAULT_LIVENESS_URL);
        assert_eq!(config.download_url, DEFAULT_DOWNLOAD_URL);
        assert_eq!(config.liveness_timeout, Duration::from_secs(10));
        assert_eq!(config.download_timeout, Duration::from_secs(20));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_probe_config_builder() {
        let config = ProbeConfig::new()
            .with_liveness_url("http://example.com/ping".to_string())
            .with_download_url("http://example.com/blob".to_string())
            .with_liveness_timeout(Duration::from_secs(1))
            .with_download_timeout(Duration::from_secs(2))
            .with_retry(RetryPolicy::none());

        assert_eq!(config.liveness_url, "http://example.com/ping");
        assert_eq!(config.download_url, "http://example.com/blob");
        assert_eq!(config.liveness_timeout, Duration::from_secs(1));
        assert_eq!(config.download_timeout, Duration::from_secs(2));
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn test_retryable_statuses() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(policy.is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(policy.is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!policy.is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!policy.is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn test_open_rejects_unusable_proxy_url() {
        let probe = HttpProbe::default();
        assert!(probe.open("192.168.1.1:8080").is_ok());
        assert!(matches!(
            probe.open("1.2.3.4:80extra"),
            Err(ProbeError::Client(_))
        ));
    }
}
