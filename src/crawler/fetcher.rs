//! Retrying page fetcher
//!
//! This module wraps a [`Transport`] with bounded retries:
//! - Classifying each attempt as success or retryable failure
//! - Waiting between attempts (fixed or exponential backoff)
//! - Preserving the URL and request body across attempts
//! - Reporting a single terminal failure once attempts are exhausted
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx with body | Success |
//! | HTTP 2xx, empty body | Retry |
//! | Any other HTTP status | Retry |
//! | Timeout / connection error | Retry |
//! | Attempts exhausted | Terminal failure |
//! | Shutdown requested | Terminal failure, no further attempts |
//!
//! Parsing happens above this layer: a malformed body that arrived intact
//! is never retried.

use crate::config::{Backoff, CrawlerConfig};
use crate::crawler::scheduler::Shutdown;
use crate::crawler::transport::{Transport, TransportError};
use crate::state::CrawlStage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A single page request and the stage it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub stage: CrawlStage,
    pub url: String,
    /// Form body; `None` sends a GET
    pub body: Option<String>,
}

impl PageRequest {
    pub fn get(stage: CrawlStage, url: impl Into<String>) -> Self {
        Self {
            stage,
            url: url.into(),
            body: None,
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub request: PageRequest,
    pub body: Vec<u8>,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Failure of a single attempt
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("cancelled by shutdown")]
    Cancelled,
}

/// Terminal failure of a request after all attempts
#[derive(Debug, Clone, Error)]
pub struct FatalFetchError {
    pub request: PageRequest,
    pub attempts: u32,
    pub last_error: FetchError,
}

impl fmt::Display for FatalFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fetch failed for {} ({}) after {} attempt(s): {}",
            self.request.url, self.request.stage, self.attempts, self.last_error
        )
    }
}

/// Attempt budget and delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
            backoff: config.backoff,
            max_delay: config.max_retry_delay(),
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

/// Fetches pages through a transport with bounded retries
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    shutdown: Shutdown,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            transport,
            policy,
            shutdown,
        }
    }

    /// Fetches a page, retrying retryable failures up to the policy's attempt limit
    ///
    /// Resolves exactly once: with the page body, or with the terminal failure
    /// carrying the last observed error and the original request.
    pub async fn fetch(&self, request: PageRequest) -> Result<FetchedPage, FatalFetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let last_error = match self.attempt(&request).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::debug!(
                            "Fetched {} on attempt {}/{}",
                            request.url,
                            attempt,
                            self.policy.max_attempts
                        );
                    }
                    return Ok(FetchedPage {
                        request,
                        body,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if attempt >= self.policy.max_attempts {
                return Err(FatalFetchError {
                    request,
                    attempts: attempt,
                    last_error,
                });
            }

            if self.shutdown.is_requested() {
                return Err(FatalFetchError {
                    request,
                    attempts: attempt,
                    last_error: FetchError::Cancelled,
                });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::debug!(
                "Attempt {}/{} for {} ({}) failed: {}; retrying in {:?}",
                attempt,
                self.policy.max_attempts,
                request.url,
                request.stage,
                last_error,
                delay
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn attempt(&self, request: &PageRequest) -> Result<Vec<u8>, FetchError> {
        let response = self
            .transport
            .fetch(&request.url, request.body.as_deref())
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(FetchError::HttpStatus(response.status));
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::EmptyBody);
        }

        Ok(response.body)
    }
}
