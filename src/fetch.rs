//! Page fetching with timeout, retry, and cancellation.
//!
//! Wraps a [`SearchBackend`] so that every page request:
//! - is bounded by a per-page timeout (an expired timeout is transient),
//! - is retried with exponential backoff on transient errors,
//! - gives up immediately on fatal and invalid-query errors,
//! - stops waiting as soon as the cancellation token fires.
//!
//! Backoff doubles from `base_delay` and is capped at `max_delay`:
//! 1s, 2s, 4s, 8s, 16s, 32s with the defaults.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::SearchBackend;
use crate::error::{TailError, TailResult};
use crate::models::{ContinuationToken, Page};
use crate::query::SearchRequest;

/// Bounded exponential backoff for transient page failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A page plus the number of transient failures it took to get it.
#[derive(Debug)]
pub struct FetchedPage {
    pub page: Page,
    pub failed_attempts: u32,
}

/// Fetches single pages from a backend.
pub struct PageFetcher {
    backend: Arc<dyn SearchBackend>,
    retry: RetryPolicy,
    page_timeout: Duration,
}

impl PageFetcher {
    pub fn new(backend: Arc<dyn SearchBackend>, retry: RetryPolicy, page_timeout: Duration) -> Self {
        Self {
            backend,
            retry,
            page_timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Fetch one page. Returns `Ok(None)` if cancelled while waiting.
    pub async fn fetch(
        &self,
        request: &SearchRequest,
        after: Option<&ContinuationToken>,
        cancel: &CancellationToken,
    ) -> TailResult<Option<FetchedPage>> {
        let mut last_err = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay(attempt);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                r = tokio::time::timeout(self.page_timeout, self.backend.search(request, after)) => r,
            };

            let err = match result {
                Ok(Ok(page)) => {
                    return Ok(Some(FetchedPage {
                        page,
                        failed_attempts: attempt,
                    }))
                }
                Ok(Err(e)) if e.is_transient() => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => TailError::Transient(format!(
                    "page fetch exceeded {}ms",
                    self.page_timeout.as_millis()
                )),
            };

            warn!(
                backend = self.backend.name(),
                attempt = attempt + 1,
                max_attempts = self.retry.max_retries + 1,
                error = %err,
                "page fetch failed"
            );
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| TailError::Transient("page fetch failed".to_string())))
    }
}
