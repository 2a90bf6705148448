//! The poll loop.
//!
//! [`Tail`] owns the cursor and drives one poll cycle per tick:
//!
//! ```text
//!  tick ─▶ build request ─▶ fetch page ─┬─▶ more pages? ─▶ fetch next page
//!                                        │
//!                                        ▼
//!                      sort ─▶ dedup ─▶ emit ─▶ advance cursor ─▶ sleep
//! ```
//!
//! Cycles never overlap and pages within a cycle are fetched one after the
//! other, each resuming from the previous page's continuation token, until
//! the backend reports no more data. The cursor is only touched after the
//! emit step, so a cycle interrupted while fetching leaves it exactly where
//! the cycle found it. A cycle interrupted while emitting, or cut short by a
//! failing sink, advances it over the documents already written and no
//! further.
//!
//! # Error handling
//!
//! - `InvalidQuery`: the cycle is dropped and the loop keeps ticking; after
//!   `max_invalid_query_streak` consecutive rejections the run fails.
//! - `Transient` after the page retry budget: the cycle is dropped and tried
//!   again on the next tick.
//! - anything fatal ends the run.
//!
//! In list-only mode a single cycle runs and any error ends the run.

use chrono::Utc;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::SearchBackend;
use crate::checkpoint;
use crate::config::TailConfig;
use crate::cursor::CursorTracker;
use crate::dedup;
use crate::emit::Emitter;
use crate::error::{TailError, TailResult};
use crate::fetch::PageFetcher;
use crate::models::{ContinuationToken, Document};
use crate::query;

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Idle,
    /// Waiting for the first page of a cycle.
    Fetching,
    /// Following continuation tokens through the rest of the result set.
    Draining,
    Emitting,
    Sleeping,
    Cancelled,
    Fatal,
}

/// Counters for one completed poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub pages: u32,
    pub fetched: usize,
    pub emitted: usize,
    pub duplicates: usize,
    pub stale: usize,
    /// Transient page failures that were retried successfully.
    pub transient_retries: u32,
    /// Total matches reported by the backend on the last page.
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The cancellation token fired.
    Cancelled,
    /// List-only mode finished its single cycle.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub cycles: u64,
    pub emitted: u64,
}

/// The tailing scheduler.
pub struct Tail {
    config: TailConfig,
    fetcher: PageFetcher,
    tracker: CursorTracker,
    state: TailState,
    cycles: u64,
    emitted: u64,
    invalid_streak: u32,
}

impl Tail {
    pub fn new(config: TailConfig, backend: Arc<dyn SearchBackend>, tracker: CursorTracker) -> Self {
        let fetcher = PageFetcher::new(backend, config.retry, config.page_timeout);
        Self {
            config,
            fetcher,
            tracker,
            state: TailState::Idle,
            cycles: 0,
            emitted: 0,
            invalid_streak: 0,
        }
    }

    /// Build a scheduler whose cursor comes from the checkpoint file when
    /// one exists, and from the configured start position otherwise.
    pub async fn from_config(config: TailConfig, backend: Arc<dyn SearchBackend>) -> TailResult<Self> {
        let restored = match &config.checkpoint {
            Some(path) => checkpoint::load(path).await?,
            None => None,
        };
        let tracker = match restored {
            Some(cursor) => {
                info!(
                    timestamp = %cursor.timestamp,
                    ids = cursor.ids.len(),
                    "resuming from checkpoint"
                );
                CursorTracker::new(Some(cursor))
            }
            None => CursorTracker::from_start(config.start, Utc::now()),
        };
        Ok(Self::new(config, backend, tracker))
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn tracker(&self) -> &CursorTracker {
        &self.tracker
    }

    /// Run poll cycles until cancelled, a fatal error occurs, or the single
    /// list-only cycle finishes.
    pub async fn run<W: AsyncWrite + Unpin>(
        &mut self,
        emitter: &mut Emitter<W>,
        cancel: &CancellationToken,
    ) -> TailResult<RunSummary> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            backend = self.fetcher.backend_name(),
            index = %self.config.index_pattern,
            query = %self.config.query,
            from = ?self.tracker.lower_bound(),
            list_only = self.config.list_only,
            "tailing"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.state = TailState::Cancelled;
                    return Ok(self.summary(RunOutcome::Cancelled));
                }
                _ = ticker.tick() => {}
            }

            let result = self.run_cycle(emitter, cancel).await;
            match result {
                Ok(Some(_)) => {
                    self.invalid_streak = 0;
                    if self.config.list_only {
                        self.state = TailState::Idle;
                        return Ok(self.summary(RunOutcome::Completed));
                    }
                    self.state = TailState::Sleeping;
                }
                Ok(None) => return Ok(self.summary(RunOutcome::Cancelled)),
                Err(e) => self.handle_cycle_error(e)?,
            }
        }
    }

    /// Decide whether a failed cycle ends the run.
    fn handle_cycle_error(&mut self, err: TailError) -> TailResult<()> {
        if self.config.list_only || err.is_fatal() {
            self.state = TailState::Fatal;
            error!(cycle = self.cycles, error = %err, "tail stopped");
            return Err(err);
        }

        match err {
            TailError::InvalidQuery(msg) => {
                self.invalid_streak += 1;
                if self.invalid_streak >= self.config.max_invalid_query_streak {
                    self.state = TailState::Fatal;
                    error!(streak = self.invalid_streak, error = %msg, "query keeps being rejected");
                    return Err(TailError::Fatal(format!(
                        "query rejected {} times in a row: {}",
                        self.invalid_streak, msg
                    )));
                }
                error!(
                    cycle = self.cycles,
                    streak = self.invalid_streak,
                    error = %msg,
                    "invalid query, skipping cycle"
                );
            }
            other => {
                warn!(cycle = self.cycles, error = %other, "cycle abandoned, retrying next tick");
            }
        }
        self.state = TailState::Sleeping;
        Ok(())
    }

    /// Run a single poll cycle.
    ///
    /// Returns `Ok(None)` if cancelled. On a sink error the cursor covers the
    /// documents written before the failure; on any other error it is
    /// unchanged.
    pub async fn run_cycle<W: AsyncWrite + Unpin>(
        &mut self,
        emitter: &mut Emitter<W>,
        cancel: &CancellationToken,
    ) -> TailResult<Option<CycleReport>> {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..Default::default()
        };

        let snapshot = self.tracker.cursor().cloned();
        let request = query::build_request(self.config.query_spec(), self.tracker.lower_bound())?;

        self.state = TailState::Fetching;
        let mut collected: Vec<Document> = Vec::new();
        let mut after: Option<ContinuationToken> = None;

        loop {
            let Some(fetched) = self.fetcher.fetch(&request, after.as_ref(), cancel).await? else {
                self.state = TailState::Cancelled;
                return Ok(None);
            };
            let page = fetched.page;
            report.pages += 1;
            report.transient_retries += fetched.failed_attempts;
            report.total = page.total.or(report.total);

            collected.extend(page.documents);
            debug!(cycle = report.cycle, page = report.pages, collected = collected.len(), "page fetched");

            match page.next {
                Some(next) if page.has_more => {
                    self.state = TailState::Draining;
                    after = Some(next);
                }
                _ => break,
            }
        }

        collected.sort_by(Document::sort_cmp);
        report.fetched = collected.len();
        let outcome = dedup::filter(snapshot.as_ref(), collected);
        report.duplicates = outcome.duplicates;
        report.stale = outcome.stale;

        self.state = TailState::Emitting;
        let mut written = 0usize;
        let mut cancelled = false;
        let mut sink_error = None;
        for doc in &outcome.fresh {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                r = emitter.emit(doc) => r,
            };
            if let Err(e) = result {
                sink_error = Some(e);
                break;
            }
            written += 1;
        }
        if written > 0 && sink_error.is_none() {
            if let Err(e) = emitter.flush().await {
                sink_error = Some(e);
            }
        }

        // Whatever reached the sink is recorded, even if the sink failed later.
        report.emitted = written;
        self.emitted += written as u64;
        if self.tracker.advance(&outcome.fresh[..written]) {
            if let (Some(path), Some(cursor)) = (&self.config.checkpoint, self.tracker.cursor()) {
                checkpoint::save(path, cursor).await?;
            }
        }
        if let Some(e) = sink_error {
            return Err(e);
        }

        if cancelled {
            self.state = TailState::Cancelled;
            return Ok(None);
        }

        debug!(
            cycle = report.cycle,
            pages = report.pages,
            fetched = report.fetched,
            emitted = report.emitted,
            duplicates = report.duplicates,
            stale = report.stale,
            retries = report.transient_retries,
            total = ?report.total,
            "cycle complete"
        );
        Ok(Some(report))
    }

    fn summary(&self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            outcome,
            cycles: self.cycles,
            emitted: self.emitted,
        }
    }
}
