//! Periodic annotation scraping.
//!
//! The [`Scraper`] owns a cursor. Each tick it asks the source for the
//! window `[cursor, now)`, drops anything stamped outside it, pushes the
//! rest onto the event queue oldest first, and moves the cursor to `now`
//! whether or not the fetch worked.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{RelayError, Result};
use crate::event::Annotation;
use crate::source::{AnnotationSource, ScrapeWindow};

/// Default time between polls.
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(10);

/// What one poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// The window that was queried.
    pub window: ScrapeWindow,
    /// Annotations returned by the source.
    pub fetched: usize,
    /// Annotations stamped outside the window and dropped.
    pub out_of_window: usize,
    /// Annotations pushed onto the queue.
    pub emitted: usize,
    /// True if the fetch failed and the window was skipped.
    pub failed: bool,
    /// True if cancellation interrupted the poll.
    pub cancelled: bool,
}

impl PollReport {
    fn new(window: ScrapeWindow) -> Self {
        Self {
            window,
            fetched: 0,
            out_of_window: 0,
            emitted: 0,
            failed: false,
            cancelled: false,
        }
    }
}

/// Orders a batch oldest first.
///
/// Grafana answers newest first, so the batch is reversed before a stable
/// sort by time; annotations sharing a timestamp keep their reversed order.
#[must_use]
pub fn oldest_first(mut batch: Vec<Annotation>) -> Vec<Annotation> {
    batch.reverse();
    batch.sort_by_key(|a| a.time);
    batch
}

/// Polls an [`AnnotationSource`] on a fixed interval.
#[derive(Debug)]
pub struct Scraper {
    source: Arc<dyn AnnotationSource>,
    events: mpsc::Sender<Annotation>,
    interval: Duration,
    cursor: DateTime<Utc>,
}

impl Scraper {
    /// Creates a scraper whose first window starts now.
    #[must_use]
    pub fn new(
        source: Arc<dyn AnnotationSource>,
        events: mpsc::Sender<Annotation>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            events,
            interval,
            cursor: Utc::now(),
        }
    }

    /// Sets the start of the first window.
    #[must_use]
    pub const fn with_cursor(mut self, cursor: DateTime<Utc>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Returns the start of the next window.
    #[must_use]
    pub const fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls the window `[cursor, now)` once.
    ///
    /// The cursor moves to `now` after the attempt even if the fetch failed.
    /// A `now` that is not after the cursor polls nothing.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::QueueClosed` if the event queue's receiver is
    /// gone. Fetch failures are logged and reported, not returned.
    pub async fn poll_once(
        &mut self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PollReport> {
        let window = ScrapeWindow::new(self.cursor, now);
        let mut report = PollReport::new(window);

        if now <= self.cursor {
            debug!(window = %window, "empty scrape window");
            return Ok(report);
        }

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                report.cancelled = true;
                return Ok(report);
            }
            fetched = self.source.annotations(window) => fetched,
        };
        self.cursor = now;

        let batch = match fetched {
            Ok(batch) => batch,
            Err(e) => {
                error!(window = %window, error = %e, "scrape failed, window skipped");
                report.failed = true;
                return Ok(report);
            }
        };
        report.fetched = batch.len();

        let (batch, outside): (Vec<_>, Vec<_>) =
            batch.into_iter().partition(|a| window.contains_ms(a.time));
        report.out_of_window = outside.len();
        if !outside.is_empty() {
            debug!(window = %window, dropped = outside.len(), "dropped annotations stamped outside the window");
        }

        for annotation in oldest_first(batch) {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                sent = self.events.send(annotation) => {
                    sent.map_err(|_| RelayError::QueueClosed)?;
                    report.emitted += 1;
                }
            }
        }

        if report.fetched > 0 {
            debug!(
                window = %window,
                fetched = report.fetched,
                out_of_window = report.out_of_window,
                emitted = report.emitted,
                "scraped annotations"
            );
        }

        Ok(report)
    }

    /// Polls every interval until `cancel` fires. The first poll happens one
    /// full interval after start; ticks missed behind a slow queue are
    /// delayed, not replayed.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::QueueClosed` if the event queue closes, or
    /// `RelayError::Config` if the interval cannot be scheduled.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(interval = ?self.interval, "scraper started");

        let start = Instant::now()
            .checked_add(self.interval)
            .ok_or_else(|| RelayError::Config(format!("scrape interval {:?} is out of range", self.interval)))?;
        let mut ticker = interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.poll_once(Utc::now(), &cancel).await?;
            if report.cancelled {
                break;
            }
        }

        info!("scraper stopped");
        Ok(())
    }
}
