//! The annotation source abstraction.

use std::collections::VecDeque;
use std::fmt;

use anno_store::backend::BoxFuture;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::SourceError;
use crate::event::{Annotation, HealthStatus};

/// A half-open time window `[from, to)` to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeWindow {
    /// Inclusive start.
    pub from: DateTime<Utc>,
    /// Exclusive end.
    pub to: DateTime<Utc>,
}

impl ScrapeWindow {
    /// Creates a window.
    #[must_use]
    pub const fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Start as milliseconds since the Unix epoch.
    #[must_use]
    pub fn from_ms(&self) -> i64 {
        self.from.timestamp_millis()
    }

    /// End as milliseconds since the Unix epoch.
    #[must_use]
    pub fn to_ms(&self) -> i64 {
        self.to.timestamp_millis()
    }

    /// Returns true if the epoch-millisecond timestamp `ms` falls in the window.
    #[must_use]
    pub fn contains_ms(&self, ms: i64) -> bool {
        (self.from_ms()..self.to_ms()).contains(&ms)
    }
}

impl fmt::Display for ScrapeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from_ms(), self.to_ms())
    }
}

/// Something annotations can be scraped from.
pub trait AnnotationSource: Send + Sync + fmt::Debug {
    /// Reports the source's health.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached.
    fn health(&self) -> BoxFuture<'_, Result<HealthStatus, SourceError>>;

    /// Fetches the annotations around `window`, in whatever order the
    /// source returns them. Sources may include annotations stamped on
    /// either boundary or regions overlapping the window; callers filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached or answers badly.
    fn annotations(&self, window: ScrapeWindow) -> BoxFuture<'_, Result<Vec<Annotation>, SourceError>>;
}

/// A scripted [`AnnotationSource`] for tests and dry runs.
///
/// Each call to `annotations` pops the next scripted batch; once the script
/// is exhausted it returns empty batches. Every requested window is recorded.
#[derive(Debug, Default)]
pub struct FakeAnnotationSource {
    script: Mutex<VecDeque<Result<Vec<Annotation>, String>>>,
    windows: Mutex<Vec<ScrapeWindow>>,
    health: Mutex<Option<HealthStatus>>,
}

impl FakeAnnotationSource {
    /// Creates a healthy source with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            health: Mutex::new(Some(HealthStatus {
                commit: "fake".to_string(),
                database: "ok".to_string(),
                version: "0.0.0-fake".to_string(),
            })),
            ..Self::default()
        }
    }

    /// Queues a batch for a future call.
    pub fn push_batch(&self, batch: Vec<Annotation>) {
        self.script.lock().push_back(Ok(batch));
    }

    /// Queues a failure for a future call.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.script.lock().push_back(Err(reason.into()));
    }

    /// Makes health checks fail.
    pub fn set_unhealthy(&self) {
        *self.health.lock() = None;
    }

    /// Returns every window requested so far.
    #[must_use]
    pub fn windows(&self) -> Vec<ScrapeWindow> {
        self.windows.lock().clone()
    }
}

impl AnnotationSource for FakeAnnotationSource {
    fn health(&self) -> BoxFuture<'_, Result<HealthStatus, SourceError>> {
        Box::pin(async move {
            self.health.lock().clone().ok_or(SourceError::Status {
                status: 503,
                body: "unhealthy".to_string(),
            })
        })
    }

    fn annotations(&self, window: ScrapeWindow) -> BoxFuture<'_, Result<Vec<Annotation>, SourceError>> {
        Box::pin(async move {
            self.windows.lock().push(window);
            match self.script.lock().pop_front() {
                Some(Ok(batch)) => Ok(batch),
                Some(Err(body)) => Err(SourceError::Status { status: 500, body }),
                None => Ok(Vec::new()),
            }
        })
    }
}
