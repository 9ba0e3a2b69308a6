//! Task supervision.
//!
//! Every long-running component runs as a named task on one [`JoinSet`] and
//! shares a single [`CancellationToken`]. The first task to finish, for any
//! reason, cancels the token; the supervisor then waits for the rest and
//! reports the first failure.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{RelayError, Result};
use crate::shutdown::wait_for_shutdown_signal;

/// Name of the task that watches for OS signals.
pub const SHUTDOWN_SIGNAL_TASK: &str = "shutdown-signal";

/// Runs named tasks under a shared cancellation token.
#[derive(Debug, Default)]
pub struct Supervisor {
    cancel: CancellationToken,
    tasks: JoinSet<Result<()>>,
    names: HashMap<Id, String>,
}

impl Supervisor {
    /// Creates an empty supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the number of tasks still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no tasks are running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawns `task` under `name`, handing it the shared token.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handle = self.tasks.spawn(task(self.cancel.clone()));
        info!(task = %name, "task started");
        self.names.insert(handle.id(), name);
    }

    /// Adds a task that finishes on SIGINT, SIGTERM, SIGQUIT or Ctrl-C,
    /// which stops every other task.
    #[must_use]
    pub fn with_shutdown_signal(mut self) -> Self {
        self.spawn(SHUTDOWN_SIGNAL_TASK, |cancel| async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Ok(()),
                signalled = wait_for_shutdown_signal() => signalled.map_err(|e| {
                    RelayError::Config(format!("could not install signal handlers: {e}"))
                }),
            }
        });
        self
    }

    fn task_name(&mut self, id: Id) -> String {
        self.names.remove(&id).unwrap_or_else(|| format!("task-{id}"))
    }

    /// Waits for every task.
    ///
    /// As soon as one task returns the token is cancelled. A panicking task
    /// is reported as `RelayError::TaskPanicked`; an aborted one as success.
    ///
    /// # Errors
    ///
    /// Returns the first error any task produced.
    pub async fn run(mut self) -> Result<()> {
        let mut first_error: Option<RelayError> = None;

        while let Some(joined) = self.tasks.join_next_with_id().await {
            let (name, outcome) = match joined {
                Ok((id, outcome)) => (self.task_name(id), outcome),
                Err(e) => {
                    let name = self.task_name(e.id());
                    let outcome = join_failure(&name, e);
                    (name, outcome)
                }
            };

            match &outcome {
                Ok(()) => info!(task = %name, "task finished"),
                Err(e) => error!(task = %name, error = %e, "task failed"),
            }
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }

            if !self.cancel.is_cancelled() {
                info!(task = %name, remaining = self.tasks.len(), "stopping remaining tasks");
                self.cancel.cancel();
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn join_failure(name: &str, e: JoinError) -> Result<()> {
    if e.is_panic() {
        Err(RelayError::TaskPanicked {
            task: name.to_string(),
            reason: panic_message(e.into_panic().as_ref()),
        })
    } else {
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
