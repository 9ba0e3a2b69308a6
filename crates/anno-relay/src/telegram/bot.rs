//! The command loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::UpdateFeed;
use super::commands::CommandHandler;
use super::types::Update;
use crate::error::Result;
use crate::transport::ChatTransport;

/// Default long-poll timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed poll.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(3);

/// Polls for updates and answers commands until cancelled.
#[derive(Debug)]
pub struct TelegramBot {
    feed: Arc<dyn UpdateFeed>,
    transport: Arc<dyn ChatTransport>,
    handler: CommandHandler,
    poll_timeout: Duration,
    retry_pause: Duration,
    offset: i64,
}

impl TelegramBot {
    /// Creates a bot reading updates from `feed` and replying through
    /// `transport`.
    #[must_use]
    pub fn new(
        feed: Arc<dyn UpdateFeed>,
        transport: Arc<dyn ChatTransport>,
        handler: CommandHandler,
    ) -> Self {
        Self {
            feed,
            transport,
            handler,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            retry_pause: DEFAULT_RETRY_PAUSE,
            offset: 0,
        }
    }

    /// Sets the long-poll timeout.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the pause after a failed poll.
    #[must_use]
    pub const fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Returns the next update id to request.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    /// Handles one batch of updates, advancing the offset past each.
    pub async fn process(&mut self, updates: Vec<Update>) {
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(reply) = self.handler.handle(&message).await else {
                continue;
            };

            if let Err(e) = self.transport.send(reply.target, &reply.text, reply.mode).await {
                error!(chat = %reply.target, error = %e, "could not send reply");
            }
        }
    }

    /// Runs the loop. Returns `Ok` once `cancel` fires.
    ///
    /// # Errors
    ///
    /// The loop itself does not fail; poll and delivery errors are logged.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(transport = self.transport.name(), "command loop started");

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = self.feed.poll(self.offset, self.poll_timeout) => polled,
            };

            match polled {
                Ok(updates) => {
                    if !updates.is_empty() {
                        debug!(count = updates.len(), offset = self.offset, "updates received");
                    }
                    self.process(updates).await;
                }
                Err(e) => {
                    warn!(error = %e, "polling updates failed");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.retry_pause) => {}
                    }
                }
            }
        }

        info!("command loop stopped");
        Ok(())
    }
}
