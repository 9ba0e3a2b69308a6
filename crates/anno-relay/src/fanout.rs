//! Delivery of scraped annotations to subscribers.

use std::sync::Arc;

use anno_store::SubscriptionStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};
use crate::event::Annotation;
use crate::matcher::matches;
use crate::template::MessageTemplate;
use crate::transport::{ChatTarget, ChatTransport, ParseMode};

/// Outcome of delivering one annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscriptions listed from the store.
    pub recipients: usize,
    /// Subscriptions whose tag filter matched.
    pub matched: usize,
    /// Messages the transport accepted.
    pub delivered: usize,
    /// Messages the transport refused.
    pub failed: usize,
}

/// Renders annotations and sends them to every matching subscriber.
#[derive(Debug)]
pub struct Fanout {
    store: SubscriptionStore,
    transport: Arc<dyn ChatTransport>,
    template: MessageTemplate,
}

impl Fanout {
    /// Creates a fanout.
    #[must_use]
    pub fn new(
        store: SubscriptionStore,
        transport: Arc<dyn ChatTransport>,
        template: MessageTemplate,
    ) -> Self {
        Self {
            store,
            transport,
            template,
        }
    }

    /// Delivers `annotation` to every subscription whose tags it carries.
    ///
    /// Subscriptions are listed fresh for every annotation. A failed send is
    /// logged and counted; it does not stop delivery to the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriptions cannot be listed.
    pub async fn dispatch(&self, annotation: &Annotation) -> Result<DeliveryReport> {
        let text = self.template.render(annotation);
        let subscriptions = self.store.list().await?;

        let mut report = DeliveryReport {
            recipients: subscriptions.len(),
            ..DeliveryReport::default()
        };

        for subscription in subscriptions.iter().filter(|s| matches(&annotation.tags, &s.tags)) {
            report.matched += 1;
            let target = ChatTarget::from(subscription);

            match self.transport.send(target, &text, ParseMode::Html).await {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(annotation_id = annotation.id, chat = %target, "annotation delivered");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(annotation_id = annotation.id, chat = %target, error = %e, "delivery failed");
                }
            }
        }

        Ok(report)
    }

    /// Consumes the event queue until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::QueueClosed` if every sender is dropped before
    /// cancellation.
    pub async fn run(self, mut events: mpsc::Receiver<Annotation>, cancel: CancellationToken) -> Result<()> {
        info!(transport = self.transport.name(), "fanout started");

        loop {
            let annotation = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Some(annotation) => annotation,
                    None => {
                        warn!("event queue closed");
                        return Err(RelayError::QueueClosed);
                    }
                },
            };

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.dispatch(&annotation) => outcome,
            };

            match outcome {
                Ok(report) => info!(
                    annotation_id = annotation.id,
                    recipients = report.recipients,
                    matched = report.matched,
                    delivered = report.delivered,
                    failed = report.failed,
                    "annotation processed"
                ),
                Err(e) => error!(
                    annotation_id = annotation.id,
                    error = %e,
                    "could not list subscriptions, annotation skipped"
                ),
            }
        }

        info!("fanout stopped");
        Ok(())
    }
}
