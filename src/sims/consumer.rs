//! Per-source consumer loop.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{AckOnce, Batch, Lookup, Rules};
use crate::service::{Consumed, Source};
use crate::telemetry;

/// Result of one consume round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing arrived within the wait time.
    Idle,
    /// The change produced no messages and was acknowledged.
    Acked,
    /// A batch of this many messages was handed to the dispatchers.
    Sent(usize),
    /// Evaluating the rules failed; the change stays on the queue.
    Skipped,
}

/// Turns the changes of one source into batches.
pub struct Consumer<T> {
    source: Arc<dyn Source<T>>,
    name: &'static str,
    lookup: Arc<dyn Lookup>,
    batches: mpsc::Sender<Batch>,
}

impl<T: Rules> Consumer<T> {
    pub fn new(
        source: Arc<dyn Source<T>>,
        name: &'static str,
        lookup: Arc<dyn Lookup>,
        batches: mpsc::Sender<Batch>,
    ) -> Self {
        Self {
            source,
            name,
            lookup,
            batches,
        }
    }

    /// Consumes one change.
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be read or acknowledged, or when the
    /// dispatchers are gone.
    pub async fn step(&self) -> anyhow::Result<Step> {
        let change = match self.source.consume().await? {
            Consumed::EmptySource => return Ok(Step::Idle),
            Consumed::Change(change) => change,
        };
        telemetry::record_consumed(self.name);

        let messages = match T::evaluate(self.lookup.as_ref(), &change).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    target: "sims",
                    source = self.name,
                    namespace = %change.namespace,
                    message_id = %change.message_id,
                    error = %e,
                    "rules failed"
                );
                return Ok(Step::Skipped);
            },
        };

        if messages.is_empty() {
            self.source.ack(&change.ack_id).await?;
            telemetry::record_acked(self.name);
            debug!(target: "sims", source = self.name, message_id = %change.message_id, "no messages");
            return Ok(Step::Acked);
        }

        let count = messages.len();
        let source = self.source.clone();
        let ack_id = change.ack_id;
        let batch = Batch {
            source: self.name,
            namespace: change.namespace,
            messages,
            ack: AckOnce::new(move || {
                let source = source.clone();
                let ack_id = ack_id.clone();
                async move { source.ack(&ack_id).await }
            }),
        };

        self.batches
            .send(batch)
            .await
            .map_err(|_| anyhow::anyhow!("{}: batch channel closed", self.name))?;
        debug!(target: "sims", source = self.name, messages = count, "batch queued");
        Ok(Step::Sent(count))
    }

    /// Consumes until the source or the channel fails.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`Consumer::step`].
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            self.step().await?;
        }
    }
}
