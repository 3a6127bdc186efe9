//! Notification worker.
//!
//! One consumer per change source evaluates the source's rules and hands the
//! resulting messages as a [`Batch`] to a pool of dispatchers over a bounded
//! channel. A dispatcher pushes every message to the live devices of its
//! recipient and acknowledges the change once all pushes went out. A change
//! whose pushes fail stays unacknowledged and is re-delivered by the queue.
//!
//! A fifth loop reads push-provider notifications from the endpoint queue
//! and disables devices whose delivery failed.

pub mod consumer;
pub mod dispatch;
pub mod endpoint;
pub mod rules;


use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::SimsConfig;
use crate::error::Result;
use crate::platform::queue::QueueService;
use crate::service::{Connection, Event, Object, QueueSource, Services, queues};

pub use consumer::Consumer;
pub use dispatch::{Dispatcher, LogPush, PushProvider, WebhookPush};
pub use endpoint::EndpointHandler;
pub use rules::{Lookup, Rules};

/// A notification for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub recipient: u64,
    pub message: String,
    pub urn: String,
}

type AckFn = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Acknowledgement of a change that runs at most once.
pub struct AckOnce {
    done: AtomicBool,
    ack: AckFn,
}

impl AckOnce {
    pub fn new<F, Fut>(ack: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            done: AtomicBool::new(false),
            ack: Box::new(move || Box::pin(ack())),
        }
    }

    /// Acknowledges the change; returns false when it was already done.
    ///
    /// # Errors
    ///
    /// Returns the queue error of the first call.
    pub async fn ack(&self) -> Result<bool> {
        if self
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        (self.ack)().await?;
        Ok(true)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Messages produced by one change.
pub struct Batch {
    /// Name of the change source.
    pub source: &'static str,
    pub namespace: String,
    pub messages: Vec<Message>,
    pub ack: AckOnce,
}

/// Wiring of the notification worker.
pub struct Worker {
    services: Services,
    queue: QueueService,
    provider: Arc<dyn PushProvider>,
    config: SimsConfig,
}

impl Worker {
    pub fn new(services: Services, queue: QueueService, provider: Arc<dyn PushProvider>, config: SimsConfig) -> Self {
        Self {
            services,
            queue,
            provider,
            config,
        }
    }

    /// Runs consumers, dispatchers and the endpoint loop until one of them
    /// stops.
    ///
    /// # Errors
    ///
    /// Returns the error of the first loop that failed.
    pub async fn run(self) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel(self.config.batch_buffer.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let lookup: Arc<dyn Lookup> = Arc::new(self.services.clone());

        let mut tasks = JoinSet::new();

        let connections = Consumer::<Connection>::new(
            Arc::new(QueueSource::new(self.queue.clone(), queues::CONNECTION)),
            queues::CONNECTION,
            lookup.clone(),
            tx.clone(),
        );
        tasks.spawn(connections.run());

        let events = Consumer::<Event>::new(
            Arc::new(QueueSource::new(self.queue.clone(), queues::EVENT)),
            queues::EVENT,
            lookup.clone(),
            tx.clone(),
        );
        tasks.spawn(events.run());

        let objects = Consumer::<Object>::new(
            Arc::new(QueueSource::new(self.queue.clone(), queues::OBJECT)),
            queues::OBJECT,
            lookup,
            tx,
        );
        tasks.spawn(objects.run());

        let dispatchers = self.config.dispatchers.max(1);
        for _ in 0..dispatchers {
            let dispatcher = Dispatcher::new(self.services.clone(), self.provider.clone());
            tasks.spawn(dispatcher.run(rx.clone()));
        }

        let endpoint = EndpointHandler::new(self.services.clone(), self.queue.clone());
        tasks.spawn(endpoint.run());

        info!(
            target: "sims",
            dispatchers,
            provider = self.provider.name(),
            "notification worker started"
        );

        let outcome = match tasks.join_next().await {
            Some(Ok(result)) => result,
            Some(Err(join)) => Err(anyhow::anyhow!("sims task panicked: {join}")),
            None => Ok(()),
        };
        if let Err(e) = &outcome {
            error!(target: "sims", error = %e, "notification worker stopped");
        }
        tasks.shutdown().await;
        outcome
    }
}
