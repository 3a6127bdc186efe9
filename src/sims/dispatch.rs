//! Delivery of batches to push providers.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::{Batch, Message};
use crate::platform::retry::{RetryPolicy, StatusError, retry};
use crate::service::{Device, DeviceQuery, Services};
use crate::telemetry;

/// Sends one message to one device.
#[async_trait]
pub trait PushProvider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn push(&self, device: &Device, message: &Message) -> anyhow::Result<()>;
}

/// Provider that only logs the pushes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPush;

#[async_trait]
impl PushProvider for LogPush {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn push(&self, device: &Device, message: &Message) -> anyhow::Result<()> {
        info!(
            target: "sims",
            recipient = message.recipient,
            endpoint_arn = %device.endpoint_arn,
            urn = %message.urn,
            "{}",
            message.message
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct PushPayload<'a> {
    endpoint_arn: &'a str,
    platform: u8,
    recipient_id: u64,
    message: &'a str,
    urn: &'a str,
}

/// Provider posting every push as JSON to a webhook.
#[derive(Clone)]
pub struct WebhookPush {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl WebhookPush {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            policy: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl PushProvider for WebhookPush {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn push(&self, device: &Device, message: &Message) -> anyhow::Result<()> {
        let payload = PushPayload {
            endpoint_arn: &device.endpoint_arn,
            platform: device.platform.into(),
            recipient_id: message.recipient,
            message: &message.message,
            urn: &message.urn,
        };

        retry(&self.policy, "push", || async {
            let resp = self.client.post(&self.url).json(&payload).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(StatusError(status.as_u16()).into());
            }
            Ok(())
        })
        .await
    }
}

/// Pushes the messages of batches and acknowledges their changes.
pub struct Dispatcher {
    services: Services,
    provider: Arc<dyn PushProvider>,
}

impl Dispatcher {
    pub fn new(services: Services, provider: Arc<dyn PushProvider>) -> Self {
        Self { services, provider }
    }

    async fn devices(&self, ns: &str, recipient: u64) -> anyhow::Result<Vec<Device>> {
        Ok(self
            .services
            .devices
            .query(
                ns,
                &DeviceQuery {
                    deleted: Some(false),
                    disabled: Some(false),
                    user_ids: vec![recipient],
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Pushes every message of `batch` and acknowledges it.
    ///
    /// # Errors
    ///
    /// Returns the first failing lookup or push; the batch then stays
    /// unacknowledged.
    pub async fn dispatch(&self, batch: &Batch) -> anyhow::Result<()> {
        let mut sent = 0u64;
        for message in &batch.messages {
            for device in self.devices(&batch.namespace, message.recipient).await? {
                self.provider.push(&device, message).await?;
                sent += 1;
            }
        }
        telemetry::record_sent(batch.source, sent);

        if batch.ack.ack().await? {
            telemetry::record_acked(batch.source);
        }
        debug!(
            target: "sims",
            source = batch.source,
            messages = batch.messages.len(),
            pushes = sent,
            "batch dispatched"
        );
        Ok(())
    }

    /// Dispatches batches from the shared receiver until every sender is
    /// gone.
    ///
    /// # Errors
    ///
    /// Never fails; dispatch errors are logged and the batch is dropped.
    pub async fn run(self, batches: Arc<Mutex<mpsc::Receiver<Batch>>>) -> anyhow::Result<()> {
        loop {
            let next = batches.lock().await.recv().await;
            let Some(batch) = next else {
                return Ok(());
            };
            if let Err(e) = self.dispatch(&batch).await {
                telemetry::record_dispatch_error(batch.source);
                warn!(
                    target: "sims",
                    source = batch.source,
                    namespace = %batch.namespace,
                    error = %e,
                    "dispatch failed"
                );
            }
        }
    }
}
