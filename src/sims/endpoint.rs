//! Push-provider notifications about endpoints.
//!
//! The provider reports delivery results through the endpoint queue as
//! `{"Type": .., "Message": ..}` where the message is itself JSON. Only
//! delivery failures reported by SNS are acted on: the device behind the
//! endpoint is disabled so no further pushes go out to it.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::service::{AppQuery, DeviceQuery, Services, queues};
use crate::platform::queue::QueueService;
use crate::telemetry;

const TYPE_NOTIFICATION: &str = "Notification";
const SERVICE_SNS: &str = "SNS";
const EVENT_DELIVERY_FAILURE: &str = "DeliveryFailure";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Endpoint state reported by the push provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointChange {
    pub endpoint_arn: String,
    pub event_type: String,
    pub failure_message: String,
    pub failure_type: String,
    pub resource: String,
    pub service: String,
}

impl EndpointChange {
    pub fn is_delivery_failure(&self) -> bool {
        self.service == SERVICE_SNS && self.event_type == EVENT_DELIVERY_FAILURE
    }
}

/// Parses a queue body; `None` for anything but a notification.
///
/// # Errors
///
/// Fails on malformed JSON.
pub fn parse(body: &str) -> anyhow::Result<Option<EndpointChange>> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.kind != TYPE_NOTIFICATION {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&envelope.message)?))
}

/// Consumes the endpoint queue.
pub struct EndpointHandler {
    services: Services,
    queue: QueueService,
}

impl EndpointHandler {
    pub fn new(services: Services, queue: QueueService) -> Self {
        Self { services, queue }
    }

    /// Disables every live device registered under `endpoint_arn` in any
    /// enabled application. Returns how many were disabled.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn disable(&self, endpoint_arn: &str) -> anyhow::Result<usize> {
        let apps = self
            .services
            .apps
            .query(
                crate::constants::GLOBAL_NAMESPACE,
                &AppQuery {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut disabled = 0;
        for app in apps {
            let ns = app.namespace();
            let devices = self
                .services
                .devices
                .query(
                    &ns,
                    &DeviceQuery {
                        deleted: Some(false),
                        disabled: Some(false),
                        endpoint_arns: vec![endpoint_arn.to_string()],
                        ..Default::default()
                    },
                )
                .await?;
            for mut device in devices {
                device.disabled = true;
                self.services.devices.put(&ns, device).await?;
                disabled += 1;
            }
        }
        Ok(disabled)
    }

    /// Handles one queue message; returns false when the queue was empty.
    ///
    /// # Errors
    ///
    /// Fails when the queue cannot be read or a device cannot be disabled;
    /// the message then stays on the queue.
    pub async fn step(&self) -> anyhow::Result<bool> {
        let Some(msg) = self.queue.receive(queues::ENDPOINT).await? else {
            return Ok(false);
        };
        telemetry::record_consumed(queues::ENDPOINT);

        match parse(&msg.body) {
            Ok(Some(change)) if change.is_delivery_failure() => {
                let count = self.disable(&change.endpoint_arn).await?;
                info!(
                    target: "sims",
                    endpoint_arn = %change.endpoint_arn,
                    failure_type = %change.failure_type,
                    devices = count,
                    "endpoint disabled after delivery failure"
                );
            },
            Ok(_) => {
                debug!(target: "sims", message_id = %msg.id, "endpoint message skipped");
            },
            Err(e) => {
                warn!(target: "sims", message_id = %msg.id, error = %e, "malformed endpoint message");
            },
        }

        self.queue.delete(queues::ENDPOINT, &msg.receipt_handle).await?;
        telemetry::record_acked(queues::ENDPOINT);
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns the first error of [`EndpointHandler::step`].
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            self.step().await?;
        }
    }
}
