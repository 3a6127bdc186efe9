//! Push devices of the current user.

use rand::RngCore;
use tracing::debug;

use super::Origin;
use crate::error::Result;
use crate::service::{Device, DeviceQuery, Platform, Services};

/// Handle of a device in the push provider.
fn endpoint_arn(platform: Platform) -> String {
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    format!("endpoint/{}/{}", u8::from(platform), hex::encode(raw))
}

/// Device operations.
#[derive(Clone)]
pub struct DeviceController {
    services: Services,
}

impl DeviceController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn live(&self, ns: &str, origin: &Origin, device_id: &str) -> Result<Vec<Device>> {
        self.services
            .devices
            .query(
                ns,
                &DeviceQuery {
                    deleted: Some(false),
                    device_ids: vec![device_id.to_string()],
                    user_ids: vec![origin.user_id],
                    ..Default::default()
                },
            )
            .await
    }

    /// Registers the device or refreshes its token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDevice`] for missing fields.
    pub async fn update(
        &self,
        ns: &str,
        origin: &Origin,
        device_id: &str,
        platform: Platform,
        token: &str,
        language: &str,
    ) -> Result<Device> {
        let existing = self.live(ns, origin, device_id).await?.into_iter().next();

        match existing {
            Some(device) if device.token == token && device.language == language && !device.disabled => {
                debug!(target: "controller", device_id, "device unchanged");
                Ok(device)
            },
            Some(mut device) => {
                device.token = token.to_string();
                device.language = language.to_string();
                device.disabled = false;
                self.services.devices.put(ns, device).await
            },
            None => {
                let device = Device {
                    device_id: device_id.to_string(),
                    endpoint_arn: endpoint_arn(platform),
                    platform,
                    token: token.to_string(),
                    user_id: origin.user_id,
                    language: language.to_string(),
                    ..Default::default()
                };
                self.services.devices.put(ns, device).await
            },
        }
    }

    /// Soft-deletes the device. Deleting an unknown device succeeds.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn delete(&self, ns: &str, origin: &Origin, device_id: &str) -> Result<()> {
        for mut device in self.live(ns, origin, device_id).await? {
            device.deleted = true;
            self.services.devices.put(ns, device).await?;
        }
        Ok(())
    }
}
