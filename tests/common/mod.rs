//! Shared fixtures of the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use tapglue::commands::Stack;
use tapglue::config::Config;
use tapglue::controller::{Controllers, Origin};
use tapglue::service::{Device, Platform, QueueSource, User};
use tapglue::sims::{Batch, Consumer, Message, PushProvider, Rules};

pub const NS: &str = "app_1_1";

/// A file-backed deployment in a temporary directory.
pub struct Deployment {
    pub dir: TempDir,
    pub config: Config,
    pub stack: Stack,
    pub ctl: Controllers,
}

pub fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = dir.path().join("tapglue.db");
    config.queue.wait_time_secs = 0;
    config
}

pub fn deployment() -> Result<Deployment> {
    let dir = tempfile::tempdir()?;
    let config = config_in(&dir);
    let stack = Stack::open(&config)?;
    let ctl = Controllers::new(&stack.services);
    Ok(Deployment { dir, config, stack, ctl })
}

impl Deployment {
    pub async fn user(&self, username: &str, first: &str, last: &str) -> Result<User> {
        let user = User {
            username: username.into(),
            email: format!("{username}@example.com"),
            first_name: first.into(),
            last_name: last.into(),
            password: "correct horse".into(),
            ..Default::default()
        };
        Ok(self.ctl.users.create(NS, user).await?)
    }

    /// Registers a phone for `user`, returning its endpoint.
    pub async fn phone(&self, user: &User) -> Result<Device> {
        let token = format!("token-{}", user.id);
        Ok(self
            .ctl
            .devices
            .update(NS, &Origin::application(user.id), "phone", Platform::Android, &token, "en")
            .await?)
    }

    pub fn consumer<T>(&self, queue: &'static str, tx: mpsc::Sender<Batch>) -> Consumer<T>
    where
        T: Rules + Serialize + DeserializeOwned,
    {
        Consumer::new(
            Arc::new(QueueSource::new(self.stack.queue.clone(), queue)),
            queue,
            Arc::new(self.stack.services.clone()),
            tx,
        )
    }
}

/// Push provider remembering every push.
#[derive(Default)]
pub struct RecordingPush {
    pub pushed: Mutex<Vec<(String, Message)>>,
}

impl RecordingPush {
    pub fn recipients(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pushed.lock().iter().map(|(_, m)| m.recipient).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[async_trait]
impl PushProvider for RecordingPush {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn push(&self, device: &Device, message: &Message) -> Result<()> {
        self.pushed.lock().push((device.endpoint_arn.clone(), message.clone()));
        Ok(())
    }
}
