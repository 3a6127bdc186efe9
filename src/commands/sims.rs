//! `tapglue sims` - run the notification worker.

use anyhow::Result;

use super::{Stack, push_provider};
use crate::config::Config;
use crate::sims::Worker;

pub async fn execute(config: Config) -> Result<()> {
    let stack = Stack::open(&config)?;
    let provider = push_provider(&config)?;
    let worker = Worker::new(stack.services, stack.queue, provider, config.sims.clone());

    tokio::select! {
        result = worker.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "sims", "shutdown requested");
            Ok(())
        },
    }
}
