//! `tapglue api` - serve the JSON API.

use anyhow::Result;

use super::Stack;
use crate::config::{Config, QueueBackendKind};
use crate::http::{self, AppState};

/// Serves the API until interrupted.
///
/// With the memory queue backend no worker can see the changes this process
/// produces; `tapglue all` runs both sides together.
pub async fn execute(config: Config) -> Result<()> {
    if config.queue.backend == QueueBackendKind::Memory {
        tracing::warn!("memory queue without a worker in this process, changes are not propagated");
    }
    let stack = Stack::open(&config)?;
    let listen = config.server.listen;
    http::serve(AppState::new(stack.services, config), listen).await
}
