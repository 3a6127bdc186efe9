//! `tapglue all` - API and worker sharing one store and queue.

use anyhow::Result;
use tracing::info;

use super::{Stack, push_provider};
use crate::config::Config;
use crate::http::{self, AppState};
use crate::sims::Worker;

pub async fn execute(config: Config) -> Result<()> {
    let stack = Stack::open(&config)?;
    let provider = push_provider(&config)?;
    let worker = Worker::new(
        stack.services.clone(),
        stack.queue.clone(),
        provider,
        config.sims.clone(),
    );
    let listen = config.server.listen;
    let api = http::serve(AppState::new(stack.services, config), listen);

    // The API returns on ctrl-c; the worker only on failure.
    tokio::select! {
        result = api => {
            info!("API stopped, stopping worker");
            result
        },
        result = worker.run() => result,
    }
}
