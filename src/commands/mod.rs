//! CLI command implementations for tapglue.
//!
//! - [`api`] - JSON API server
//! - [`sims`] - notification worker
//! - [`all`] - API and worker in one process
//! - [`app`] - application administration

pub mod all;
pub mod api;
pub mod app;
pub mod sims;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, QueueBackendKind};
use crate::platform::cache::CountCache;
use crate::platform::queue::QueueService;
use crate::platform::sql::SqlService;
use crate::service::Services;
use crate::sims::{LogPush, PushProvider, WebhookPush};

#[derive(Parser, Debug)]
#[command(name = "tapglue")]
#[command(version, about = "Multi-tenant social graph backend")]
pub struct Cli {
    /// Configuration file (defaults to tapglue.toml)
    #[arg(short, long, global = true, env = "TAPGLUE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API
    Api(ServeArgs),
    /// Run the notification worker
    Sims(StoreArgs),
    /// Serve the API and run the worker in one process
    All(ServeArgs),
    /// Manage applications
    #[command(subcommand)]
    App(AppCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Database file, `:memory:` for a transient store
    #[arg(long)]
    pub database: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Create an application and print its tokens
    Create {
        /// Owning organization
        #[arg(long)]
        org: u64,
        /// Application name
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Apply the production rate limit
        #[arg(long)]
        production: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
}

impl StoreArgs {
    /// Applies the flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.database {
            config.database.path.clone_from(path);
        }
    }
}

impl ServeArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        self.store.apply(config);
    }
}

/// Storage and queue of one process.
#[derive(Clone)]
pub struct Stack {
    pub services: Services,
    pub queue: QueueService,
}

impl Stack {
    /// Opens the database and the change queue named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open(config: &Config) -> Result<Self> {
        let sql = if config.database.is_memory() {
            SqlService::memory().context("Failed to open in-memory database")?
        } else {
            if let Some(parent) = config.database.path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            SqlService::file(&config.database.path)
                .with_context(|| format!("Failed to open database {}", config.database.path.display()))?
        };

        let queue_config = config.queue.service_config();
        let queue = match config.queue.backend {
            QueueBackendKind::Sqlite => QueueService::sqlite(sql.clone(), queue_config),
            QueueBackendKind::Memory => QueueService::memory(queue_config),
        };

        let cache = CountCache::new(
            Duration::from_secs(config.cache.count_ttl_secs),
            config.cache.max_capacity,
        );
        info!(
            database = %config.database.path.display(),
            queue = ?config.queue.backend,
            "storage opened"
        );

        Ok(Self {
            services: Services::new(sql, queue.clone(), cache),
            queue,
        })
    }
}

/// Push provider of the configured webhook, logging pushes when unset.
///
/// # Errors
///
/// Returns an error if the webhook client cannot be built.
pub fn push_provider(config: &Config) -> Result<Arc<dyn PushProvider>> {
    match &config.sims.push_url {
        Some(url) => Ok(Arc::new(WebhookPush::new(url.clone())?)),
        None => {
            warn!(target: "sims", "no push_url configured, pushes are only logged");
            Ok(Arc::new(LogPush))
        },
    }
}

/// Validates the configuration, printing warnings.
///
/// # Errors
///
/// Returns an error listing every fatal problem.
pub fn check_config(config: &Config) -> Result<()> {
    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    Ok(())
}
