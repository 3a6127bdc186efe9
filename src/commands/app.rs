//! `tapglue app` - application administration.

use anyhow::{Context, Result};

use super::Stack;
use crate::config::Config;
use crate::constants::GLOBAL_NAMESPACE;
use crate::service::App;

/// Creates an app and prints its namespace and tokens.
pub async fn create(config: &Config, org_id: u64, name: &str, description: &str, in_production: bool) -> Result<App> {
    let stack = Stack::open(config)?;
    let app = stack
        .services
        .apps
        .put(GLOBAL_NAMESPACE, App::new(org_id, name, description, in_production))
        .await
        .context("Failed to create app")?;

    println!("Created app '{}' (id {})", app.name, app.id);
    println!("  namespace:     {}", app.namespace());
    println!("  token:         {}", app.token);
    println!("  backend token: {}", app.backend_token);
    println!("  rate limit:    {}/min", config.rate_limit.limit_for(&app));
    Ok(app)
}
