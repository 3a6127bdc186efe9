use anyhow::Result;
use clap::Parser;

use tapglue::commands::{self, AppCommand, Cli, Command};
use tapglue::config::Config;
use tapglue::telemetry;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Command::Api(args) | Command::All(args) => args.apply(&mut config),
        Command::Sims(args) => args.apply(&mut config),
        Command::App(AppCommand::Create { store, .. }) => store.apply(&mut config),
    }

    telemetry::init_logging(&config.logging);
    commands::check_config(&config)?;

    match cli.command {
        Command::Api(_) => {
            telemetry::install_metrics(config.metrics.listen)?;
            commands::api::execute(config).await
        },
        Command::Sims(_) => {
            telemetry::install_metrics(config.metrics.listen)?;
            commands::sims::execute(config).await
        },
        Command::All(_) => {
            telemetry::install_metrics(config.metrics.listen)?;
            commands::all::execute(config).await
        },
        Command::App(AppCommand::Create {
            org,
            name,
            description,
            production,
            ..
        }) => {
            commands::app::create(&config, org, &name, &description, production).await?;
            Ok(())
        },
    }
}
