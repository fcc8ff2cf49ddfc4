//! USSD session service
//!
//! CLI entry point for the USSD menu server and its dev tools.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ussd=info,ussd_core=info,ussd_menu=info,ussd_handlers=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cli::Cli::parse();
    if cli.command.is_some() {
        info!("Starting USSD service v{}", env!("CARGO_PKG_VERSION"));
    }

    cli::run(cli).await
}
