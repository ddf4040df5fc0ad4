// SPDX-License-Identifier: MIT

//! `wsi`: a small driver binary over the Store/Scheduler/Executor stack.
//!
//! Stands in for the out-of-scope HTTP/SSE transport surface (spec section
//! 1): a fixed-tenant, single-process command line that exercises the same
//! [`wsi_cli::api::Api`] facade a real server would sit on top of.

mod api;
mod scenario;

use clap::{Parser, Subcommand};
use scenario::Scenario;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Branch-aware tiled-inference workflow scheduler.
#[derive(Debug, Parser)]
#[command(name = "wsi", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one of the concrete end-to-end scenarios from the spec's
    /// "Testable properties" section and print the resulting job/workflow
    /// snapshots as JSON.
    Demo {
        scenario: Scenario,
        /// Directory job artifacts are written under.
        #[arg(long, default_value = "uploads/results")]
        results_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested; cancellation is cooperative between tiles only");
            shutdown.cancel();
        });
    }

    match cli.command {
        Command::Demo { scenario, results_dir } => {
            let output = scenario::run(scenario, results_dir, &shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
