// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use devagent::config::AgentConfig;
use devagent::install::Installer;

#[derive(Debug, Parser)]
#[command(name = "devagent", version, about = "On-device HTTP/WebSocket control agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: AgentConfig,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the agent in the foreground (default).
    Server,
    /// Ask a running agent on this device to stop.
    Stop,
    /// Install one APK through the install policy, then exit.
    Install { apk: PathBuf },
    /// Print the effective configuration as JSON.
    Info,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let result = match cli.command.unwrap_or(Command::Server) {
        Command::Server => devagent::run(cli.config).await,
        Command::Stop => stop(&cli.config).await,
        Command::Install { apk } => install(&cli.config, &apk).await,
        Command::Info => info(&cli.config),
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn stop(config: &AgentConfig) -> anyhow::Result<()> {
    let url = format!("http://127.0.0.1:{}/stop", config.port);
    let resp = reqwest::Client::new().post(&url).send().await?;
    resp.error_for_status()?;
    println!("agent stopped");
    Ok(())
}

async fn install(config: &AgentConfig, apk: &std::path::Path) -> anyhow::Result<()> {
    let installer = Installer::from_config(config);
    installer.force_install(apk).await?;
    println!("installed {}", apk.display());
    Ok(())
}

fn info(config: &AgentConfig) -> anyhow::Result<()> {
    let summary = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config": config,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
