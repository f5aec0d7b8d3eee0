mod bootstrap;
mod commands;
mod health;
mod webhook;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use octorelay_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(name = "octorelay-server", about = "GitHub to chat-room event relay")]
struct Args {
    /// Path to the configuration file (defaults to octorelay.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (trace|debug|info|warn|error).
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(config: &AppConfig) {
    use octorelay_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let args = Args::parse();

    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions {
        config_path: args.config,
        overrides: ConfigOverrides { log_level: args.log_level, ..ConfigOverrides::default() },
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.associations.clone(),
    )
    .await?;

    let webhook_state = webhook::WebhookState {
        associations: app.associations.clone(),
        chat: app.chat.clone(),
        bot_alias: app.config.relay.bot_alias.clone(),
    };
    let command_service = commands::RelayCommandService::new(
        app.associations.clone(),
        app.tokens.clone(),
        app.hooks.clone(),
        app.chat.clone(),
        app.config.relay.webhook_url(),
    );
    let command_state = commands::CommandState::new(command_service, app.chat.clone());

    let router = webhook::router(webhook_state).merge(commands::router(command_state));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        webhook_url = %app.config.relay.webhook_url(),
        "octorelay-server started"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "octorelay-server stopping");

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
