use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use addon_operator::{config_controller, csr_controller, server, telemetry, webhook};

const METRICS_PORT: u16 = 8080;

#[derive(Parser)]
#[command(
    name = "addon-operator",
    about = "Addon lifecycle operator — reconciles managed-cluster addon configs"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the KlusterletAddonConfig CRD YAML to stdout.
    Crd,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Crd) => {
            config_controller::print_crd()?;
            return Ok(());
        }
        None => {}
    }

    let state = server::ServerState::new();

    // Optionally start the webhook server if WEBHOOK_ENABLED=true
    let webhook_enabled = std::env::var("WEBHOOK_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if webhook_enabled {
        let webhook_config = webhook::WebhookConfig::default();
        info!(port = webhook_config.port, "webhook server enabled");
        tokio::spawn(async move {
            if let Err(e) = webhook::run(webhook_config).await {
                error!(%e, "webhook server failed");
            }
        });
    }

    // Run the metrics/health server and both controllers concurrently.
    // If any exits, shut down.
    let state2 = state.clone();
    tokio::select! {
        res = server::run(METRICS_PORT, state.clone()) => {
            error!("metrics server exited: {res:?}");
            res
        }
        res = config_controller::run(state) => {
            res
        }
        res = csr_controller::run(state2) => {
            res
        }
    }
}
