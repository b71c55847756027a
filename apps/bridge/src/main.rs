//! # Yumi Bridge
//!
//! Playback-state sync bridge: mirrors one leader account's playback to
//! any number of participant accounts in near real time.
//!
//! ## Runtime Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Bridge Process                                 │
//! │                                                                         │
//! │  bridge.toml / YUMI_* env ──► BridgeConfig                             │
//! │                                    │                                    │
//! │                                    ▼                                    │
//! │                         SyncCoordinator::run()                          │
//! │                         (leader + N participants)                       │
//! │                                    │                                    │
//! │            ctrl-c ─────────────────┴──► shutdown, stats, exit          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use yumi_sync::{BridgeConfig, SyncCoordinator};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Yumi bridge...");

    // Optional config path as the only positional argument.
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = match BridgeConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::FAILURE;
        }
    };
    info!(
        participants = config.participants.len(),
        device_id = %config.device_id(),
        "Configuration loaded"
    );

    let mut coordinator = SyncCoordinator::new(config);

    let outcome = tokio::select! {
        result = coordinator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };
    coordinator.shutdown().await;

    match outcome {
        Ok(()) => {
            info!("Bridge exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Bridge run failed");
            ExitCode::FAILURE
        }
    }
}
