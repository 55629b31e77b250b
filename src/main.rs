//! ==============================================================================
//! main.rs - shadow hub entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the hub together and serves it.
//!
//! startup:
//!     1. logging (RUST_LOG, else info until config is read)
//!     2. configuration (hub.toml + environment), then logging.level
//!     3. reading gateway - a misconfigured store is fatal here, and only here
//!     4. coordinator (the shadow)
//!     5. cold start reconcile from the store
//!     6. optional liveness sweep
//!     7. http server
//!
//! architecture:
//!
//!     ┌──────────┐  check-in   ┌────────────────────────────┐  save / fetch  ┌──────────────┐
//!     │  device  │ ──────────► │                            │ ─────────────► │ hosted table │
//!     │ (esp32)  │ ◄────────── │        coordinator         │ ◄───────────── │ (sensor_data)│
//!     └──────────┘  commands   │   (one Arc, shared by all  │                └──────────────┘
//!                              │        http handlers)      │
//!     ┌──────────┐  commands   │                            │
//!     │dashboard │ ──────────► │                            │
//!     │          │ ◄────────── │                            │
//!     └──────────┘  status     └────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use shadow_hub::config::HubConfig;
use shadow_hub::http::{build_router, AppState};
use shadow_hub::{gateway, Coordinator, CoordinatorSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // logging first so config warnings are visible; the filter is swapped
    // for logging.level afterwards unless RUST_LOG was given
    let env_filter = EnvFilter::try_from_default_env();
    let from_env = env_filter.is_ok();
    let (filter, filter_handle) = reload::Layer::new(env_filter.unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    let config = HubConfig::load_or_default();
    if !from_env {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(level) => {
                if let Err(e) = filter_handle.reload(level) {
                    tracing::warn!(level = %config.logging.level, error = %e, "failed to apply logging.level, keeping info");
                }
            }
            Err(e) => tracing::warn!(level = %config.logging.level, error = %e, "bad logging.level, keeping info"),
        }
    }

    println!("===========================================================");
    println!("  Shadow Hub - device shadow & command delivery");
    println!("===========================================================");
    config.print_summary();

    let gateway = gateway::connect(&config.store).context("failed to build reading gateway")?;
    tracing::info!(backend = gateway.backend_tag(), "reading gateway ready");

    let coordinator = Arc::new(Coordinator::new(gateway, CoordinatorSettings::from_config(&config)));

    let outcome = coordinator.reconcile().await;
    tracing::info!(?outcome, "cold start reconcile");

    if config.liveness.sweep_seconds > 0 {
        Arc::clone(&coordinator).spawn_liveness_sweep(Duration::from_secs(config.liveness.sweep_seconds));
        tracing::info!(every_s = config.liveness.sweep_seconds, "liveness sweep running");
    }

    let app = build_router(AppState::new(coordinator));
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "hub listening");
    axum::serve(listener, app).await?;
    Ok(())
}
