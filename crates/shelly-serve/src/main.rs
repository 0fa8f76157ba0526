//! `shelly-serve` -- long-running JSON façade over the fleet control plane.
//!
//! Wires the core subsystems (catalogue, registry, discovery, engine,
//! executor) exactly like the CLI, then serves them over HTTP. The core
//! returns domain objects; this layer only routes and renders.

mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shelly_api::TransportConfig;
use shelly_config::Settings;
use shelly_core::catalog::DeviceTypes;
use shelly_core::groups::GroupExecutor;
use shelly_core::{
    CapabilityCatalog, DeviceRegistry, DiscoveryService, GroupManager, ParameterEngine,
};

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "shelly-serve", version, about = "HTTP service for Shelly fleet control")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8900", env = "SHELLY_LISTEN")]
    listen: SocketAddr,

    /// Settings file (default: ./shellyctl.toml)
    #[arg(long, env = "SHELLY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let state = wire(args.config.as_deref())?;

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(listen = %args.listen, "shelly-serve listening");
    axum::serve(listener, routes::build(state)).await?;
    Ok(())
}

/// Build the core subsystems in their required order.
fn wire(config: Option<&std::path::Path>) -> Result<AppState, Box<dyn std::error::Error>> {
    let settings = Settings::load(config)?;
    let transport = TransportConfig {
        timeout: Duration::from_secs(settings.transport.timeout_secs),
        ..TransportConfig::default()
    };

    let catalog = Arc::new(CapabilityCatalog::load(
        settings.capabilities_dir(),
        settings.parameter_mappings_file(),
    )?);
    let device_types = DeviceTypes::load_or_create(&settings.device_types_file())?;

    let registry = Arc::new(DeviceRegistry::new(settings.devices_dir())?);
    registry.load_all()?;

    let discovery = Arc::new(DiscoveryService::new(
        Arc::clone(&registry),
        device_types,
        settings.discovery.clone(),
        &transport,
    )?);

    let engine = Arc::new(ParameterEngine::new(
        &transport,
        Arc::clone(&catalog),
        Arc::clone(&registry),
        Duration::from_secs(settings.executor.reboot_grace_secs),
    )?);

    let groups = Arc::new(GroupManager::new(settings.groups_dir())?);

    let executor = Arc::new(GroupExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&engine),
        Arc::clone(&groups),
        settings.executor.concurrency,
        settings.executor.destructive_verbs.iter().cloned(),
    ));

    Ok(AppState {
        catalog,
        registry,
        engine,
        groups,
        executor,
        discovery,
    })
}
