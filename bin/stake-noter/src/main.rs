//! Stake Noter
//!
//! Mirrors staking on the relay chain and asset hub into the destination
//! chain's per-account staking cache. Runs a bootstrap sweep at startup, then
//! periodic sweeps plus a fast path for accounts that start tracking.

mod config;
mod credentials;

use anyhow::{Context, Result};
use clap::Parser;
use config::NoterConfig;
use noter_chain_client::{ChainConnector, SubstrateDestination, SubstrateSource};
use noter_reconciler::{
    run_bootstrap, shutdown, AccountRegistry, BootstrapConfig, BootstrapState, EventWatcher,
    ReconcileError, Reconciler, Scheduler, SourceBinding, Sweeper, WatcherConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Extra time granted to in-flight submissions during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "stake-noter")]
#[command(author, version, about = "Staking score noter", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/noter.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Relay chain RPC endpoint (overrides config file)
    #[arg(long, env = "NOTER_RELAY_RPC_URL")]
    relay_rpc_url: Option<String>,

    /// Asset hub RPC endpoint (overrides config file)
    #[arg(long, env = "NOTER_ASSET_HUB_RPC_URL")]
    asset_hub_rpc_url: Option<String>,

    /// Destination chain RPC endpoint (overrides config file)
    #[arg(long, env = "NOTER_DESTINATION_RPC_URL")]
    destination_rpc_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting stake noter");

    let config = load_config(&cli)?;
    let signer =
        credentials::load_signer(&config.credentials).context("failed to load noter credentials")?;
    info!(origin = ?signer.origin(), "Signing key ready");

    let connector_config = config.connector();
    let (relay, asset_hub, destination) = tokio::try_join!(
        ChainConnector::connect("relay", config.chains.relay_rpc_url.clone(), connector_config.clone()),
        ChainConnector::connect(
            "asset-hub",
            config.chains.asset_hub_rpc_url.clone(),
            connector_config.clone()
        ),
        ChainConnector::connect(
            "destination",
            config.chains.destination_rpc_url.clone(),
            connector_config
        ),
    )
    .context("failed to connect to chains")?;

    let destination = Arc::new(SubstrateDestination::new(
        destination,
        config.destination.pallet.clone(),
        signer.into_pair(),
    ));
    info!(
        signer = %destination.signer_account(),
        pallet = destination.pallet(),
        "Destination configured"
    );

    let reconciler = Arc::new(
        Reconciler::new(
            vec![
                SourceBinding::direct(Arc::new(SubstrateSource::new(relay))),
                SourceBinding::combined(Arc::new(SubstrateSource::new(asset_hub))),
            ],
            destination.clone(),
        )
        .with_submit_timeout(config.submit_timeout()),
    );
    let sweeper = Arc::new(Sweeper::new(
        reconciler.clone(),
        AccountRegistry::new(destination.clone()),
        config.sweep(),
    ));

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        shutdown_tx.send_replace(true);
    });

    let bootstrap_state = BootstrapState::new();
    match run_bootstrap(&sweeper, &bootstrap_state, &BootstrapConfig::default(), &shutdown_rx).await {
        Ok(stats) => info!(
            tracked = stats.tracked,
            updated = stats.updated,
            errored = stats.errored,
            source_failures = stats.source_failures,
            "Initial sweep finished"
        ),
        Err(ReconcileError::Shutdown) => {
            info!("Shutdown requested before bootstrap completed");
            return Ok(());
        }
        Err(e) => return Err(e).context("bootstrap failed"),
    }
    if !bootstrap_state.is_complete() {
        anyhow::bail!("bootstrap returned without completing, refusing to watch events");
    }

    let scheduler = tokio::spawn(
        Scheduler::new(sweeper.clone())
            .with_shutdown(shutdown_rx.clone())
            .run(),
    );
    let mut watcher = EventWatcher::new(reconciler.clone(), destination.clone(), WatcherConfig::default())
        .with_shutdown(shutdown_rx.clone());
    let watcher = tokio::spawn(async move { watcher.run().await });

    info!("Stake noter running, press Ctrl+C to stop");

    let mut stop = shutdown_rx.clone();
    shutdown::requested(&mut stop).await;

    let grace = config.submit_timeout() + SHUTDOWN_GRACE;
    match tokio::time::timeout(grace, async { tokio::join!(scheduler, watcher) }).await {
        Ok((scheduler, watcher)) => {
            let sweeps = scheduler.context("scheduler task failed")?;
            watcher.context("watcher task failed")??;
            info!(sweeps, "Background tasks stopped");
        }
        Err(_) => warn!(grace_secs = grace.as_secs(), "Background tasks did not stop in time"),
    }

    bootstrap_state.reset();
    signal_task.abort();
    info!("Stake noter stopped");
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load the config file and apply CLI overrides.
fn load_config(cli: &Cli) -> Result<NoterConfig> {
    info!(path = %cli.config.display(), "Loading configuration");
    let mut config = NoterConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    apply_overrides(&mut config, cli);
    config.validate().context("invalid configuration after CLI overrides")?;
    Ok(config)
}

fn apply_overrides(config: &mut NoterConfig, cli: &Cli) {
    if let Some(url) = &cli.relay_rpc_url {
        info!(endpoint = %url, "Overriding relay endpoint");
        config.chains.relay_rpc_url = url.clone();
    }
    if let Some(url) = &cli.asset_hub_rpc_url {
        info!(endpoint = %url, "Overriding asset hub endpoint");
        config.chains.asset_hub_rpc_url = url.clone();
    }
    if let Some(url) = &cli.destination_rpc_url {
        info!(endpoint = %url, "Overriding destination endpoint");
        config.chains.destination_rpc_url = url.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_replace_endpoints() {
        let mut config: NoterConfig =
            toml::from_str(include_str!("../config/noter.toml")).unwrap();
        let cli = Cli::parse_from([
            "stake-noter",
            "--relay-rpc-url",
            "wss://relay.example:443",
            "--json-logs",
        ]);

        apply_overrides(&mut config, &cli);

        assert!(cli.json_logs);
        assert_eq!(config.chains.relay_rpc_url, "wss://relay.example:443");
        assert_eq!(config.chains.asset_hub_rpc_url, "ws://127.0.0.1:9945");
        config.validate().unwrap();
    }
}
