//! wPOKT Validator Service
//!
//! Entry point for the bridge validator daemon. Startup is strict: a
//! configuration problem, an unreachable store or chain, or a multisig
//! set that does not hash to the vault address aborts the process. Once
//! running, every service logs and retries instead of propagating errors,
//! and SIGINT/SIGTERM drains the services before the store disconnects.

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, info};

use wpokt_validator::config::Config;
use wpokt_validator::crypto::EthSigner;
use wpokt_validator::db::Database;
use wpokt_validator::eth_client::EthClient;
use wpokt_validator::executor::{
    burn::BURN_EXECUTOR_NAME, mint::MINT_EXECUTOR_NAME, BurnExecutor, MintExecutor,
};
use wpokt_validator::health::{find_last_health, HealthService, HEALTH_SERVICE_NAME};
use wpokt_validator::models::HealthRecord;
use wpokt_validator::monitor::{
    burn::BURN_MONITOR_NAME, mint::MINT_MONITOR_NAME, BurnMonitor, MintMonitor,
};
use wpokt_validator::multisig::MultisigKey;
use wpokt_validator::pocket_client::PocketClient;
use wpokt_validator::service::{new_health_slot, spawn_service, HealthSlot, PeriodicService};
use wpokt_validator::signer::{
    burn::BURN_SIGNER_NAME, mint::MINT_SIGNER_NAME, BurnSigner, MintSigner,
};

#[derive(Parser, Debug)]
#[command(name = "wpokt-validator")]
#[command(about = "Validator daemon for the POKT <-> wPOKT token bridge")]
struct Args {
    /// Path to the YAML config file
    #[arg(long)]
    config: Option<String>,

    /// Path to an env file of KEY=VALUE overrides
    #[arg(long)]
    env: Option<String>,
}

fn init_logging() {
    let level = match std::env::var("LOG_LEVEL").unwrap_or_default().to_lowercase().as_str() {
        "debug" => tracing::Level::DEBUG,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Startup checks against both chains and the configured multisig set.
async fn validate_networks(config: &Config) -> Result<()> {
    let eth_client = EthClient::new(&config.ethereum)?;
    let node_chain_id = eth_client.get_chain_id().await?;
    if node_chain_id != config.ethereum.chain_id {
        return Err(anyhow!(
            "ethereum chain id mismatch: config {} node {}",
            config.ethereum.chain_id,
            node_chain_id
        ));
    }
    debug!(chain_id = %node_chain_id, "connected to ethereum node");

    let pocket_client = PocketClient::new(&config.pocket)?;
    let height = pocket_client.get_height().await?;
    debug!(height, "connected to pocket node");

    let multisig = MultisigKey::new(
        &config.pocket.multisig_public_keys,
        config.pocket.multisig_threshold,
    )?;
    if multisig.address() != config.pocket.vault_address.to_lowercase() {
        return Err(anyhow!(
            "multisig public keys hash to {}, expected vault address {}",
            multisig.address(),
            config.pocket.vault_address
        ));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref(), args.env.as_deref())?;
    info!("configuration loaded");

    validate_networks(&config).await?;

    let db = Database::connect(&config.mongodb).await?;
    db.setup_indexes().await?;
    info!("database ready");

    let eth_signer = EthSigner::from_hex_key(&config.ethereum.private_key)?;
    let last_health: Option<HealthRecord> = if config.health.read_last_health {
        find_last_health(&db, &config.pocket.vault_address.to_lowercase(), eth_signer.address())
            .await
    } else {
        None
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handles = Vec::new();
    let mut slots: Vec<HealthSlot> = Vec::new();

    macro_rules! start_service {
        ($name:expr, $service:expr) => {{
            let service = $service;
            let slot = new_health_slot($name);
            *slot.write().await = service.health();
            slots.push(slot.clone());
            handles.push(spawn_service(service, slot, stop_rx.clone()));
        }};
    }

    if config.mint_monitor.enabled {
        start_service!(
            MINT_MONITOR_NAME,
            MintMonitor::new(&config, db.clone(), last_health.as_ref()).await?
        );
    } else {
        info!("mint monitor disabled");
    }
    if config.mint_signer.enabled {
        start_service!(MINT_SIGNER_NAME, MintSigner::new(&config, db.clone())?);
    } else {
        info!("mint signer disabled");
    }
    if config.mint_executor.enabled {
        start_service!(
            MINT_EXECUTOR_NAME,
            MintExecutor::new(&config, db.clone(), last_health.as_ref()).await?
        );
    } else {
        info!("mint executor disabled");
    }
    if config.burn_monitor.enabled {
        start_service!(
            BURN_MONITOR_NAME,
            BurnMonitor::new(&config, db.clone(), last_health.as_ref()).await?
        );
    } else {
        info!("burn monitor disabled");
    }
    if config.burn_signer.enabled {
        start_service!(BURN_SIGNER_NAME, BurnSigner::new(&config, db.clone())?);
    } else {
        info!("burn signer disabled");
    }
    if config.burn_executor.enabled {
        start_service!(BURN_EXECUTOR_NAME, BurnExecutor::new(&config, db.clone())?);
    } else {
        info!("burn executor disabled");
    }

    start_service!(
        HEALTH_SERVICE_NAME,
        HealthService::new(
            db.clone(),
            std::time::Duration::from_secs(config.health.interval_secs),
            slots.clone(),
            &config.pocket.vault_address,
            eth_signer.address(),
        )
    );

    info!("validator started");

    wait_for_shutdown_signal().await;
    debug!("stopping services");
    let _ = stop_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    db.disconnect().await;
    info!("validator stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received interrupt"),
            _ = sigterm.recv() => info!("received terminate"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received interrupt");
    }
}
