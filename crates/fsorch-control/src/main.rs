//! The `fsorchd` control daemon.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fsorch_control::cli::{Cli, Command};
use fsorch_control::{ControlConfig, ControlPlane, HealthSupervisor};
use fsorch_pool::InMemorySubstrate;
use fsorch_sched::{NodeId, RoundRobinPlacement};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: &PathBuf) -> Result<ControlConfig> {
    if path.exists() {
        ControlConfig::from_file(path)
    } else {
        tracing::warn!(
            "Config file not found, using defaults: {}",
            path.display()
        );
        Ok(ControlConfig::default())
    }
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = ControlConfig::from_file(&path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    tracing::info!("fsorchd starting");

    let storage = Arc::new(InMemorySubstrate::new(config.storage_capacity_bytes));
    let placement = Arc::new(RoundRobinPlacement::new(
        config.placement_nodes.iter().map(|n| NodeId::new(*n)).collect(),
    ));
    let plane = Arc::new(ControlPlane::new(config.clone(), storage, placement));

    HealthSupervisor::new(&plane).spawn();

    let sweeper = plane.clone();
    let sweep_interval = Duration::from_secs(config.reconcile_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            for name in sweeper.store().names().await {
                if let Err(err) = sweeper.reconcile(&name).await {
                    tracing::warn!(filesystem = %name, error = %err, "reconcile pass failed");
                }
            }
        }
    });

    // the in-memory placement runs no real processes; report them healthy
    let pump = plane.clone();
    let pump_interval = Duration::from_secs((config.health_window_secs / 3).max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(pump_interval);
        loop {
            interval.tick().await;
            for record in pump.store().list().await {
                let name = record.spec.name;
                for inst in pump.scheduler().instances(&name).await {
                    let _ = pump
                        .scheduler()
                        .record_heartbeat(&name, inst.id, now_secs())
                        .await;
                }
            }
        }
    });

    let gc = plane.clone();
    let retention = config.tombstone_retention_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = gc.store().gc_tombstones(retention, now_secs()).await;
            if removed > 0 {
                tracing::debug!(removed, "tombstones garbage-collected");
            }
        }
    });

    let app = fsorch_control::api::router(plane.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "admin API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
