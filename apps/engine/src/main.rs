use clap::Parser;
use dotenvy::dotenv;
use snews_domain_models::EngineConfig;
use snews_engine::cli::{Cli, Command};
use snews_engine::engine::Engine;
use snews_engine::runner::{spawn_maintenance_loop, Runner};
use snews_infra_db::{ArchivalRepository, DbClient, SweepRepository};
use snews_infra_transport::InMemoryTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    snews_shared_telemetry::init_tracing("snews_engine");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(dispatch())
}

async fn dispatch() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;

    match cli.command {
        Command::ConfigCheck => {
            println!("{config:#?}");
            Ok(())
        }
        Command::Reset => {
            let payload = serde_json::json!({
                "id": "0_hard-reset_0",
                "admin_secret": config.admin_shared_secret,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

/// Wires together the engine, an in-process transport (the only
/// production-ready broker client this deployment ships; see
/// `snews-infra-transport`), the archival writer and the heartbeat
/// silence-scan loop, then drains the observation stream until an
/// interrupt or a fatal transport fault.
async fn run(config: EngineConfig) -> anyhow::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_handler = shutdown.clone();
    ctrlc::set_handler(move || shutdown_for_handler.store(true, Ordering::Relaxed))?;

    let (archival, sweep) = match &config.database_url {
        Some(url) => {
            let client = DbClient::connect(url, config.turso_auth_token.clone()).await?;
            (Some(ArchivalRepository::new(client.clone())), Some(SweepRepository::new(client)))
        }
        None => {
            warn!("DATABASE_URL not set, running without archival persistence");
            (None, None)
        }
    };

    let engine = Engine::new(config.clone());
    let heartbeat = engine.heartbeat_handle();
    let (transport, _handle) = InMemoryTransport::new();
    let transport = Arc::new(transport);

    info!(server_tag = %config.server_tag, leader = config.leader, "engine starting");

    let maintenance_shutdown = shutdown.clone();
    let maintenance = tokio::spawn(spawn_maintenance_loop(heartbeat, sweep, maintenance_shutdown));

    let mut runner = Runner::new(engine, transport, archival, shutdown);
    runner.run().await;

    maintenance.abort();
    info!("engine stopped");
    Ok(())
}
