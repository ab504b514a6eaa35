use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use vigia_core::{Orchestrator, OrchestratorConfig};
use vigia_hw::{ActuatorGateway, GatewayConfig};
use vigia_store::AccessStore;

mod config;
mod dbus_interface;
mod signaler;

use config::Config;
use dbus_interface::AccessService;
use signaler::GatewaySignaler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigiad starting");
    let config = Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }

    let store = AccessStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "database open");

    // Fail fast on a missing or corrupt model; the session then lives on
    // its own thread.
    let faces = vigia_face::spawn_pipeline(
        &config.model_path.to_string_lossy(),
        config.face_confidence,
    )
    .context("loading face pipeline model")?;

    let layout = match &config.actuator_layout {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading actuator layout {}", path.display()))?;
            GatewayConfig::from_toml(&text).context("parsing actuator layout")?
        }
        None => GatewayConfig::default(),
    };
    let gateway = Arc::new(ActuatorGateway::open(layout));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(faces),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(GatewaySignaler::new(Arc::clone(&gateway))),
        OrchestratorConfig {
            match_threshold: config.match_threshold,
            alert_threshold: config.alert_threshold,
            attempt_ttl: config.attempt_ttl,
            door_offset: config.door_offset,
        },
    ));

    // Periodic eviction of stale attempt counters.
    {
        let orchestrator = Arc::clone(&orchestrator);
        let mut tick = tokio::time::interval(config.evict_interval);
        tokio::spawn(async move {
            tick.tick().await; // first tick fires immediately; skip it
            loop {
                tick.tick().await;
                let evicted = orchestrator.tracker().evict_stale(Instant::now());
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted stale attempt counters");
                }
            }
        });
    }

    let service = AccessService {
        orchestrator,
        store,
        gateway,
    };

    let _connection = zbus::connection::Builder::session()?
        .name("org.vigia.Access1")?
        .serve_at("/org/vigia/Access1", service)?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!("vigiad ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("vigiad shutting down");

    Ok(())
}
