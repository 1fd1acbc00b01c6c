//! Main entry point for the W4RDEN engine.
//! Slim orchestrator that constructs every component once and wires them
//! together; no component reaches for ambient global state.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use w4rden::launch::LaunchMonitor;
use w4rden::registry::PipelineSpawner;
use w4rden::{
    spawn_token_pipeline, BlacklistStore, Config, GateChecker, MigrationDetector, PipelineDeps,
    RelationEngine, TokenRegistry, WalletRegistryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = match Config::from_toml_file(&config_path) {
        Ok(config) => {
            info!(path = %config_path, "loaded config");
            config
        }
        Err(_) => {
            info!("using default config");
            Config::default()
        }
    };

    info!("starting w4rden bundler sentinel");

    let blacklist = Arc::new(BlacklistStore::load(&config.paths.blacklist_file).await?);
    let gates = Arc::new(GateChecker::new(
        config.source.rpc_url.clone(),
        &config.paths.whitelist_file,
        config.gate_cache_ttl(),
    ));
    let engine = Arc::new(RelationEngine::new(config.tracking.blacklist_threshold));
    let migration = Arc::new(MigrationDetector::new(
        config.feed(),
        config.programs.migration_program.clone(),
        config.migration_ttl(),
    ));
    let registry_store = if config.source.redis_url.is_empty() {
        None
    } else {
        Some(Arc::new(WalletRegistryStore::new(&config.source.redis_url)?))
    };

    let deps = Arc::new(PipelineDeps {
        feed: config.feed(),
        engine: engine.clone(),
        gates,
        blacklist: blacklist.clone(),
        registry_store: registry_store.clone(),
    });
    let spawner: PipelineSpawner = {
        let deps = deps.clone();
        Arc::new(move |mint| spawn_token_pipeline(mint, deps.clone()))
    };
    let registry = Arc::new(TokenRegistry::new(
        config.token_ttl(),
        engine.clone(),
        registry_store,
        spawner,
    ));
    let launch = LaunchMonitor::new(
        config.feed(),
        config.programs.launch_program.clone(),
        registry.clone(),
    );

    let handles = vec![
        tokio::spawn(migration.clone().run()),
        tokio::spawn(
            registry
                .clone()
                .run_sweeper(migration.clone(), config.sweep_interval()),
        ),
        tokio::spawn(
            engine
                .clone()
                .run_sweeper(blacklist.clone(), config.sweep_interval()),
        ),
        tokio::spawn(launch.run()),
    ];

    info!("all components started - awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    for handle in &handles {
        handle.abort();
    }
    Ok(())
}
