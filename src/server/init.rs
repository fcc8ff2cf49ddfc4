//! Service assembly and the server run loop

use super::at::{self, AtState, MARKER_CONTINUE, MARKER_END};
use super::config::AppConfig;
use super::loader::load_config;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use ussd_core::{
    wait_for_shutdown_signal, Backends, FlagTable, IndexedListStore, KeyedStore, SessionPipeline, ShutdownController,
    SimpleStorageProvider, UserDataStore,
};
use ussd_handlers::{Handlers, HttpAccountService};
use ussd_menu::{MenuDefinition, MenuEngine};

/// Everything a request needs, built once at startup
pub struct Services {
    pub pipeline: Arc<SessionPipeline>,
}

/// Load resources, open storage and wire handlers, engine and pipeline
pub async fn build_services(config: &AppConfig) -> Result<Services> {
    let flags = FlagTable::from_path(&config.menu.flags)
        .with_context(|| format!("Failed to load flag table {}", config.menu.flags))?;
    let menu = MenuDefinition::from_path(&config.menu.definition)
        .with_context(|| format!("Failed to load menu definition {}", config.menu.definition))?;

    let backends = Backends::from_config(&config.storage)
        .await
        .context("Failed to open storage")?;
    info!(backend = %config.storage.backend, "Storage ready");

    let store: Arc<dyn UserDataStore> = Arc::new(KeyedStore::new(backends.userdata.clone()));
    let lists = IndexedListStore::new(backends.userdata.clone());
    let accounts = Arc::new(
        HttpAccountService::new(
            &config.custodial.base_url,
            &config.custodial.data_url,
            Duration::from_secs(config.custodial.timeout_secs),
        )
        .context("Failed to create account service client")?,
    );
    let handlers = Handlers::with_flag_table(store, lists, accounts, &flags).context("Failed to resolve handler flags")?;

    let mut engine = MenuEngine::new(menu, &flags, Arc::new(handlers))
        .context("Invalid menu definition")?
        .with_max_output(config.menu.max_output);
    if let Some(language) = &config.menu.default_language {
        engine = engine.with_default_language(language.clone());
    }

    let provider = Arc::new(SimpleStorageProvider::new(
        backends.state,
        backends.userdata,
        config.storage.lease_timeout(),
    ));
    let pipeline = SessionPipeline::new(provider, Arc::new(engine)).with_markers(MARKER_CONTINUE, MARKER_END);

    Ok(Services {
        pipeline: Arc::new(pipeline),
    })
}

/// Run the HTTP server until a shutdown signal arrives
pub async fn run() -> Result<()> {
    let config = load_config()?;
    let services = build_services(&config).await?;

    let shutdown_controller = ShutdownController::with_timeout(Duration::from_secs(config.server.shutdown_timeout_secs));
    let state = AtState {
        pipeline: services.pipeline.clone(),
        shutdown: shutdown_controller.clone(),
    };
    let app = at::router(state, &config.server.endpoint);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}{}", addr, config.server.endpoint);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown_controller.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            server_shutdown.shutdown().await;
        })
        .await
        .context("HTTP server error")?;

    services.pipeline.close().await.context("Failed to close storage")?;
    info!("USSD service shutdown complete");
    Ok(())
}
