//! Dev tool: send a session back to the root node

use crate::server::load_config;
use anyhow::{Context, Result};
use ussd_core::{Backends, SimpleStorageProvider, StorageProvider};

/// Reset `session_id`'s durable state; user data is left alone
pub async fn run(session_id: &str) -> Result<()> {
    let config = load_config()?;
    let backends = Backends::from_config(&config.storage)
        .await
        .context("Failed to open storage")?;
    let provider = SimpleStorageProvider::new(backends.state, backends.userdata, config.storage.lease_timeout());

    provider
        .reset_state(session_id)
        .await
        .with_context(|| format!("Failed to reset state for {}", session_id))?;
    provider.close().await.context("Failed to close storage")?;

    println!("State for {} reset to the root node", session_id);
    Ok(())
}
