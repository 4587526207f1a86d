//! CLI commands module
//!
//! Contains all CLI command implementations plus the JSON credential store
//! they share.

pub mod credentials;
pub mod limits;
pub mod search;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use tunedeck_core::{Credential, CredentialPool, PoolConfig, RotationEvent};

/// Shared context for all commands
pub struct Context {
    pub store_path: PathBuf,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Resolve the credential store location: explicit flag/env wins, otherwise
/// `~/.tunedeck/store.json`.
pub fn resolve_store_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        log::debug!("[store] using override path {}", path);
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".tunedeck").join("store.json");
    log::debug!("[store] using default path {}", path.display());
    Ok(path)
}

/// On-disk shape of the credential store
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub active_key: Option<String>,
    #[serde(default)]
    pub history: Vec<RotationEvent>,
}

/// Load the saved state, returning the empty state when the file is absent
pub fn load_state(path: &Path) -> Result<SavedState> {
    if !path.exists() {
        return Ok(SavedState::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read store: {}", path.display()))?;
    let state = serde_json::from_str(&raw)
        .with_context(|| format!("Store is not valid JSON: {}", path.display()))?;
    Ok(state)
}

/// Persist the pool back to disk, creating parent directories on first run
pub async fn save_pool(path: &Path, pool: &CredentialPool) -> Result<()> {
    let state = SavedState {
        credentials: pool.credentials().await,
        active_key: pool.active().await.map(|c| c.key),
        history: pool.history().await,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(&state)?;
    std::fs::write(path, raw)
        .with_context(|| format!("Failed to write store: {}", path.display()))?;
    log::debug!(
        "[store] saved {} credential(s) to {}",
        state.credentials.len(),
        path.display()
    );
    Ok(())
}

/// Rehydrate a pool from the saved state
pub fn load_pool(path: &Path) -> Result<CredentialPool> {
    let state = load_state(path)?;
    Ok(CredentialPool::from_saved(
        state.credentials,
        state.active_key,
        state.history,
        PoolConfig::default(),
    ))
}
