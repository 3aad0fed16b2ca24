//! Ledger persistence
//!
//! The whole store is written as one JSON document, `ledger.json`, inside the
//! configured data directory. Writes go to a temporary file first and are
//! renamed into place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GovernanceError, Result};
use crate::store::{ProposalStore, StoredProposal};

pub const SNAPSHOT_FILE: &str = "ledger.json";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub proposals: Vec<StoredProposal>,
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Write the store to `dir/ledger.json`.
pub async fn save(store: &ProposalStore, dir: &Path) -> Result<PathBuf> {
    let snapshot = LedgerSnapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        proposals: store.export(),
    };
    let json = serde_json::to_string_pretty(&snapshot)?;

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        GovernanceError::Storage(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let path = snapshot_path(dir);
    let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| GovernanceError::Storage(format!("Failed to write snapshot: {}", e)))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| GovernanceError::Storage(format!("Failed to replace snapshot: {}", e)))?;

    log::info!(
        "Saved {} proposals to {}",
        snapshot.proposals.len(),
        path.display()
    );
    Ok(path)
}

/// Read `dir/ledger.json`. A missing file yields an empty store.
pub async fn load(dir: &Path) -> Result<ProposalStore> {
    let path = snapshot_path(dir);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        log::info!("No snapshot at {}, starting empty", path.display());
        return Ok(ProposalStore::new());
    }

    let data = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| GovernanceError::Storage(format!("Failed to read snapshot: {}", e)))?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&data)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(GovernanceError::Storage(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    let count = snapshot.proposals.len();
    let store = ProposalStore::import(snapshot.proposals)?;
    log::info!("Loaded {} proposals from {}", count, path.display());
    Ok(store)
}
