//! Weight oracle interface
//!
//! Voting weight (token holdings) lives outside the ledger. The ledger asks
//! for it once per cast and never re-queries on its own.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{GovernanceError, Result};

#[async_trait::async_trait]
pub trait WeightOracle: Send + Sync {
    /// Eligible weight held by `voter_id` at `as_of`.
    async fn weight_at(&self, voter_id: &str, as_of: DateTime<Utc>) -> Result<u64>;

    /// Total addressable weight at `as_of`, used as a proposal's fixed
    /// eligible-weight snapshot.
    async fn total_weight_at(&self, as_of: DateTime<Utc>) -> Result<u64>;
}

/// Table of balances kept in memory.
///
/// The total is either pinned explicitly or taken as the sum of all balances.
#[derive(Debug, Default)]
pub struct StaticWeightOracle {
    balances: DashMap<String, u64>,
    total_override: Option<u64>,
}

/// On-disk form of a balance table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceTable {
    #[serde(default)]
    pub total_supply: Option<u64>,
    #[serde(default)]
    pub balances: HashMap<String, u64>,
}

impl StaticWeightOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_total(total: u64) -> Self {
        Self {
            balances: DashMap::new(),
            total_override: Some(total),
        }
    }

    pub fn from_table(table: BalanceTable) -> Self {
        let balances = DashMap::new();
        for (voter, weight) in table.balances {
            balances.insert(voter, weight);
        }
        Self {
            balances,
            total_override: table.total_supply,
        }
    }

    /// Load a JSON balance table.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GovernanceError::Storage(format!("Failed to read balances {}: {}", path.display(), e))
        })?;
        let table: BalanceTable = serde_json::from_str(&data)?;
        log::info!(
            "Loaded {} balances from {}",
            table.balances.len(),
            path.display()
        );
        Ok(Self::from_table(table))
    }

    pub fn set_weight(&self, voter_id: &str, weight: u64) {
        self.balances.insert(voter_id.to_string(), weight);
    }
}

#[async_trait::async_trait]
impl WeightOracle for StaticWeightOracle {
    async fn weight_at(&self, voter_id: &str, _as_of: DateTime<Utc>) -> Result<u64> {
        Ok(self.balances.get(voter_id).map(|w| *w).unwrap_or(0))
    }

    async fn total_weight_at(&self, _as_of: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .total_override
            .unwrap_or_else(|| {
                self.balances
                    .iter()
                    .fold(0u64, |total, e| total.saturating_add(*e.value()))
            }))
    }
}
