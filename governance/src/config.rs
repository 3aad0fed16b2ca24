//! Governance configuration
//!
//! Loaded from TOML. Every key is optional:
//!
//! ```toml
//! oracle_timeout_ms = 2000
//! sweep_interval_secs = 30
//! data_dir = "/var/lib/governance"
//! balances_file = "/etc/governance/balances.json"
//! retention_days = 90
//!
//! [classes.treasury]
//! quorum_percent = 25.0
//! approval_percent = 67.0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GovernanceError, Result};
use crate::proposal::Percent;

/// Default oracle query bound (2 seconds)
pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 2_000;

/// Default sweep period (30 seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Recognised proposal classes, each with its own thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProposalClass {
    Standard,
    Treasury,
    Emergency,
}

impl ProposalClass {
    pub const ALL: [ProposalClass; 3] = [Self::Standard, Self::Treasury, Self::Emergency];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Treasury => "treasury",
            Self::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub fn default_thresholds(&self) -> ClassThresholds {
        match self {
            Self::Standard => ClassThresholds {
                quorum_percent: 10.0,
                approval_percent: 60.0,
            },
            Self::Treasury => ClassThresholds {
                quorum_percent: 20.0,
                approval_percent: 67.0,
            },
            Self::Emergency => ClassThresholds {
                quorum_percent: 30.0,
                approval_percent: 75.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassThresholds {
    pub quorum_percent: f64,
    pub approval_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GovernanceConfig {
    pub oracle_timeout_ms: u64,
    pub sweep_interval_secs: u64,
    pub data_dir: Option<PathBuf>,
    pub balances_file: Option<PathBuf>,
    pub retention_days: Option<u64>,
    pub classes: HashMap<String, ClassThresholds>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            data_dir: None,
            balances_file: None,
            retention_days: None,
            classes: HashMap::new(),
        }
    }
}

impl GovernanceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GovernanceError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| GovernanceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oracle_timeout_ms == 0 {
            return Err(GovernanceError::Config(
                "oracle_timeout_ms must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(GovernanceError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        for (name, thresholds) in &self.classes {
            if ProposalClass::parse(name).is_none() {
                return Err(GovernanceError::Config(format!(
                    "unknown proposal class '{}'",
                    name
                )));
            }
            if Percent::from_percent(thresholds.quorum_percent).is_none()
                || Percent::from_percent(thresholds.approval_percent).is_none()
            {
                return Err(GovernanceError::Config(format!(
                    "thresholds for '{}' must lie in [0, 100]",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Configured thresholds for `class`, falling back to its defaults.
    pub fn thresholds(&self, class: ProposalClass) -> ClassThresholds {
        self.classes
            .get(class.as_str())
            .copied()
            .unwrap_or_else(|| class.default_thresholds())
    }
}
