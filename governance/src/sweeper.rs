//! Periodic resolution sweep
//!
//! Lazy resolution on read covers proposals somebody looks at. The sweep
//! covers the rest: each tick resolves every closed window through the same
//! idempotent routine, prunes old terminal proposals when retention is set,
//! and persists the ledger when a data directory is configured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::GovernanceConfig;
use crate::proposal::{ProposalId, ProposalStatus};
use crate::service::GovernanceService;
use crate::snapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub resolved: Vec<(ProposalId, ProposalStatus)>,
    pub pruned: Vec<ProposalId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.pruned.is_empty()
    }
}

pub struct Sweeper {
    service: Arc<GovernanceService>,
    interval: Duration,
    retention: Option<chrono::Duration>,
    data_dir: Option<PathBuf>,
}

impl Sweeper {
    pub fn new(service: Arc<GovernanceService>, config: &GovernanceConfig) -> Self {
        Self {
            service,
            interval: config.sweep_interval(),
            retention: config
                .retention_days
                .map(|days| chrono::Duration::days(days as i64)),
            data_dir: config.data_dir.clone(),
        }
    }

    /// Run one sweep.
    pub async fn tick(&self) -> SweepReport {
        let resolved = self.service.resolve_due();

        let pruned = match self.retention {
            Some(retention) => self
                .service
                .store()
                .prune_terminal(self.service.now() - retention),
            None => Vec::new(),
        };

        let report = SweepReport { resolved, pruned };
        if report.is_empty() {
            log::debug!("Sweep: nothing to resolve");
            return report;
        }

        log::info!(
            "Sweep: resolved {}, pruned {}",
            report.resolved.len(),
            report.pruned.len()
        );
        if let Some(dir) = &self.data_dir {
            if let Err(e) = snapshot::save(self.service.store(), dir).await {
                log::warn!("Sweep could not persist ledger, will retry next tick: {}", e);
            }
        }
        report
    }

    /// Run `tick` on a fixed interval until the handle is shut down.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            log::info!("Resolution sweep every {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        log::info!("Resolution sweep stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, join }
    }
}

pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.join.await {
            log::warn!("Sweep task ended abnormally: {}", e);
        }
    }
}
