//! Governance service
//!
//! The request-facing contract over the proposal store. Owns the clock and
//! the weight oracle; everything else is delegated to the store.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};
use crate::oracle::WeightOracle;
use crate::proposal::{Proposal, ProposalId, ProposalSpec, ProposalStatus};
use crate::store::{ProposalStore, ProposalView, ResolveOutcome};
use crate::voting::{TallySnapshot, VoteChoice, VoteRecord};

pub struct GovernanceService {
    store: Arc<ProposalStore>,
    oracle: Arc<dyn WeightOracle>,
    clock: Arc<dyn Clock>,
    oracle_timeout: Duration,
}

impl GovernanceService {
    pub fn new(
        store: Arc<ProposalStore>,
        oracle: Arc<dyn WeightOracle>,
        clock: Arc<dyn Clock>,
        config: &GovernanceConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            clock,
            oracle_timeout: config.oracle_timeout(),
        }
    }

    pub fn store(&self) -> &Arc<ProposalStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn create_proposal(&self, spec: ProposalSpec) -> Result<ProposalId> {
        self.store.create_draft(spec, self.now())
    }

    pub fn submit_for_review(&self, id: &str) -> Result<()> {
        self.store.submit_for_review(id)
    }

    pub fn activate_proposal(&self, id: &str) -> Result<()> {
        self.store.activate(id)
    }

    pub fn cancel_proposal(&self, id: &str, requester_id: &str) -> Result<()> {
        self.store.cancel(id, requester_id, self.now())
    }

    /// Cast or recast a vote.
    ///
    /// The voter's weight is fetched before anything is written; an oracle
    /// failure or timeout leaves the ledger untouched.
    pub async fn cast_vote(
        &self,
        proposal_id: &str,
        voter_id: &str,
        choice: VoteChoice,
    ) -> Result<TallySnapshot> {
        let now = self.now();
        let proposal = self.store.proposal(proposal_id)?;
        if !proposal.is_open_for_voting(now) {
            return Err(GovernanceError::VotingNotOpen(proposal_id.to_string()));
        }

        let weight = self.query_weight(voter_id, now).await?;
        if weight == 0 {
            return Err(GovernanceError::InsufficientWeight(voter_id.to_string()));
        }

        self.store
            .record_vote(proposal_id, voter_id, choice, weight, self.now())
    }

    async fn query_weight(&self, voter_id: &str, as_of: DateTime<Utc>) -> Result<u64> {
        match tokio::time::timeout(self.oracle_timeout, self.oracle.weight_at(voter_id, as_of)).await
        {
            Ok(Ok(weight)) => Ok(weight),
            Ok(Err(e)) => {
                log::warn!("Weight oracle failed for {}: {}", voter_id, e);
                Err(GovernanceError::WeightOracleUnavailable(e.to_string()))
            }
            Err(_) => {
                log::warn!(
                    "Weight oracle timed out after {:?} for {}",
                    self.oracle_timeout,
                    voter_id
                );
                Err(GovernanceError::WeightOracleUnavailable(format!(
                    "timed out after {:?}",
                    self.oracle_timeout
                )))
            }
        }
    }

    /// Total eligible weight right now, bounded by the oracle timeout.
    pub async fn eligible_weight(&self) -> Result<u64> {
        let now = self.now();
        match tokio::time::timeout(self.oracle_timeout, self.oracle.total_weight_at(now)).await {
            Ok(Ok(total)) => Ok(total),
            Ok(Err(e)) => Err(GovernanceError::WeightOracleUnavailable(e.to_string())),
            Err(_) => Err(GovernanceError::WeightOracleUnavailable(format!(
                "timed out after {:?}",
                self.oracle_timeout
            ))),
        }
    }

    /// Projection with live preview, resolving lazily once closed.
    pub fn get_proposal(&self, id: &str) -> Result<ProposalView> {
        self.store.get(id, self.now())
    }

    pub fn get_tally(&self, id: &str) -> Result<TallySnapshot> {
        self.store.tally(id)
    }

    pub fn get_vote(&self, id: &str, voter_id: &str) -> Result<Option<VoteRecord>> {
        self.store.vote_of(id, voter_id)
    }

    pub fn list_proposals(&self, status: Option<ProposalStatus>) -> Vec<Proposal> {
        self.store.list(status)
    }

    pub fn resolve(&self, id: &str) -> Result<ResolveOutcome> {
        self.store.resolve(id, self.now())
    }

    pub fn resolve_due(&self) -> Vec<(ProposalId, ProposalStatus)> {
        self.store.resolve_due(self.now())
    }
}
