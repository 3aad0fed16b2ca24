//! Submission intake
//!
//! Accepts externally authored drafts, stamps them with their class
//! thresholds and the current eligible-weight snapshot, and queues them for
//! review. Reviewers act through `approve` (activation) or the proposer
//! withdraws through the service's cancel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{GovernanceConfig, ProposalClass};
use crate::error::{GovernanceError, Result};
use crate::proposal::{Proposal, ProposalId, ProposalSpec, ProposalStatus};
use crate::service::GovernanceService;

/// A proposal as authored, before thresholds and weight snapshot are fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub title: String,
    pub summary: String,
    pub detail: String,
    pub proposer_id: String,
    pub class: ProposalClass,
    pub voting_opens_at: DateTime<Utc>,
    pub voting_closes_at: DateTime<Utc>,
}

pub struct SubmissionIntake {
    service: Arc<GovernanceService>,
    config: GovernanceConfig,
}

impl SubmissionIntake {
    pub fn new(service: Arc<GovernanceService>, config: GovernanceConfig) -> Self {
        Self { service, config }
    }

    /// Create the proposal and move it into the review queue.
    pub async fn submit(&self, draft: ProposalDraft) -> Result<ProposalId> {
        if draft.title.trim().is_empty() {
            return Err(GovernanceError::InvalidProposalSpec(
                "title must not be empty".to_string(),
            ));
        }
        if draft.proposer_id.trim().is_empty() {
            return Err(GovernanceError::InvalidProposalSpec(
                "proposer must be identified".to_string(),
            ));
        }

        let eligible_weight_snapshot = self.service.eligible_weight().await?;
        let thresholds = self.config.thresholds(draft.class);

        let id = self.service.create_proposal(ProposalSpec {
            title: draft.title,
            summary: draft.summary,
            detail: draft.detail,
            proposer_id: draft.proposer_id,
            voting_opens_at: draft.voting_opens_at,
            voting_closes_at: draft.voting_closes_at,
            eligible_weight_snapshot,
            quorum_threshold_percent: thresholds.quorum_percent,
            approval_threshold_percent: thresholds.approval_percent,
        })?;
        self.service.submit_for_review(&id)?;

        log::info!(
            "Accepted {} submission {} (eligible weight {})",
            draft.class.as_str(),
            id,
            eligible_weight_snapshot
        );
        Ok(id)
    }

    /// Proposals awaiting review, oldest first.
    pub fn review_queue(&self) -> Vec<Proposal> {
        self.service.list_proposals(Some(ProposalStatus::PendingReview))
    }

    /// Reviewer sign-off: activate the proposal.
    pub fn approve(&self, id: &str) -> Result<()> {
        self.service.activate_proposal(id)
    }
}
