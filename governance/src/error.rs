//! Governance error types

use thiserror::Error;

use crate::proposal::ProposalStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GovernanceError {
    #[error("Invalid proposal spec: {0}")]
    InvalidProposalSpec(String),

    #[error("Invalid transition: cannot {action} a proposal in status {from:?}")]
    InvalidTransition {
        from: ProposalStatus,
        action: &'static str,
    },

    #[error("Unauthorized: {requester} is not the proposer of {proposal_id}")]
    Unauthorized {
        proposal_id: String,
        requester: String,
    },

    #[error("Voting window of {0} has already opened")]
    WindowAlreadyOpen(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Duplicate proposal id: {0}")]
    DuplicateProposal(String),

    #[error("Voting not open on {0}")]
    VotingNotOpen(String),

    #[error("Insufficient weight: voter {0} has no voting weight")]
    InsufficientWeight(String),

    #[error("Weight exceeds eligible pool: counted {counted} + {incoming} > {eligible}")]
    WeightExceedsEligible {
        counted: u64,
        incoming: u64,
        eligible: u64,
    },

    #[error("Weight oracle unavailable: {0}")]
    WeightOracleUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse grouping used by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Authorization,
    Timing,
    Dependency,
    Eligibility,
    Internal,
}

impl GovernanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidProposalSpec(_)
            | Self::InvalidTransition { .. }
            | Self::ProposalNotFound(_)
            | Self::DuplicateProposal(_) => ErrorClass::Validation,
            Self::Unauthorized { .. } | Self::WindowAlreadyOpen(_) => ErrorClass::Authorization,
            Self::VotingNotOpen(_) => ErrorClass::Timing,
            Self::WeightOracleUnavailable(_) => ErrorClass::Dependency,
            Self::InsufficientWeight(_) | Self::WeightExceedsEligible { .. } => {
                ErrorClass::Eligibility
            }
            Self::Config(_) | Self::Storage(_) | Self::Serialization(_) => ErrorClass::Internal,
        }
    }

    /// Timing and dependency failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Timing | ErrorClass::Dependency)
    }
}

impl From<serde_json::Error> for GovernanceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for GovernanceError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
