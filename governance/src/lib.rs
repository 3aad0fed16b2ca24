//! Governance Proposal Ledger
//!
//! Proposal lifecycle, weighted vote accounting and quorum/approval
//! resolution for a centrally operated governance service.
//!
//! - Proposals move `Draft -> PendingReview -> Active` and end as
//!   `Approved`, `Rejected`, `Expired` or `Cancelled`.
//! - Each voter holds at most one active vote per proposal; recasting
//!   replaces it atomically.
//! - A closed window is resolved exactly once, lazily on read or by the
//!   periodic sweep.

pub mod clock;
pub mod config;
pub mod error;
pub mod intake;
pub mod oracle;
pub mod proposal;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod sweeper;
pub mod tally;
pub mod voting;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClassThresholds, GovernanceConfig, ProposalClass};
pub use error::{ErrorClass, GovernanceError, Result};
pub use intake::{ProposalDraft, SubmissionIntake};
pub use oracle::{BalanceTable, StaticWeightOracle, WeightOracle};
pub use proposal::{
    Percent, Proposal, ProposalId, ProposalSpec, ProposalStatus, Resolution, WindowPhase,
};
pub use service::GovernanceService;
pub use store::{ProposalStore, ProposalView, ResolveOutcome, StoredProposal};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
pub use tally::TallyOutcome;
pub use voting::{Tally, TallySnapshot, VoteChoice, VoteLedger, VoteRecord, VoterId};
