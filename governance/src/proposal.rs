//! Proposal types and lifecycle

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

pub type ProposalId = String;

/// Lifecycle status of a proposal.
///
/// ```text
/// Draft -> PendingReview -> Active -> {Approved | Rejected | Expired}
/// Draft | PendingReview | Active -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProposalStatus {
    Draft,
    PendingReview,
    Active,
    Approved,
    Rejected,
    /// Window closed with no counted weight
    Expired,
    Cancelled,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Expired | Self::Cancelled
        )
    }

    /// Whether `next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (*self, next),
            (Draft, PendingReview)
                | (PendingReview, Active)
                | (Active, Approved)
                | (Active, Rejected)
                | (Active, Expired)
                | (Draft, Cancelled)
                | (PendingReview, Cancelled)
                | (Active, Cancelled)
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pendingreview" | "pending-review" | "pending_review" => Some(Self::PendingReview),
            "active" => Some(Self::Active),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A percentage in [0, 100], kept exactly as given.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct Percent(f64);

impl Percent {
    pub const ZERO: Percent = Percent(0.0);
    pub const HUNDRED: Percent = Percent(100.0);

    pub fn from_percent(value: f64) -> Option<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return None;
        }
        // abs folds -0.0 into 0.0
        Some(Self(value.abs()))
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// Exact check of `numerator / denominator * 100 >= self`.
    ///
    /// The threshold is compared as the exact binary value it holds, with no
    /// intermediate rounding. An empty denominator counts as 0 %.
    pub fn is_met_by(&self, numerator: u64, denominator: u64) -> bool {
        if denominator == 0 {
            return self.0 == 0.0;
        }
        let (mantissa, shift) = dyadic_parts(self.0);
        if mantissa == 0 {
            return true;
        }

        // numerator * 100 * 2^shift >= mantissa * denominator
        let lhs = numerator as u128 * 100;
        let rhs = mantissa as u128 * denominator as u128;
        if lhs == 0 {
            return false;
        }
        let lhs_bits = 128 - lhs.leading_zeros();
        if lhs_bits + shift > 127 {
            // lhs * 2^shift >= 2^127, beyond any rhs (< 2^117)
            return true;
        }
        (lhs << shift) >= rhs
    }
}

/// Split a finite, non-negative `f64` below 2^53 into `mantissa / 2^shift`
/// with the mantissa made odd (or zero).
fn dyadic_parts(value: f64) -> (u64, u32) {
    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mut mantissa, mut exp) = if exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exponent - 1075)
    };
    if mantissa == 0 {
        return (0, 0);
    }
    let trailing = mantissa.trailing_zeros() as i32;
    mantissa >>= trailing;
    exp += trailing;
    if exp >= 0 {
        // Whole number; fold the power back into the mantissa
        return (mantissa << exp, 0);
    }
    (mantissa, (-exp) as u32)
}

impl TryFrom<f64> for Percent {
    type Error = String;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        Self::from_percent(value).ok_or_else(|| format!("percentage {} outside [0, 100]", value))
    }
}

impl From<Percent> for f64 {
    fn from(percent: Percent) -> f64 {
        percent.0
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Input to `create_draft`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalSpec {
    pub title: String,
    pub summary: String,
    pub detail: String,
    pub proposer_id: String,
    pub voting_opens_at: DateTime<Utc>,
    pub voting_closes_at: DateTime<Utc>,
    pub eligible_weight_snapshot: u64,
    pub quorum_threshold_percent: f64,
    pub approval_threshold_percent: f64,
}

/// Immutable terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub for_weight: u64,
    pub against_weight: u64,
    pub abstain_weight: u64,
    pub quorum_percent: f64,
    pub approval_percent: f64,
    pub resolved_at: DateTime<Utc>,
}

/// Where `now` sits relative to the voting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPhase {
    Upcoming,
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub summary: String,
    pub detail: String,
    pub proposer_id: String,
    pub created_at: DateTime<Utc>,
    pub voting_opens_at: DateTime<Utc>,
    pub voting_closes_at: DateTime<Utc>,
    pub eligible_weight_snapshot: u64,
    pub quorum_threshold: Percent,
    pub approval_threshold: Percent,
    pub status: ProposalStatus,
    pub resolution: Option<Resolution>,
}

impl Proposal {
    /// Validate a spec and build a `Draft` record from it.
    pub fn from_spec(id: ProposalId, spec: ProposalSpec, created_at: DateTime<Utc>) -> Result<Self> {
        if spec.voting_opens_at > spec.voting_closes_at {
            return Err(GovernanceError::InvalidProposalSpec(format!(
                "voting opens at {} after it closes at {}",
                spec.voting_opens_at, spec.voting_closes_at
            )));
        }
        if spec.eligible_weight_snapshot == 0 {
            return Err(GovernanceError::InvalidProposalSpec(
                "eligible weight snapshot must be positive".to_string(),
            ));
        }
        let quorum_threshold = Percent::from_percent(spec.quorum_threshold_percent).ok_or_else(|| {
            GovernanceError::InvalidProposalSpec(format!(
                "quorum threshold {} outside [0, 100]",
                spec.quorum_threshold_percent
            ))
        })?;
        let approval_threshold =
            Percent::from_percent(spec.approval_threshold_percent).ok_or_else(|| {
                GovernanceError::InvalidProposalSpec(format!(
                    "approval threshold {} outside [0, 100]",
                    spec.approval_threshold_percent
                ))
            })?;

        Ok(Self {
            id,
            title: spec.title,
            summary: spec.summary,
            detail: spec.detail,
            proposer_id: spec.proposer_id,
            created_at,
            voting_opens_at: spec.voting_opens_at,
            voting_closes_at: spec.voting_closes_at,
            eligible_weight_snapshot: spec.eligible_weight_snapshot,
            quorum_threshold,
            approval_threshold,
            status: ProposalStatus::Draft,
            resolution: None,
        })
    }

    /// Move along one edge of the lifecycle graph.
    pub(crate) fn transition(&mut self, next: ProposalStatus, action: &'static str) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GovernanceError::InvalidTransition {
                from: self.status,
                action,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn phase(&self, now: DateTime<Utc>) -> WindowPhase {
        if now < self.voting_opens_at {
            WindowPhase::Upcoming
        } else if now < self.voting_closes_at {
            WindowPhase::Open
        } else {
            WindowPhase::Closed
        }
    }

    /// Time left until the window closes, `None` once closed.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (now < self.voting_closes_at).then(|| self.voting_closes_at - now)
    }

    /// Accepting votes right now.
    pub fn is_open_for_voting(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Active && self.phase(now) == WindowPhase::Open
    }

    /// Active and past its close time.
    pub fn is_due_for_resolution(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Active && now >= self.voting_closes_at
    }
}
