//! Quorum and approval resolution
//!
//! One set of formulas serves both the live preview of an active proposal and
//! its one-time final resolution:
//!
//! - `quorum   = (for + against + abstain) / eligible_weight_snapshot * 100`
//! - `approval = for / (for + against) * 100`, or 0 when nobody voted for or against
//! - passes when both meet their thresholds
//!
//! Abstentions count toward turnout but never toward approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proposal::{Percent, Proposal, ProposalStatus, Resolution};
use crate::voting::Tally;

/// Quorum/approval verdict for a tally against a proposal's thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TallyOutcome {
    pub total_counted_weight: u64,
    pub quorum_percent: f64,
    pub approval_percent: f64,
    pub quorum_met: bool,
    pub approval_met: bool,
}

impl TallyOutcome {
    pub fn passes(&self) -> bool {
        self.quorum_met && self.approval_met
    }
}

pub fn quorum_percent(tally: &Tally, eligible: u64) -> f64 {
    if eligible == 0 {
        return 0.0;
    }
    tally.total() as f64 / eligible as f64 * 100.0
}

pub fn approval_percent(tally: &Tally) -> f64 {
    let decisive = tally.decisive();
    if decisive == 0 {
        return 0.0;
    }
    tally.for_weight as f64 / decisive as f64 * 100.0
}

/// Evaluate `tally` with explicit thresholds.
pub fn evaluate(tally: &Tally, eligible: u64, quorum: Percent, approval: Percent) -> TallyOutcome {
    TallyOutcome {
        total_counted_weight: tally.total(),
        quorum_percent: quorum_percent(tally, eligible),
        approval_percent: approval_percent(tally),
        quorum_met: quorum.is_met_by(tally.total(), eligible),
        approval_met: approval.is_met_by(tally.for_weight, tally.decisive()),
    }
}

/// Non-authoritative preview for an active proposal. Never persisted.
pub fn preview(proposal: &Proposal, tally: &Tally) -> TallyOutcome {
    evaluate(
        tally,
        proposal.eligible_weight_snapshot,
        proposal.quorum_threshold,
        proposal.approval_threshold,
    )
}

/// Terminal status and resolution record for a closed window.
///
/// Pure: depends only on the tally and the proposal's stored fields, and
/// stamps `resolved_at` with the close time rather than the wall clock.
pub fn final_resolution(proposal: &Proposal, tally: &Tally) -> (ProposalStatus, Resolution) {
    let resolved_at: DateTime<Utc> = proposal.voting_closes_at;

    if tally.total() == 0 {
        return (
            ProposalStatus::Expired,
            Resolution {
                for_weight: 0,
                against_weight: 0,
                abstain_weight: 0,
                quorum_percent: 0.0,
                approval_percent: 0.0,
                resolved_at,
            },
        );
    }

    let outcome = preview(proposal, tally);
    let status = if outcome.passes() {
        ProposalStatus::Approved
    } else {
        ProposalStatus::Rejected
    };

    (
        status,
        Resolution {
            for_weight: tally.for_weight,
            against_weight: tally.against_weight,
            abstain_weight: tally.abstain_weight,
            quorum_percent: outcome.quorum_percent,
            approval_percent: outcome.approval_percent,
            resolved_at,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalSpec;
    use chrono::Duration;

    fn proposal() -> Proposal {
        let opens = DateTime::from_timestamp(10_000, 0).unwrap();
        let mut p = Proposal::from_spec(
            "prop-1".to_string(),
            ProposalSpec {
                title: "Test".to_string(),
                summary: String::new(),
                detail: String::new(),
                proposer_id: "alice".to_string(),
                voting_opens_at: opens,
                voting_closes_at: opens + Duration::days(14),
                eligible_weight_snapshot: 5_000_000,
                quorum_threshold_percent: 10.0,
                approval_threshold_percent: 60.0,
            },
            opens,
        )
        .unwrap();
        p.status = ProposalStatus::Active;
        p
    }

    fn tally(f: u64, a: u64, ab: u64) -> Tally {
        Tally {
            for_weight: f,
            against_weight: a,
            abstain_weight: ab,
        }
    }

    #[test]
    fn test_quorum_and_approval_met() {
        let p = proposal();
        let t = tally(425_000, 125_000, 0);
        let outcome = preview(&p, &t);

        assert_eq!(outcome.total_counted_weight, 550_000);
        assert!((outcome.quorum_percent - 11.0).abs() < 1e-9);
        assert!((outcome.approval_percent - 77.2727).abs() < 1e-3);
        assert!(outcome.passes());

        let (status, resolution) = final_resolution(&p, &t);
        assert_eq!(status, ProposalStatus::Approved);
        assert_eq!(resolution.resolved_at, p.voting_closes_at);
    }

    #[test]
    fn test_quorum_failed_despite_approval() {
        let p = proposal();
        let t = tally(8_000, 2_000, 0);
        let outcome = preview(&p, &t);

        assert!((outcome.quorum_percent - 0.2).abs() < 1e-9);
        assert!((outcome.approval_percent - 80.0).abs() < 1e-9);
        assert!(!outcome.quorum_met);
        assert!(outcome.approval_met);

        let (status, _) = final_resolution(&p, &t);
        assert_eq!(status, ProposalStatus::Rejected);
    }

    #[test]
    fn test_no_votes_expires() {
        let p = proposal();
        let (status, resolution) = final_resolution(&p, &Tally::default());

        assert_eq!(status, ProposalStatus::Expired);
        assert_eq!(resolution.quorum_percent, 0.0);
        assert_eq!(resolution.approval_percent, 0.0);
    }

    #[test]
    fn test_abstain_only_counts_toward_quorum() {
        let p = proposal();
        let t = tally(0, 0, 600_000);
        let outcome = preview(&p, &t);

        assert!(outcome.quorum_met);
        assert_eq!(outcome.approval_percent, 0.0);
        assert!(!outcome.approval_met);

        // Abstain-only participation is contested-and-lost, not expired
        let (status, _) = final_resolution(&p, &t);
        assert_eq!(status, ProposalStatus::Rejected);
    }

    #[test]
    fn test_exact_thresholds_pass() {
        let p = proposal();
        // 500_000 / 5_000_000 = 10 %, 300_000 / 500_000 = 60 %
        let t = tally(300_000, 200_000, 0);
        assert!(preview(&p, &t).passes());

        let t = tally(299_999, 200_001, 0);
        assert!(!preview(&p, &t).passes());
    }

    #[test]
    fn test_fractional_thresholds_decide_exactly() {
        let mut p = proposal();
        p.eligible_weight_snapshot = 100_000;
        p.quorum_threshold = Percent::ZERO;
        p.approval_threshold = Percent::from_percent(66.666).unwrap();

        // 66.6667 % approval clears 66.666 %
        let (status, resolution) = final_resolution(&p, &tally(2, 1, 0));
        assert!(resolution.approval_percent > 66.666);
        assert_eq!(status, ProposalStatus::Approved);

        // 10.002 % turnout misses a 10.004 % quorum
        p.quorum_threshold = Percent::from_percent(10.004).unwrap();
        p.approval_threshold = Percent::from_percent(50.0).unwrap();
        let (status, resolution) = final_resolution(&p, &tally(10_002, 0, 0));
        assert!((resolution.quorum_percent - 10.002).abs() < 1e-9);
        assert_eq!(status, ProposalStatus::Rejected);
    }

    #[test]
    fn test_zero_thresholds() {
        let t = tally(0, 0, 1);
        let outcome = evaluate(&t, 100, Percent::ZERO, Percent::ZERO);
        assert!(outcome.passes());
    }
}
