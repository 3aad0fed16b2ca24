//! Vote records and per-proposal weighted tallies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{GovernanceError, Result};
use crate::proposal::ProposalId;

pub type VoterId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl VoteChoice {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "for" | "yes" => Some(Self::For),
            "against" | "no" => Some(Self::Against),
            "abstain" => Some(Self::Abstain),
            _ => None,
        }
    }
}

/// A voter's single active vote on a proposal. Weight is frozen at cast time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub voter_id: VoterId,
    pub proposal_id: ProposalId,
    pub choice: VoteChoice,
    pub weight: u64,
    pub cast_at: DateTime<Utc>,
}

/// Running weighted totals per choice.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    pub for_weight: u64,
    pub against_weight: u64,
    pub abstain_weight: u64,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.for_weight
            .saturating_add(self.against_weight)
            .saturating_add(self.abstain_weight)
    }

    /// Weight of the non-abstain votes.
    pub fn decisive(&self) -> u64 {
        self.for_weight.saturating_add(self.against_weight)
    }

    fn slot_mut(&mut self, choice: VoteChoice) -> &mut u64 {
        match choice {
            VoteChoice::For => &mut self.for_weight,
            VoteChoice::Against => &mut self.against_weight,
            VoteChoice::Abstain => &mut self.abstain_weight,
        }
    }

    fn remove(&mut self, choice: VoteChoice, weight: u64) {
        let slot = self.slot_mut(choice);
        *slot = slot.saturating_sub(weight);
    }

    fn add(&mut self, choice: VoteChoice, weight: u64) -> Option<()> {
        let slot = self.slot_mut(choice);
        *slot = slot.checked_add(weight)?;
        Some(())
    }
}

/// Read-side view of a proposal's tally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TallySnapshot {
    pub proposal_id: ProposalId,
    pub for_weight: u64,
    pub against_weight: u64,
    pub abstain_weight: u64,
    pub voter_count: usize,
}

impl TallySnapshot {
    pub fn new(proposal_id: ProposalId, tally: Tally, voter_count: usize) -> Self {
        Self {
            proposal_id,
            for_weight: tally.for_weight,
            against_weight: tally.against_weight,
            abstain_weight: tally.abstain_weight,
            voter_count,
        }
    }

    pub fn tally(&self) -> Tally {
        Tally {
            for_weight: self.for_weight,
            against_weight: self.against_weight,
            abstain_weight: self.abstain_weight,
        }
    }
}

/// Votes cast on one proposal.
///
/// Holds at most one record per voter, and the tally always equals the sum of
/// the records. Not synchronized; the owning store serializes access.
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    records: HashMap<VoterId, VoteRecord>,
    tally: Tally,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted records, recomputing the tally.
    pub fn from_records(records: Vec<VoteRecord>, eligible: u64) -> Result<Self> {
        let mut ledger = Self::new();
        for record in records {
            if ledger.records.contains_key(&record.voter_id) {
                return Err(GovernanceError::Storage(format!(
                    "duplicate vote record for voter {} on {}",
                    record.voter_id, record.proposal_id
                )));
            }
            ledger.apply(record, eligible)?;
        }
        Ok(ledger)
    }

    /// Write `record`, replacing the voter's previous one if present.
    ///
    /// The previous contribution is subtracted and the new one added on a
    /// scratch copy; nothing is committed unless the result stays within
    /// `eligible`.
    pub fn apply(&mut self, record: VoteRecord, eligible: u64) -> Result<Tally> {
        let mut next = self.tally;
        if let Some(previous) = self.records.get(&record.voter_id) {
            next.remove(previous.choice, previous.weight);
        }

        let counted = next.total();
        let within_pool = next
            .add(record.choice, record.weight)
            .filter(|_| next.total() <= eligible);
        if within_pool.is_none() {
            return Err(GovernanceError::WeightExceedsEligible {
                counted,
                incoming: record.weight,
                eligible,
            });
        }

        self.tally = next;
        self.records.insert(record.voter_id.clone(), record);
        Ok(self.tally)
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn get(&self, voter_id: &str) -> Option<&VoteRecord> {
        self.records.get(voter_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &VoteRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(voter: &str, choice: VoteChoice, weight: u64, ts: i64) -> VoteRecord {
        VoteRecord {
            voter_id: voter.to_string(),
            proposal_id: "prop-1".to_string(),
            choice,
            weight,
            cast_at: DateTime::from_timestamp(ts, 0).unwrap(),
        }
    }

    #[test]
    fn test_votes_accumulate_per_choice() {
        let mut ledger = VoteLedger::new();
        ledger.apply(record("v1", VoteChoice::For, 100, 1), 1_000).unwrap();
        ledger.apply(record("v2", VoteChoice::Against, 50, 2), 1_000).unwrap();
        let tally = ledger.apply(record("v3", VoteChoice::Abstain, 25, 3), 1_000).unwrap();

        assert_eq!(tally.for_weight, 100);
        assert_eq!(tally.against_weight, 50);
        assert_eq!(tally.abstain_weight, 25);
        assert_eq!(tally.total(), 175);
        assert_eq!(tally.decisive(), 150);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_recast_replaces_prior_contribution() {
        let mut ledger = VoteLedger::new();
        ledger.apply(record("v1", VoteChoice::For, 100, 1), 1_000).unwrap();
        ledger.apply(record("v2", VoteChoice::For, 40, 1), 1_000).unwrap();

        let tally = ledger.apply(record("v1", VoteChoice::Against, 150, 2), 1_000).unwrap();

        assert_eq!(tally.for_weight, 40);
        assert_eq!(tally.against_weight, 150);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("v1").unwrap().choice, VoteChoice::Against);
    }

    #[test]
    fn test_same_choice_recast_refreshes_weight_and_time() {
        let mut ledger = VoteLedger::new();
        ledger.apply(record("v1", VoteChoice::For, 100, 1), 1_000).unwrap();
        let tally = ledger.apply(record("v1", VoteChoice::For, 100, 9), 1_000).unwrap();

        assert_eq!(tally.for_weight, 100);
        assert_eq!(ledger.get("v1").unwrap().cast_at.timestamp(), 9);

        let tally = ledger.apply(record("v1", VoteChoice::For, 130, 10), 1_000).unwrap();
        assert_eq!(tally.for_weight, 130);
    }

    #[test]
    fn test_conservation_guard_leaves_ledger_untouched() {
        let mut ledger = VoteLedger::new();
        ledger.apply(record("v1", VoteChoice::For, 600, 1), 1_000).unwrap();

        let err = ledger
            .apply(record("v2", VoteChoice::Against, 401, 2), 1_000)
            .unwrap_err();
        assert_eq!(
            err,
            GovernanceError::WeightExceedsEligible {
                counted: 600,
                incoming: 401,
                eligible: 1_000
            }
        );
        assert_eq!(ledger.tally().total(), 600);
        assert!(ledger.get("v2").is_none());

        // Replacing v1's own weight frees its old contribution first
        let tally = ledger.apply(record("v1", VoteChoice::For, 1_000, 3), 1_000).unwrap();
        assert_eq!(tally.total(), 1_000);
    }

    #[test]
    fn test_from_records_rejects_duplicates() {
        let records = vec![
            record("v1", VoteChoice::For, 10, 1),
            record("v1", VoteChoice::Against, 10, 2),
        ];
        assert!(VoteLedger::from_records(records, 1_000).is_err());

        let ledger = VoteLedger::from_records(
            vec![record("v1", VoteChoice::For, 10, 1), record("v2", VoteChoice::Abstain, 5, 1)],
            1_000,
        )
        .unwrap();
        assert_eq!(ledger.tally().total(), 15);
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(VoteChoice::parse("FOR"), Some(VoteChoice::For));
        assert_eq!(VoteChoice::parse("no"), Some(VoteChoice::Against));
        assert_eq!(VoteChoice::parse("maybe"), None);
    }
}
