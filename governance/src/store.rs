//! Proposal store
//!
//! Every proposal lives in its own slot. A slot has a mutex that serializes
//! all writes to that proposal (lifecycle changes, vote casts, resolution) and
//! a published snapshot that readers clone without waiting on the mutex.
//! Different proposals never share a lock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{GovernanceError, Result};
use crate::proposal::{Proposal, ProposalId, ProposalSpec, ProposalStatus, Resolution, WindowPhase};
use crate::tally::{self, TallyOutcome};
use crate::voting::{Tally, TallySnapshot, VoteChoice, VoteLedger, VoteRecord, VoterId};

/// Projection returned by `get`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalView {
    pub proposal: Proposal,
    pub tally: TallySnapshot,
    /// Live verdict, present only while `Active`
    pub preview: Option<TallyOutcome>,
    pub phase: WindowPhase,
    pub seconds_remaining: Option<i64>,
}

/// Result of running the resolution routine once.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// This call wrote the terminal state.
    Resolved {
        status: ProposalStatus,
        resolution: Resolution,
    },
    /// Another call already did; nothing was written.
    AlreadyResolved {
        status: ProposalStatus,
        resolution: Resolution,
    },
    /// Still active and the window has not closed.
    NotDue,
    /// Never reached voting (draft, under review, or cancelled).
    Inapplicable(ProposalStatus),
}

/// Persisted form of one proposal and its active votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProposal {
    pub proposal: Proposal,
    pub votes: Vec<VoteRecord>,
}

struct SlotState {
    proposal: Proposal,
    votes: VoteLedger,
}

#[derive(Debug)]
struct Published {
    proposal: Proposal,
    tally: Tally,
    voter_count: usize,
}

struct ProposalSlot {
    state: Mutex<SlotState>,
    published: RwLock<Arc<Published>>,
    /// Active records by voter, written under `state` and read without it
    records: DashMap<VoterId, VoteRecord>,
}

impl ProposalSlot {
    fn new(proposal: Proposal, votes: VoteLedger) -> Self {
        let records = votes
            .records()
            .map(|r| (r.voter_id.clone(), r.clone()))
            .collect();
        let state = SlotState { proposal, votes };
        let published = RwLock::new(Arc::new(Published::of(&state)));
        Self {
            state: Mutex::new(state),
            published,
            records,
        }
    }

    fn snapshot(&self) -> Arc<Published> {
        self.published.read().clone()
    }

    /// Must be called with `state` locked, after every successful write.
    fn publish(&self, state: &SlotState) {
        *self.published.write() = Arc::new(Published::of(state));
    }
}

impl Published {
    fn of(state: &SlotState) -> Self {
        Self {
            proposal: state.proposal.clone(),
            tally: state.votes.tally(),
            voter_count: state.votes.len(),
        }
    }

    fn tally_snapshot(&self) -> TallySnapshot {
        TallySnapshot::new(self.proposal.id.clone(), self.tally, self.voter_count)
    }
}

#[derive(Default)]
pub struct ProposalStore {
    slots: DashMap<ProposalId, Arc<ProposalSlot>>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Result<Arc<ProposalSlot>> {
        self.slots
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GovernanceError::ProposalNotFound(id.to_string()))
    }

    fn all_slots(&self) -> Vec<Arc<ProposalSlot>> {
        self.slots.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Validate `spec` and store it as a new `Draft`.
    pub fn create_draft(&self, spec: ProposalSpec, now: DateTime<Utc>) -> Result<ProposalId> {
        let id = format!("prop-{}", Uuid::new_v4());
        let proposal = Proposal::from_spec(id.clone(), spec, now)?;
        self.insert(proposal, VoteLedger::new())?;
        log::info!("Created draft proposal {}", id);
        Ok(id)
    }

    /// Insert a proposal with existing votes.
    pub fn insert(&self, proposal: Proposal, votes: VoteLedger) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.slots.entry(proposal.id.clone()) {
            Entry::Occupied(_) => Err(GovernanceError::DuplicateProposal(proposal.id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(ProposalSlot::new(proposal, votes)));
                Ok(())
            }
        }
    }

    /// Draft -> PendingReview.
    pub fn submit_for_review(&self, id: &str) -> Result<()> {
        self.transition(id, ProposalStatus::PendingReview, "submit for review")?;
        log::info!("Proposal {} queued for review", id);
        Ok(())
    }

    /// PendingReview -> Active.
    pub fn activate(&self, id: &str) -> Result<()> {
        self.transition(id, ProposalStatus::Active, "activate")?;
        log::info!("Proposal {} activated", id);
        Ok(())
    }

    fn transition(&self, id: &str, next: ProposalStatus, action: &'static str) -> Result<()> {
        let slot = self.slot(id)?;
        let mut state = slot.state.lock();
        state.proposal.transition(next, action)?;
        slot.publish(&state);
        Ok(())
    }

    /// Withdraw a proposal. Only its proposer may do so, and only before the
    /// voting window opens.
    pub fn cancel(&self, id: &str, requester_id: &str, now: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(id)?;
        let mut state = slot.state.lock();
        let proposal = &mut state.proposal;

        if !proposal.status.can_transition_to(ProposalStatus::Cancelled) {
            return Err(GovernanceError::InvalidTransition {
                from: proposal.status,
                action: "cancel",
            });
        }
        if proposal.proposer_id != requester_id {
            return Err(GovernanceError::Unauthorized {
                proposal_id: id.to_string(),
                requester: requester_id.to_string(),
            });
        }
        if now >= proposal.voting_opens_at {
            return Err(GovernanceError::WindowAlreadyOpen(id.to_string()));
        }

        proposal.transition(ProposalStatus::Cancelled, "cancel")?;
        slot.publish(&state);
        log::info!("Proposal {} cancelled by {}", id, requester_id);
        Ok(())
    }

    /// Record a vote whose weight is already known.
    ///
    /// The window is checked again under the proposal's lock, so a cast that
    /// raced past `voting_closes_at` or a concurrent resolution is refused.
    pub fn record_vote(
        &self,
        id: &str,
        voter_id: &str,
        choice: VoteChoice,
        weight: u64,
        now: DateTime<Utc>,
    ) -> Result<TallySnapshot> {
        let slot = self.slot(id)?;
        let mut state = slot.state.lock();
        if !state.proposal.is_open_for_voting(now) {
            return Err(GovernanceError::VotingNotOpen(id.to_string()));
        }
        if weight == 0 {
            return Err(GovernanceError::InsufficientWeight(voter_id.to_string()));
        }

        let record = VoteRecord {
            voter_id: voter_id.to_string(),
            proposal_id: id.to_string(),
            choice,
            weight,
            cast_at: now,
        };
        let eligible = state.proposal.eligible_weight_snapshot;
        let recast = state.votes.get(voter_id).is_some();
        let tally = state.votes.apply(record.clone(), eligible)?;
        slot.records.insert(record.voter_id.clone(), record);
        slot.publish(&state);

        log::debug!(
            "{} {} on {}: {:?} weight {}",
            voter_id,
            if recast { "recast" } else { "voted" },
            id,
            choice,
            weight
        );
        Ok(TallySnapshot::new(id.to_string(), tally, state.votes.len()))
    }

    /// Current tally. Never resolves or writes.
    pub fn tally(&self, id: &str) -> Result<TallySnapshot> {
        Ok(self.slot(id)?.snapshot().tally_snapshot())
    }

    /// Stored record as last published, without triggering resolution.
    pub fn proposal(&self, id: &str) -> Result<Proposal> {
        Ok(self.slot(id)?.snapshot().proposal.clone())
    }

    /// A voter's active record. Does not wait on in-flight casts.
    pub fn vote_of(&self, id: &str, voter_id: &str) -> Result<Option<VoteRecord>> {
        let slot = self.slot(id)?;
        let record = slot.records.get(voter_id).map(|r| r.value().clone());
        Ok(record)
    }

    /// Current projection, resolving first if the window has closed.
    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Result<ProposalView> {
        let slot = self.slot(id)?;
        if slot.snapshot().proposal.is_due_for_resolution(now) {
            self.resolve_slot(&slot, now)?;
        }
        Ok(view_of(&slot.snapshot(), now))
    }

    /// The one resolution routine, shared by lazy reads and the sweep.
    ///
    /// Idempotent: the first caller past the close time writes the terminal
    /// state; every later caller sees it and writes nothing.
    pub fn resolve(&self, id: &str, now: DateTime<Utc>) -> Result<ResolveOutcome> {
        let slot = self.slot(id)?;
        self.resolve_slot(&slot, now)
    }

    fn resolve_slot(&self, slot: &ProposalSlot, now: DateTime<Utc>) -> Result<ResolveOutcome> {
        let mut state = slot.state.lock();

        match state.proposal.status {
            ProposalStatus::Active => {}
            ProposalStatus::Approved | ProposalStatus::Rejected | ProposalStatus::Expired => {
                let resolution = state.proposal.resolution.clone().ok_or_else(|| {
                    GovernanceError::Storage(format!(
                        "proposal {} is {:?} without a resolution",
                        state.proposal.id, state.proposal.status
                    ))
                })?;
                return Ok(ResolveOutcome::AlreadyResolved {
                    status: state.proposal.status,
                    resolution,
                });
            }
            other => return Ok(ResolveOutcome::Inapplicable(other)),
        }

        if now < state.proposal.voting_closes_at {
            return Ok(ResolveOutcome::NotDue);
        }

        let (status, resolution) = tally::final_resolution(&state.proposal, &state.votes.tally());
        state.proposal.transition(status, "resolve")?;
        state.proposal.resolution = Some(resolution.clone());
        slot.publish(&state);

        log::info!(
            "Proposal {} resolved {:?}: quorum {:.2}%, approval {:.2}%",
            state.proposal.id,
            status,
            resolution.quorum_percent,
            resolution.approval_percent
        );
        Ok(ResolveOutcome::Resolved { status, resolution })
    }

    /// Resolve every active proposal whose window has closed.
    ///
    /// Returns the ids this call resolved together with their new status.
    /// A failure on one proposal is logged and left for the next sweep.
    pub fn resolve_due(&self, now: DateTime<Utc>) -> Vec<(ProposalId, ProposalStatus)> {
        let mut resolved = Vec::new();

        for slot in self.all_slots() {
            let snapshot = slot.snapshot();
            if !snapshot.proposal.is_due_for_resolution(now) {
                continue;
            }
            match self.resolve_slot(&slot, now) {
                Ok(ResolveOutcome::Resolved { status, .. }) => {
                    resolved.push((snapshot.proposal.id.clone(), status));
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "Failed to resolve proposal {}, will retry: {}",
                        snapshot.proposal.id,
                        e
                    );
                }
            }
        }

        resolved
    }

    /// Proposals sorted by creation time, optionally filtered by status.
    pub fn list(&self, status: Option<ProposalStatus>) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = self
            .all_slots()
            .into_iter()
            .map(|slot| slot.snapshot().proposal.clone())
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        proposals
    }

    /// Drop terminal proposals whose window (or creation, if cancelled)
    /// ended before `before`.
    pub fn prune_terminal(&self, before: DateTime<Utc>) -> Vec<ProposalId> {
        let stale: Vec<ProposalId> = self
            .all_slots()
            .into_iter()
            .filter_map(|slot| {
                let snapshot = slot.snapshot();
                let proposal = &snapshot.proposal;
                let ended = match proposal.status {
                    ProposalStatus::Cancelled => proposal.created_at,
                    s if s.is_terminal() => proposal.voting_closes_at,
                    _ => return None,
                };
                (ended < before).then(|| proposal.id.clone())
            })
            .collect();

        for id in &stale {
            self.slots.remove(id);
        }
        if !stale.is_empty() {
            log::info!("Pruned {} terminal proposals", stale.len());
        }
        stale
    }

    /// Copy of every proposal with its active votes, for persistence.
    pub fn export(&self) -> Vec<StoredProposal> {
        let mut stored: Vec<StoredProposal> = self
            .all_slots()
            .into_iter()
            .map(|slot| {
                let state = slot.state.lock();
                let mut votes: Vec<VoteRecord> = state.votes.records().cloned().collect();
                votes.sort_by(|a, b| a.voter_id.cmp(&b.voter_id));
                StoredProposal {
                    proposal: state.proposal.clone(),
                    votes,
                }
            })
            .collect();
        stored.sort_by(|a, b| {
            a.proposal
                .created_at
                .cmp(&b.proposal.created_at)
                .then_with(|| a.proposal.id.cmp(&b.proposal.id))
        });
        stored
    }

    /// Rebuild a store from persisted proposals.
    pub fn import(stored: Vec<StoredProposal>) -> Result<Self> {
        let store = Self::new();
        for StoredProposal { proposal, votes } in stored {
            if votes.iter().any(|v| v.proposal_id != proposal.id) {
                return Err(GovernanceError::Storage(format!(
                    "vote record filed under the wrong proposal in {}",
                    proposal.id
                )));
            }
            let ledger = VoteLedger::from_records(votes, proposal.eligible_weight_snapshot)?;
            store.insert(proposal, ledger)?;
        }
        Ok(store)
    }
}

fn view_of(published: &Published, now: DateTime<Utc>) -> ProposalView {
    let proposal = &published.proposal;
    let preview = (proposal.status == ProposalStatus::Active)
        .then(|| tally::preview(proposal, &published.tally));

    ProposalView {
        proposal: proposal.clone(),
        tally: published.tally_snapshot(),
        preview,
        phase: proposal.phase(now),
        seconds_remaining: proposal.time_remaining(now).map(|d| d.num_seconds()),
    }
}
