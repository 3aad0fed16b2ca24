use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use governance::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const VOTERS: usize = 64;

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn setup(eligible: u64) -> (Arc<GovernanceService>, Arc<StaticWeightOracle>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let oracle = Arc::new(StaticWeightOracle::with_total(eligible));
    let service = Arc::new(GovernanceService::new(
        Arc::new(ProposalStore::new()),
        oracle.clone(),
        clock.clone(),
        &GovernanceConfig::default(),
    ));
    (service, oracle, clock)
}

fn open(service: &GovernanceService, eligible: u64) -> ProposalId {
    let id = service
        .create_proposal(ProposalSpec {
            title: "Concurrent ballot".to_string(),
            summary: String::new(),
            detail: String::new(),
            proposer_id: "alice".to_string(),
            voting_opens_at: start(),
            voting_closes_at: start() + Duration::days(1),
            eligible_weight_snapshot: eligible,
            quorum_threshold_percent: 10.0,
            approval_threshold_percent: 50.0,
        })
        .unwrap();
    service.submit_for_review(&id).unwrap();
    service.activate_proposal(&id).unwrap();
    id
}

fn voter(i: usize) -> String {
    format!("voter-{}", i)
}

fn choice_for(round: usize, i: usize) -> VoteChoice {
    match (round + i) % 3 {
        0 => VoteChoice::For,
        1 => VoteChoice::Against,
        _ => VoteChoice::Abstain,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_casts_and_recasts_conserve_weight() {
    let eligible = 1_000_000;
    let (service, oracle, _clock) = setup(eligible);
    let id = open(&service, eligible);
    for i in 0..VOTERS {
        oracle.set_weight(&voter(i), (i as u64 + 1) * 100);
    }

    let tasks = (0..VOTERS).map(|i| {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move {
            for round in 0..5 {
                service
                    .cast_vote(&id, &voter(i), choice_for(round, i))
                    .await
                    .unwrap();
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let snapshot = service.get_tally(&id).unwrap();
    assert_eq!(snapshot.voter_count, VOTERS);

    let mut expected = Tally::default();
    for i in 0..VOTERS {
        let record = service.get_vote(&id, &voter(i)).unwrap().unwrap();
        assert_eq!(record.choice, choice_for(4, i));
        match record.choice {
            VoteChoice::For => expected.for_weight += record.weight,
            VoteChoice::Against => expected.against_weight += record.weight,
            VoteChoice::Abstain => expected.abstain_weight += record.weight,
        }
    }
    assert_eq!(snapshot.tally(), expected);

    // Each voter counted once: sum of 100..=6400 in steps of 100
    let all: u64 = (1..=VOTERS as u64).map(|n| n * 100).sum();
    assert_eq!(expected.total(), all);
    assert!(expected.total() <= eligible);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_recast() {
    let eligible = VOTERS as u64;
    let (service, oracle, _clock) = setup(eligible);
    let id = open(&service, eligible);
    for i in 0..VOTERS {
        oracle.set_weight(&voter(i), 1);
        service.cast_vote(&id, &voter(i), VoteChoice::For).await.unwrap();
    }

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let id = id.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let mut reads = 0u64;
                while !done.load(Ordering::Acquire) {
                    let snapshot = service.get_tally(&id).unwrap();
                    assert_eq!(snapshot.tally().total(), VOTERS as u64);
                    assert_eq!(snapshot.voter_count, VOTERS);
                    reads += 1;
                    tokio::task::yield_now().await;
                }
                reads
            })
        })
        .collect();

    let writers = (0..VOTERS).map(|i| {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move {
            for round in 0..10 {
                let choice = if round % 2 == 0 {
                    VoteChoice::Against
                } else {
                    VoteChoice::For
                };
                service.cast_vote(&id, &voter(i), choice).await.unwrap();
            }
        })
    });
    for result in join_all(writers).await {
        result.unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in join_all(readers).await {
        assert!(reader.unwrap() > 0);
    }
    let tally = service.get_tally(&id).unwrap();
    assert_eq!(tally.for_weight, VOTERS as u64);
    assert_eq!(tally.against_weight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_happens_once() {
    let (service, oracle, clock) = setup(10_000);
    let id = open(&service, 10_000);
    oracle.set_weight("a", 3_000);
    oracle.set_weight("b", 1_000);
    service.cast_vote(&id, "a", VoteChoice::For).await.unwrap();
    service.cast_vote(&id, "b", VoteChoice::Against).await.unwrap();
    clock.advance(Duration::days(2));

    // Half resolve explicitly, half trigger lazy resolution through a read
    let tasks = (0..16).map(|n| {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if n % 2 == 0 {
                match service.resolve(&id).unwrap() {
                    ResolveOutcome::Resolved { resolution, .. } => (true, resolution),
                    ResolveOutcome::AlreadyResolved { resolution, .. } => (false, resolution),
                    other => panic!("unexpected outcome {:?}", other),
                }
            } else {
                let view = service.get_proposal(&id).unwrap();
                (false, view.proposal.resolution.unwrap())
            }
        })
    });

    let outcomes: Vec<(bool, Resolution)> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(outcomes.iter().filter(|(won, _)| *won).count() <= 1);
    assert!(outcomes.windows(2).all(|w| w[0].1 == w[1].1));

    let proposal = service.store().proposal(&id).unwrap();
    assert_eq!(proposal.status, ProposalStatus::Approved);
    assert_eq!(proposal.resolution, Some(outcomes[0].1.clone()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_resolution_reports_single_winner() {
    let store = Arc::new(ProposalStore::new());
    let id = store
        .create_draft(
            ProposalSpec {
                title: "Race to resolve".to_string(),
                summary: String::new(),
                detail: String::new(),
                proposer_id: "alice".to_string(),
                voting_opens_at: start(),
                voting_closes_at: start() + Duration::hours(1),
                eligible_weight_snapshot: 100,
                quorum_threshold_percent: 10.0,
                approval_threshold_percent: 50.0,
            },
            start(),
        )
        .unwrap();
    store.submit_for_review(&id).unwrap();
    store.activate(&id).unwrap();
    store
        .record_vote(&id, "bob", VoteChoice::Against, 40, start())
        .unwrap();

    let tasks = (0..32).map(|n| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let now = start() + Duration::hours(1) + Duration::minutes(n);
            store.resolve(&id, now).unwrap()
        })
    });
    let outcomes: Vec<ResolveOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, ResolveOutcome::Resolved { .. }))
        .count();
    assert_eq!(winners, 1);
    for outcome in &outcomes {
        match outcome {
            ResolveOutcome::Resolved { status, resolution }
            | ResolveOutcome::AlreadyResolved { status, resolution } => {
                assert_eq!(*status, ProposalStatus::Rejected);
                assert_eq!(resolution.resolved_at, start() + Duration::hours(1));
                assert_eq!(resolution.against_weight, 40);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_proposals_progress_in_parallel() {
    let eligible = 1_000;
    let (service, oracle, clock) = setup(eligible);
    let ids: Vec<ProposalId> = (0..8).map(|_| open(&service, eligible)).collect();
    for i in 0..VOTERS {
        oracle.set_weight(&voter(i), 10);
    }

    let tasks = ids.iter().enumerate().flat_map(|(p, id)| {
        let service = service.clone();
        (0..VOTERS).map(move |i| {
            let service = service.clone();
            let id = id.clone();
            let choice = if (i + p) % 4 == 0 {
                VoteChoice::Against
            } else {
                VoteChoice::For
            };
            tokio::spawn(async move { service.cast_vote(&id, &voter(i), choice).await })
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    for id in &ids {
        let tally = service.get_tally(id).unwrap();
        assert_eq!(tally.voter_count, VOTERS);
        assert_eq!(tally.tally().total(), VOTERS as u64 * 10);
    }

    clock.advance(Duration::days(1));
    let mut resolved = service.resolve_due();
    resolved.sort();
    assert_eq!(resolved.len(), ids.len());
    assert!(resolved
        .iter()
        .all(|(_, status)| *status == ProposalStatus::Approved));
}
