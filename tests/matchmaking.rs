//! Queue admission, pairing and distribution behavior.

mod common;

use std::sync::Arc;

use common::{identity, RecordingStore, ScriptedPipeline};
use duelbox::config::types::Difficulty;
use duelbox::config::Settings;
use duelbox::error::{DomainRejection, DuelError};
use duelbox::game::coordinator::MatchCoordinator;
use duelbox::matchmaking::Matchmaker;
use duelbox::problems::select::ProblemSelector;
use duelbox::problems::store::InMemoryProblemStore;
use duelbox::ws::frames::ServerFrame;
use duelbox::ws::transport::{Outbound, PlayerTransport};

fn build_matchmaker() -> (Arc<Matchmaker>, Arc<MatchCoordinator>) {
    let settings = Settings::default();
    let pipeline = Arc::new(ScriptedPipeline::default());
    let store = Arc::new(RecordingStore::default());
    let coordinator = Arc::new(MatchCoordinator::new(pipeline, store, settings.rating_k));
    let problems = InMemoryProblemStore::new(
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
            .into_iter()
            .flat_map(|d| (0..10).map(move |i| common::problem(&format!("{d}-{i}"), d, 10))),
    );
    let selector = Arc::new(ProblemSelector::new(Arc::new(problems)));
    let matchmaker = Arc::new(Matchmaker::new(&settings, coordinator.clone(), selector));
    (matchmaker, coordinator)
}

fn match_found(outbound: Option<Outbound>) -> Option<String> {
    match outbound {
        Some(Outbound::Frame(ServerFrame::MatchFound { match_id })) => Some(match_id),
        _ => None,
    }
}

#[tokio::test]
async fn three_way_queue_pairs_exactly_two() {
    let (matchmaker, coordinator) = build_matchmaker();

    let mut receivers = Vec::new();
    for id in 1..=3 {
        let (transport, rx) = PlayerTransport::channel();
        matchmaker
            .enqueue(transport, identity(id, &format!("user{id}"), 1000.0), false)
            .await
            .unwrap();
        receivers.push(rx);
    }

    let ids: Vec<Option<String>> = receivers
        .iter_mut()
        .map(|rx| match_found(rx.try_recv().ok()))
        .collect();
    let matched: Vec<&String> = ids.iter().flatten().collect();
    assert_eq!(matched.len(), 2, "exactly two players get match_found");
    assert_eq!(matched[0], matched[1], "both got the same match id");

    // The third stays enqueued.
    assert_eq!(matchmaker.queue_len(false), 1);
    assert_eq!(coordinator.lookup_by_match(matched[0]).map(|h| ()), Some(()));
}

#[tokio::test]
async fn enqueue_rejects_double_entry_and_active_players() {
    let (matchmaker, coordinator) = build_matchmaker();

    let (t1, _rx1) = PlayerTransport::channel();
    matchmaker
        .enqueue(t1, identity(1, "alice", 1000.0), false)
        .await
        .unwrap();

    let (t2, _rx2) = PlayerTransport::channel();
    let err = matchmaker
        .enqueue(t2, identity(1, "alice", 1000.0), true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DuelError::Domain(DomainRejection::AlreadyInQueue)
    ));

    // A player with an active match cannot queue.
    coordinator
        .create_match(
            identity(5, "eve", 1000.0),
            identity(6, "mallory", 1000.0),
            common::easy_problems(1),
            duelbox::game::state::MatchType::Unranked,
            Settings::default().game,
        )
        .unwrap();
    let (t3, _rx3) = PlayerTransport::channel();
    let err = matchmaker
        .enqueue(t3, identity(5, "eve", 1000.0), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DuelError::Domain(DomainRejection::AlreadyInGame)
    ));
}

#[tokio::test]
async fn dequeue_is_idempotent_and_reopens_entry() {
    let (matchmaker, _) = build_matchmaker();

    let (t1, _rx1) = PlayerTransport::channel();
    matchmaker
        .enqueue(t1, identity(1, "alice", 1000.0), false)
        .await
        .unwrap();
    assert!(matchmaker.in_queue(1));

    matchmaker.dequeue(1);
    matchmaker.dequeue(1);
    assert!(!matchmaker.in_queue(1));

    let (t2, _rx2) = PlayerTransport::channel();
    matchmaker
        .enqueue(t2, identity(1, "alice", 1000.0), false)
        .await
        .unwrap();
    assert_eq!(matchmaker.queue_len(false), 1);
}

#[tokio::test]
async fn ranked_pairing_stays_within_a_tier() {
    let (matchmaker, _) = build_matchmaker();

    // Gold player waits alone; two bronze players pair immediately.
    let (gold_t, mut gold_rx) = PlayerTransport::channel();
    matchmaker
        .enqueue(gold_t, identity(10, "gold", 1600.0), true)
        .await
        .unwrap();

    let (b1_t, mut b1_rx) = PlayerTransport::channel();
    matchmaker
        .enqueue(b1_t, identity(11, "bronze1", 1000.0), true)
        .await
        .unwrap();
    assert!(match_found(b1_rx.try_recv().ok()).is_none());

    let (b2_t, mut b2_rx) = PlayerTransport::channel();
    matchmaker
        .enqueue(b2_t, identity(12, "bronze2", 1100.0), true)
        .await
        .unwrap();

    assert!(match_found(b1_rx.try_recv().ok()).is_some());
    assert!(match_found(b2_rx.try_recv().ok()).is_some());
    assert!(match_found(gold_rx.try_recv().ok()).is_none());
    assert_eq!(matchmaker.queue_len(true), 1);
}

#[tokio::test]
async fn unranked_distribution_draws_problem_count() {
    let (matchmaker, _) = build_matchmaker();
    let expected = Settings::default().game.problem_count;
    for _ in 0..20 {
        let counts = matchmaker.problem_distribution();
        assert_eq!(counts.easy + counts.medium + counts.hard, expected);
    }
}

#[tokio::test]
async fn ranked_distribution_uses_lower_tier() {
    let (matchmaker, _) = build_matchmaker();
    // 1100 is bronze, 1900 is platinum; the pair plays bronze problems.
    let counts = matchmaker.problem_distribution_ranked(1900.0, 1100.0);
    let bronze = Settings::default().ranks.tier(1100.0).distribution;
    assert_eq!(counts, bronze);
}
