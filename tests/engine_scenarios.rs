//! End-to-end scenarios against the match engine, driven through
//! `MatchHandle` with a scripted judging pipeline.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{easy_problems, frame_type, identity, next_frame, next_outbound, RecordingStore, ScriptedPipeline};
use duelbox::config::types::GameSettings;
use duelbox::game::coordinator::MatchCoordinator;
use duelbox::game::engine::MatchHandle;
use duelbox::game::state::{MatchStatus, MatchType};
use duelbox::ws::frames::{AbilityAction, ServerFrame, SubmissionReport};
use duelbox::ws::transport::{Outbound, PlayerTransport};
use tokio::sync::mpsc::UnboundedReceiver;

struct Duel {
    pipeline: Arc<ScriptedPipeline>,
    store: Arc<RecordingStore>,
    coordinator: Arc<MatchCoordinator>,
    handle: MatchHandle,
    rx1: UnboundedReceiver<Outbound>,
    rx2: UnboundedReceiver<Outbound>,
}

fn test_settings() -> GameSettings {
    GameSettings {
        match_timeout_secs: 180,
        ..GameSettings::default()
    }
}

async fn start_duel(problem_count: usize, settings: GameSettings, match_type: MatchType) -> Duel {
    let pipeline = Arc::new(ScriptedPipeline::default());
    let store = Arc::new(RecordingStore::default());
    let coordinator = Arc::new(MatchCoordinator::new(
        pipeline.clone(),
        store.clone(),
        32.0,
    ));
    let handle = coordinator
        .create_match(
            identity(1, "alice", 1500.0),
            identity(2, "bob", 1500.0),
            easy_problems(problem_count),
            match_type,
            settings,
        )
        .unwrap();

    let (t1, mut rx1) = PlayerTransport::channel();
    let (t2, mut rx2) = PlayerTransport::channel();
    handle.attach(1, t1);
    handle.attach(2, t2);

    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(frame_type(&next_frame(rx).await), "game_state");
        assert_eq!(frame_type(&next_frame(rx).await), "game_start");
        assert_eq!(frame_type(&next_frame(rx).await), "problem");
    }

    Duel {
        pipeline,
        store,
        coordinator,
        handle,
        rx1,
        rx2,
    }
}

async fn expect_submission_result(rx: &mut UnboundedReceiver<Outbound>) -> SubmissionReport {
    match next_frame(rx).await {
        ServerFrame::SubmissionResult(report) => report,
        other => panic!("expected submission_result, got {}", frame_type(&other)),
    }
}

async fn expect_game_state(rx: &mut UnboundedReceiver<Outbound>) -> duelbox::game::state::GameView {
    match next_frame(rx).await {
        ServerFrame::GameState(view) => view,
        other => panic!("expected game_state, got {}", frame_type(&other)),
    }
}

#[tokio::test(start_paused = true)]
async fn all_correct_twice_on_easy() {
    let mut duel = start_duel(3, test_settings(), MatchType::Unranked).await;

    duel.handle.submit(1, "python".to_string(), "pass:10".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    assert_eq!(report.deducted_hp, 50);
    assert!(report.problem_solved);
    let view = expect_game_state(&mut duel.rx1).await;
    assert_eq!(view.opponent_hp, 90);
    assert_eq!(frame_type(&next_frame(&mut duel.rx1).await), "problem");
    // The opponent only sees the state change.
    let opponent_view = expect_game_state(&mut duel.rx2).await;
    assert_eq!(opponent_view.your_hp, 90);

    tokio::time::sleep(Duration::from_secs(2)).await;

    duel.handle.submit(1, "python".to_string(), "pass:10".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    assert_eq!(report.deducted_hp, 50);
    let view = expect_game_state(&mut duel.rx1).await;
    assert_eq!(view.opponent_hp, 40);
    assert_eq!(view.problems_solved, 2);
    assert_eq!(view.current_problem_index, 2);
    assert_eq!(frame_type(&next_frame(&mut duel.rx1).await), "problem");
}

#[tokio::test(start_paused = true)]
async fn partial_then_regression_then_full() {
    let mut duel = start_duel(1, test_settings(), MatchType::Unranked).await;

    duel.handle.submit(1, "python".to_string(), "pass:7".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    assert_eq!(report.deducted_hp, 35);
    assert!(!report.problem_solved);
    assert_eq!(expect_game_state(&mut duel.rx1).await.opponent_hp, 105);
    expect_game_state(&mut duel.rx2).await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    // Fewer passes than the best run: no damage.
    duel.handle.submit(1, "python".to_string(), "pass:3".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    assert_eq!(report.deducted_hp, 0);
    assert!(!report.problem_solved);
    assert_eq!(expect_game_state(&mut duel.rx1).await.opponent_hp, 105);
    expect_game_state(&mut duel.rx2).await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    // Full solve pays only the 3-test delta; solving the only problem
    // ends the match.
    duel.handle.submit(1, "python".to_string(), "pass:10".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    assert_eq!(report.deducted_hp, 15);
    assert!(report.problem_solved);
    let view = expect_game_state(&mut duel.rx1).await;
    assert_eq!(view.opponent_hp, 90);
    assert_eq!(view.problems_solved, 1);
    match next_frame(&mut duel.rx1).await {
        ServerFrame::MatchEnd(result) => assert_eq!(result.winner.as_deref(), Some("alice")),
        other => panic!("expected match_end, got {}", frame_type(&other)),
    }
}

#[tokio::test(start_paused = true)]
async fn cooldown_blocks_second_submission_without_judging() {
    let mut duel = start_duel(1, test_settings(), MatchType::Unranked).await;

    duel.handle.submit(1, "python".to_string(), "pass:5".to_string());
    expect_submission_result(&mut duel.rx1).await;
    expect_game_state(&mut duel.rx1).await;
    assert_eq!(duel.pipeline.calls.load(Ordering::SeqCst), 1);

    duel.handle.submit(1, "python".to_string(), "pass:10".to_string());
    match next_frame(&mut duel.rx1).await {
        ServerFrame::Error { message } => assert!(message.contains("cooldown")),
        other => panic!("expected error, got {}", frame_type(&other)),
    }
    // The sandbox was never invoked for the blocked submission.
    assert_eq!(duel.pipeline.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn forfeit_ends_match_and_silences_the_seat() {
    let mut duel = start_duel(2, test_settings(), MatchType::Unranked).await;

    duel.handle.forfeit(1);
    for rx in [&mut duel.rx1, &mut duel.rx2] {
        expect_game_state(rx).await;
        match next_frame(rx).await {
            ServerFrame::MatchEnd(result) => {
                assert_eq!(result.winner.as_deref(), Some("bob"));
            }
            other => panic!("expected match_end, got {}", frame_type(&other)),
        }
        match next_outbound(rx).await {
            Outbound::Close { code, .. } => assert_eq!(code, 1000),
            other => panic!("expected close, got {other:?}"),
        }
    }

    // Post-finish commands are ignored: the engine is gone, no frames
    // reach either seat.
    duel.handle.chat(1, "anyone there?".to_string());
    duel.handle.submit(1, "python".to_string(), "pass:10".to_string());
    assert!(duel.rx1.recv().await.is_none());
    assert!(duel.rx2.recv().await.is_none());
    assert!(duel.coordinator.lookup(1).is_none());
    assert!(duel.coordinator.lookup(2).is_none());
}

#[tokio::test(start_paused = true)]
async fn hp_depletion_wins_the_match() {
    let settings = GameSettings {
        starting_hp: 40,
        ..test_settings()
    };
    let mut duel = start_duel(3, settings, MatchType::Unranked).await;

    duel.handle.submit(1, "python".to_string(), "pass:10".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    // 50 raw damage clamped to the 40 HP remaining.
    assert_eq!(report.deducted_hp, 40);
    let view = expect_game_state(&mut duel.rx1).await;
    assert_eq!(view.opponent_hp, 0);
    match next_frame(&mut duel.rx1).await {
        ServerFrame::MatchEnd(result) => {
            assert_eq!(result.winner.as_deref(), Some("alice"));
            assert_eq!(result.p2.hp, 0);
        }
        other => panic!("expected match_end, got {}", frame_type(&other)),
    }

    // The terminal broadcast precedes the persistence call; wait for it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let records = duel.store.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner_id, Some(1));
}

#[tokio::test(start_paused = true)]
async fn idle_match_times_out_to_a_draw() {
    let settings = GameSettings {
        match_timeout_secs: 3,
        ..test_settings()
    };
    let mut duel = start_duel(1, settings, MatchType::Unranked).await;

    for rx in [&mut duel.rx1, &mut duel.rx2] {
        let view = expect_game_state(rx).await;
        assert_eq!(view.status, MatchStatus::Finished);
        match next_frame(rx).await {
            ServerFrame::MatchEnd(result) => {
                assert_eq!(result.winner, None);
                assert_eq!(result.p1.hp, result.p2.hp);
            }
            other => panic!("expected match_end, got {}", frame_type(&other)),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn reconnection_supersedes_previous_transport() {
    let mut duel = start_duel(2, test_settings(), MatchType::Unranked).await;

    let (t3, mut rx3) = PlayerTransport::channel();
    duel.handle.attach(1, t3);

    match next_outbound(&mut duel.rx1).await {
        Outbound::Close { code, reason } => {
            assert_eq!(code, 4000);
            assert!(reason.contains("Reconnected"));
        }
        other => panic!("expected close, got {other:?}"),
    }

    // The fresh transport immediately gets state and the current problem.
    assert_eq!(frame_type(&next_frame(&mut rx3).await), "game_state");
    assert_eq!(frame_type(&next_frame(&mut rx3).await), "problem");

    // The new transport is live: submissions flow normally.
    duel.handle.submit(1, "python".to_string(), "pass:4".to_string());
    expect_submission_result(&mut rx3).await;
}

#[tokio::test(start_paused = true)]
async fn failed_submission_reports_without_mutating() {
    let mut duel = start_duel(1, test_settings(), MatchType::Unranked).await;

    duel.handle.submit(1, "python".to_string(), "fail:time limit exceeded".to_string());
    let report = expect_submission_result(&mut duel.rx1).await;
    assert!(!report.result.success);
    assert_eq!(report.deducted_hp, 0);
    assert_eq!(report.result.message.as_deref(), Some("time limit exceeded"));

    // No game_state broadcast: nothing changed. Verify via query.
    let view = duel.handle.query(2).await.unwrap();
    assert_eq!(view.your_hp, 140);
    // But the failed attempt still consumed the cooldown.
    duel.handle.submit(1, "python".to_string(), "pass:1".to_string());
    match next_frame(&mut duel.rx1).await {
        ServerFrame::Error { message } => assert!(message.contains("cooldown")),
        other => panic!("expected error, got {}", frame_type(&other)),
    }
}

#[tokio::test(start_paused = true)]
async fn abilities_buy_and_use_with_broadcasts() {
    let settings = GameSettings {
        starting_skill_points: 10,
        starting_mana_points: 10,
        ..test_settings()
    };
    let mut duel = start_duel(1, settings, MatchType::Unranked).await;

    duel.handle
        .ability(1, AbilityAction::Use, "healio".to_string());
    match next_frame(&mut duel.rx1).await {
        ServerFrame::Error { message } => assert!(message.contains("own")),
        other => panic!("expected error, got {}", frame_type(&other)),
    }

    duel.handle
        .ability(1, AbilityAction::Buy, "healio".to_string());
    for rx in [&mut duel.rx1, &mut duel.rx2] {
        match next_frame(rx).await {
            ServerFrame::AbilityBought {
                username,
                ability_id,
            } => {
                assert_eq!(username, "alice");
                assert_eq!(ability_id, "healio");
            }
            other => panic!("expected ability_bought, got {}", frame_type(&other)),
        }
        expect_game_state(rx).await;
    }

    duel.handle
        .ability(1, AbilityAction::Use, "healio".to_string());
    for rx in [&mut duel.rx1, &mut duel.rx2] {
        match next_frame(rx).await {
            ServerFrame::AbilityUsed { ability_id, .. } => assert_eq!(ability_id, "healio"),
            other => panic!("expected ability_used, got {}", frame_type(&other)),
        }
    }
    let view = expect_game_state(&mut duel.rx1).await;
    // Full HP plus the heal: the ceiling rises with healing received.
    assert_eq!(view.your_hp, 160);
    assert_eq!(view.mana_points, 5);
    assert!(view.abilities.contains(&"healio".to_string()));
    expect_game_state(&mut duel.rx2).await;
}

#[tokio::test(start_paused = true)]
async fn ranked_finalize_applies_elo() {
    let mut duel = start_duel(1, test_settings(), MatchType::Ranked).await;

    duel.handle.forfeit(1);
    expect_game_state(&mut duel.rx2).await;
    match next_frame(&mut duel.rx2).await {
        ServerFrame::MatchEnd(result) => {
            assert_eq!(result.winner.as_deref(), Some("bob"));
            assert_eq!(result.p1.rating_change, Some(-16.0));
            assert_eq!(result.p2.rating_change, Some(16.0));
        }
        other => panic!("expected match_end, got {}", frame_type(&other)),
    }

    // Give finalize a chance to persist before inspecting the store.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let records = duel.store.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].p1.rating_change, Some(-16.0));
    assert_eq!(records[0].p2.rating_change, Some(16.0));
    assert_eq!(records[0].winner_id, Some(2));
}

#[tokio::test(start_paused = true)]
async fn chat_relays_to_both_seats() {
    let mut duel = start_duel(1, test_settings(), MatchType::Unranked).await;

    duel.handle.chat(2, "good luck".to_string());
    for rx in [&mut duel.rx1, &mut duel.rx2] {
        match next_frame(rx).await {
            ServerFrame::Chat(chat) => {
                assert_eq!(chat.sender, "bob");
                assert_eq!(chat.message, "good luck");
            }
            other => panic!("expected chat, got {}", frame_type(&other)),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn waiting_match_rejects_submissions() {
    let pipeline = Arc::new(ScriptedPipeline::default());
    let store = Arc::new(RecordingStore::default());
    let coordinator = Arc::new(MatchCoordinator::new(pipeline, store, 32.0));
    let handle = coordinator
        .create_match(
            identity(1, "alice", 1500.0),
            identity(2, "bob", 1500.0),
            easy_problems(1),
            MatchType::Unranked,
            test_settings(),
        )
        .unwrap();

    let (t1, mut rx1) = PlayerTransport::channel();
    handle.attach(1, t1);
    assert_eq!(frame_type(&next_frame(&mut rx1).await), "game_state");

    handle.submit(1, "python".to_string(), "pass:10".to_string());
    match next_frame(&mut rx1).await {
        ServerFrame::Error { message } => assert!(message.contains("not in progress")),
        other => panic!("expected error, got {}", frame_type(&other)),
    }
}

#[tokio::test(start_paused = true)]
async fn practice_match_starts_with_one_transport() {
    let pipeline = Arc::new(ScriptedPipeline::default());
    let store = Arc::new(RecordingStore::default());
    let coordinator = Arc::new(MatchCoordinator::new(pipeline, store, 32.0));
    let handle = coordinator
        .create_match(
            identity(1, "alice", 1500.0),
            identity(-1, "practice-bot", 1500.0),
            easy_problems(1),
            MatchType::Practice,
            test_settings(),
        )
        .unwrap();

    // The bot seat never attaches a transport; one human attach starts
    // the match.
    let (t1, mut rx1) = PlayerTransport::channel();
    handle.attach(1, t1);
    assert_eq!(frame_type(&next_frame(&mut rx1).await), "game_state");
    assert_eq!(frame_type(&next_frame(&mut rx1).await), "game_start");
    assert_eq!(frame_type(&next_frame(&mut rx1).await), "problem");

    // Broadcasts to the transportless seat are no-ops; the match still
    // plays to completion.
    duel_submit_and_win(&handle, &mut rx1).await;
}

async fn duel_submit_and_win(
    handle: &MatchHandle,
    rx: &mut UnboundedReceiver<Outbound>,
) {
    handle.submit(1, "python".to_string(), "pass:10".to_string());
    match next_frame(rx).await {
        ServerFrame::SubmissionResult(report) => assert!(report.problem_solved),
        other => panic!("expected submission_result, got {}", frame_type(&other)),
    }
    assert_eq!(frame_type(&next_frame(rx).await), "game_state");
    match next_frame(rx).await {
        ServerFrame::MatchEnd(result) => {
            assert_eq!(result.winner.as_deref(), Some("alice"));
        }
        other => panic!("expected match_end, got {}", frame_type(&other)),
    }
}
