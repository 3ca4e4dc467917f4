//! Custom-room lifecycle and the public-room directory.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{identity, RecordingStore, ScriptedPipeline};
use duelbox::config::types::Difficulty;
use duelbox::config::Settings;
use duelbox::error::{DomainRejection, DuelError};
use duelbox::game::coordinator::MatchCoordinator;
use duelbox::problems::select::ProblemSelector;
use duelbox::problems::store::InMemoryProblemStore;
use duelbox::rooms::{RoomService, RoomSettings, RoomStatus};
use duelbox::ws::frames::ServerFrame;
use duelbox::ws::transport::{Outbound, PlayerTransport};
use tokio::sync::mpsc::UnboundedReceiver;

fn build_service() -> Arc<RoomService> {
    let settings = Settings::default();
    let pipeline = Arc::new(ScriptedPipeline::default());
    let store = Arc::new(RecordingStore::default());
    let coordinator = Arc::new(MatchCoordinator::new(pipeline, store, settings.rating_k));
    let problems = InMemoryProblemStore::new(
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
            .into_iter()
            .flat_map(|d| (0..12).map(move |i| common::problem(&format!("{d}-{i}"), d, 10))),
    );
    let selector = Arc::new(ProblemSelector::new(Arc::new(problems)));
    Arc::new(RoomService::new(
        coordinator,
        selector,
        settings.game.clone(),
        settings.room_code_length,
    ))
}

async fn drain_until(
    rx: &mut UnboundedReceiver<Outbound>,
    wanted: &str,
) -> ServerFrame {
    for _ in 0..32 {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Outbound::Frame(frame))) => {
                if common::frame_type(&frame) == wanted {
                    return frame;
                }
            }
            Ok(Some(Outbound::Close { code, reason })) => {
                panic!("unexpected close {code} ({reason}) while waiting for {wanted}")
            }
            Ok(None) => panic!("channel closed while waiting for {wanted}"),
            Err(_) => panic!("timed out waiting for {wanted}"),
        }
    }
    panic!("gave up waiting for {wanted}");
}

#[tokio::test]
async fn room_codes_are_fixed_length_alphanumeric() {
    let service = build_service();
    let code = service
        .create_room(identity(1, "alice", 1000.0), false, RoomSettings::default())
        .unwrap();
    assert_eq!(code.len(), Settings::default().room_code_length);
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
}

#[tokio::test]
async fn full_room_flow_starts_a_custom_match() {
    let service = build_service();
    let host = identity(1, "alice", 1000.0);
    let guest = identity(2, "bob", 1000.0);
    let code = service
        .create_room(host.clone(), true, RoomSettings::default())
        .unwrap();

    let (host_t, mut host_rx) = PlayerTransport::channel();
    service.attach(&code, &host, host_t).unwrap();
    drain_until(&mut host_rx, "room_state").await;

    // Start requires a full, all-ready room and the host as caller.
    let err = service.start_game(&code, host.id).await.unwrap_err();
    assert!(matches!(
        err,
        DuelError::Domain(DomainRejection::NotEnoughPlayers)
    ));

    let (guest_t, mut guest_rx) = PlayerTransport::channel();
    let view = service.attach(&code, &guest, guest_t).unwrap();
    assert_eq!(view.guest.as_deref(), Some("bob"));

    let err = service.start_game(&code, guest.id).await.unwrap_err();
    assert!(matches!(
        err,
        DuelError::Domain(DomainRejection::GuestCannotStart)
    ));

    service.toggle_ready(&code, host.id).unwrap();
    let err = service.start_game(&code, host.id).await.unwrap_err();
    assert!(matches!(err, DuelError::Domain(DomainRejection::NotAllReady)));

    service.toggle_ready(&code, guest.id).unwrap();
    let game_id = service.start_game(&code, host.id).await.unwrap();

    match drain_until(&mut host_rx, "game_started").await {
        ServerFrame::GameStarted { game_id: got } => assert_eq!(got, game_id),
        _ => unreachable!(),
    }
    drain_until(&mut guest_rx, "game_started").await;

    let view = service.view(&code).unwrap();
    assert_eq!(view.status, RoomStatus::InGame);
    assert_eq!(view.game_id.as_deref(), Some(game_id.as_str()));
}

#[tokio::test]
async fn third_player_is_rejected_with_room_full() {
    let service = build_service();
    let code = service
        .create_room(identity(1, "alice", 1000.0), false, RoomSettings::default())
        .unwrap();

    let (host_t, _host_rx) = PlayerTransport::channel();
    service.attach(&code, &identity(1, "alice", 1000.0), host_t).unwrap();
    let (guest_t, _guest_rx) = PlayerTransport::channel();
    service.attach(&code, &identity(2, "bob", 1000.0), guest_t).unwrap();

    let (third_t, _third_rx) = PlayerTransport::channel();
    let err = service
        .attach(&code, &identity(3, "carol", 1000.0), third_t)
        .unwrap_err();
    assert!(matches!(err, DuelError::Domain(DomainRejection::RoomFull)));
}

#[tokio::test]
async fn host_leave_promotes_guest_or_destroys_room() {
    let service = build_service();
    let code = service
        .create_room(identity(1, "alice", 1000.0), false, RoomSettings::default())
        .unwrap();
    let (guest_t, _guest_rx) = PlayerTransport::channel();
    service.attach(&code, &identity(2, "bob", 1000.0), guest_t).unwrap();

    service.leave(&code, 1);
    let view = service.view(&code).unwrap();
    assert_eq!(view.host, "bob");
    assert_eq!(view.guest, None);
    assert!(!view.host_ready);

    // Promoted host leaving an empty room destroys it.
    service.leave(&code, 2);
    assert!(matches!(
        service.view(&code),
        Err(DuelError::Domain(DomainRejection::RoomNotFound))
    ));
}

#[tokio::test]
async fn settings_are_host_only_and_validated() {
    let service = build_service();
    let code = service
        .create_room(identity(1, "alice", 1000.0), false, RoomSettings::default())
        .unwrap();
    let (guest_t, _guest_rx) = PlayerTransport::channel();
    service.attach(&code, &identity(2, "bob", 1000.0), guest_t).unwrap();

    let mut settings = RoomSettings::default();
    settings.starting_hp = 500;

    let err = service.update_settings(&code, 2, settings.clone()).unwrap_err();
    assert!(matches!(err, DuelError::Domain(DomainRejection::HostOnly)));

    let view = service.update_settings(&code, 1, settings).unwrap();
    assert_eq!(view.settings.starting_hp, 500);

    let mut invalid = RoomSettings::default();
    invalid.starting_hp = 5000;
    let err = service.update_settings(&code, 1, invalid).unwrap_err();
    assert!(matches!(
        err,
        DuelError::Domain(DomainRejection::InvalidSettings(_))
    ));
}

#[tokio::test]
async fn member_of_another_room_cannot_join() {
    let service = build_service();
    let first = service
        .create_room(identity(1, "alice", 1000.0), false, RoomSettings::default())
        .unwrap();
    let second = service
        .create_room(identity(2, "bob", 1000.0), false, RoomSettings::default())
        .unwrap();
    assert_ne!(first, second);

    let (t, _rx) = PlayerTransport::channel();
    let err = service.attach(&second, &identity(1, "alice", 1000.0), t).unwrap_err();
    assert!(matches!(
        err,
        DuelError::Domain(DomainRejection::AlreadyInRoom)
    ));
}

#[tokio::test]
async fn room_reconnection_supersedes_previous_transport() {
    let service = build_service();
    let host = identity(1, "alice", 1000.0);
    let code = service
        .create_room(host.clone(), false, RoomSettings::default())
        .unwrap();

    let (first_t, mut first_rx) = PlayerTransport::channel();
    service.attach(&code, &host, first_t).unwrap();
    drain_until(&mut first_rx, "room_state").await;

    let (second_t, second_id) = {
        let (t, rx) = PlayerTransport::channel();
        std::mem::forget(rx);
        (t.clone(), t.id())
    };
    service.attach(&code, &host, second_t).unwrap();

    loop {
        match first_rx.recv().await.expect("expected close") {
            Outbound::Close { code, reason } => {
                assert_eq!(code, 4000);
                assert!(reason.contains("Reconnected"));
                break;
            }
            Outbound::Frame(_) => continue,
        }
    }

    // The stale session's disconnect must not evict the replacement.
    service.handle_disconnect(&code, host.id, 0);
    assert!(service.view(&code).is_ok());
    // The current transport going away does leave the room.
    service.handle_disconnect(&code, host.id, second_id);
    assert!(service.view(&code).is_err());
}

#[tokio::test]
async fn directory_coalesces_and_broadcasts_public_rooms() {
    let service = build_service();
    RoomService::spawn_directory_broadcaster(service.clone(), Duration::from_millis(100));

    let (listener, mut listener_rx) = PlayerTransport::channel();
    service.send_directory_snapshot(&listener);
    service.directory().subscribe(listener);

    // Snapshot arrives immediately, before any room exists.
    match drain_until(&mut listener_rx, "room_list").await {
        ServerFrame::RoomList { rooms } => assert!(rooms.is_empty()),
        _ => unreachable!(),
    }

    // A public room marks the directory dirty; the throttled writer picks
    // it up within a window or two.
    let code = service
        .create_room(identity(1, "alice", 1000.0), true, RoomSettings::default())
        .unwrap();
    match drain_until(&mut listener_rx, "room_list").await {
        ServerFrame::RoomList { rooms } => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].room_code, code);
            assert_eq!(rooms[0].host, "alice");
        }
        _ => unreachable!(),
    }

    // Private rooms are never advertised.
    service
        .create_room(identity(2, "bob", 1000.0), false, RoomSettings::default())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let mut last_list = None;
    while let Ok(outbound) = listener_rx.try_recv() {
        if let Outbound::Frame(ServerFrame::RoomList { rooms }) = outbound {
            last_list = Some(rooms);
        }
    }
    if let Some(rooms) = last_list {
        assert_eq!(rooms.len(), 1, "private room must not appear");
    }
}
