use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::auth::{token_from_subprotocol, UserIdentity};
use crate::error::{close_code, DuelError};
use crate::game::engine::MatchHandle;
use crate::game::state::MatchType;
use crate::server::AppState;
use crate::ws::frames::{ClientFrame, ServerFrame};
use crate::ws::transport::{Outbound, PlayerTransport};

/// Socket poll timeout: the loop wakes at least this often so a vanished
/// peer is noticed even when neither side is sending.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/game/queue", get(queue_upgrade))
        .route("/game/ranked-queue", get(ranked_queue_upgrade))
        .route("/game/play/:match_id", get(play_upgrade))
        .route("/practice", get(practice_upgrade))
        .route("/rooms/lobby", get(lobby_upgrade))
        .route("/rooms/:code", get(room_upgrade))
}

/// Negotiate the `access_token|<jwt>` subprotocol and upgrade. Credential
/// failures still complete the upgrade, then close with 4001 so the
/// client sees the stream-level code.
async fn upgrade_with_auth<F, Fut>(
    state: Arc<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    session: F,
) -> Response
where
    F: FnOnce(Arc<AppState>, WebSocket, UserIdentity) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let offered = headers
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let identity = match token_from_subprotocol(&offered) {
        Ok(token) => state.validator.validate(token).await,
        Err(e) => Err(e),
    };

    let ws = ws.protocols([offered]);
    match identity {
        Ok(identity) => ws.on_upgrade(move |socket| session(state, socket, identity)),
        Err(_) => ws.on_upgrade(|socket| async move {
            close_socket(socket, close_code::UNAUTHORIZED, "could not validate credentials")
                .await;
        }),
    }
}

async fn close_socket(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            log::error!("outbound frame not serializable: {e}");
            true
        }
    }
}

/// One pump step: either an outbound delivery or an inbound poll.
enum Pump {
    Inbound(ClientFrame),
    /// Socket gone or close requested; session should end.
    Ended,
    /// Poll timeout or ignorable message.
    Idle,
}

async fn pump_step(
    socket: &mut WebSocket,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>,
) -> Pump {
    tokio::select! {
        outbound = rx.recv() => match outbound {
            Some(Outbound::Frame(frame)) => {
                if send_frame(socket, &frame).await {
                    Pump::Idle
                } else {
                    Pump::Ended
                }
            }
            Some(Outbound::Close { code, reason }) => {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                Pump::Ended
            }
            None => Pump::Ended,
        },
        inbound = tokio::time::timeout(POLL_TIMEOUT, socket.recv()) => match inbound {
            Err(_) => Pump::Idle,
            Ok(None) => Pump::Ended,
            Ok(Some(Err(_))) => Pump::Ended,
            Ok(Some(Ok(Message::Close(_)))) => Pump::Ended,
            Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str(&text) {
                Ok(frame) => Pump::Inbound(frame),
                Err(e) => {
                    let _ = send_frame(socket, &ServerFrame::error(format!("invalid message: {e}")))
                        .await;
                    Pump::Idle
                }
            },
            Ok(Some(Ok(_))) => Pump::Idle,
        },
    }
}

// ---------------------------------------------------------------------------
// Matchmaking queues
// ---------------------------------------------------------------------------

async fn queue_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    upgrade_with_auth(state, ws, headers, |state, socket, identity| {
        queue_session(state, socket, identity, false)
    })
    .await
}

async fn ranked_queue_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    upgrade_with_auth(state, ws, headers, |state, socket, identity| {
        queue_session(state, socket, identity, true)
    })
    .await
}

/// Presence maintains enqueue: no inbound frames are required, the
/// session just forwards `match_found` and dequeues on disconnect.
async fn queue_session(
    state: Arc<AppState>,
    mut socket: WebSocket,
    identity: UserIdentity,
    ranked: bool,
) {
    let (transport, mut rx) = PlayerTransport::channel();
    if let Err(e) = state
        .matchmaker
        .enqueue(transport, identity.clone(), ranked)
        .await
    {
        let code = match &e {
            DuelError::Domain(rejection) => rejection.close_code(),
            _ => close_code::CONFLICT,
        };
        close_socket(socket, code, &e.to_string()).await;
        return;
    }
    log::debug!(
        "{} joined the {} queue",
        identity.username,
        if ranked { "ranked" } else { "unranked" }
    );

    loop {
        match pump_step(&mut socket, &mut rx).await {
            Pump::Ended => break,
            // Queue streams carry no commands; inbound text is keep-alive.
            Pump::Inbound(_) | Pump::Idle => continue,
        }
    }

    state.matchmaker.dequeue(identity.id);
}

// ---------------------------------------------------------------------------
// Live match
// ---------------------------------------------------------------------------

async fn play_upgrade(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    upgrade_with_auth(state, ws, headers, move |state, socket, identity| {
        play_session(state, socket, identity, match_id)
    })
    .await
}

async fn play_session(
    state: Arc<AppState>,
    mut socket: WebSocket,
    identity: UserIdentity,
    match_id: String,
) {
    let Some(handle) = state.coordinator.lookup_by_match(&match_id) else {
        close_socket(socket, close_code::NOT_FOUND, "game not found").await;
        return;
    };

    let (transport, mut rx) = PlayerTransport::channel();
    let transport_id = transport.id();
    // Seat membership is checked by the engine; a non-participant's
    // transport comes back closed with 4004.
    handle.attach(identity.id, transport);

    loop {
        match pump_step(&mut socket, &mut rx).await {
            Pump::Ended => break,
            Pump::Idle => continue,
            Pump::Inbound(frame) => {
                if !dispatch_match_frame(&handle, &identity, frame, &mut socket).await {
                    break;
                }
            }
        }
    }

    handle.detach(identity.id, transport_id);
}

async fn dispatch_match_frame(
    handle: &MatchHandle,
    identity: &UserIdentity,
    frame: ClientFrame,
    socket: &mut WebSocket,
) -> bool {
    match frame {
        ClientFrame::Chat { message } => handle.chat(identity.id, message),
        ClientFrame::Submit { code, language } => handle.submit(identity.id, language, code),
        ClientFrame::Ability { action, ability_id } => {
            handle.ability(identity.id, action, ability_id)
        }
        ClientFrame::Forfeit => handle.forfeit(identity.id),
        ClientFrame::Query => {
            if let Some(view) = handle.query(identity.id).await {
                return send_frame(socket, &ServerFrame::GameState(view)).await;
            }
        }
        _ => {
            return send_frame(
                socket,
                &ServerFrame::error("unsupported message type for this stream"),
            )
            .await;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Practice
// ---------------------------------------------------------------------------

async fn practice_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    upgrade_with_auth(state, ws, headers, practice_session).await
}

/// Practice seats reuse the normal match machinery; the opposing seat has
/// no transport and is driven in-process.
async fn practice_session(state: Arc<AppState>, mut socket: WebSocket, identity: UserIdentity) {
    if state.coordinator.lookup(identity.id).is_some() {
        close_socket(socket, close_code::CONFLICT, "already in a game").await;
        return;
    }

    let distribution = state.matchmaker.problem_distribution();
    let problems = match state.selector.by_distribution(&distribution, true).await {
        Ok(problems) if !problems.is_empty() => problems,
        _ => {
            close_socket(socket, close_code::NOT_FOUND, "no problems available").await;
            return;
        }
    };

    let bot = UserIdentity {
        id: -identity.id,
        username: "practice-bot".to_string(),
        display_name: "Practice Bot".to_string(),
        rating: identity.rating,
    };
    let handle = match state.coordinator.create_match(
        identity.clone(),
        bot,
        problems,
        MatchType::Practice,
        state.settings.game.clone(),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            close_socket(socket, close_code::CONFLICT, &e.to_string()).await;
            return;
        }
    };

    let (transport, mut rx) = PlayerTransport::channel();
    let transport_id = transport.id();
    handle.attach(identity.id, transport);

    loop {
        match pump_step(&mut socket, &mut rx).await {
            Pump::Ended => break,
            Pump::Idle => continue,
            Pump::Inbound(frame) => {
                if !dispatch_match_frame(&handle, &identity, frame, &mut socket).await {
                    break;
                }
            }
        }
    }

    handle.detach(identity.id, transport_id);
}

// ---------------------------------------------------------------------------
// Lobby directory
// ---------------------------------------------------------------------------

async fn lobby_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    upgrade_with_auth(state, ws, headers, lobby_session).await
}

async fn lobby_session(state: Arc<AppState>, mut socket: WebSocket, _identity: UserIdentity) {
    let (transport, mut rx) = PlayerTransport::channel();
    state.rooms.send_directory_snapshot(&transport);
    let listener_id = state.rooms.directory().subscribe(transport);

    loop {
        match pump_step(&mut socket, &mut rx).await {
            Pump::Ended => break,
            // Any inbound text is keep-alive only.
            Pump::Inbound(_) | Pump::Idle => continue,
        }
    }

    state.rooms.directory().unsubscribe(listener_id);
}

// ---------------------------------------------------------------------------
// Custom rooms
// ---------------------------------------------------------------------------

async fn room_upgrade(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> Response {
    upgrade_with_auth(state, ws, headers, move |state, socket, identity| {
        room_session(state, socket, identity, code)
    })
    .await
}

async fn room_session(
    state: Arc<AppState>,
    mut socket: WebSocket,
    identity: UserIdentity,
    code: String,
) {
    let code = code.to_uppercase();
    let (transport, mut rx) = PlayerTransport::channel();
    let transport_id = transport.id();

    if let Err(e) = state.rooms.attach(&code, &identity, transport) {
        let close = match &e {
            DuelError::Domain(rejection) => rejection.close_code(),
            _ => close_code::NOT_FOUND,
        };
        close_socket(socket, close, &e.to_string()).await;
        return;
    }

    loop {
        match pump_step(&mut socket, &mut rx).await {
            Pump::Ended => break,
            Pump::Idle => continue,
            Pump::Inbound(frame) => {
                if !dispatch_room_frame(&state, &code, &identity, frame, &mut socket).await {
                    break;
                }
            }
        }
    }

    state.rooms.handle_disconnect(&code, identity.id, transport_id);
}

async fn dispatch_room_frame(
    state: &Arc<AppState>,
    code: &str,
    identity: &UserIdentity,
    frame: ClientFrame,
    socket: &mut WebSocket,
) -> bool {
    let outcome = match frame {
        ClientFrame::Chat { message } => {
            state.rooms.chat(code, identity.id, message);
            Ok(())
        }
        ClientFrame::ToggleReady => state.rooms.toggle_ready(code, identity.id),
        ClientFrame::StartGame => state.rooms.start_game(code, identity.id).await.map(|_| ()),
        _ => {
            return send_frame(
                socket,
                &ServerFrame::error("unsupported message type for this stream"),
            )
            .await;
        }
    };
    if let Err(e) = outcome {
        return send_frame(socket, &ServerFrame::error(e.to_string())).await;
    }
    true
}
