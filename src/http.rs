//! REST surface.
//!
//! Auth-subsystem routes (register/login/token refresh) live in an
//! external service; this router only carries the game-adjacent
//! endpoints. Errors are JSON `{detail}` bodies with conventional status
//! codes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::UserIdentity;
use crate::error::{DomainRejection, DuelError};
use crate::game::state::GameView;
use crate::rooms::{RoomSettings, RoomView};
use crate::server::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/game/current-game", get(current_game))
        .route("/rooms/create", post(create_room))
        .route("/rooms/:code", get(room_view))
        .route("/rooms/:code/settings", patch(update_room_settings))
}

struct ApiError(DuelError);

impl From<DuelError> for ApiError {
    fn from(e: DuelError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DuelError::Auth => StatusCode::UNAUTHORIZED,
            DuelError::Domain(rejection) => match rejection {
                DomainRejection::RoomNotFound
                | DomainRejection::GameNotFound
                | DomainRejection::PlayerNotFound => StatusCode::NOT_FOUND,
                DomainRejection::HostOnly | DomainRejection::GuestCannotStart => {
                    StatusCode::FORBIDDEN
                }
                DomainRejection::InvalidSettings(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::CONFLICT,
            },
            DuelError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserIdentity, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError(DuelError::Auth))?;
    state.validator.validate(token).await.map_err(ApiError)
}

/// The caller's view of their active match, or null.
async fn current_game(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Option<GameView>>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let view = match state.coordinator.lookup(identity.id) {
        Some(handle) => handle.query(identity.id).await,
        None => None,
    };
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct CreateRoomQuery {
    #[serde(default)]
    is_public: bool,
}

#[derive(Debug, Serialize)]
struct CreateRoomResponse {
    room_code: String,
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CreateRoomQuery>,
    headers: HeaderMap,
    settings: Option<Json<RoomSettings>>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let settings = settings.map(|Json(s)| s).unwrap_or_default();
    let room_code = state.rooms.create_room(identity, query.is_public, settings)?;
    Ok(Json(CreateRoomResponse { room_code }))
}

async fn room_view(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomView>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.rooms.view(&code.to_uppercase())?))
}

async fn update_room_settings(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(settings): Json<RoomSettings>,
) -> Result<Json<RoomView>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let view = state
        .rooms
        .update_settings(&code.to_uppercase(), identity.id, settings)?;
    Ok(Json(view))
}
