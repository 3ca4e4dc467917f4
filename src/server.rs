//! Application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::auth::TokenValidator;
use crate::config::Settings;
use crate::game::coordinator::MatchCoordinator;
use crate::matchmaking::Matchmaker;
use crate::persistence::MatchStore;
use crate::pipeline::{JudgePipeline, SubmissionPipeline};
use crate::problems::select::ProblemSelector;
use crate::problems::store::ProblemStore;
use crate::rooms::RoomService;
use crate::{http, ws};

pub struct AppState {
    pub settings: Settings,
    pub validator: Arc<dyn TokenValidator>,
    pub coordinator: Arc<MatchCoordinator>,
    pub matchmaker: Arc<Matchmaker>,
    pub rooms: Arc<RoomService>,
    pub selector: Arc<ProblemSelector>,
}

impl AppState {
    /// Wire the full service graph. Must run inside a runtime: the room
    /// directory broadcaster is spawned here.
    pub fn new(
        settings: Settings,
        validator: Arc<dyn TokenValidator>,
        problem_store: Arc<dyn ProblemStore>,
        match_store: Arc<dyn MatchStore>,
    ) -> Arc<Self> {
        let pipeline: Arc<dyn JudgePipeline> =
            Arc::new(SubmissionPipeline::new(settings.sandbox.clone()));
        Self::with_pipeline(settings, validator, problem_store, match_store, pipeline)
    }

    /// Same wiring with an injected judging pipeline (tests use scripted
    /// pipelines instead of the sandbox).
    pub fn with_pipeline(
        settings: Settings,
        validator: Arc<dyn TokenValidator>,
        problem_store: Arc<dyn ProblemStore>,
        match_store: Arc<dyn MatchStore>,
        pipeline: Arc<dyn JudgePipeline>,
    ) -> Arc<Self> {
        let coordinator = Arc::new(MatchCoordinator::new(
            pipeline,
            match_store,
            settings.rating_k,
        ));
        let selector = Arc::new(ProblemSelector::new(problem_store));
        let matchmaker = Arc::new(Matchmaker::new(
            &settings,
            coordinator.clone(),
            selector.clone(),
        ));
        let rooms = Arc::new(RoomService::new(
            coordinator.clone(),
            selector.clone(),
            settings.game.clone(),
            settings.room_code_length,
        ));
        RoomService::spawn_directory_broadcaster(
            rooms.clone(),
            Duration::from_secs(settings.room_update_throttle_secs),
        );

        Arc::new(Self {
            settings,
            validator,
            coordinator,
            matchmaker,
            rooms,
            selector,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(http::router())
        .merge(ws::routes::router())
        .with_state(state)
}
