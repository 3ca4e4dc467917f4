//! Top-level match lifecycle.
//!
//! Owns the active-match and player-to-match indexes. Each created match
//! runs as its own engine task ([`crate::game::engine`]); the task removes
//! itself from the registry during finalize, so the indexes never hold a
//! finished match.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::config::types::GameSettings;
use crate::error::{DomainRejection, Result};
use crate::game::engine::{EngineDeps, MatchEngine, MatchHandle};
use crate::game::state::{MatchState, MatchType};
use crate::persistence::MatchStore;
use crate::pipeline::JudgePipeline;
use crate::problems::ProblemHandle;

/// Shared lookup maps. Engine tasks hold an Arc so finalize can drop
/// entries without going through the coordinator.
#[derive(Default)]
pub struct MatchRegistry {
    matches: DashMap<String, MatchHandle>,
    players: DashMap<i64, String>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_player(&self, user_id: i64) -> Option<MatchHandle> {
        let match_id = self.players.get(&user_id)?.clone();
        self.matches.get(&match_id).map(|entry| entry.clone())
    }

    pub fn by_id(&self, match_id: &str) -> Option<MatchHandle> {
        self.matches.get(match_id).map(|entry| entry.clone())
    }

    pub fn has_active(&self, user_id: i64) -> bool {
        self.players.contains_key(&user_id)
    }

    pub fn active_count(&self) -> usize {
        self.matches.len()
    }

    fn insert(&self, handle: MatchHandle, players: [i64; 2]) {
        for user_id in players {
            self.players.insert(user_id, handle.id().to_string());
        }
        self.matches.insert(handle.id().to_string(), handle);
    }

    /// Called exactly once per match, from the engine's finalize. A seat
    /// index entry is only dropped while it still points at this match;
    /// a player who already started a new match keeps the new entry.
    pub fn remove_match(&self, match_id: &str, players: [i64; 2]) {
        self.matches.remove(match_id);
        for user_id in players {
            self.players
                .remove_if(&user_id, |_, current| current == match_id);
        }
    }
}

pub struct MatchCoordinator {
    registry: Arc<MatchRegistry>,
    pipeline: Arc<dyn JudgePipeline>,
    store: Arc<dyn MatchStore>,
    rating_k: f64,
}

impl MatchCoordinator {
    pub fn new(
        pipeline: Arc<dyn JudgePipeline>,
        store: Arc<dyn MatchStore>,
        rating_k: f64,
    ) -> Self {
        Self {
            registry: Arc::new(MatchRegistry::new()),
            pipeline,
            store,
            rating_k,
        }
    }

    pub fn registry(&self) -> Arc<MatchRegistry> {
        self.registry.clone()
    }

    pub fn lookup(&self, user_id: i64) -> Option<MatchHandle> {
        self.registry.by_player(user_id)
    }

    pub fn lookup_by_match(&self, match_id: &str) -> Option<MatchHandle> {
        self.registry.by_id(match_id)
    }

    /// Create and start a match. Admission into a match is atomic with the
    /// active-index check.
    pub fn create_match(
        &self,
        p1: UserIdentity,
        p2: UserIdentity,
        problems: Vec<Arc<ProblemHandle>>,
        match_type: MatchType,
        settings: GameSettings,
    ) -> Result<MatchHandle> {
        if self.registry.has_active(p1.id) || self.registry.has_active(p2.id) {
            return Err(DomainRejection::AlreadyInGame.into());
        }
        let players = [p1.id, p2.id];
        let state = MatchState::new(
            Uuid::new_v4().to_string(),
            p1,
            p2,
            problems,
            match_type,
            settings,
        );
        let handle = MatchEngine::spawn(
            state,
            EngineDeps {
                pipeline: self.pipeline.clone(),
                store: self.store.clone(),
                registry: self.registry.clone(),
                rating_k: self.rating_k,
            },
        );
        self.registry.insert(handle.clone(), players);
        log::info!(
            "created {} match {} for players {:?}",
            match_type_name(match_type),
            handle.id(),
            players
        );
        Ok(handle)
    }
}

fn match_type_name(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::Unranked => "unranked",
        MatchType::Ranked => "ranked",
        MatchType::Custom => "custom",
        MatchType::Practice => "practice",
    }
}
