//! Durable match history boundary.
//!
//! Storage itself is an external collaborator; the core builds one
//! [`MatchRecord`] per finished match and hands it over exactly once
//! during finalize. Persistence faults are logged and never unwind the
//! engine.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::game::state::MatchType;

/// One seat's final line in the record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub user_id: i64,
    pub username: String,
    pub hp: u32,
    pub problems_solved: u32,
    /// problem-index -> greatest hidden-test count ever passed.
    pub partial_progress: BTreeMap<usize, u32>,
    /// Ranked matches only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_change: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub match_type: MatchType,
    pub p1: PlayerRecord,
    pub p2: PlayerRecord,
    /// `None` on a draw.
    pub winner_id: Option<i64>,
    pub problem_ids: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Persistence collaborator.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn save_match(&self, record: &MatchRecord) -> Result<()>;
}

/// Stand-alone store: logs the record and drops it.
#[derive(Debug, Default)]
pub struct LogMatchStore;

#[async_trait]
impl MatchStore for LogMatchStore {
    async fn save_match(&self, record: &MatchRecord) -> Result<()> {
        match serde_json::to_string(record) {
            Ok(json) => log::info!("match record: {json}"),
            Err(e) => log::warn!("match record for {} not serializable: {e}", record.match_id),
        }
        Ok(())
    }
}
