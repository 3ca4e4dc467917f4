//! Problem handles and the problem-store boundary.
//!
//! Storage and rendering of problems is an external concern; the core works
//! with immutable [`ProblemHandle`]s exposing a public view (what players
//! see) and a validation view (what the judging pipeline needs).

pub mod select;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::types::Difficulty;

/// A sample case shown to players alongside the statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleCase {
    pub input: String,
    pub expected: serde_json::Value,
}

/// Player-facing problem content.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub samples: Vec<SampleCase>,
    /// Starter code keyed by language name.
    pub boilerplate: HashMap<String, String>,
}

/// Judge-facing problem content. Never serialized toward a player stream.
#[derive(Clone, Debug)]
pub struct ValidationView {
    /// Name of the solution method the harness invokes.
    pub method_name: String,
    /// Hidden case argument strings (`--arg1=... --arg2=...`).
    pub hidden_cases: Vec<String>,
    pub hidden_expected: Vec<serde_json::Value>,
    pub sample_cases: Vec<String>,
    pub sample_expected: Vec<serde_json::Value>,
    /// Comparison expression keyed by language name. The harness splices it
    /// verbatim into the generated wrapper.
    pub comparators: HashMap<String, String>,
}

/// Immutable handle to one problem.
#[derive(Clone, Debug)]
pub struct ProblemHandle {
    id: String,
    difficulty: Difficulty,
    public: PublicView,
    validation: ValidationView,
}

impl ProblemHandle {
    pub fn new(
        id: impl Into<String>,
        difficulty: Difficulty,
        public: PublicView,
        validation: ValidationView,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            difficulty,
            public,
            validation,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn public_view(&self) -> &PublicView {
        &self.public
    }

    pub fn validation_view(&self) -> &ValidationView {
        &self.validation
    }

    /// Hidden-suite size; the denominator for partial progress.
    pub fn total_tests(&self) -> u32 {
        self.validation.hidden_cases.len() as u32
    }
}
