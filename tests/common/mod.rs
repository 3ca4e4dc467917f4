//! Shared fixtures: scripted judging pipeline, recording match store,
//! problem builders and frame helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use duelbox::auth::UserIdentity;
use duelbox::config::types::Difficulty;
use duelbox::error::Result;
use duelbox::persistence::{MatchRecord, MatchStore};
use duelbox::pipeline::{JudgePipeline, SubmissionResult};
use duelbox::problems::{ProblemHandle, PublicView, ValidationView};
use duelbox::sandbox::SuiteSummary;
use duelbox::ws::frames::ServerFrame;
use duelbox::ws::transport::Outbound;
use duelbox::Language;

pub fn identity(id: i64, name: &str, rating: f64) -> UserIdentity {
    UserIdentity {
        id,
        username: name.to_string(),
        display_name: name.to_string(),
        rating,
    }
}

pub fn problem(id: &str, difficulty: Difficulty, tests: usize) -> Arc<ProblemHandle> {
    ProblemHandle::new(
        id,
        difficulty,
        PublicView {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            difficulty,
            samples: Vec::new(),
            boilerplate: HashMap::new(),
        },
        ValidationView {
            method_name: "solve".to_string(),
            hidden_cases: (0..tests).map(|i| format!("--arg1={i}")).collect(),
            hidden_expected: (0..tests).map(|i| serde_json::json!(i)).collect(),
            sample_cases: vec!["--arg1=0".to_string()],
            sample_expected: vec![serde_json::json!(0)],
            comparators: HashMap::new(),
        },
    )
}

pub fn easy_problems(count: usize) -> Vec<Arc<ProblemHandle>> {
    (0..count)
        .map(|i| problem(&format!("p{i}"), Difficulty::Easy, 10))
        .collect()
}

/// Judging stub driven by the submitted "code": `pass:<n>` passes n of the
/// hidden suite, `fail:<msg>` is a pipeline-level failure. Counts calls so
/// cooldown tests can assert the sandbox was never reached.
#[derive(Default)]
pub struct ScriptedPipeline {
    pub calls: AtomicUsize,
}

#[async_trait]
impl JudgePipeline for ScriptedPipeline {
    async fn judge(
        &self,
        problem: &ProblemHandle,
        _language: Language,
        code: &str,
    ) -> SubmissionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = problem.total_tests();
        if let Some(n) = code.strip_prefix("pass:") {
            let passed: u32 = n.parse().expect("scripted pass count");
            SubmissionResult {
                success: true,
                message: None,
                test_results: None,
                sample_results: None,
                summary: SuiteSummary {
                    total_tests: total,
                    passed_tests: passed.min(total),
                },
            }
        } else if let Some(message) = code.strip_prefix("fail:") {
            SubmissionResult::failure(message.to_string(), total)
        } else {
            SubmissionResult::failure("unscripted submission", total)
        }
    }
}

/// Captures records handed to persistence.
#[derive(Default)]
pub struct RecordingStore {
    pub records: Mutex<Vec<MatchRecord>>,
}

#[async_trait]
impl MatchStore for RecordingStore {
    async fn save_match(&self, record: &MatchRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Next frame from a transport receiver, failing loudly on closes and
/// timeouts.
pub async fn next_frame(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>) -> ServerFrame {
    match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
        Ok(Some(Outbound::Frame(frame))) => frame,
        Ok(Some(Outbound::Close { code, reason })) => {
            panic!("expected frame, got close {code} ({reason})")
        }
        Ok(None) => panic!("transport channel closed"),
        Err(_) => panic!("timed out waiting for frame"),
    }
}

/// Next outbound item of any kind.
pub async fn next_outbound(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>) -> Outbound {
    match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
        Ok(Some(outbound)) => outbound,
        Ok(None) => panic!("transport channel closed"),
        Err(_) => panic!("timed out waiting for outbound"),
    }
}

pub fn frame_type(frame: &ServerFrame) -> &'static str {
    match frame {
        ServerFrame::MatchFound { .. } => "match_found",
        ServerFrame::GameState(_) => "game_state",
        ServerFrame::Problem { .. } => "problem",
        ServerFrame::GameStart { .. } => "game_start",
        ServerFrame::SubmissionResult(_) => "submission_result",
        ServerFrame::Chat(_) => "chat",
        ServerFrame::AbilityBought { .. } => "ability_bought",
        ServerFrame::AbilityUsed { .. } => "ability_used",
        ServerFrame::Error { .. } => "error",
        ServerFrame::MatchEnd(_) => "match_end",
        ServerFrame::RoomState(_) => "room_state",
        ServerFrame::SettingsUpdated(_) => "settings_updated",
        ServerFrame::GameStarted { .. } => "game_started",
        ServerFrame::RoomList { .. } => "room_list",
    }
}
