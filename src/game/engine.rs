//! Single-owner match task.
//!
//! All mutations of one match flow through its command channel and are
//! applied by one task, so per-match serialization and the broadcast
//! ordering guarantees hold by construction. Sandbox judging runs off the
//! task; its outcome re-enters the channel as `SubmissionJudged` and is
//! applied even if the submitter's transport is gone by then.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::types::Language;
use crate::error::close_code;
use crate::game::coordinator::MatchRegistry;
use crate::game::rating;
use crate::game::state::{GameView, MatchResult, MatchState, MatchStatus, MatchType};
use crate::persistence::{MatchRecord, MatchStore, PlayerRecord};
use crate::pipeline::{JudgePipeline, SubmissionResult};
use crate::ws::frames::{AbilityAction, ChatMessage, ServerFrame, SubmissionReport};
use crate::ws::transport::PlayerTransport;

pub enum MatchCommand {
    Attach {
        user_id: i64,
        transport: PlayerTransport,
    },
    /// Clear a seat's transport if it is still the given one.
    Detach {
        user_id: i64,
        transport_id: u64,
    },
    Submit {
        user_id: i64,
        language: String,
        code: String,
    },
    Ability {
        user_id: i64,
        action: AbilityAction,
        ability_id: String,
    },
    Forfeit {
        user_id: i64,
    },
    Chat {
        user_id: i64,
        message: String,
    },
    Query {
        user_id: i64,
        reply: oneshot::Sender<Option<GameView>>,
    },
    /// Judged submission re-entering the loop.
    SubmissionJudged {
        user_id: i64,
        problem_index: usize,
        result: SubmissionResult,
    },
}

/// Cheap cloneable front for one match task. Sends after the match
/// finished are silently dropped, which is exactly the "ignored, no
/// frames" contract.
#[derive(Clone)]
pub struct MatchHandle {
    id: String,
    tx: mpsc::UnboundedSender<MatchCommand>,
}

impl MatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attach(&self, user_id: i64, transport: PlayerTransport) {
        let _ = self.tx.send(MatchCommand::Attach { user_id, transport });
    }

    pub fn detach(&self, user_id: i64, transport_id: u64) {
        let _ = self.tx.send(MatchCommand::Detach {
            user_id,
            transport_id,
        });
    }

    pub fn submit(&self, user_id: i64, language: String, code: String) {
        let _ = self.tx.send(MatchCommand::Submit {
            user_id,
            language,
            code,
        });
    }

    pub fn ability(&self, user_id: i64, action: AbilityAction, ability_id: String) {
        let _ = self.tx.send(MatchCommand::Ability {
            user_id,
            action,
            ability_id,
        });
    }

    pub fn forfeit(&self, user_id: i64) {
        let _ = self.tx.send(MatchCommand::Forfeit { user_id });
    }

    pub fn chat(&self, user_id: i64, message: String) {
        let _ = self.tx.send(MatchCommand::Chat { user_id, message });
    }

    pub async fn query(&self, user_id: i64) -> Option<GameView> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(MatchCommand::Query { user_id, reply }).ok()?;
        rx.await.ok().flatten()
    }
}

/// Dependencies shared by every match task.
pub struct EngineDeps {
    pub pipeline: Arc<dyn JudgePipeline>,
    pub store: Arc<dyn MatchStore>,
    pub registry: Arc<MatchRegistry>,
    pub rating_k: f64,
}

pub struct MatchEngine {
    state: MatchState,
    deps: EngineDeps,
    rx: mpsc::UnboundedReceiver<MatchCommand>,
    tx: mpsc::UnboundedSender<MatchCommand>,
}

impl MatchEngine {
    /// Spawn the task for a freshly created match and return its handle.
    pub fn spawn(state: MatchState, deps: EngineDeps) -> MatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = MatchHandle {
            id: state.id.clone(),
            tx: tx.clone(),
        };
        let engine = MatchEngine {
            state,
            deps,
            rx,
            tx,
        };
        tokio::spawn(engine.run());
        handle
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.handle_tick().await {
                        break;
                    }
                }
            }
        }
        log::debug!("match {} task exited", self.state.id);
    }

    /// Returns true once the match is finalized and the task should exit.
    async fn handle_command(&mut self, command: MatchCommand) -> bool {
        match command {
            MatchCommand::Attach { user_id, transport } => {
                self.handle_attach(user_id, transport);
                false
            }
            MatchCommand::Detach {
                user_id,
                transport_id,
            } => {
                if let Some(seat) = self.state.seat_index(user_id) {
                    let slot = self.state.seat_mut(seat);
                    if slot
                        .transport
                        .as_ref()
                        .is_some_and(|t| t.id() == transport_id)
                    {
                        slot.transport = None;
                    }
                }
                false
            }
            MatchCommand::Submit {
                user_id,
                language,
                code,
            } => {
                self.handle_submit(user_id, language, code);
                false
            }
            MatchCommand::SubmissionJudged {
                user_id,
                problem_index,
                result,
            } => self.handle_judged(user_id, problem_index, result).await,
            MatchCommand::Ability {
                user_id,
                action,
                ability_id,
            } => {
                self.handle_ability(user_id, action, &ability_id);
                false
            }
            MatchCommand::Forfeit { user_id } => self.handle_forfeit(user_id).await,
            MatchCommand::Chat { user_id, message } => {
                self.handle_chat(user_id, message);
                false
            }
            MatchCommand::Query { user_id, reply } => {
                let view = self
                    .state
                    .seat_index(user_id)
                    .map(|seat| self.state.game_view(seat));
                let _ = reply.send(view);
                false
            }
        }
    }

    fn handle_attach(&mut self, user_id: i64, transport: PlayerTransport) {
        let Some(seat) = self.state.seat_index(user_id) else {
            transport.close(close_code::NOT_FOUND, "not a player in this match");
            return;
        };

        let slot = self.state.seat_mut(seat);
        if let Some(previous) = slot.transport.take() {
            previous.close(close_code::CONFLICT, "Reconnected from another session");
        }
        slot.transport = Some(transport);

        let view = self.state.game_view(seat);
        self.send_to_seat(seat, ServerFrame::GameState(view));
        if self.state.status == MatchStatus::InProgress {
            let index = self.state.seat(seat).current_problem_index;
            self.dispatch_problem(seat, index);
        }

        let ready = match self.state.match_type {
            // A practice seat is driven in-process with no transport.
            MatchType::Practice => self.state.any_attached(),
            _ => self.state.both_attached(),
        };
        if self.state.status == MatchStatus::Waiting && ready {
            self.state.begin();
            let match_id = self.state.id.clone();
            for seat in 0..2 {
                self.send_to_seat(
                    seat,
                    ServerFrame::GameStart {
                        match_id: match_id.clone(),
                    },
                );
            }
            for seat in 0..2 {
                self.dispatch_problem(seat, 0);
            }
        }
    }

    fn handle_submit(&mut self, user_id: i64, language: String, code: String) {
        let Some(seat) = self.state.seat_index(user_id) else {
            return;
        };
        if self.state.status != MatchStatus::InProgress {
            self.send_to_seat(seat, ServerFrame::error("match is not in progress"));
            return;
        }

        let now = Instant::now();
        if let Some(remaining) = self.state.cooldown_remaining(seat, now) {
            self.send_to_seat(
                seat,
                ServerFrame::error(format!(
                    "submission cooldown: {:.1}s remaining",
                    remaining.as_secs_f64()
                )),
            );
            return;
        }
        self.state.seat_mut(seat).last_submission_at = Some(now);

        let language = match Language::parse(&language) {
            Ok(language) => language,
            Err(e) => {
                self.send_to_seat(seat, ServerFrame::error(e.to_string()));
                return;
            }
        };

        let index = self.state.seat(seat).current_problem_index;
        if index >= self.state.problem_count() {
            self.send_to_seat(seat, ServerFrame::error("all problems already solved"));
            return;
        }

        let problem = self.state.problems[index].clone();
        let pipeline = self.deps.pipeline.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = pipeline.judge(&problem, language, &code).await;
            let _ = tx.send(MatchCommand::SubmissionJudged {
                user_id,
                problem_index: index,
                result,
            });
        });
    }

    async fn handle_judged(
        &mut self,
        user_id: i64,
        problem_index: usize,
        result: SubmissionResult,
    ) -> bool {
        if self.state.status == MatchStatus::Finished {
            // Late result after match end: no frames, no mutation.
            return false;
        }
        let Some(seat) = self.state.seat_index(user_id) else {
            return false;
        };

        if !result.success {
            self.send_to_seat(
                seat,
                ServerFrame::SubmissionResult(SubmissionReport {
                    problem_index,
                    deducted_hp: 0,
                    problem_solved: false,
                    result,
                }),
            );
            return false;
        }

        let applied = self.state.apply_submission(seat, problem_index, &result);
        self.send_to_seat(
            seat,
            ServerFrame::SubmissionResult(SubmissionReport {
                problem_index,
                deducted_hp: applied.deducted_hp,
                problem_solved: applied.problem_solved,
                result,
            }),
        );
        self.broadcast_game_state();

        if self.state.evaluate_end() {
            self.finalize().await;
            return true;
        }
        if let Some(next) = applied.next_problem_index {
            self.dispatch_problem(seat, next);
        }
        false
    }

    fn handle_ability(&mut self, user_id: i64, action: AbilityAction, ability_id: &str) {
        let Some(seat) = self.state.seat_index(user_id) else {
            return;
        };
        if self.state.status != MatchStatus::InProgress {
            self.send_to_seat(seat, ServerFrame::error("match is not in progress"));
            return;
        }
        let username = self.state.seat(seat).username().to_string();
        let outcome = match action {
            AbilityAction::Buy => self.state.buy_ability(seat, ability_id),
            AbilityAction::Use => self.state.use_ability(seat, ability_id),
        };
        match outcome {
            Ok(()) => {
                let frame = match action {
                    AbilityAction::Buy => ServerFrame::AbilityBought {
                        username,
                        ability_id: ability_id.to_string(),
                    },
                    AbilityAction::Use => ServerFrame::AbilityUsed {
                        username,
                        ability_id: ability_id.to_string(),
                    },
                };
                for seat in 0..2 {
                    self.send_to_seat(seat, frame.clone());
                }
                self.broadcast_game_state();
            }
            Err(message) => self.send_to_seat(seat, ServerFrame::error(message)),
        }
    }

    async fn handle_forfeit(&mut self, user_id: i64) -> bool {
        if self.state.status == MatchStatus::Finished {
            return false;
        }
        let Some(seat) = self.state.seat_index(user_id) else {
            return false;
        };
        self.state.forfeit(seat);
        self.broadcast_game_state();
        self.finalize().await;
        true
    }

    fn handle_chat(&mut self, user_id: i64, message: String) {
        if self.state.status == MatchStatus::Finished {
            return;
        }
        let Some(seat) = self.state.seat_index(user_id) else {
            return;
        };
        let frame = ServerFrame::Chat(ChatMessage {
            sender: self.state.seat(seat).username().to_string(),
            message,
            timestamp: Utc::now().timestamp_millis(),
        });
        for seat in 0..2 {
            self.send_to_seat(seat, frame.clone());
        }
    }

    async fn handle_tick(&mut self) -> bool {
        if self.state.check_timeout(Instant::now()) {
            self.broadcast_game_state();
            self.finalize().await;
            return true;
        }
        false
    }

    /// Deliver a frame to a seat. Absent transport is a no-op; a dead one
    /// is cleared so reconnection starts clean.
    fn send_to_seat(&mut self, seat: usize, frame: ServerFrame) {
        let slot = self.state.seat_mut(seat);
        if let Some(transport) = &slot.transport {
            if !transport.send(frame) {
                slot.transport = None;
            }
        }
    }

    fn broadcast_game_state(&mut self) {
        for seat in 0..2 {
            let view = self.state.game_view(seat);
            self.send_to_seat(seat, ServerFrame::GameState(view));
        }
    }

    fn dispatch_problem(&mut self, seat: usize, index: usize) {
        if index >= self.state.problem_count() {
            return;
        }
        let problem = self.state.problems[index].public_view().clone();
        self.send_to_seat(
            seat,
            ServerFrame::Problem {
                problem_index: index,
                problem,
            },
        );
    }

    /// Terminal path, gated by the cleanup latch: broadcast `match_end`,
    /// persist the record, drop the match from the registry. The terminal
    /// broadcast precedes persistence so a storage fault can never
    /// withhold the result from players.
    async fn finalize(&mut self) {
        if self.state.cleanup_latch {
            return;
        }
        self.state.cleanup_latch = true;

        let (change_a, change_b) = self.rating_changes();
        let result = MatchResult {
            match_id: self.state.id.clone(),
            winner: self.state.winner_username.clone(),
            p1: self.state.player_outcome(0, change_a),
            p2: self.state.player_outcome(1, change_b),
        };
        for seat in 0..2 {
            self.send_to_seat(seat, ServerFrame::MatchEnd(result.clone()));
        }
        for seat in 0..2 {
            if let Some(transport) = self.state.seat_mut(seat).transport.take() {
                transport.close(1000, "match ended");
            }
        }

        let record = self.build_record(change_a, change_b);
        if let Err(e) = self.deps.store.save_match(&record).await {
            log::error!("failed to persist match {}: {e}", self.state.id);
        }

        self.deps.registry.remove_match(
            &self.state.id,
            [self.state.seat(0).identity.id, self.state.seat(1).identity.id],
        );
    }

    /// Ranked matches move ratings; every other type leaves them alone.
    fn rating_changes(&self) -> (Option<f64>, Option<f64>) {
        if self.state.match_type != MatchType::Ranked {
            return (None, None);
        }
        let a = &self.state.seat(0).identity;
        let b = &self.state.seat(1).identity;
        let (score_a, score_b) = match self.state.winner_username.as_deref() {
            Some(winner) if winner == a.username => (1.0, 0.0),
            Some(_) => (0.0, 1.0),
            None => (0.5, 0.5),
        };
        (
            Some(rating::rating_delta(
                self.deps.rating_k,
                a.rating,
                b.rating,
                score_a,
            )),
            Some(rating::rating_delta(
                self.deps.rating_k,
                b.rating,
                a.rating,
                score_b,
            )),
        )
    }

    fn build_record(&self, change_a: Option<f64>, change_b: Option<f64>) -> MatchRecord {
        let seat_record = |seat: usize, rating_change: Option<f64>| {
            let slot = self.state.seat(seat);
            PlayerRecord {
                user_id: slot.identity.id,
                username: slot.identity.username.clone(),
                hp: slot.hp,
                problems_solved: slot.problems_solved,
                partial_progress: slot.partial_progress.clone(),
                rating_change,
            }
        };
        let winner_id = self.state.winner_username.as_deref().and_then(|winner| {
            [0, 1]
                .into_iter()
                .find(|seat| self.state.seat(*seat).identity.username == winner)
                .map(|seat| self.state.seat(seat).identity.id)
        });
        MatchRecord {
            match_id: self.state.id.clone(),
            match_type: self.state.match_type,
            p1: seat_record(0, change_a),
            p2: seat_record(1, change_b),
            winner_id,
            problem_ids: self
                .state
                .problems
                .iter()
                .map(|p| p.id().to_string())
                .collect(),
            start_time: self.state.start_time,
            end_time: Utc::now(),
        }
    }
}
