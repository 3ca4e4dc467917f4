//! Authoritative per-match state.
//!
//! Pure state and rules: no channels, no sockets. The engine task
//! ([`crate::game::engine`]) owns one [`MatchState`] and serializes every
//! mutation; everything here is synchronous and deterministic so the rules
//! can be tested without a runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::auth::UserIdentity;
use crate::config::types::GameSettings;
use crate::game::abilities::{self, AbilityEffect};
use crate::pipeline::SubmissionResult;
use crate::problems::ProblemHandle;
use crate::ws::transport::PlayerTransport;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Unranked,
    Ranked,
    Custom,
    Practice,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchStatus {
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "FINISHED")]
    Finished,
}

/// One seat.
pub struct PlayerSlot {
    pub identity: UserIdentity,
    pub hp: u32,
    /// Total healing received; raises the HP ceiling.
    pub healed: u32,
    /// 0-based; equals the problem count once every problem is solved.
    pub current_problem_index: usize,
    pub problems_solved: u32,
    /// problem-index -> greatest hidden-test count ever passed there.
    pub partial_progress: BTreeMap<usize, u32>,
    pub last_submission_at: Option<Instant>,
    pub skill_points: u32,
    pub mana_points: u32,
    pub owned_abilities: BTreeSet<String>,
    pub transport: Option<PlayerTransport>,
}

impl PlayerSlot {
    fn new(identity: UserIdentity, settings: &GameSettings) -> Self {
        Self {
            identity,
            hp: settings.starting_hp,
            healed: 0,
            current_problem_index: 0,
            problems_solved: 0,
            partial_progress: BTreeMap::new(),
            last_submission_at: None,
            skill_points: settings.starting_skill_points,
            mana_points: settings.starting_mana_points,
            owned_abilities: BTreeSet::new(),
            transport: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }
}

/// How one judged submission changed the match.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionApplied {
    pub deducted_hp: u32,
    pub problem_solved: bool,
    /// Index of the next problem to dispatch, when one exists.
    pub next_problem_index: Option<usize>,
}

/// Seat-tailored state snapshot; never exposes the opponent's resources
/// or abilities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameView {
    pub match_id: String,
    pub opponent_name: String,
    pub opponent_display_name: String,
    pub current_problem_index: usize,
    pub problems_solved: u32,
    pub opponent_problems_solved: u32,
    pub your_hp: u32,
    pub opponent_hp: u32,
    pub match_type: MatchType,
    pub start_time: DateTime<Utc>,
    pub status: MatchStatus,
    pub winner: Option<String>,
    pub skill_points: u32,
    pub mana_points: u32,
    pub abilities: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerOutcome {
    pub username: String,
    pub hp: u32,
    pub problems_solved: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_change: Option<f64>,
}

/// `match_end` payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub match_id: String,
    /// `None` means a draw.
    pub winner: Option<String>,
    pub p1: PlayerOutcome,
    pub p2: PlayerOutcome,
}

/// Why the match ended; drives winner selection precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndCause {
    HpDepleted,
    AllSolved,
    Timeout,
}

pub struct MatchState {
    pub id: String,
    pub status: MatchStatus,
    pub match_type: MatchType,
    pub settings: GameSettings,
    pub problems: Vec<Arc<ProblemHandle>>,
    pub start_time: DateTime<Utc>,
    pub winner_username: Option<String>,
    /// End-of-match side effects run exactly once.
    pub cleanup_latch: bool,
    pub timeout_deadline: Instant,
    seats: [PlayerSlot; 2],
}

impl MatchState {
    pub fn new(
        id: String,
        p1: UserIdentity,
        p2: UserIdentity,
        problems: Vec<Arc<ProblemHandle>>,
        match_type: MatchType,
        settings: GameSettings,
    ) -> Self {
        let timeout = Duration::from_secs(settings.match_timeout_secs);
        Self {
            id,
            status: MatchStatus::Waiting,
            match_type,
            seats: [
                PlayerSlot::new(p1, &settings),
                PlayerSlot::new(p2, &settings),
            ],
            problems,
            start_time: Utc::now(),
            winner_username: None,
            cleanup_latch: false,
            timeout_deadline: Instant::now() + timeout,
            settings,
        }
    }

    pub fn problem_count(&self) -> usize {
        self.problems.len()
    }

    pub fn seat_index(&self, user_id: i64) -> Option<usize> {
        self.seats.iter().position(|s| s.identity.id == user_id)
    }

    pub fn seat(&self, index: usize) -> &PlayerSlot {
        &self.seats[index]
    }

    pub fn seat_mut(&mut self, index: usize) -> &mut PlayerSlot {
        &mut self.seats[index]
    }

    /// Borrow a seat and its opponent at once.
    pub fn seat_pair_mut(&mut self, index: usize) -> (&mut PlayerSlot, &mut PlayerSlot) {
        let (left, right) = self.seats.split_at_mut(1);
        if index == 0 {
            (&mut left[0], &mut right[0])
        } else {
            (&mut right[0], &mut left[0])
        }
    }

    pub fn both_attached(&self) -> bool {
        self.seats.iter().all(|s| s.transport.is_some())
    }

    pub fn any_attached(&self) -> bool {
        self.seats.iter().any(|s| s.transport.is_some())
    }

    /// Move to IN_PROGRESS; the timeout clock restarts from now (deadlines
    /// may extend, never compress).
    pub fn begin(&mut self) {
        self.status = MatchStatus::InProgress;
        let deadline = Instant::now() + Duration::from_secs(self.settings.match_timeout_secs);
        if deadline > self.timeout_deadline {
            self.timeout_deadline = deadline;
        }
    }

    /// Remaining cooldown for a seat, if any.
    pub fn cooldown_remaining(&self, seat: usize, now: Instant) -> Option<Duration> {
        let cooldown = Duration::from_secs(self.settings.submission_cooldown_secs);
        let last = self.seats[seat].last_submission_at?;
        let elapsed = now.duration_since(last);
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }

    /// Apply a judged submission for `seat` on `problem_index`.
    ///
    /// Damage rule: only test cases passed beyond the seat's best previous
    /// run on this problem deal damage; re-running old passes is free for
    /// the opponent.
    pub fn apply_submission(
        &mut self,
        seat: usize,
        problem_index: usize,
        result: &SubmissionResult,
    ) -> SubmissionApplied {
        let base = self.settings.base_hp_deduction;
        let problem = &self.problems[problem_index];
        let multiplier = self.settings.hp_multipliers.get(problem.difficulty());
        let total = problem.total_tests();
        let mana_recharge = self.settings.mana_recharge;
        let problem_count = self.problems.len();

        let (player, opponent) = self.seat_pair_mut(seat);

        // Grants are per successful submission, solved or not.
        player.skill_points += 1;
        player.mana_points += mana_recharge;

        let passed = result.summary.passed_tests.min(total);
        let prev = player
            .partial_progress
            .get(&problem_index)
            .copied()
            .unwrap_or(0);

        let mut deducted_hp = 0;
        if passed > prev {
            let delta = passed - prev;
            let raw = (base as f64 * delta as f64 * multiplier) as u32;
            deducted_hp = raw.min(opponent.hp);
            opponent.hp -= deducted_hp;
            player.partial_progress.insert(problem_index, passed);
        }

        let problem_solved = passed == total && total > 0;
        let mut next_problem_index = None;
        if problem_solved && passed > prev {
            player.problems_solved += 1;
            if player.current_problem_index < problem_count {
                player.current_problem_index += 1;
                if player.current_problem_index < problem_count {
                    next_problem_index = Some(player.current_problem_index);
                }
            }
        }

        SubmissionApplied {
            deducted_hp,
            problem_solved,
            next_problem_index,
        }
    }

    /// Buy an ability. Errors are client-facing messages.
    pub fn buy_ability(&mut self, seat: usize, ability_id: &str) -> Result<(), String> {
        let Some(ability) = abilities::find(ability_id) else {
            return Err(format!("unknown ability: {ability_id}"));
        };
        let player = &mut self.seats[seat];
        if player.owned_abilities.contains(ability_id) {
            return Err("already bought".to_string());
        }
        if player.skill_points < ability.sp_cost {
            return Err("not enough skill points".to_string());
        }
        player.skill_points -= ability.sp_cost;
        player.owned_abilities.insert(ability_id.to_string());
        Ok(())
    }

    /// Use an owned ability.
    pub fn use_ability(&mut self, seat: usize, ability_id: &str) -> Result<(), String> {
        let Some(ability) = abilities::find(ability_id) else {
            return Err(format!("unknown ability: {ability_id}"));
        };
        let starting_hp = self.settings.starting_hp;
        let player = &mut self.seats[seat];
        if !player.owned_abilities.contains(ability_id) {
            return Err("don't own this ability".to_string());
        }
        if player.mana_points < ability.mp_cost {
            return Err("not enough mana".to_string());
        }
        player.mana_points -= ability.mp_cost;
        if let AbilityEffect::Heal(amount) = ability.effect {
            player.healed += amount;
            player.hp = (player.hp + amount).min(starting_hp + player.healed);
        }
        Ok(())
    }

    /// Evaluate the end-of-match predicate after a mutation. Returns true
    /// when this call moved the match to FINISHED (winner recorded).
    pub fn evaluate_end(&mut self) -> bool {
        if self.status == MatchStatus::Finished {
            return false;
        }
        let count = self.problems.len();
        let cause = if self.seats.iter().any(|s| s.hp == 0) {
            EndCause::HpDepleted
        } else if self.seats.iter().any(|s| s.current_problem_index >= count) {
            EndCause::AllSolved
        } else {
            return false;
        };
        self.finish(cause);
        true
    }

    /// Timer-driven check; finishes with a timeout verdict once the
    /// deadline passed.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.status == MatchStatus::Finished || now < self.timeout_deadline {
            return false;
        }
        self.finish(EndCause::Timeout);
        true
    }

    /// Explicit forfeit: the opponent wins regardless of board state.
    pub fn forfeit(&mut self, seat: usize) {
        if self.status == MatchStatus::Finished {
            return;
        }
        let opponent = 1 - seat;
        self.winner_username = Some(self.seats[opponent].identity.username.clone());
        self.status = MatchStatus::Finished;
    }

    fn finish(&mut self, cause: EndCause) {
        let count = self.problems.len();
        let [a, b] = &self.seats;
        self.winner_username = match cause {
            EndCause::HpDepleted => {
                if a.hp == 0 && b.hp == 0 {
                    None
                } else if b.hp == 0 {
                    Some(a.identity.username.clone())
                } else {
                    Some(b.identity.username.clone())
                }
            }
            EndCause::AllSolved => {
                let a_done = a.current_problem_index >= count;
                let b_done = b.current_problem_index >= count;
                if a_done && b_done {
                    None
                } else if a_done {
                    Some(a.identity.username.clone())
                } else {
                    Some(b.identity.username.clone())
                }
            }
            EndCause::Timeout => {
                if a.hp > b.hp {
                    Some(a.identity.username.clone())
                } else if b.hp > a.hp {
                    Some(b.identity.username.clone())
                } else {
                    None
                }
            }
        };
        self.status = MatchStatus::Finished;
    }

    pub fn game_view(&self, seat: usize) -> GameView {
        let player = &self.seats[seat];
        let opponent = &self.seats[1 - seat];
        GameView {
            match_id: self.id.clone(),
            opponent_name: opponent.identity.username.clone(),
            opponent_display_name: opponent.identity.display_name.clone(),
            current_problem_index: player.current_problem_index,
            problems_solved: player.problems_solved,
            opponent_problems_solved: opponent.problems_solved,
            your_hp: player.hp,
            opponent_hp: opponent.hp,
            match_type: self.match_type,
            start_time: self.start_time,
            status: self.status,
            winner: self.winner_username.clone(),
            skill_points: player.skill_points,
            mana_points: player.mana_points,
            abilities: player.owned_abilities.iter().cloned().collect(),
        }
    }

    pub fn player_outcome(&self, seat: usize, rating_change: Option<f64>) -> PlayerOutcome {
        let player = &self.seats[seat];
        PlayerOutcome {
            username: player.identity.username.clone(),
            hp: player.hp,
            problems_solved: player.problems_solved,
            rating_change,
        }
    }
}
