//! Matchmaking queues and pairing.
//!
//! Two independent queues (unranked, ranked) guarded by one lock so
//! membership checks across both are atomic with enqueue. Pairing is
//! cooperative: every enqueue attempts a pair, candidates are extracted
//! under the lock and everything async (problem draw, match creation,
//! `match_found` fan-out) happens after it is released.

use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::auth::UserIdentity;
use crate::config::types::{GameSettings, PerDifficulty, RankTable};
use crate::config::Settings;
use crate::error::{DomainRejection, DuelError, Result};
use crate::game::coordinator::MatchCoordinator;
use crate::game::state::MatchType;
use crate::problems::select::{weighted_counts, ProblemSelector};
use crate::ws::frames::ServerFrame;
use crate::ws::transport::PlayerTransport;

struct QueueEntry {
    identity: UserIdentity,
    transport: PlayerTransport,
}

#[derive(Default)]
struct Queues {
    unranked: Vec<QueueEntry>,
    ranked: Vec<QueueEntry>,
}

impl Queues {
    fn contains(&self, user_id: i64) -> bool {
        self.unranked.iter().any(|e| e.identity.id == user_id)
            || self.ranked.iter().any(|e| e.identity.id == user_id)
    }

    fn remove(&mut self, user_id: i64) {
        self.unranked.retain(|e| e.identity.id != user_id);
        self.ranked.retain(|e| e.identity.id != user_id);
    }
}

pub struct Matchmaker {
    queues: Mutex<Queues>,
    coordinator: Arc<MatchCoordinator>,
    selector: Arc<ProblemSelector>,
    game: GameSettings,
    ranks: RankTable,
}

impl Matchmaker {
    pub fn new(
        settings: &Settings,
        coordinator: Arc<MatchCoordinator>,
        selector: Arc<ProblemSelector>,
    ) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            coordinator,
            selector,
            game: settings.game.clone(),
            ranks: settings.ranks.clone(),
        }
    }

    /// Enter a queue. Rejected while queued anywhere or in an active
    /// match; the check and the insert are atomic.
    pub async fn enqueue(
        &self,
        transport: PlayerTransport,
        identity: UserIdentity,
        ranked: bool,
    ) -> Result<()> {
        let pair = {
            let mut queues = self.queues.lock().expect("matchmaking lock poisoned");
            if queues.contains(identity.id) {
                return Err(DomainRejection::AlreadyInQueue.into());
            }
            if self.coordinator.lookup(identity.id).is_some() {
                return Err(DomainRejection::AlreadyInGame.into());
            }
            let entry = QueueEntry {
                identity,
                transport,
            };
            if ranked {
                queues.ranked.push(entry);
                self.extract_ranked_pair(&mut queues)
            } else {
                queues.unranked.push(entry);
                self.extract_unranked_pair(&mut queues)
            }
        };

        if let Some((a, b)) = pair {
            self.start_match(a, b, ranked).await;
        }
        Ok(())
    }

    /// Idempotent removal from both queues.
    pub fn dequeue(&self, user_id: i64) {
        let mut queues = self.queues.lock().expect("matchmaking lock poisoned");
        queues.remove(user_id);
    }

    pub fn in_queue(&self, user_id: i64) -> bool {
        self.queues
            .lock()
            .expect("matchmaking lock poisoned")
            .contains(user_id)
    }

    pub fn queue_len(&self, ranked: bool) -> usize {
        let queues = self.queues.lock().expect("matchmaking lock poisoned");
        if ranked {
            queues.ranked.len()
        } else {
            queues.unranked.len()
        }
    }

    /// Uniform-random pair among the whole queue, not strict FIFO.
    fn extract_unranked_pair(&self, queues: &mut Queues) -> Option<(QueueEntry, QueueEntry)> {
        extract_random_pair(&mut queues.unranked, |_| true)
    }

    /// Pair within one rating tier; no cross-tier matches.
    fn extract_ranked_pair(&self, queues: &mut Queues) -> Option<(QueueEntry, QueueEntry)> {
        for tier in 0..self.ranks.tiers.len() {
            let in_tier =
                |entry: &QueueEntry| self.ranks.tier_index(entry.identity.rating) == tier;
            if queues.ranked.iter().filter(|e| in_tier(e)).count() >= 2 {
                return extract_random_pair(&mut queues.ranked, in_tier);
            }
        }
        None
    }

    async fn start_match(&self, a: QueueEntry, b: QueueEntry, ranked: bool) {
        let distribution = if ranked {
            self.problem_distribution_ranked(a.identity.rating, b.identity.rating)
        } else {
            self.problem_distribution()
        };

        let problems = match self.selector.by_distribution(&distribution, true).await {
            Ok(problems) if !problems.is_empty() => problems,
            Ok(_) => {
                log::error!("problem store returned an empty set for {distribution:?}");
                let frame = ServerFrame::error("no problems available, please retry");
                a.transport.send(frame.clone());
                b.transport.send(frame);
                return;
            }
            Err(e) => {
                log::error!("problem draw failed: {e}");
                let frame = ServerFrame::error("matchmaking failed, please retry");
                a.transport.send(frame.clone());
                b.transport.send(frame);
                return;
            }
        };

        let match_type = if ranked {
            MatchType::Ranked
        } else {
            MatchType::Unranked
        };
        match self.coordinator.create_match(
            a.identity.clone(),
            b.identity.clone(),
            problems,
            match_type,
            self.game.clone(),
        ) {
            Ok(handle) => {
                let frame = ServerFrame::MatchFound {
                    match_id: handle.id().to_string(),
                };
                a.transport.send(frame.clone());
                b.transport.send(frame);
            }
            Err(DuelError::Domain(rejection)) => {
                // One of them raced into another match; the other returns
                // to the queue by reconnecting.
                let frame = ServerFrame::error(rejection.to_string());
                a.transport.send(frame.clone());
                b.transport.send(frame);
            }
            Err(e) => {
                log::error!("match creation failed: {e}");
                let frame = ServerFrame::error("matchmaking failed, please retry");
                a.transport.send(frame.clone());
                b.transport.send(frame);
            }
        }
    }

    /// Unranked distribution: `problem_count` draws from the configured
    /// categorical weights.
    pub fn problem_distribution(&self) -> PerDifficulty<u32> {
        let mut rng = rand::thread_rng();
        weighted_counts(&self.game.problem_weights, self.game.problem_count, &mut rng)
    }

    /// Ranked distribution: the configured counts of the lower player's
    /// tier, so the lower-rated participant is never punished with
    /// problems above their bracket.
    pub fn problem_distribution_ranked(&self, rating_a: f64, rating_b: f64) -> PerDifficulty<u32> {
        let lower = rating_a.min(rating_b);
        self.ranks.tier(lower).distribution
    }
}

fn extract_random_pair(
    queue: &mut Vec<QueueEntry>,
    eligible: impl Fn(&QueueEntry) -> bool,
) -> Option<(QueueEntry, QueueEntry)> {
    let candidates: Vec<usize> = queue
        .iter()
        .enumerate()
        .filter(|(_, e)| eligible(e))
        .map(|(i, _)| i)
        .collect();
    if candidates.len() < 2 {
        return None;
    }
    let mut rng = rand::thread_rng();
    let mut picked = candidates
        .choose_multiple(&mut rng, 2)
        .copied()
        .collect::<Vec<_>>();
    // Remove the higher index first so the lower one stays valid.
    picked.sort_unstable_by(|a, b| b.cmp(a));
    let second = queue.remove(picked[0]);
    let first = queue.remove(picked[1]);
    if rng.gen_bool(0.5) {
        Some((first, second))
    } else {
        Some((second, first))
    }
}
