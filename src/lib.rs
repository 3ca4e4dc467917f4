//! duelbox: the real-time backend of a competitive coding duel.
//!
//! Two players race to solve algorithm problems; each newly passed hidden
//! test case deducts HP from the opponent, abilities spend SP/MP, and a
//! match ends on HP depletion, full completion, forfeit or timeout.
//!
//! # Architecture
//!
//! ## Judging
//! - [`sandbox`]: rlimit-confined process execution with a wall-clock
//!   watchdog, run-scoped workspaces and the `EXECUTION_RESULTS:` stdout
//!   contract
//! - [`harness`]: per-language wrapper generation (python / java / cpp)
//! - [`pipeline`]: difficulty-gated admission and result shaping
//! - [`problems`]: problem handles, store boundary, selection
//!
//! ## Live matches
//! - [`game`]: match state machine, ability catalog, rating, the
//!   single-owner engine task and the coordinator's active-match maps
//! - [`matchmaking`]: unranked and ranked queues with cooperative pairing
//! - [`rooms`]: custom lobbies and the throttled public-room directory
//!
//! ## Edges
//! - [`ws`]: frame schemas, transport handles, per-stream session loops
//! - [`http`]: REST endpoints
//! - [`auth`], [`persistence`]: collaborator boundaries (token validation,
//!   durable match history)
//! - [`config`], [`error`], [`server`]: settings, error taxonomy, wiring
//!
//! # Design principles
//!
//! 1. **One owner per match** - every mutation of a match flows through
//!    its engine task; ordering guarantees hold by construction
//! 2. **Judging is evidence** - verdicts come from the harness report on
//!    sandbox stdout, never inferred from symptoms
//! 3. **Cleanup is hygiene** - isolation units are removed on every exit
//!    path, and a failed removal is logged, never propagated
//! 4. **Collaborators behind traits** - auth, problems and persistence are
//!    external systems the core only knows as trait objects

pub mod auth;
pub mod config;
pub mod error;
pub mod game;
pub mod harness;
pub mod http;
pub mod matchmaking;
pub mod persistence;
pub mod pipeline;
pub mod problems;
pub mod rooms;
pub mod sandbox;
pub mod server;
pub mod ws;

pub use config::types::{Difficulty, Language};
pub use error::{DuelError, Result};
