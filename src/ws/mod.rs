//! Real-time event fabric: frame schemas, transport handles and the
//! per-stream session loops.
//!
//! Every live stream is owned by exactly one session loop. The loop polls
//! the socket with a short timeout so disconnects and cancellations are
//! detected even when the peer stays silent, forwards outbound frames from
//! the owning service, and dispatches inbound frames to it.

pub mod frames;
pub mod routes;
pub mod transport;
