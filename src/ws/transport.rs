use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::ws::frames::ServerFrame;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// What a session loop writes to its socket.
#[derive(Clone, Debug)]
pub enum Outbound {
    Frame(ServerFrame),
    /// Close the socket with a code and reason, then end the session.
    Close { code: u16, reason: String },
}

/// Send-side handle to one live bidirectional stream.
///
/// The engine and services hold these; the session loop owns the receive
/// side and the socket. Sends to a dead session are no-ops that report
/// `false` so holders can clear stale handles.
#[derive(Clone, Debug)]
pub struct PlayerTransport {
    id: u64,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PlayerTransport {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
                tx,
            },
            rx,
        )
    }

    /// Distinguishes transports attached to the same seat across
    /// reconnects.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(&self, frame: ServerFrame) -> bool {
        self.tx.send(Outbound::Frame(frame)).is_ok()
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
