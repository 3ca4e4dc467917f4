use thiserror::Error;

/// Central error taxonomy for duelbox.
///
/// Connection-level rejections carry the WebSocket close code the fabric
/// should use; command-level rejections are surfaced as in-band `error`
/// frames and never close the stream.
#[derive(Error, Debug)]
pub enum DuelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not validate credentials")]
    Auth,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("harness error: {0}")]
    Harness(String),

    #[error("{0}")]
    Domain(DomainRejection),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("problem store error: {0}")]
    ProblemStore(String),
}

/// Domain rejections checked on attach (connection-level) or inside a live
/// loop (command-level).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainRejection {
    #[error("already in a game")]
    AlreadyInGame,
    #[error("already in queue")]
    AlreadyInQueue,
    #[error("already in another room")]
    AlreadyInRoom,
    #[error("room full")]
    RoomFull,
    #[error("room not found")]
    RoomNotFound,
    #[error("game not found")]
    GameNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("not a player in this match")]
    NotInThisMatch,
    #[error("only the host can start the game")]
    GuestCannotStart,
    #[error("not enough players")]
    NotEnoughPlayers,
    #[error("not all players are ready")]
    NotAllReady,
    #[error("only the host can change settings")]
    HostOnly,
    #[error("game already in progress")]
    GameInProgress,
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// WebSocket close codes shared by every stream.
pub mod close_code {
    /// Already in a game / already in queue / superseded session.
    pub const CONFLICT: u16 = 4000;
    /// Token validation failed.
    pub const UNAUTHORIZED: u16 = 4001;
    /// Room is full.
    pub const ROOM_FULL: u16 = 4003;
    /// Room or game not found.
    pub const NOT_FOUND: u16 = 4004;
    /// Already a member of another room.
    pub const ALREADY_IN_ROOM: u16 = 4005;
}

impl DomainRejection {
    /// Close code used when this rejection is connection-level.
    pub fn close_code(&self) -> u16 {
        match self {
            DomainRejection::AlreadyInGame
            | DomainRejection::AlreadyInQueue
            | DomainRejection::GameInProgress => close_code::CONFLICT,
            DomainRejection::RoomFull => close_code::ROOM_FULL,
            DomainRejection::RoomNotFound
            | DomainRejection::GameNotFound
            | DomainRejection::PlayerNotFound
            | DomainRejection::NotInThisMatch => close_code::NOT_FOUND,
            DomainRejection::AlreadyInRoom => close_code::ALREADY_IN_ROOM,
            DomainRejection::GuestCannotStart
            | DomainRejection::NotEnoughPlayers
            | DomainRejection::NotAllReady
            | DomainRejection::HostOnly
            | DomainRejection::InvalidSettings(_) => close_code::CONFLICT,
        }
    }
}

impl From<DomainRejection> for DuelError {
    fn from(rejection: DomainRejection) -> Self {
        DuelError::Domain(rejection)
    }
}

/// Result type alias for duelbox operations.
pub type Result<T> = std::result::Result<T, DuelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_close_codes_match_stream_contract() {
        assert_eq!(DomainRejection::AlreadyInGame.close_code(), 4000);
        assert_eq!(DomainRejection::AlreadyInQueue.close_code(), 4000);
        assert_eq!(DomainRejection::RoomFull.close_code(), 4003);
        assert_eq!(DomainRejection::RoomNotFound.close_code(), 4004);
        assert_eq!(DomainRejection::AlreadyInRoom.close_code(), 4005);
    }
}
