//! Errors surfaced to the client that initiated an action

use uuid::Uuid;

/// Rejected game or matchmaking action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Match {0} not found")]
    MatchNotFound(Uuid),

    #[error("Player is not in a match")]
    NotInMatch,

    #[error("Player is already in the matchmaking queue")]
    AlreadyQueued,

    #[error("Player is already in a match")]
    AlreadyInMatch,

    #[error("No disconnected match to resume")]
    NotReconnectable,

    #[error("Mode {0} cannot be started directly")]
    UnsupportedMode(&'static str),

    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),
}

impl GameError {
    /// Stable code sent to clients in `error` messages
    pub fn code(&self) -> &'static str {
        match self {
            Self::MatchNotFound(_) => "match_not_found",
            Self::NotInMatch => "not_in_match",
            Self::AlreadyQueued => "already_queued",
            Self::AlreadyInMatch => "already_in_match",
            Self::NotReconnectable => "not_reconnectable",
            Self::UnsupportedMode(_) => "unsupported_mode",
            Self::InvalidParticipants(_) => "invalid_participants",
        }
    }
}
