//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::r#match::{
    BallState, GameConstants, MatchMode, MatchStatus, PaddleState, Participant,
};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Start a match; remote mode enters matchmaking instead
    StartGame { mode: MatchMode },

    /// Enter the remote matchmaking queue
    JoinMatchmaking,

    /// Leave the remote matchmaking queue
    LeaveMatchmaking,

    /// Move a paddle one step
    UpdatePosition {
        /// -1.0 = up, 1.0 = down
        direction: f32,
        /// Local multiplayer only: 1 moves the second player's paddle
        #[serde(default)]
        slot_hint: Option<usize>,
    },

    /// Play again in the given mode
    Rematch { mode: MatchMode },

    /// Resume a match after a dropped connection
    ReconnectToGame,

    /// Accept a paired match
    AcceptMatch { match_id: Uuid },

    /// Decline a paired match
    DeclineMatch { match_id: Uuid },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    /// A match became active
    GameStarted { match_id: Uuid, game: MatchView },

    /// State after a simulation tick
    GameState { game: MatchView },

    /// The other side dropped; the match is paused
    OpponentDisconnected { player_id: Uuid, game: MatchView },

    /// A dropped player came back
    PlayerReconnected { player_id: Uuid, game: MatchView },

    /// Match reached its terminal state
    GameOver {
        winner_slot: usize,
        reason: GameOverReason,
        score: ScoreView,
    },

    /// Queue position after any queue change
    MatchmakingUpdate { position: usize, waiting_count: usize },

    /// Paired with an opponent, waiting for both to accept
    MatchFound { match_id: Uuid, opponent: Uuid },

    /// A paired match was declined and dropped
    MatchDeclined { match_id: Uuid },

    /// Confirmation of leaving the queue
    LeftQueue,

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// A slot reached the win score
    Win,
    /// The opponent left before the match could start
    Disconnection,
    /// The reconnect window expired
    Timeout,
}

/// Final or running score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreView {
    pub left: u32,
    pub right: u32,
}

/// Client-facing view of one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchView {
    pub match_id: Uuid,
    pub mode: MatchMode,
    pub status: MatchStatus,
    /// Slot 0 is the left paddle
    pub participants: [Participant; 2],
    pub ball: BallState,
    pub paddles: [PaddleState; 2],
    pub constants: GameConstants,
    pub winner_slot: Option<usize>,
    pub tick: u64,
    pub created_at: DateTime<Utc>,
}
