//! Match state: participants, ball and paddles, lifecycle status

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a connected player
pub type PlayerId = Uuid;

/// Opaque identifier of a match
pub type MatchId = Uuid;

/// Index of the left paddle
pub const LEFT_SLOT: usize = 0;
/// Index of the right paddle
pub const RIGHT_SLOT: usize = 1;

/// How a match is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// One human against the AI paddle
    Singleplayer,
    /// Two humans sharing one connection
    LocalMultiplayer,
    /// Two humans on separate connections, paired by matchmaking
    RemoteMultiplayer,
}

impl MatchMode {
    /// Whether a disconnect pauses the match instead of ending it
    pub fn survives_disconnect(self) -> bool {
        matches!(self, Self::LocalMultiplayer | Self::RemoteMultiplayer)
    }
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Created, waiting for both sides to attach
    Pending,
    /// Ticking
    Active,
    /// A participant dropped, grace period running
    Paused,
    /// Terminal
    Finished,
}

impl MatchStatus {
    /// Forward-only lifecycle; nothing leaves `Finished`.
    /// `Pending -> Finished` covers paired matches called off before they start.
    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Finished)
                | (Active, Paused)
                | (Active, Finished)
                | (Paused, Active)
                | (Paused, Finished)
        )
    }
}

/// Who controls a paddle slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "player_id", rename_all = "snake_case")]
pub enum Participant {
    /// A remote human on its own connection
    Human(PlayerId),
    /// Second human sharing the first human's connection
    LocalSecondary,
    /// Server-driven paddle
    Ai,
}

impl Participant {
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            Self::Human(id) => Some(*id),
            Self::LocalSecondary | Self::Ai => None,
        }
    }
}

/// Tunable physics parameters, copied into each match at creation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameConstants {
    pub court_width: f32,
    pub court_height: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    pub paddle_speed: f32,
    pub ball_size: f32,
    /// Base ball speed, restored after every point
    pub ball_speed: f32,
    /// Speed multiplier applied on every wall or paddle bounce
    pub ball_acceleration: f32,
    pub win_score: u32,
}

impl Default for GameConstants {
    fn default() -> Self {
        Self {
            court_width: 800.0,
            court_height: 600.0,
            paddle_width: 10.0,
            paddle_height: 100.0,
            paddle_speed: 10.0,
            ball_size: 20.0,
            ball_speed: 5.0,
            ball_acceleration: 1.1,
            win_score: 2,
        }
    }
}

impl GameConstants {
    /// Highest paddle offset that keeps the paddle inside the court
    pub fn max_paddle_offset(&self) -> f32 {
        (self.court_height - self.paddle_height).max(0.0)
    }

    /// Top-left corner that puts the ball's box in the middle of the court:
    /// (390, 290) on the default court. Serves use this rather than the
    /// court midpoint (400, 300) so the ball is visually centered.
    pub fn ball_center(&self) -> (f32, f32) {
        (
            (self.court_width - self.ball_size) / 2.0,
            (self.court_height - self.ball_size) / 2.0,
        )
    }
}

/// Ball kinematics. Direction components are always exactly 1 or -1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub speed: f32,
}

impl BallState {
    /// Centered ball with a random diagonal direction and base speed
    pub fn serve<R: Rng>(constants: &GameConstants, rng: &mut R) -> Self {
        let (x, y) = constants.ball_center();
        Self {
            x,
            y,
            dir_x: random_sign(rng),
            dir_y: random_sign(rng),
            speed: constants.ball_speed,
        }
    }
}

fn random_sign<R: Rng>(rng: &mut R) -> f32 {
    if rng.gen_bool(0.5) {
        1.0
    } else {
        -1.0
    }
}

/// One side of the court
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleState {
    /// Vertical offset of the paddle's top edge
    pub offset: f32,
    pub score: u32,
}

/// Authoritative state of one match
#[derive(Debug, Clone)]
pub struct PongMatch {
    pub id: MatchId,
    pub mode: MatchMode,
    /// Slot 0 is the left paddle, slot 1 the right one
    pub participants: [Participant; 2],
    pub ball: BallState,
    pub paddles: [PaddleState; 2],
    pub constants: GameConstants,
    pub status: MatchStatus,
    pub winner_slot: Option<usize>,
    /// Acceptance flags for paired remote matches
    pub ready: [bool; 2],
    pub tick: u64,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
    pub rng: ChaCha8Rng,
}

impl PongMatch {
    /// Build a pending match with a centered serve and centered paddles
    pub fn new(
        id: MatchId,
        mode: MatchMode,
        participants: [Participant; 2],
        constants: GameConstants,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ball = BallState::serve(&constants, &mut rng);
        let paddle = PaddleState {
            offset: constants.max_paddle_offset() / 2.0,
            score: 0,
        };

        Self {
            id,
            mode,
            participants,
            ball,
            paddles: [paddle; 2],
            constants,
            status: MatchStatus::Pending,
            winner_slot: None,
            ready: [false; 2],
            tick: 0,
            seed,
            created_at: Utc::now(),
            rng,
        }
    }

    /// Real connections attached to this match, in slot order
    pub fn human_ids(&self) -> Vec<PlayerId> {
        self.participants
            .iter()
            .filter_map(Participant::player_id)
            .collect()
    }

    /// Slot occupied by the given human
    pub fn slot_of(&self, player_id: PlayerId) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| *p == Participant::Human(player_id))
    }

    pub fn scores(&self) -> [u32; 2] {
        [self.paddles[LEFT_SLOT].score, self.paddles[RIGHT_SLOT].score]
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    /// Move to `next` if the lifecycle allows it. Returns whether it moved.
    pub fn set_status(&mut self, next: MatchStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Declare a winner and end the match
    pub fn finish(&mut self, winner_slot: usize) -> bool {
        if self.set_status(MatchStatus::Finished) {
            self.winner_slot = Some(winner_slot);
            true
        } else {
            false
        }
    }

    /// Slots that still need a human to accept before the match can start
    pub fn all_ready(&self) -> bool {
        self.participants
            .iter()
            .zip(self.ready.iter())
            .all(|(participant, ready)| participant.player_id().is_none() || *ready)
    }
}

/// The slot on the other side of the court
pub fn opponent_slot(slot: usize) -> usize {
    1 - slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_match() -> PongMatch {
        PongMatch::new(
            Uuid::new_v4(),
            MatchMode::RemoteMultiplayer,
            [
                Participant::Human(Uuid::new_v4()),
                Participant::Human(Uuid::new_v4()),
            ],
            GameConstants::default(),
            7,
        )
    }

    #[test]
    fn new_match_is_centered_and_pending() {
        let game = remote_match();
        let constants = game.constants;

        assert_eq!(game.status, MatchStatus::Pending);
        assert_eq!((game.ball.x, game.ball.y), constants.ball_center());
        assert_eq!(game.ball.speed, constants.ball_speed);
        assert!(game.ball.dir_x.abs() == 1.0 && game.ball.dir_y.abs() == 1.0);
        for paddle in game.paddles {
            assert_eq!(paddle.offset, 250.0);
            assert_eq!(paddle.score, 0);
        }
    }

    #[test]
    fn same_seed_gives_same_serve() {
        let a = remote_match();
        let b = remote_match();
        assert_eq!(a.ball, b.ball);
    }

    #[test]
    fn status_only_moves_forward() {
        let mut game = remote_match();
        assert!(game.set_status(MatchStatus::Active));
        assert!(game.set_status(MatchStatus::Paused));
        assert!(game.set_status(MatchStatus::Active));
        assert!(!game.set_status(MatchStatus::Pending));
        assert!(game.finish(RIGHT_SLOT));
        assert_eq!(game.winner_slot, Some(RIGHT_SLOT));

        for next in [MatchStatus::Pending, MatchStatus::Active, MatchStatus::Paused] {
            assert!(!game.set_status(next));
        }
        assert!(!game.finish(LEFT_SLOT));
        assert_eq!(game.winner_slot, Some(RIGHT_SLOT));
    }

    #[test]
    fn pending_match_cannot_pause() {
        let mut game = remote_match();
        assert!(!game.set_status(MatchStatus::Paused));
        assert_eq!(game.status, MatchStatus::Pending);
        assert!(game.finish(LEFT_SLOT));
    }

    #[test]
    fn serve_position_is_the_centered_ball_box() {
        assert_eq!(GameConstants::default().ball_center(), (390.0, 290.0));
    }

    #[test]
    fn slots_follow_participant_order() {
        let game = remote_match();
        let [left, right] = game.participants;
        assert_eq!(game.slot_of(left.player_id().unwrap()), Some(LEFT_SLOT));
        assert_eq!(game.slot_of(right.player_id().unwrap()), Some(RIGHT_SLOT));
        assert_eq!(game.slot_of(Uuid::new_v4()), None);
        assert_eq!(opponent_slot(LEFT_SLOT), RIGHT_SLOT);
    }

    #[test]
    fn only_humans_need_to_accept() {
        let mut game = PongMatch::new(
            Uuid::new_v4(),
            MatchMode::Singleplayer,
            [Participant::Human(Uuid::new_v4()), Participant::Ai],
            GameConstants::default(),
            1,
        );
        assert!(!game.all_ready());
        game.ready[LEFT_SLOT] = true;
        assert!(game.all_ready());
    }

    #[test]
    fn participants_serialize_with_kind_tag() {
        let id = Uuid::nil();
        let human = serde_json::to_value(Participant::Human(id)).unwrap();
        assert_eq!(human["kind"], "human");
        assert_eq!(human["player_id"], id.to_string());
        let ai = serde_json::to_value(Participant::Ai).unwrap();
        assert_eq!(ai["kind"], "ai");
        let mode = serde_json::to_value(MatchMode::LocalMultiplayer).unwrap();
        assert_eq!(mode, "local-multiplayer");
    }
}
