//! Ball and paddle physics, scoring and win detection

use super::r#match::{
    BallState, GameConstants, MatchStatus, Participant, PongMatch, LEFT_SLOT, RIGHT_SLOT,
};

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Slot that scored this tick
    pub scored: Option<usize>,
    /// Slot that won this tick
    pub winner: Option<usize>,
    pub wall_bounce: bool,
    pub paddle_hits: u8,
}

/// Physics system for advancing a match by one tick
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance an active match by exactly one tick.
    ///
    /// Order: integrate the ball, steer AI paddles, bounce off walls, bounce
    /// off paddles, score, check for a winner. Matches that are not active
    /// are left untouched.
    pub fn advance(game: &mut PongMatch) -> TickReport {
        let mut report = TickReport::default();
        if game.status != MatchStatus::Active {
            return report;
        }

        game.tick += 1;
        let constants = game.constants;

        // Integrate
        game.ball.x += game.ball.speed * game.ball.dir_x;
        game.ball.y += game.ball.speed * game.ball.dir_y;

        // AI paddles chase the ball
        for slot in [LEFT_SLOT, RIGHT_SLOT] {
            if game.participants[slot] == Participant::Ai {
                game.paddles[slot].offset =
                    Self::track_ball(game.paddles[slot].offset, &game.ball, &constants);
            }
        }

        // Walls
        if game.ball.y <= 0.0 || game.ball.y >= constants.court_height - constants.ball_size {
            game.ball.dir_y = -game.ball.dir_y;
            game.ball.speed *= constants.ball_acceleration;
            report.wall_bounce = true;
        }

        // Paddles. Both checks may fire in the same tick when the geometry overlaps.
        for slot in [LEFT_SLOT, RIGHT_SLOT] {
            if Self::hits_paddle(&game.ball, slot, game.paddles[slot].offset, &constants) {
                game.ball.dir_x = -game.ball.dir_x;
                game.ball.speed *= constants.ball_acceleration;
                report.paddle_hits += 1;
            }
        }

        // Scoring
        let scorer = if game.ball.x >= constants.court_width - constants.ball_size {
            Some(LEFT_SLOT)
        } else if game.ball.x <= 0.0 {
            Some(RIGHT_SLOT)
        } else {
            None
        };

        if let Some(slot) = scorer {
            game.paddles[slot].score += 1;
            game.ball = BallState::serve(&constants, &mut game.rng);
            report.scored = Some(slot);
        }

        // Win check
        if let Some(slot) = [LEFT_SLOT, RIGHT_SLOT]
            .into_iter()
            .find(|&slot| game.paddles[slot].score >= constants.win_score)
        {
            game.finish(slot);
            report.winner = Some(slot);
        }

        report
    }

    /// Apply one directional paddle step and clamp to the court
    pub fn move_paddle(offset: f32, direction: f32, constants: &GameConstants) -> f32 {
        let direction = direction.clamp(-1.0, 1.0);
        Self::clamp_paddle(offset + constants.paddle_speed * direction, constants)
    }

    /// Keep a paddle offset within `[0, court_height - paddle_height]`
    pub fn clamp_paddle(offset: f32, constants: &GameConstants) -> f32 {
        if offset.is_nan() {
            return 0.0;
        }
        offset.clamp(0.0, constants.max_paddle_offset())
    }

    /// AI step: move at most one paddle-speed unit toward the ball's center,
    /// only when the gap is larger than that unit
    fn track_ball(offset: f32, ball: &BallState, constants: &GameConstants) -> f32 {
        let paddle_center = offset + constants.paddle_height / 2.0;
        let ball_center = ball.y + constants.ball_size / 2.0;
        let gap = ball_center - paddle_center;

        if gap.abs() <= constants.paddle_speed {
            return offset;
        }

        Self::clamp_paddle(offset + constants.paddle_speed * gap.signum(), constants)
    }

    /// Axis-aligned overlap between the ball and a paddle strip
    fn hits_paddle(ball: &BallState, slot: usize, offset: f32, constants: &GameConstants) -> bool {
        let paddle_x = if slot == LEFT_SLOT {
            0.0
        } else {
            constants.court_width - constants.paddle_width
        };

        ball.x < paddle_x + constants.paddle_width
            && ball.x + constants.ball_size > paddle_x
            && ball.y < offset + constants.paddle_height
            && ball.y + constants.ball_size > offset
    }
}
