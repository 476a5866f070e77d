//! Snapshot building: authoritative match → client messages

use crate::ws::protocol::{GameOverReason, MatchView, ScoreView, ServerMsg};

use super::r#match::{PongMatch, LEFT_SLOT, RIGHT_SLOT};

/// Client-facing view of a match
pub fn match_view(game: &PongMatch) -> MatchView {
    MatchView {
        match_id: game.id,
        mode: game.mode,
        status: game.status,
        participants: game.participants,
        ball: game.ball,
        paddles: game.paddles,
        constants: game.constants,
        winner_slot: game.winner_slot,
        tick: game.tick,
        created_at: game.created_at,
    }
}

pub fn score(game: &PongMatch) -> ScoreView {
    ScoreView {
        left: game.paddles[LEFT_SLOT].score,
        right: game.paddles[RIGHT_SLOT].score,
    }
}

/// Per-tick state broadcast
pub fn game_state(game: &PongMatch) -> ServerMsg {
    ServerMsg::GameState {
        game: match_view(game),
    }
}

pub fn game_started(game: &PongMatch) -> ServerMsg {
    ServerMsg::GameStarted {
        match_id: game.id,
        game: match_view(game),
    }
}

/// Terminal message; `None` while the match has no winner
pub fn game_over(game: &PongMatch, reason: GameOverReason) -> Option<ServerMsg> {
    let winner_slot = game.winner_slot?;
    Some(ServerMsg::GameOver {
        winner_slot,
        reason,
        score: score(game),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::{GameConstants, MatchMode, Participant};
    use uuid::Uuid;

    fn local_match() -> PongMatch {
        PongMatch::new(
            Uuid::new_v4(),
            MatchMode::LocalMultiplayer,
            [Participant::Human(Uuid::new_v4()), Participant::LocalSecondary],
            GameConstants::default(),
            3,
        )
    }

    #[test]
    fn view_mirrors_the_match() {
        let mut game = local_match();
        game.paddles[RIGHT_SLOT].score = 1;

        let view = match_view(&game);

        assert_eq!(view.match_id, game.id);
        assert_eq!(view.participants, game.participants);
        assert_eq!(view.paddles[RIGHT_SLOT].score, 1);
        assert_eq!(score(&game), ScoreView { left: 0, right: 1 });
    }

    #[test]
    fn game_over_needs_a_winner() {
        let mut game = local_match();
        assert!(game_over(&game, GameOverReason::Win).is_none());

        game.finish(LEFT_SLOT);
        match game_over(&game, GameOverReason::Win) {
            Some(ServerMsg::GameOver { winner_slot, reason, .. }) => {
                assert_eq!(winner_slot, LEFT_SLOT);
                assert_eq!(reason, GameOverReason::Win);
            }
            other => panic!("expected game over, got {:?}", other),
        }
    }
}
