//! Game orchestration: inbound player actions over the directory, the
//! scheduler and the outbound connections

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::ws::connections::ConnectionRegistry;
use crate::ws::protocol::{GameOverReason, ServerMsg};

use super::directory::RoomDirectory;
use super::error::GameError;
use super::physics::PhysicsSystem;
use super::r#match::{
    opponent_slot, MatchId, MatchMode, MatchStatus, Participant, PlayerId, PongMatch, RIGHT_SLOT,
};
use super::scheduler::MatchScheduler;
use super::snapshot;

pub struct GameService {
    directory: Arc<RoomDirectory>,
    scheduler: Arc<MatchScheduler>,
    connections: Arc<ConnectionRegistry>,
    reconnect_grace: Duration,
    require_match_accept: bool,
}

impl GameService {
    pub fn new(
        directory: Arc<RoomDirectory>,
        scheduler: Arc<MatchScheduler>,
        connections: Arc<ConnectionRegistry>,
        reconnect_grace: Duration,
        require_match_accept: bool,
    ) -> Self {
        Self {
            directory,
            scheduler,
            connections,
            reconnect_grace,
            require_match_accept,
        }
    }

    /// Start a singleplayer or local match for one connection.
    /// Remote matches only come out of matchmaking.
    pub fn start_game(&self, player_id: PlayerId, mode: MatchMode) -> Result<MatchId, GameError> {
        if mode == MatchMode::RemoteMultiplayer {
            return Err(GameError::UnsupportedMode("remote-multiplayer"));
        }

        let match_id = self.directory.create_match(&[player_id], mode)?;
        self.launch(&match_id);
        Ok(match_id)
    }

    /// Build a match for a pair taken off the queue. Depending on
    /// configuration it starts right away or waits for both to accept.
    ///
    /// A player whose socket closed after leaving the queue is handled as a
    /// disconnect once the match is indexed.
    pub fn create_remote_match(
        &self,
        left: PlayerId,
        right: PlayerId,
    ) -> Result<MatchId, GameError> {
        let match_id = self
            .directory
            .create_match(&[left, right], MatchMode::RemoteMultiplayer)?;

        if self.require_match_accept {
            self.connections.send_to(
                left,
                ServerMsg::MatchFound {
                    match_id,
                    opponent: right,
                },
            );
            self.connections.send_to(
                right,
                ServerMsg::MatchFound {
                    match_id,
                    opponent: left,
                },
            );
            info!(match_id = %match_id, "Paired match awaiting acceptance");
        } else {
            self.launch(&match_id);
        }

        for player_id in [left, right] {
            if !self.connections.is_connected(&player_id) {
                warn!(match_id = %match_id, player_id = %player_id, "Paired player already gone");
                self.disconnect(player_id);
            }
        }

        Ok(match_id)
    }

    /// Record acceptance; the match starts once every human accepted
    pub fn accept_match(&self, player_id: PlayerId, match_id: MatchId) -> Result<(), GameError> {
        if self.directory.mark_ready(&match_id, player_id)? {
            self.launch(&match_id);
        }
        Ok(())
    }

    /// Drop a pending match. Returns the other player so the caller can
    /// put them back in the queue.
    pub fn decline_match(
        &self,
        player_id: PlayerId,
        match_id: MatchId,
    ) -> Result<Option<PlayerId>, GameError> {
        let game = self
            .directory
            .get_match(&match_id)
            .ok_or(GameError::MatchNotFound(match_id))?;
        let slot = game.slot_of(player_id).ok_or(GameError::NotInMatch)?;
        if game.status != MatchStatus::Pending {
            return Err(GameError::AlreadyInMatch);
        }

        self.directory.remove_match(&match_id);
        self.connections
            .broadcast(game.human_ids(), &ServerMsg::MatchDeclined { match_id });
        info!(match_id = %match_id, player_id = %player_id, "Match declined");

        Ok(game.participants[opponent_slot(slot)].player_id())
    }

    /// Move one paddle a single step.
    ///
    /// The caller moves their own slot; on a local match `slot_hint = 1`
    /// moves the second local paddle instead. AI paddles and finished
    /// matches ignore client moves.
    pub fn update_position(
        &self,
        player_id: PlayerId,
        direction: f32,
        slot_hint: Option<usize>,
    ) -> Result<(), GameError> {
        let match_id = self
            .directory
            .match_id_for_player(&player_id)
            .ok_or(GameError::NotInMatch)?;

        self.directory
            .update(&match_id, |game| {
                if game.is_finished() {
                    return Ok(());
                }
                let own = game.slot_of(player_id).ok_or(GameError::NotInMatch)?;
                let slot = match slot_hint {
                    Some(RIGHT_SLOT) if game.participants[RIGHT_SLOT] == Participant::LocalSecondary => {
                        RIGHT_SLOT
                    }
                    _ => own,
                };
                if game.participants[slot] == Participant::Ai {
                    return Ok(());
                }

                let direction = if direction.is_finite() { direction } else { 0.0 };
                let paddle = &mut game.paddles[slot];
                paddle.offset = PhysicsSystem::move_paddle(paddle.offset, direction, &game.constants);
                Ok(())
            })
            .unwrap_or(Err(GameError::MatchNotFound(match_id)))
    }

    /// Resume the player's paused match
    pub fn reconnect(&self, player_id: PlayerId) -> Result<PongMatch, GameError> {
        let game = self
            .directory
            .on_reconnect(player_id)
            .ok_or(GameError::NotReconnectable)?;

        if game.status == MatchStatus::Active {
            self.scheduler.start(game.id);
        }
        self.connections.broadcast(
            game.human_ids(),
            &ServerMsg::PlayerReconnected {
                player_id,
                game: snapshot::match_view(&game),
            },
        );
        Ok(game)
    }

    /// The player's connection is gone.
    ///
    /// Running multiplayer matches pause and the opponent gets the grace
    /// window; a paired match still awaiting acceptance is called off.
    /// Disconnecting again while already away changes nothing.
    pub fn disconnect(&self, player_id: PlayerId) {
        let Some(match_id) = self.directory.match_id_for_player(&player_id) else {
            return;
        };

        if self
            .directory
            .get_match(&match_id)
            .is_some_and(|game| game.status == MatchStatus::Pending)
        {
            self.abandon_pending(match_id, player_id);
            return;
        }

        let Some(game) = self.directory.on_disconnect(match_id, player_id) else {
            self.scheduler.stop(&match_id);
            return;
        };

        self.scheduler.stop(&match_id);
        let view = snapshot::match_view(&game);
        self.connections.broadcast(
            game.human_ids().into_iter().filter(|id| *id != player_id),
            &ServerMsg::OpponentDisconnected {
                player_id,
                game: view,
            },
        );

        let connections = self.connections.clone();
        let scheduler = self.scheduler.clone();
        let directory = self.directory.clone();
        self.directory.arm_grace_timer(
            match_id,
            player_id,
            self.reconnect_grace,
            move |forfeited| {
                if let Some(msg) = snapshot::game_over(&forfeited, GameOverReason::Timeout) {
                    connections.broadcast(forfeited.human_ids(), &msg);
                }
                scheduler.stop(&forfeited.id);
                directory.remove_match(&forfeited.id);
            },
        );
    }

    /// Tear down the player's match if it already ended
    pub fn release_finished(&self, player_id: PlayerId) {
        if let Some(game) = self.directory.release_finished(player_id) {
            self.scheduler.stop(&game.id);
        }
    }

    pub fn has_live_match(&self, player_id: PlayerId) -> bool {
        self.directory.has_live_match(player_id)
    }

    /// Activate a pending match, start ticking it and tell its humans
    fn launch(&self, match_id: &MatchId) -> Option<PongMatch> {
        let Some(game) = self.directory.activate(match_id) else {
            warn!(match_id = %match_id, "Launch of a match that is not pending");
            return None;
        };

        self.scheduler.start(game.id);
        self.connections
            .broadcast(game.human_ids(), &snapshot::game_started(&game));
        info!(match_id = %game.id, mode = ?game.mode, seed = game.seed, "Match started");
        Some(game)
    }

    /// A player left a paired match before it started
    fn abandon_pending(&self, match_id: MatchId, player_id: PlayerId) {
        let ended = self
            .directory
            .update(&match_id, |game| {
                let slot = game.slot_of(player_id)?;
                game.finish(opponent_slot(slot)).then(|| game.clone())
            })
            .flatten();

        if let Some(game) = ended {
            if let Some(msg) = snapshot::game_over(&game, GameOverReason::Disconnection) {
                self.connections.broadcast(game.human_ids(), &msg);
            }
            info!(match_id = %match_id, player_id = %player_id, reason = "disconnection", "Pending match abandoned");
        }
        self.directory.remove_match(&match_id);
    }
}
