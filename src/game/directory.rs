//! Room directory: live matches, player index, disconnect bookkeeping

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::GameError;
use super::r#match::{
    opponent_slot, GameConstants, MatchId, MatchMode, MatchStatus, Participant, PlayerId,
    PongMatch,
};

/// A player who dropped out of a pausable match and may still come back
#[derive(Debug)]
pub struct DisconnectRecord {
    pub match_id: MatchId,
    pub disconnected_at: DateTime<Utc>,
    grace_task: Option<JoinHandle<()>>,
}

impl DisconnectRecord {
    fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            disconnected_at: Utc::now(),
            grace_task: None,
        }
    }

    fn cancel(&mut self) {
        if let Some(task) = self.grace_task.take() {
            task.abort();
        }
    }
}

/// Sole owner of the match collection and the player → match index
pub struct RoomDirectory {
    matches: DashMap<MatchId, PongMatch>,
    player_index: DashMap<PlayerId, MatchId>,
    disconnects: DashMap<PlayerId, DisconnectRecord>,
    constants: GameConstants,
}

impl RoomDirectory {
    pub fn new(constants: GameConstants) -> Self {
        Self {
            matches: DashMap::new(),
            player_index: DashMap::new(),
            disconnects: DashMap::new(),
            constants,
        }
    }

    /// Create a pending match and index its human participants.
    ///
    /// Remote matches take two distinct players; the other modes take the
    /// single human and fill slot 1 with the AI or the local second player.
    /// A participant still attached to an unfinished match is refused; a
    /// finished match they were attached to is torn down first.
    pub fn create_match(
        &self,
        participant_ids: &[PlayerId],
        mode: MatchMode,
    ) -> Result<MatchId, GameError> {
        let participants = match (mode, participant_ids) {
            (MatchMode::Singleplayer, [host]) => [Participant::Human(*host), Participant::Ai],
            (MatchMode::LocalMultiplayer, [host]) => {
                [Participant::Human(*host), Participant::LocalSecondary]
            }
            (MatchMode::RemoteMultiplayer, [left, right]) if left != right => {
                [Participant::Human(*left), Participant::Human(*right)]
            }
            _ => {
                return Err(GameError::InvalidParticipants(format!(
                    "{} player(s) for {:?}",
                    participant_ids.len(),
                    mode
                )))
            }
        };

        for player_id in participant_ids {
            if self.has_live_match(*player_id) {
                return Err(GameError::AlreadyInMatch);
            }
        }
        for player_id in participant_ids {
            self.release_finished(*player_id);
        }

        let match_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let game = PongMatch::new(match_id, mode, participants, self.constants, seed);

        self.matches.insert(match_id, game);
        for player_id in participant_ids {
            self.player_index.insert(*player_id, match_id);
        }

        info!(match_id = %match_id, mode = ?mode, seed, "Match created");
        Ok(match_id)
    }

    pub fn get_match(&self, match_id: &MatchId) -> Option<PongMatch> {
        self.matches.get(match_id).map(|m| m.value().clone())
    }

    pub fn match_id_for_player(&self, player_id: &PlayerId) -> Option<MatchId> {
        self.player_index.get(player_id).map(|r| *r)
    }

    /// Match the player is attached to, if any
    pub fn match_for_player(&self, player_id: &PlayerId) -> Option<PongMatch> {
        let match_id = self.match_id_for_player(player_id)?;
        self.get_match(&match_id)
    }

    /// Replace the stored state of a live match. A removed match stays removed.
    pub fn set_match(&self, match_id: MatchId, game: PongMatch) -> bool {
        match self.matches.get_mut(&match_id) {
            Some(mut entry) => {
                *entry = game;
                true
            }
            None => false,
        }
    }

    /// Mutate a match in place while holding its entry lock
    pub fn update<R>(&self, match_id: &MatchId, f: impl FnOnce(&mut PongMatch) -> R) -> Option<R> {
        self.matches.get_mut(match_id).map(|mut entry| f(entry.value_mut()))
    }

    /// Delete a match and every index entry and disconnect record pointing at it
    pub fn remove_match(&self, match_id: &MatchId) -> Option<PongMatch> {
        let (_, game) = self.matches.remove(match_id)?;

        for player_id in game.human_ids() {
            self.player_index.remove_if(&player_id, |_, mid| mid == match_id);
            if let Some((_, mut record)) = self
                .disconnects
                .remove_if(&player_id, |_, record| record.match_id == *match_id)
            {
                record.cancel();
            }
        }

        info!(match_id = %match_id, "Match removed");
        Some(game)
    }

    /// Activate a pending match
    pub fn activate(&self, match_id: &MatchId) -> Option<PongMatch> {
        self.update(match_id, |game| {
            if game.status != MatchStatus::Pending || !game.set_status(MatchStatus::Active) {
                return None;
            }
            Some(game.clone())
        })
        .flatten()
    }

    /// Record that a human accepted a pending match.
    /// Returns whether every human has now accepted.
    pub fn mark_ready(&self, match_id: &MatchId, player_id: PlayerId) -> Result<bool, GameError> {
        self.update(match_id, |game| {
            let slot = game.slot_of(player_id).ok_or(GameError::NotInMatch)?;
            if game.status != MatchStatus::Pending {
                return Err(GameError::AlreadyInMatch);
            }
            game.ready[slot] = true;
            Ok(game.all_ready())
        })
        .unwrap_or(Err(GameError::MatchNotFound(*match_id)))
    }

    /// A participant's connection dropped.
    ///
    /// Running multiplayer matches pause and remember the player as
    /// reconnect-eligible; the paused match is returned so the caller can
    /// notify the opponent and arm the grace timer. Singleplayer, pending
    /// and finished matches are torn down and `None` is returned.
    ///
    /// A player already away from this match keeps their first record and
    /// timer, so the grace window never restarts; `None` is returned.
    pub fn on_disconnect(&self, match_id: MatchId, player_id: PlayerId) -> Option<PongMatch> {
        if self
            .disconnects
            .get(&player_id)
            .is_some_and(|record| record.match_id == match_id)
        {
            debug!(match_id = %match_id, player_id = %player_id, "Already disconnected, grace window unchanged");
            return None;
        }

        let paused = self
            .update(&match_id, |game| {
                game.slot_of(player_id)?;
                let pausable =
                    game.status == MatchStatus::Paused || game.set_status(MatchStatus::Paused);
                if !game.mode.survives_disconnect() || !pausable {
                    return Some(None);
                }
                Some(Some(game.clone()))
            })
            .flatten()?;

        match paused {
            Some(game) => {
                let record = DisconnectRecord::new(match_id);
                info!(
                    match_id = %match_id,
                    player_id = %player_id,
                    disconnected_at = %record.disconnected_at,
                    "Player disconnected, match paused"
                );
                if let Some(mut stale) = self.disconnects.insert(player_id, record) {
                    stale.cancel();
                }
                Some(game)
            }
            None => {
                self.remove_match(&match_id);
                None
            }
        }
    }

    /// Start the grace period for a disconnect recorded by [`on_disconnect`].
    ///
    /// When it elapses without a reconnect the match is forfeited and
    /// `on_forfeit` receives the finished match. A reconnect aborts the timer.
    ///
    /// [`on_disconnect`]: RoomDirectory::on_disconnect
    pub fn arm_grace_timer<F>(
        self: &Arc<Self>,
        match_id: MatchId,
        player_id: PlayerId,
        grace: Duration,
        on_forfeit: F,
    ) where
        F: FnOnce(PongMatch) + Send + 'static,
    {
        let directory = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(game) = directory.on_reconnect_timeout(match_id, player_id) {
                on_forfeit(game);
            }
        });

        match self.disconnects.get_mut(&player_id) {
            Some(mut record) if record.match_id == match_id => {
                record.cancel();
                record.grace_task = Some(task);
            }
            _ => task.abort(),
        }
    }

    /// Grace period elapsed. Forfeits the match to the other slot if the
    /// player is still away from this match; otherwise does nothing.
    pub fn on_reconnect_timeout(&self, match_id: MatchId, player_id: PlayerId) -> Option<PongMatch> {
        self.disconnects
            .remove_if(&player_id, |_, record| record.match_id == match_id)?;

        let forfeited = self
            .update(&match_id, |game| {
                let slot = game.slot_of(player_id)?;
                game.finish(opponent_slot(slot)).then(|| game.clone())
            })
            .flatten();

        if forfeited.is_some() {
            info!(match_id = %match_id, player_id = %player_id, "Reconnect window expired, match forfeited");
        }
        forfeited
    }

    /// A previously disconnected player is back.
    ///
    /// Returns the match when it can be resumed; it only becomes active again
    /// once no other participant is still away.
    pub fn on_reconnect(&self, player_id: PlayerId) -> Option<PongMatch> {
        let (_, mut record) = self.disconnects.remove(&player_id)?;
        record.cancel();
        let match_id = record.match_id;

        let others_away = self
            .disconnects
            .iter()
            .any(|entry| entry.value().match_id == match_id);

        let resumed = self
            .update(&match_id, |game| {
                if game.is_finished() {
                    return None;
                }
                if !others_away {
                    game.set_status(MatchStatus::Active);
                }
                Some(game.clone())
            })
            .flatten();

        match &resumed {
            Some(game) => {
                info!(match_id = %match_id, player_id = %player_id, status = ?game.status, "Player reconnected")
            }
            None => debug!(match_id = %match_id, player_id = %player_id, "Reconnect to a finished or removed match"),
        }
        resumed
    }

    /// Whether the player is waiting out a grace period
    pub fn is_disconnected(&self, player_id: &PlayerId) -> bool {
        self.disconnects.contains_key(player_id)
    }

    /// Whether the player is attached to a match that is not finished
    pub fn has_live_match(&self, player_id: PlayerId) -> bool {
        self.match_for_player(&player_id)
            .map(|game| !game.is_finished())
            .unwrap_or(false)
    }

    /// Tear down the player's match if it already ended
    pub fn release_finished(&self, player_id: PlayerId) -> Option<PongMatch> {
        let match_id = self.match_id_for_player(&player_id)?;
        match self.get_match(&match_id) {
            Some(game) if game.is_finished() => self.remove_match(&match_id),
            Some(_) => None,
            None => {
                self.player_index.remove_if(&player_id, |_, mid| *mid == match_id);
                None
            }
        }
    }

    /// Drop everything (process shutdown)
    pub fn clear(&self) {
        for mut record in self.disconnects.iter_mut() {
            record.cancel();
        }
        self.disconnects.clear();
        self.player_index.clear();
        self.matches.clear();
    }

    /// Live matches in any status
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Matches currently ticking
    pub fn active_matches(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.value().status == MatchStatus::Active)
            .count()
    }

    /// Players attached to a match
    pub fn total_players(&self) -> usize {
        self.player_index.len()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new(GameConstants::default())
    }
}
