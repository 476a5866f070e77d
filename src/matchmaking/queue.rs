//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::game::error::GameError;
use crate::game::r#match::PlayerId;

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub player_id: PlayerId,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// FIFO of players waiting for a remote opponent
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a player. Returns their 1-based position.
    pub fn enqueue(&mut self, player_id: PlayerId) -> Result<usize, GameError> {
        if self.contains(&player_id) {
            return Err(GameError::AlreadyQueued);
        }
        self.queue.push_back(QueuedPlayer::new(player_id));
        Ok(self.queue.len())
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, player_id: &PlayerId) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|p| &p.player_id == player_id)?;
        self.queue.remove(pos)
    }

    /// Check if a player is in the queue
    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.queue.iter().any(|p| &p.player_id == player_id)
    }

    /// 1-based position of a waiting player
    pub fn position(&self, player_id: &PlayerId) -> Option<usize> {
        self.queue
            .iter()
            .position(|p| &p.player_id == player_id)
            .map(|pos| pos + 1)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedPlayer> {
        self.queue.iter()
    }

    /// Take the two longest-waiting players, oldest first
    pub fn pop_pair(&mut self) -> Option<(QueuedPlayer, QueuedPlayer)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }

    /// Put players back at the head, keeping their relative order and wait time
    pub fn requeue_front(&mut self, players: impl IntoIterator<Item = QueuedPlayer>) {
        let players: Vec<QueuedPlayer> = players.into_iter().collect();
        for player in players.into_iter().rev() {
            if !self.contains(&player.player_id) {
                self.queue.push_front(player);
            }
        }
    }
}
