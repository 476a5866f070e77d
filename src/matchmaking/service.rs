//! Matchmaking service - manages queue and match creation

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::game::error::GameError;
use crate::game::r#match::{MatchId, PlayerId};
use crate::game::service::GameService;
use crate::ws::connections::ConnectionRegistry;
use crate::ws::protocol::ServerMsg;

use super::queue::{MatchmakingQueue, QueuedPlayer};

/// Queue state as seen by one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub position: Option<usize>,
    pub waiting_count: usize,
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    games: Arc<GameService>,
    connections: Arc<ConnectionRegistry>,
    sweep_interval: Duration,
}

impl MatchmakingService {
    pub fn new(
        games: Arc<GameService>,
        connections: Arc<ConnectionRegistry>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            games,
            connections,
            sweep_interval,
        }
    }

    /// Join the remote matchmaking queue. Returns the 1-based position at
    /// the time of joining; pairing runs right after.
    pub fn join_queue(&self, player_id: PlayerId) -> Result<usize, GameError> {
        self.games.release_finished(player_id);
        if self.games.has_live_match(player_id) {
            return Err(GameError::AlreadyInMatch);
        }

        let (position, queue_size) = {
            let mut queue = self.queue.lock();
            let position = queue.enqueue(player_id)?;
            (position, queue.len())
        };
        info!(player_id = %player_id, position, queue_size, "Player joined matchmaking queue");

        self.publish_queue_state();
        self.pair_waiting();
        Ok(position)
    }

    /// Leave the queue. Returns whether the player was waiting.
    pub fn leave_queue(&self, player_id: PlayerId) -> bool {
        let removed = self.queue.lock().dequeue(&player_id);
        let Some(player) = removed else {
            return false;
        };

        info!(
            player_id = %player_id,
            waited_ms = player.wait_time().as_millis() as u64,
            "Player left matchmaking queue"
        );
        self.connections.send_to(player_id, ServerMsg::LeftQueue);
        self.publish_queue_state();
        true
    }

    /// Pair the two longest-waiting players while at least two are queued.
    /// Returns the matches created.
    pub fn pair_waiting(&self) -> Vec<MatchId> {
        self.pair_with(|left, right| self.games.create_remote_match(left, right))
    }

    /// Pairing loop over a match factory. On a failed creation both players
    /// go back to the head in order and the loop stops until the next call.
    fn pair_with<F>(&self, create: F) -> Vec<MatchId>
    where
        F: Fn(PlayerId, PlayerId) -> Result<MatchId, GameError>,
    {
        let mut created = Vec::new();

        loop {
            let Some((first, second)) = self.queue.lock().pop_pair() else {
                break;
            };

            // A queued player may have started a local game meanwhile
            let busy: Vec<bool> = [&first, &second]
                .iter()
                .map(|p| self.games.has_live_match(p.player_id))
                .collect();
            if busy.iter().any(|b| *b) {
                let free: Vec<QueuedPlayer> = [first, second]
                    .into_iter()
                    .zip(busy)
                    .filter(|(_, busy)| !busy)
                    .map(|(player, _)| player)
                    .collect();
                warn!("Dropped a queued player already in a match");
                self.queue.lock().requeue_front(free);
                continue;
            }

            match create(first.player_id, second.player_id) {
                Ok(match_id) => {
                    info!(
                        match_id = %match_id,
                        left = %first.player_id,
                        right = %second.player_id,
                        waited_ms = first.wait_time().as_millis() as u64,
                        "Paired players"
                    );
                    created.push(match_id);
                }
                Err(e) => {
                    error!(error = %e, "Pairing failed, players returned to the queue");
                    self.queue.lock().requeue_front([first, second]);
                    break;
                }
            }
        }

        if !created.is_empty() {
            self.publish_queue_state();
        }
        created
    }

    /// Send every waiting player their current position
    pub fn publish_queue_state(&self) {
        let updates: Vec<(PlayerId, usize)> = {
            let queue = self.queue.lock();
            queue
                .iter()
                .enumerate()
                .map(|(idx, p)| (p.player_id, idx + 1))
                .collect()
        };

        let waiting_count = updates.len();
        for (player_id, position) in updates {
            self.connections.send_to(
                player_id,
                ServerMsg::MatchmakingUpdate {
                    position,
                    waiting_count,
                },
            );
        }
    }

    /// Run the matchmaking service (periodic queue processing)
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let created = self.pair_waiting();
            if !created.is_empty() {
                debug!(created = created.len(), "Sweep paired waiting players");
            }
        }
    }

    /// Get current queue size
    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if player is in queue
    pub fn is_in_queue(&self, player_id: &PlayerId) -> bool {
        self.queue.lock().contains(player_id)
    }

    pub fn status_of(&self, player_id: &PlayerId) -> QueueStatus {
        let queue = self.queue.lock();
        QueueStatus {
            position: queue.position(player_id),
            waiting_count: queue.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::directory::RoomDirectory;
    use crate::game::r#match::{GameConstants, MatchMode, MatchStatus, Participant};
    use crate::game::scheduler::MatchScheduler;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    struct Harness {
        directory: Arc<RoomDirectory>,
        connections: Arc<ConnectionRegistry>,
        games: Arc<GameService>,
        matchmaking: MatchmakingService,
    }

    fn harness() -> Harness {
        let directory = Arc::new(RoomDirectory::new(GameConstants::default()));
        let connections = Arc::new(ConnectionRegistry::new());
        let scheduler = Arc::new(MatchScheduler::new(
            Duration::from_millis(16),
            directory.clone(),
            connections.clone(),
        ));
        let games = Arc::new(GameService::new(
            directory.clone(),
            scheduler,
            connections.clone(),
            Duration::from_secs(5),
            false,
        ));
        let matchmaking =
            MatchmakingService::new(games.clone(), connections.clone(), Duration::from_secs(1));
        Harness {
            directory,
            connections,
            games,
            matchmaking,
        }
    }

    fn connect(h: &Harness) -> (PlayerId, mpsc::Receiver<ServerMsg>) {
        let player = Uuid::new_v4();
        let (_, rx) = h.connections.register(player);
        (player, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn two_joins_start_one_match() {
        let h = harness();
        let (p1, mut rx1) = connect(&h);
        let (p2, mut rx2) = connect(&h);

        assert_eq!(assert_ok!(h.matchmaking.join_queue(p1)), 1);
        assert!(matches!(
            drain(&mut rx1).as_slice(),
            [ServerMsg::MatchmakingUpdate { position: 1, waiting_count: 1 }]
        ));

        assert_eq!(assert_ok!(h.matchmaking.join_queue(p2)), 2);
        assert_eq!(h.matchmaking.queue_size(), 0);

        let started = |rx: &mut mpsc::Receiver<ServerMsg>| {
            drain(rx).into_iter().find_map(|msg| match msg {
                ServerMsg::GameStarted { match_id, .. } => Some(match_id),
                _ => None,
            })
        };
        let id1 = started(&mut rx1).expect("p1 started");
        let id2 = started(&mut rx2).expect("p2 started");
        assert_eq!(id1, id2);

        let game = h.directory.get_match(&id1).unwrap();
        assert_eq!(game.participants, [Participant::Human(p1), Participant::Human(p2)]);
        assert_eq!(game.status, MatchStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_keeps_arrival_order() {
        let h = harness();
        let players: Vec<_> = (0..5).map(|_| connect(&h)).collect();

        for (player, _) in &players {
            assert_ok!(h.matchmaking.join_queue(*player));
        }

        assert_eq!(h.matchmaking.queue_size(), 1);
        assert!(h.matchmaking.is_in_queue(&players[4].0));
        for pair in players[..4].chunks(2) {
            let game = h.directory.match_for_player(&pair[0].0).unwrap();
            assert_eq!(
                game.participants,
                [Participant::Human(pair[0].0), Participant::Human(pair[1].0)]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn join_is_rejected_when_queued_or_playing() {
        let h = harness();
        let (p1, _rx1) = connect(&h);
        let (p2, _rx2) = connect(&h);

        assert_ok!(h.matchmaking.join_queue(p1));
        assert_eq!(h.matchmaking.join_queue(p1), Err(GameError::AlreadyQueued));

        assert_ok!(h.games.start_game(p2, MatchMode::Singleplayer));
        assert_eq!(h.matchmaking.join_queue(p2), Err(GameError::AlreadyInMatch));
        assert_err!(h.matchmaking.join_queue(p2));
        assert_eq!(h.matchmaking.queue_size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_acknowledges_and_updates_others() {
        let h = harness();
        let (p1, mut rx1) = connect(&h);
        let (p2, _rx2) = connect(&h);
        h.matchmaking.queue.lock().enqueue(p2).unwrap();
        h.matchmaking.queue.lock().enqueue(p1).unwrap();

        assert!(h.matchmaking.leave_queue(p2));
        assert!(!h.matchmaking.leave_queue(p2));

        assert!(matches!(
            drain(&mut rx1).as_slice(),
            [ServerMsg::MatchmakingUpdate { position: 1, waiting_count: 1 }]
        ));
        assert_eq!(
            h.matchmaking.status_of(&p1),
            QueueStatus { position: Some(1), waiting_count: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn busy_player_is_skipped_and_partner_keeps_the_head() {
        let h = harness();
        let (p1, _rx1) = connect(&h);
        let (p2, _rx2) = connect(&h);
        let (p3, _rx3) = connect(&h);
        h.matchmaking.queue.lock().enqueue(p1).unwrap();
        h.matchmaking.queue.lock().enqueue(p2).unwrap();
        assert_ok!(h.games.start_game(p1, MatchMode::Singleplayer));

        assert!(h.matchmaking.pair_waiting().is_empty());
        assert_eq!(h.matchmaking.status_of(&p2).position, Some(1));

        h.matchmaking.queue.lock().enqueue(p3).unwrap();
        let created = h.matchmaking.pair_waiting();
        assert_eq!(created.len(), 1);
        let game = h.directory.get_match(&created[0]).unwrap();
        assert_eq!(game.participants, [Participant::Human(p2), Participant::Human(p3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pairing_returns_both_to_the_head() {
        let h = harness();
        let players: Vec<_> = (0..3).map(|_| connect(&h)).collect();
        for (player, _) in &players {
            h.matchmaking.queue.lock().enqueue(*player).unwrap();
        }

        let attempts = std::cell::Cell::new(0);
        let created = h.matchmaking.pair_with(|_, _| {
            attempts.set(attempts.get() + 1);
            Err(GameError::InvalidParticipants("pairing refused".into()))
        });

        assert!(created.is_empty());
        assert_eq!(attempts.get(), 1);
        let order: Vec<_> = h.matchmaking.queue.lock().iter().map(|p| p.player_id).collect();
        assert_eq!(order, players.iter().map(|(id, _)| *id).collect::<Vec<_>>());
        assert!(h.directory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_pairs_players_queued_without_pairing() {
        let h = Arc::new(harness());
        let (p1, _rx1) = connect(&h);
        let (p2, _rx2) = connect(&h);
        h.matchmaking.queue.lock().enqueue(p1).unwrap();
        h.matchmaking.queue.lock().enqueue(p2).unwrap();

        let sweeper = h.clone();
        let task = tokio::spawn(async move { sweeper.matchmaking.run().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.matchmaking.queue_size(), 0);
        assert!(h.directory.match_for_player(&p1).is_some());
        task.abort();
    }
}
