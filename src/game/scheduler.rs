//! Per-match fixed-rate tick loops

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::ws::connections::ConnectionRegistry;
use crate::ws::protocol::GameOverReason;

use super::directory::RoomDirectory;
use super::physics::PhysicsSystem;
use super::r#match::{MatchId, MatchStatus};
use super::snapshot;

struct TickTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns exactly one tick task per active match
pub struct MatchScheduler {
    timers: Arc<DashMap<MatchId, TickTimer>>,
    next_generation: AtomicU64,
    tick_period: Duration,
    directory: Arc<RoomDirectory>,
    connections: Arc<ConnectionRegistry>,
}

impl MatchScheduler {
    pub fn new(
        tick_period: Duration,
        directory: Arc<RoomDirectory>,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
            tick_period,
            directory,
            connections,
        }
    }

    /// Start ticking a match. An existing timer for the same match is replaced.
    pub fn start(&self, match_id: MatchId) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(run_ticks(
            match_id,
            generation,
            self.tick_period,
            self.directory.clone(),
            self.connections.clone(),
            self.timers.clone(),
        ));

        if let Some(previous) = self
            .timers
            .insert(match_id, TickTimer { generation, handle })
        {
            previous.handle.abort();
            debug!(match_id = %match_id, "Replaced running tick timer");
        }
    }

    /// Stop ticking a match. No-op when it is not ticking.
    pub fn stop(&self, match_id: &MatchId) {
        if let Some((_, timer)) = self.timers.remove(match_id) {
            timer.handle.abort();
        }
    }

    pub fn stop_all(&self) {
        for timer in self.timers.iter() {
            timer.handle.abort();
        }
        self.timers.clear();
    }

    pub fn is_running(&self, match_id: &MatchId) -> bool {
        self.timers
            .get(match_id)
            .map(|timer| !timer.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn running(&self) -> usize {
        self.timers
            .iter()
            .filter(|timer| !timer.handle.is_finished())
            .count()
    }
}

/// Tick loop of one match. Ends as soon as the match is gone or not active.
async fn run_ticks(
    match_id: MatchId,
    generation: u64,
    tick_period: Duration,
    directory: Arc<RoomDirectory>,
    connections: Arc<ConnectionRegistry>,
    timers: Arc<DashMap<MatchId, TickTimer>>,
) {
    let mut ticker = interval(tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        // Fetch, advance and persist under the match's entry lock
        let stepped = directory
            .update(&match_id, |game| {
                if game.status != MatchStatus::Active {
                    return None;
                }
                let report = PhysicsSystem::advance(game);
                Some((game.clone(), report))
            })
            .flatten();

        let Some((game, report)) = stepped else {
            debug!(match_id = %match_id, "Match no longer active, stopping ticks");
            break;
        };

        let humans = game.human_ids();
        connections.broadcast(humans.iter().copied(), &snapshot::game_state(&game));

        if report.wall_bounce || report.paddle_hits > 0 {
            trace!(match_id = %match_id, wall = report.wall_bounce, paddles = report.paddle_hits, "Bounce");
        }
        if let Some(slot) = report.scored {
            debug!(match_id = %match_id, slot, score = ?game.scores(), "Point scored");
        }

        if let Some(winner_slot) = report.winner {
            info!(match_id = %match_id, winner_slot, score = ?game.scores(), "Match finished");
            if let Some(msg) = snapshot::game_over(&game, GameOverReason::Win) {
                connections.broadcast(humans, &msg);
            }
            break;
        }
    }

    timers.remove_if(&match_id, |_, timer| timer.generation == generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::{GameConstants, MatchMode, PlayerId, LEFT_SLOT, RIGHT_SLOT};
    use crate::ws::protocol::ServerMsg;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    const PERIOD: Duration = Duration::from_millis(16);

    struct Harness {
        directory: Arc<RoomDirectory>,
        connections: Arc<ConnectionRegistry>,
        scheduler: MatchScheduler,
    }

    fn harness(constants: GameConstants) -> Harness {
        let directory = Arc::new(RoomDirectory::new(constants));
        let connections = Arc::new(ConnectionRegistry::new());
        let scheduler = MatchScheduler::new(PERIOD, directory.clone(), connections.clone());
        Harness {
            directory,
            connections,
            scheduler,
        }
    }

    fn active_remote(h: &Harness) -> (MatchId, [(PlayerId, mpsc::Receiver<ServerMsg>); 2]) {
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, rx1) = h.connections.register(p1);
        let (_, rx2) = h.connections.register(p2);
        let match_id = h
            .directory
            .create_match(&[p1, p2], MatchMode::RemoteMultiplayer)
            .unwrap();
        h.directory.activate(&match_id).unwrap();
        (match_id, [(p1, rx1), (p2, rx2)])
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_broadcast_to_both_players() {
        let h = harness(GameConstants::default());
        let (match_id, [(_, mut rx1), (_, mut rx2)]) = active_remote(&h);

        h.scheduler.start(match_id);
        tokio::time::sleep(PERIOD * 5 + Duration::from_millis(1)).await;

        let states: Vec<u64> = drain(&mut rx1)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMsg::GameState { game } => Some(game.tick),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![1, 2, 3, 4, 5]);
        assert_eq!(drain(&mut rx2).len(), 5);
        assert_eq!(h.directory.get_match(&match_id).unwrap().tick, 5);
        assert!(h.scheduler.is_running(&match_id));
    }

    #[tokio::test(start_paused = true)]
    async fn pausing_stops_the_timer() {
        let h = harness(GameConstants::default());
        let (match_id, [(p1, mut rx1), _]) = active_remote(&h);

        h.scheduler.start(match_id);
        tokio::time::sleep(PERIOD * 2 + Duration::from_millis(1)).await;
        h.directory.on_disconnect(match_id, p1).unwrap();
        tokio::time::sleep(PERIOD * 3).await;
        drain(&mut rx1);

        tokio::time::sleep(PERIOD * 10).await;
        assert!(drain(&mut rx1).is_empty());
        assert!(!h.scheduler.is_running(&match_id));
        assert_eq!(h.scheduler.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_match_ends_its_timer() {
        let h = harness(GameConstants::default());
        let (match_id, _) = active_remote(&h);

        h.scheduler.start(match_id);
        h.directory.remove_match(&match_id);
        tokio::time::sleep(PERIOD * 3).await;

        assert!(!h.scheduler.is_running(&match_id));
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_instead_of_stacking() {
        let h = harness(GameConstants::default());
        let (match_id, _) = active_remote(&h);

        h.scheduler.start(match_id);
        h.scheduler.start(match_id);
        tokio::time::sleep(PERIOD * 4 + Duration::from_millis(1)).await;

        assert_eq!(h.scheduler.running(), 1);
        assert_eq!(h.directory.get_match(&match_id).unwrap().tick, 4);

        h.scheduler.stop(&match_id);
        tokio::time::sleep(PERIOD * 4).await;
        assert_eq!(h.directory.get_match(&match_id).unwrap().tick, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn winning_tick_sends_game_over_and_stops() {
        let constants = GameConstants {
            ball_speed: 2.0,
            win_score: 1,
            ..GameConstants::default()
        };
        let h = harness(constants);
        let (match_id, [(_, mut rx1), _]) = active_remote(&h);
        h.directory.update(&match_id, |game| {
            game.ball.x = 779.0;
            game.ball.dir_x = 1.0;
            game.paddles[RIGHT_SLOT].offset = if game.ball.y > 300.0 { 0.0 } else { 500.0 };
        });

        h.scheduler.start(match_id);
        tokio::time::sleep(PERIOD * 3).await;

        let msgs = drain(&mut rx1);
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            ServerMsg::GameState { game } => {
                assert_eq!(game.status, MatchStatus::Finished);
                assert_eq!(game.winner_slot, Some(LEFT_SLOT));
            }
            other => panic!("expected state, got {:?}", other),
        }
        assert!(matches!(
            msgs[1],
            ServerMsg::GameOver { winner_slot: LEFT_SLOT, reason: GameOverReason::Win, .. }
        ));
        assert!(!h.scheduler.is_running(&match_id));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_halts_every_match() {
        let h = harness(GameConstants::default());
        let (a, _) = active_remote(&h);
        let (b, _) = active_remote(&h);

        h.scheduler.start(a);
        h.scheduler.start(b);
        h.scheduler.stop_all();
        tokio::time::sleep(PERIOD * 3).await;

        assert_eq!(h.scheduler.running(), 0);
        assert_eq!(h.directory.get_match(&a).unwrap().tick, 0);
        assert_eq!(h.directory.get_match(&b).unwrap().tick, 0);
    }
}
