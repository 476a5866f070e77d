//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{GameConstants, GameService, MatchScheduler, RoomDirectory};
use crate::matchmaking::MatchmakingService;
use crate::util::time::tick_period;
use crate::ws::connections::ConnectionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<RoomDirectory>,
    pub scheduler: Arc<MatchScheduler>,
    pub connections: Arc<ConnectionRegistry>,
    pub games: Arc<GameService>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let constants = GameConstants {
            win_score: config.win_score,
            ..GameConstants::default()
        };
        let directory = Arc::new(RoomDirectory::new(constants));
        let connections = Arc::new(ConnectionRegistry::new());

        // One tick task per active match, all at the configured rate
        let scheduler = Arc::new(MatchScheduler::new(
            tick_period(config.tick_rate_hz),
            directory.clone(),
            connections.clone(),
        ));

        let games = Arc::new(GameService::new(
            directory.clone(),
            scheduler.clone(),
            connections.clone(),
            config.reconnect_grace,
            config.require_match_accept,
        ));

        let matchmaking = Arc::new(MatchmakingService::new(
            games.clone(),
            connections.clone(),
            config.queue_sweep_interval,
        ));

        Self {
            config,
            directory,
            scheduler,
            connections,
            games,
            matchmaking,
        }
    }

    /// Stop every tick loop and grace timer and drop all matches
    pub fn shutdown(&self) {
        self.scheduler.stop_all();
        self.directory.clear();
    }
}
