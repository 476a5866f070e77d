//! Outbound routing: player id → live WebSocket writer

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::r#match::PlayerId;
use crate::ws::protocol::ServerMsg;

/// Outbound buffer per connection, about two seconds of 60 Hz state
const OUTBOUND_CAPACITY: usize = 128;

struct ConnectionEntry {
    connection_id: u64,
    tx: mpsc::Sender<ServerMsg>,
}

/// Connected players and their outbound channels
pub struct ConnectionRegistry {
    connections: DashMap<PlayerId, ConnectionEntry>,
    next_connection_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Attach a new connection for the player, replacing any older one.
    /// Returns the connection id and the receiver the socket writer drains.
    pub fn register(&self, player_id: PlayerId) -> (u64, mpsc::Receiver<ServerMsg>) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

        if self
            .connections
            .insert(player_id, ConnectionEntry { connection_id, tx })
            .is_some()
        {
            debug!(player_id = %player_id, "Replaced an older connection");
        }

        (connection_id, rx)
    }

    /// Detach a connection. A newer connection for the same player is kept.
    /// Returns whether this connection was the player's current one.
    pub fn unregister(&self, player_id: PlayerId, connection_id: u64) -> bool {
        self.connections
            .remove_if(&player_id, |_, entry| entry.connection_id == connection_id)
            .is_some()
    }

    pub fn is_connected(&self, player_id: &PlayerId) -> bool {
        self.connections.contains_key(player_id)
    }

    /// Send to one client. Returns false when it is gone or not keeping up.
    pub fn send_to(&self, player_id: PlayerId, msg: ServerMsg) -> bool {
        let Some(entry) = self.connections.get(&player_id) else {
            return false;
        };

        match entry.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(player_id = %player_id, "Outbound buffer full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(player_id = %player_id, "Outbound channel closed");
                false
            }
        }
    }

    /// Send the same message to every listed player
    pub fn broadcast<I>(&self, players: I, msg: &ServerMsg)
    where
        I: IntoIterator<Item = PlayerId>,
    {
        for player_id in players {
            self.send_to(player_id, msg.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn send_reaches_the_current_connection() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (_, mut rx) = registry.register(player);

        assert!(registry.send_to(player, ServerMsg::LeftQueue));
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::LeftQueue)));
        assert!(!registry.send_to(Uuid::new_v4(), ServerMsg::LeftQueue));
    }

    #[test]
    fn stale_connection_cannot_unregister_newer_one() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (old, _old_rx) = registry.register(player);
        let (new, mut new_rx) = registry.register(player);

        assert!(!registry.unregister(player, old));
        assert!(registry.is_connected(&player));
        registry.send_to(player, ServerMsg::Pong { t: 1 });
        assert!(matches!(new_rx.try_recv(), Ok(ServerMsg::Pong { t: 1 })));

        assert!(registry.unregister(player, new));
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_skips_missing_players() {
        let registry = ConnectionRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut rx_a) = registry.register(a);

        registry.broadcast([a, b], &ServerMsg::Pong { t: 9 });

        assert!(matches!(rx_a.try_recv(), Ok(ServerMsg::Pong { t: 9 })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn full_buffer_drops_instead_of_blocking() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (_, _rx) = registry.register(player);

        for t in 0..OUTBOUND_CAPACITY as u64 {
            assert!(registry.send_to(player, ServerMsg::Pong { t }));
        }
        assert!(!registry.send_to(player, ServerMsg::Pong { t: 0 }));
    }
}
