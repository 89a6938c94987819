use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use courier_types::events::GatewayEvent;

/// Tracks which users hold a live gateway connection and fans events out
/// to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events; every connected client
    /// receives every broadcast.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Live connections: user_id -> (conn_id, targeted sender).
    /// A user is online exactly while they have an entry here.
    connections: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Track a connection for `user_id`. A second connection for the same
    /// user overwrites the first. Broadcasts a presence delta only when the
    /// user was actually offline before, followed by a fresh snapshot.
    pub async fn register(
        &self,
        user_id: Uuid,
        conn_id: Uuid,
        sender: mpsc::UnboundedSender<GatewayEvent>,
    ) {
        let (was_online, user_ids) = {
            let mut connections = self.inner.connections.write().await;
            let previous = connections.insert(user_id, (conn_id, sender));
            (previous.is_some(), connections.keys().copied().collect())
        };

        if !was_online {
            self.broadcast(GatewayEvent::PresenceDelta {
                user_id,
                online: true,
            });
        }
        self.broadcast(GatewayEvent::OnlineUsersSnapshot { user_ids });
    }

    /// Drop the tracked connection, but only if `conn_id` still owns the
    /// entry. A stale disconnect from a replaced connection must not knock
    /// the newer connection of the same user offline.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let user_ids = {
            let mut connections = self.inner.connections.write().await;
            match connections.get(&user_id) {
                Some((stored_conn_id, _)) if *stored_conn_id == conn_id => {
                    connections.remove(&user_id);
                    connections.keys().copied().collect::<Vec<_>>()
                }
                // A newer connection has taken over, or the user is
                // already gone. Don't touch anything.
                _ => return,
            }
        };

        self.broadcast(GatewayEvent::PresenceDelta {
            user_id,
            online: false,
        });
        self.broadcast(GatewayEvent::OnlineUsersSnapshot { user_ids });
    }

    /// Send a targeted event to a specific user. Returns whether a live
    /// connection accepted it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Ids of all users currently holding a live connection.
    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        self.inner.connections.read().await.keys().copied().collect()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.connections.read().await.contains_key(&user_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
