use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use plaza_types::events::GatewayEvent;

/// Manages all connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global events (presence); every connected client receives these
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    online_users: RwLock<HashSet<Uuid>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashSet::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. A newer connection replaces an
    /// older one. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Dropped if they are offline.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    pub async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        for user_id in user_ids {
            if let Some((_, tx)) = channels.get(user_id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.online_users.read().await.contains(&user_id)
    }

    pub async fn user_online(&self, user_id: Uuid) {
        self.inner.online_users.write().await.insert(user_id);
        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: true,
        });
    }

    /// Only cleans up if conn_id still owns the user channel.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection has taken over
            return;
        }

        self.inner.online_users.write().await.remove(&user_id);
        self.unregister_user_channel(user_id, conn_id).await;

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            online: false,
        });
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.online_users.read().await.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn targeted_events_reach_only_their_user() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        dispatcher
            .send_to_user(alice, GatewayEvent::Ready { user_id: alice })
            .await;

        assert!(matches!(alice_rx.try_recv(), Ok(GatewayEvent::Ready { .. })));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_connection_does_not_take_user_offline() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(alice).await;
        dispatcher.user_online(alice).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(alice).await;

        dispatcher.user_offline(alice, old_conn).await;
        assert!(dispatcher.is_online(alice).await);

        dispatcher.send_to_users(&[alice], GatewayEvent::Ready { user_id: alice }).await;
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn presence_is_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let alice = Uuid::new_v4();

        let (conn, _rx) = dispatcher.register_user_channel(alice).await;
        dispatcher.user_online(alice).await;
        dispatcher.user_offline(alice, conn).await;

        assert!(matches!(rx.recv().await, Ok(GatewayEvent::PresenceUpdate { online: true, .. })));
        assert!(matches!(rx.recv().await, Ok(GatewayEvent::PresenceUpdate { online: false, .. })));
        assert!(dispatcher.online_users().await.is_empty());
    }
}
