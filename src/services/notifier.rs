//! Notification bus.
//!
//! Per-agent broadcast channels for prompt in-process wakeups, paired with
//! the durable per-agent pending list so late subscribers do not miss
//! events. Publishing to an agent does both in one logical operation.
//! Broadcast events ([`BROADCAST_AGENT`]) fan out to every open channel and
//! are not persisted: they are wakeup hints, and polling remains the safe
//! fallback for anything durable.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Notification, BROADCAST_AGENT};
use crate::domain::ports::NotificationStore;

const CHANNEL_CAPACITY: usize = 64;

/// Pub/sub fan-out plus durable pending lists.
#[derive(Clone)]
pub struct NotificationBus {
    store: Arc<dyn NotificationStore>,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Notification>>>>,
}

impl NotificationBus {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store, channels: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Subscribe to an agent's channel (or [`BROADCAST_AGENT`] wakeups,
    /// which are delivered to every subscriber anyway).
    pub async fn subscribe(&self, agent_id: &str) -> broadcast::Receiver<Notification> {
        let mut channels = self.channels.write().await;
        channels
            .entry(agent_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish: append to the durable pending list, then fan out over the
    /// live channels. Broadcast events skip persistence.
    pub async fn publish(&self, notification: Notification) -> DomainResult<()> {
        let is_broadcast = notification.agent_id == BROADCAST_AGENT;
        if !is_broadcast {
            self.store.push(&notification).await?;
        }

        let channels = self.channels.read().await;
        if is_broadcast {
            for (agent_id, tx) in channels.iter() {
                if tx.send(notification.clone()).is_err() {
                    debug!(agent_id, "no live subscriber for broadcast");
                }
            }
        } else if let Some(tx) = channels.get(&notification.agent_id) {
            if tx.send(notification.clone()).is_err() {
                debug!(agent_id = %notification.agent_id, "no live subscriber; pending list retains event");
            }
        }

        Ok(())
    }

    /// Drain the durable pending list for an agent.
    pub async fn drain_pending(&self, agent_id: &str) -> DomainResult<Vec<Notification>> {
        self.store.drain(agent_id).await
    }

    /// Pending count for an agent.
    pub async fn pending_len(&self, agent_id: &str) -> DomainResult<u64> {
        self.store.pending_len(agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_test_pool, Migrator, SqliteNotificationStore,
    };
    use crate::domain::models::NotificationKind;
    use serde_json::json;

    async fn bus() -> NotificationBus {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
        NotificationBus::new(Arc::new(SqliteNotificationStore::new(pool)))
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber_and_pending() {
        let bus = bus().await;
        let mut rx = bus.subscribe("agent-1").await;

        let n = Notification::new(
            "agent-1",
            Some("t1".into()),
            NotificationKind::MergeSuccess,
            json!({}),
        );
        bus.publish(n.clone()).await.unwrap();

        let live = rx.recv().await.unwrap();
        assert_eq!(live.id, n.id);

        let pending = bus.drain_pending("agent-1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, n.id);
        assert_eq!(bus.pending_len("agent-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_pending() {
        let bus = bus().await;
        let n = Notification::new(
            "agent-2",
            Some("t1".into()),
            NotificationKind::TestsFailed,
            json!({"output": "1 failed"}),
        );
        bus.publish(n.clone()).await.unwrap();

        // No live channel existed at publish time; the pending list has it.
        let pending = bus.drain_pending("agent-2").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NotificationKind::TestsFailed);
    }

    #[tokio::test]
    async fn test_broadcast_fans_out_without_persistence() {
        let bus = bus().await;
        let mut rx_a = bus.subscribe("agent-a").await;
        let mut rx_b = bus.subscribe("agent-b").await;

        bus.publish(Notification::broadcast(
            NotificationKind::PhaseActivated,
            json!({"phase": 2}),
        ))
        .await
        .unwrap();

        assert_eq!(rx_a.recv().await.unwrap().kind, NotificationKind::PhaseActivated);
        assert_eq!(rx_b.recv().await.unwrap().kind, NotificationKind::PhaseActivated);
        assert_eq!(bus.pending_len("agent-a").await.unwrap(), 0);
    }
}
