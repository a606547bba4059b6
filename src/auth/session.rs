//! Session lifecycle: revocation and push notifications to connected dashboards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::repo::RevocationStore;
use crate::auth::repo_types::Role;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { user_id: Uuid, session_id: Uuid },
    SignedOut { user_id: Uuid, session_id: Uuid },
    RoleChanged { user_id: Uuid, role: Role },
}

impl SessionEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            SessionEvent::SignedIn { user_id, .. }
            | SessionEvent::SignedOut { user_id, .. }
            | SessionEvent::RoleChanged { user_id, .. } => *user_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn { .. } => "signed_in",
            SessionEvent::SignedOut { .. } => "signed_out",
            SessionEvent::RoleChanged { .. } => "role_changed",
        }
    }
}

/// Fan-out of session events plus the revocation list consulted by the gate.
///
/// Revocations are written through to a [`RevocationStore`] and mirrored in
/// memory until they lapse, so a restart does not revive signed-out sessions.
#[derive(Clone)]
pub struct SessionHub {
    tx: broadcast::Sender<SessionEvent>,
    revoked: Arc<RwLock<HashMap<Uuid, OffsetDateTime>>>,
    store: Arc<dyn RevocationStore>,
}

impl SessionHub {
    pub fn new(store: Arc<dyn RevocationStore>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            revoked: Arc::default(),
            store,
        }
    }

    /// Drops lapsed rows from the store and loads the ones still in force.
    pub async fn restore(store: Arc<dyn RevocationStore>) -> anyhow::Result<Self> {
        let now = OffsetDateTime::now_utc();
        let pruned = store.prune(now).await?;
        let active = store.active(now).await?;
        info!(pruned, active = active.len(), "session revocations restored");
        let hub = Self::new(store);
        if let Ok(mut revoked) = hub.revoked.write() {
            revoked.extend(active);
        }
        Ok(hub)
    }

    pub fn publish(&self, event: SessionEvent) {
        // No subscribers is fine: nobody is watching.
        if self.tx.send(event.clone()).is_err() {
            debug!(event = event.name(), "no session subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Revokes `session_id` until `until`. Takes effect in memory even when
    /// the store write fails; the error is returned for the caller to log.
    pub async fn revoke(&self, session_id: Uuid, until: OffsetDateTime) -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        if let Ok(mut revoked) = self.revoked.write() {
            revoked.retain(|_, lapses| *lapses > now);
            let slot = revoked.entry(session_id).or_insert(until);
            *slot = (*slot).max(until);
        }
        self.store.record(session_id, until).await
    }

    /// A poisoned lock counts as revoked.
    pub fn is_revoked(&self, session_id: Uuid) -> bool {
        let now = OffsetDateTime::now_utc();
        self.revoked
            .read()
            .map(|r| r.get(&session_id).is_some_and(|until| *until > now))
            .unwrap_or(true)
    }

    pub fn revoked_len(&self) -> usize {
        self.revoked.read().map(|r| r.len()).unwrap_or_default()
    }
}

#[cfg(test)]
impl Default for SessionHub {
    fn default() -> Self {
        Self::new(Arc::new(crate::auth::repo::memory::MemoryRevocations::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::memory::MemoryRevocations;

    #[tokio::test]
    async fn subscribers_see_events_published_after_subscribing() {
        let hub = SessionHub::default();
        let user_id = Uuid::new_v4();
        hub.publish(SessionEvent::RoleChanged {
            user_id,
            role: Role::User,
        });

        let mut rx = hub.subscribe();
        hub.publish(SessionEvent::SignedOut {
            user_id,
            session_id: Uuid::nil(),
        });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.name(), "signed_out");
        assert_eq!(ev.user_id(), user_id);
    }

    fn later() -> OffsetDateTime {
        OffsetDateTime::now_utc() + time::Duration::hours(1)
    }

    #[tokio::test]
    async fn revocation_is_per_session() {
        let hub = SessionHub::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        hub.revoke(a, later()).await.unwrap();
        assert!(hub.is_revoked(a));
        assert!(!hub.is_revoked(b));
    }

    #[tokio::test]
    async fn lapsed_revocations_are_pruned() {
        let hub = SessionHub::default();
        let stale = Uuid::new_v4();
        hub.revoke(stale, OffsetDateTime::now_utc() - time::Duration::minutes(1))
            .await
            .unwrap();
        assert!(!hub.is_revoked(stale));

        let fresh = Uuid::new_v4();
        hub.revoke(fresh, later()).await.unwrap();
        assert_eq!(hub.revoked_len(), 1);
        assert!(hub.is_revoked(fresh));
    }

    #[tokio::test]
    async fn revocations_survive_a_restart() {
        let store = Arc::new(MemoryRevocations::default());
        let sid = Uuid::new_v4();
        let first = SessionHub::new(store.clone());
        first.revoke(sid, later()).await.unwrap();
        first
            .revoke(Uuid::new_v4(), OffsetDateTime::now_utc() - time::Duration::minutes(1))
            .await
            .unwrap();

        let restarted = SessionHub::restore(store.clone()).await.unwrap();
        assert!(restarted.is_revoked(sid));
        assert_eq!(restarted.revoked_len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = SessionEvent::RoleChanged {
            user_id: Uuid::nil(),
            role: Role::Member,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "role_changed");
        assert_eq!(json["role"], "member");
    }
}
