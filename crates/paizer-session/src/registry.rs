//! The client registry: the single source of truth for "who is connected".
//!
//! # Concurrency note
//!
//! One `tokio::sync::Mutex` guards one `HashMap`. A single global lock is
//! plenty at chat-relay scale, and every critical section is a map
//! mutation or a copy of `Arc`s, never network I/O. Callers only see
//! [`register`](Registry::register), [`unregister`](Registry::unregister),
//! and [`snapshot`](Registry::snapshot); the raw map is never exposed.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use paizer_protocol::SessionId;
use tokio::sync::Mutex;

use crate::{Session, SessionError};

/// Shared mapping of session id → session.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session under its id.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyRegistered`] if the id is taken.
    /// With ids from [`IdAllocator`](crate::IdAllocator) this cannot
    /// happen; callers should treat it as a bug, not retry.
    pub async fn register(
        &self,
        session: Arc<Session>,
    ) -> Result<(), SessionError> {
        let id = session.id();
        match self.sessions.lock().await.entry(id) {
            Entry::Occupied(_) => Err(SessionError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
                tracing::debug!(%id, "session registered");
                Ok(())
            }
        }
    }

    /// Removes and returns the session, or `None` if it is already gone.
    ///
    /// Idempotent on purpose: when a handler's own failure detection and
    /// the heartbeat sweep race to evict the same session, exactly one of
    /// them gets `Some` and the other sees `None`.
    pub async fn unregister(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.lock().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(%id, "session unregistered");
        }
        removed
    }

    /// A point-in-time copy of every registered session.
    ///
    /// Order is unspecified.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Returns `true` if a session with this id is registered.
    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` if nobody is connected.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use paizer_protocol::LineCodec;

    use super::*;
    use crate::{IdAllocator, Outlet};

    fn session(id: SessionId) -> Arc<Session> {
        let (outlet, _rx) = Outlet::new(Arc::new(LineCodec));
        Arc::new(Session::new(id, format!("user{id}"), "127.0.0.1", outlet))
    }

    #[tokio::test]
    async fn test_register_then_snapshot_contains_session() {
        let registry = Registry::new();
        registry.register(session(SessionId(1))).await.expect("register");

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), SessionId(1));
        assert!(registry.contains(SessionId(1)).await);
    }

    #[tokio::test]
    async fn test_register_duplicate_id_is_rejected() {
        let registry = Registry::new();
        registry.register(session(SessionId(1))).await.unwrap();

        let result = registry.register(session(SessionId(1))).await;

        assert!(matches!(
            result,
            Err(SessionError::AlreadyRegistered(SessionId(1)))
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_returns_session_once() {
        let registry = Registry::new();
        registry.register(session(SessionId(3))).await.unwrap();

        let first = registry.unregister(SessionId(3)).await;
        let second = registry.unregister(SessionId(3)).await;

        assert_eq!(first.map(|s| s.id()), Some(SessionId(3)));
        assert!(second.is_none(), "second unregister must be a no-op");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregister_unknown_id_is_none() {
        let registry = Registry::new();
        assert!(registry.unregister(SessionId(99)).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unregister_exactly_one_winner() {
        let registry = Arc::new(Registry::new());
        registry.register(session(SessionId(1))).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.unregister(SessionId(1)).await.is_some()
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time_copy() {
        let registry = Registry::new();
        let ids = IdAllocator::new();
        for _ in 0..3 {
            registry.register(session(ids.next())).await.unwrap();
        }

        let snapshot = registry.snapshot().await;
        registry.unregister(SessionId(2)).await;

        // The copy still has all three; the registry has moved on.
        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.len().await, 2);
    }
}
