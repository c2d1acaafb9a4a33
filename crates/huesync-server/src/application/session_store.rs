//! SessionStore: the process-wide session, shared behind a lock.
//!
//! The store is created once at startup, wrapped in an `Arc`, and handed to
//! the controller (the only writer) and the frame adapter (a reader).
//!
//! Writes go through [`SessionStore::apply`], which runs one transition
//! method of [`Session`] under the write lock.  Readers therefore always see
//! either the state before a transition or the state after it, never a mix
//! such as an active area with a non-`Working` status.
//!
//! The frame delivery path uses [`SessionStore::is_streaming_now`], which
//! never waits: if a transition holds the lock at that instant the frame is
//! treated as gated.

use huesync_core::{Session, SessionError, SessionStatus};
use tokio::sync::RwLock;
use tracing::debug;

/// Shared session handle.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a consistent copy of the session.
    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.read().await.status()
    }

    /// Non-waiting gate check for the frame delivery path.
    ///
    /// Returns `false` while a transition is being applied.
    pub fn is_streaming_now(&self) -> bool {
        self.inner
            .try_read()
            .map(|session| session.is_streaming())
            .unwrap_or(false)
    }

    /// Applies one transition atomically with respect to all readers.
    ///
    /// # Errors
    ///
    /// Propagates the transition's [`SessionError`]; the session is unchanged
    /// in that case.
    pub async fn apply<T, F>(&self, transition: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut Session) -> Result<T, SessionError>,
    {
        let mut session = self.inner.write().await;
        let before = session.status();
        let result = transition(&mut *session);
        debug_assert!(session.invariants_hold(), "session invariant broken: {session:?}");
        if result.is_ok() && before != session.status() {
            debug!("session status {before} -> {}", session.status());
        }
        result
    }

    /// Moves the session to `error`, recording `reason`.
    pub async fn fail(&self, reason: impl Into<String>) -> SessionStatus {
        let mut session = self.inner.write().await;
        session.fail(reason)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use huesync_core::{BridgeIdentity, Credentials};

    async fn attached_store() -> SessionStore {
        let store = SessionStore::new();
        store
            .apply(|s| s.attach_bridge(BridgeIdentity::new("b1", "10.0.0.2"), Credentials::new("k", "u")))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_new_store_is_not_ready() {
        let store = SessionStore::new();
        assert_eq!(store.status().await, SessionStatus::NotReady);
        assert!(!store.is_streaming_now());
    }

    #[tokio::test]
    async fn test_apply_begin_stream_opens_gate() {
        let store = attached_store().await;

        store.apply(|s| s.begin_stream("areaA")).await.unwrap();

        assert!(store.is_streaming_now());
        assert_eq!(store.snapshot().await.active_area_id(), Some("areaA"));
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_store_unchanged() {
        let store = attached_store().await;
        let before = store.snapshot().await;

        let result = store.apply(|s| s.end_stream()).await;

        assert_eq!(result, Err(SessionError::NoActiveSession));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_gate_reads_closed_while_transition_holds_lock() {
        let store = attached_store().await;
        store.apply(|s| s.begin_stream("areaA")).await.unwrap();

        let guard = store.inner.write().await;
        assert!(!store.is_streaming_now(), "gate must not wait on a writer");
        drop(guard);

        assert!(store.is_streaming_now());
    }

    #[tokio::test]
    async fn test_fail_moves_to_error_and_closes_gate() {
        let store = attached_store().await;
        store.apply(|s| s.begin_stream("areaA")).await.unwrap();

        let status = store.fail("stop timed out").await;

        assert_eq!(status, SessionStatus::Error);
        assert!(!store.is_streaming_now());
        assert_eq!(store.snapshot().await.last_error(), Some("stop timed out"));
    }
}
