use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::SessionStore;

/// Cadence for recomputing remaining session time
const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No active session; the watcher is not ticking.
    Idle,
    /// Ticking, remaining time above zero.
    Active,
    /// Remaining time just reached zero; a single logout is in flight.
    Expiring,
}

/// Snapshot published on every watcher tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTick {
    pub state: WatcherState,
    pub remaining_ms: i64,
}

impl SessionTick {
    fn idle() -> Self {
        Self {
            state: WatcherState::Idle,
            remaining_ms: 0,
        }
    }

    fn active(remaining_ms: i64) -> Self {
        Self {
            state: WatcherState::Active,
            remaining_ms,
        }
    }
}

/// Enforces session expiry without user interaction.
///
/// While a session is active, a background task re-reads the persisted expiry
/// every second and publishes the remaining time for display. When remaining
/// time reaches zero the task logs the session out exactly once and stops;
/// when no session is active it does not tick at all. The task handle is a
/// scoped resource: `stop()` or dropping the watcher aborts it, so a timer
/// can never outlive its owner and fire against cleared state.
pub struct ExpirationWatcher {
    handle: Option<JoinHandle<()>>,
    rx: watch::Receiver<SessionTick>,
}

impl ExpirationWatcher {
    /// Start watching the given store. Call on session start (login or a
    /// successful restore); if no session is active the task exits
    /// immediately and the watcher reports `Idle`.
    pub fn start(store: Arc<Mutex<SessionStore>>) -> Self {
        Self::start_with_interval(store, TICK_INTERVAL)
    }

    pub(crate) fn start_with_interval(store: Arc<Mutex<SessionStore>>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(SessionTick::idle());

        let handle = tokio::spawn(async move {
            {
                let store = store.lock().await;
                if !store.is_active() {
                    debug!("No active session, watcher staying idle");
                    return;
                }
                let _ = tx.send(SessionTick::active(store.remaining_ms()));
            }

            let mut ticker = tokio::time::interval(interval);
            // The first interval tick completes immediately; consume it so
            // every published value is a full tick apart.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let mut store = store.lock().await;

                match store.checked_remaining() {
                    Ok(Some(remaining)) if remaining > 0 => {
                        let _ = tx.send(SessionTick::active(remaining));
                    }
                    Ok(Some(_)) => {
                        let _ = tx.send(SessionTick {
                            state: WatcherState::Expiring,
                            remaining_ms: 0,
                        });
                        if let Err(e) = store.logout() {
                            warn!(error = %e, "Failed to clear expired session");
                        }
                        info!("Session expired, logged out");
                        let _ = tx.send(SessionTick::idle());
                        break;
                    }
                    Ok(None) => {
                        // Missing expiry while nominally active: either an
                        // explicit logout raced this tick (logout is
                        // idempotent, so clearing again is a no-op) or the
                        // entry vanished and an orphaned token may remain.
                        // Clear the store either way.
                        debug!("Persisted expiry gone, watcher stopping");
                        if let Err(e) = store.logout() {
                            warn!(error = %e, "Failed to clear session without expiry");
                        }
                        let _ = tx.send(SessionTick::idle());
                        break;
                    }
                    Err(e) => {
                        // Corrupt persisted expiry: fail safe to logged-out
                        // rather than leave an unbounded session.
                        error!(error = %e, "Corrupt session state, forcing logout");
                        if let Err(e) = store.logout() {
                            warn!(error = %e, "Failed to clear corrupt session");
                        }
                        let _ = tx.send(SessionTick::idle());
                        break;
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
            rx,
        }
    }

    /// Subscribe to published ticks.
    pub fn subscribe(&self) -> watch::Receiver<SessionTick> {
        self.rx.clone()
    }

    /// Most recently published tick.
    pub fn snapshot(&self) -> SessionTick {
        *self.rx.borrow()
    }

    /// Cancel the ticking task. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ExpirationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{EXPIRATION_KEY, TOKEN_KEY};
    use crate::storage::{KvStorage, MemoryStorage};

    const FAST_TICK: Duration = Duration::from_millis(25);

    fn shared_store(storage: Arc<MemoryStorage>) -> Arc<Mutex<SessionStore>> {
        Arc::new(Mutex::new(SessionStore::new(storage)))
    }

    #[tokio::test]
    async fn test_idle_without_session() {
        let store = shared_store(Arc::new(MemoryStorage::new()));
        let watcher = ExpirationWatcher::start_with_interval(store, FAST_TICK);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(watcher.snapshot().state, WatcherState::Idle);
    }

    #[tokio::test]
    async fn test_publishes_non_increasing_remaining() {
        let store = shared_store(Arc::new(MemoryStorage::new()));
        store.lock().await.login("abc123", 60).unwrap();

        let watcher = ExpirationWatcher::start_with_interval(store, FAST_TICK);
        let mut rx = watcher.subscribe();

        let mut last = i64::MAX;
        for _ in 0..5 {
            rx.changed().await.unwrap();
            let tick = *rx.borrow();
            assert_eq!(tick.state, WatcherState::Active);
            assert!(tick.remaining_ms <= last);
            last = tick.remaining_ms;
        }
    }

    #[tokio::test]
    async fn test_expiry_forces_single_logout() {
        let storage = Arc::new(MemoryStorage::new());
        let store = shared_store(storage.clone());
        store.lock().await.login("abc123", 1).unwrap();

        let watcher = ExpirationWatcher::start_with_interval(store.clone(), FAST_TICK);
        tokio::time::sleep(Duration::from_millis(1300)).await;

        assert_eq!(watcher.snapshot().state, WatcherState::Idle);
        assert!(!store.lock().await.is_active());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stops_after_explicit_logout() {
        let store = shared_store(Arc::new(MemoryStorage::new()));
        store.lock().await.login("abc123", 60).unwrap();

        let watcher = ExpirationWatcher::start_with_interval(store.clone(), FAST_TICK);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(watcher.snapshot().state, WatcherState::Active);

        store.lock().await.logout().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(watcher.snapshot().state, WatcherState::Idle);
    }

    #[tokio::test]
    async fn test_missing_expiry_clears_orphaned_token() {
        let storage = Arc::new(MemoryStorage::new());
        let store = shared_store(storage.clone());
        store.lock().await.login("abc123", 60).unwrap();

        // Only the expiry entry vanishes; the token is orphaned.
        storage.remove(EXPIRATION_KEY).unwrap();

        let watcher = ExpirationWatcher::start_with_interval(store.clone(), FAST_TICK);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(watcher.snapshot().state, WatcherState::Idle);
        assert!(!store.lock().await.is_active());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_expiry_fails_safe() {
        let storage = Arc::new(MemoryStorage::new());
        let store = shared_store(storage.clone());
        store.lock().await.login("abc123", 60).unwrap();

        storage.set(EXPIRATION_KEY, "not-a-number").unwrap();

        let watcher = ExpirationWatcher::start_with_interval(store.clone(), FAST_TICK);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(watcher.snapshot().state, WatcherState::Idle);
        assert!(!store.lock().await.is_active());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);
    }
}
