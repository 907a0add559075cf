use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::storage::KvStorage;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key for the absolute expiry instant (stringified epoch milliseconds)
pub const EXPIRATION_KEY: &str = "expirationTime";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    /// Absolute expiry instant, epoch milliseconds.
    pub expires_at: i64,
}

impl SessionData {
    /// Milliseconds until expiry, clamped at zero.
    pub fn remaining_ms(&self) -> i64 {
        (self.expires_at - now_ms()).max(0)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_ms()
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Single source of truth for authentication state.
///
/// Owns the two persisted keys exclusively; every mutation writes through to
/// storage before the in-memory state changes, so storage is always the
/// recovery source after a crash. Absence and expiry are normal states, not
/// errors - only storage I/O and corrupt persisted data produce `Err`.
pub struct SessionStore {
    storage: Arc<dyn KvStorage>,
    data: Option<SessionData>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KvStorage>) -> Self {
        Self {
            storage,
            data: None,
        }
    }

    /// Begin a session from a backend-issued token and time-to-live.
    ///
    /// Caller guarantees a non-empty token and `ttl_seconds > 0`; the backend
    /// response is validated before this is invoked.
    pub fn login(&mut self, token: &str, ttl_seconds: u64) -> Result<()> {
        debug_assert!(!token.is_empty());
        debug_assert!(ttl_seconds > 0);

        let expires_at = now_ms() + (ttl_seconds as i64) * 1000;

        // Write-through: persist both keys before publishing in-memory state.
        self.storage
            .set(TOKEN_KEY, token)
            .context("Failed to persist session token")?;
        self.storage
            .set(EXPIRATION_KEY, &expires_at.to_string())
            .context("Failed to persist session expiry")?;

        self.data = Some(SessionData {
            token: token.to_string(),
            expires_at,
        });
        debug!(ttl_seconds, "Session started");
        Ok(())
    }

    /// Clear the session. Idempotent: logging out while already logged out
    /// leaves storage and in-memory state untouched.
    pub fn logout(&mut self) -> Result<()> {
        self.storage
            .remove(TOKEN_KEY)
            .context("Failed to clear session token")?;
        self.storage
            .remove(EXPIRATION_KEY)
            .context("Failed to clear session expiry")?;
        self.data = None;
        Ok(())
    }

    /// Rebuild session state from storage at process start.
    ///
    /// Returns `None` when nothing is persisted, when the persisted session
    /// has expired, or when the persisted expiry fails to parse. The latter
    /// two cases clear storage so stale or corrupt entries cannot resurface
    /// on the next start.
    pub fn restore(&mut self) -> Result<Option<SessionData>> {
        self.data = None;

        let token = match self.storage.get(TOKEN_KEY)? {
            Some(token) if !token.is_empty() => token,
            _ => {
                // Drop an orphaned expiry entry if the token is gone.
                self.storage.remove(EXPIRATION_KEY)?;
                return Ok(None);
            }
        };

        let expires_at = match self.storage.get(EXPIRATION_KEY)? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(ms) => ms,
                Err(_) => {
                    // Corrupt expiry: fail safe to logged-out, clearing both
                    // keys without re-reading the bad value.
                    error!(value = %raw, "Corrupt persisted session expiry, clearing session");
                    self.storage.remove(TOKEN_KEY)?;
                    self.storage.remove(EXPIRATION_KEY)?;
                    return Ok(None);
                }
            },
            None => {
                self.storage.remove(TOKEN_KEY)?;
                return Ok(None);
            }
        };

        let session = SessionData { token, expires_at };
        if session.is_expired() {
            debug!("Persisted session already expired, clearing");
            self.storage.remove(TOKEN_KEY)?;
            self.storage.remove(EXPIRATION_KEY)?;
            return Ok(None);
        }

        self.data = Some(session.clone());
        Ok(Some(session))
    }

    /// Bearer token for the current session, if one is active.
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }

    /// Milliseconds until expiry for the in-memory session, clamped at zero.
    pub fn remaining_ms(&self) -> i64 {
        self.data.as_ref().map(|d| d.remaining_ms()).unwrap_or(0)
    }

    /// Re-read the persisted expiry and compute remaining milliseconds.
    ///
    /// This is the watcher's per-tick read: `None` means no session is
    /// persisted, `Err` means the persisted value is corrupt. The returned
    /// remaining is unclamped so the caller can distinguish "just expired"
    /// from "absent".
    pub fn checked_remaining(&self) -> Result<Option<i64>> {
        match self.storage.get(EXPIRATION_KEY)? {
            None => Ok(None),
            Some(raw) => {
                let expires_at: i64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Corrupt persisted session expiry: {:?}", raw))?;
                Ok(Some(expires_at - now_ms()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_login_then_restore_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = SessionStore::new(storage.clone());

        store.login("abc123", 300).unwrap();
        assert!(store.is_active());
        assert_eq!(store.token(), Some("abc123"));

        // A fresh store over the same storage recovers the session.
        let mut restored = SessionStore::new(storage);
        let session = restored.restore().unwrap().expect("session should restore");
        assert_eq!(session.token, "abc123");

        // Remaining drifts by at most the time between the two calls.
        let drift = 300_000 - session.remaining_ms();
        assert!((0..=1000).contains(&drift), "drift was {drift}ms");
    }

    #[test]
    fn test_logout_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = SessionStore::new(storage.clone());

        store.login("abc123", 60).unwrap();
        store.logout().unwrap();
        assert!(!store.is_active());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);

        // Second logout observes an already-cleared session.
        store.logout().unwrap();
        assert!(!store.is_active());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_clears_expired_session() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "stale").unwrap();
        let past = Utc::now().timestamp_millis() - 5000;
        storage.set(EXPIRATION_KEY, &past.to_string()).unwrap();

        let mut store = SessionStore::new(storage.clone());
        assert!(store.restore().unwrap().is_none());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_clears_corrupt_expiry() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "abc123").unwrap();
        storage.set(EXPIRATION_KEY, "not-a-number").unwrap();

        let mut store = SessionStore::new(storage.clone());
        assert!(store.restore().unwrap().is_none());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_clears_orphaned_expiry() {
        let storage = Arc::new(MemoryStorage::new());
        let future = Utc::now().timestamp_millis() + 60_000;
        storage.set(EXPIRATION_KEY, &future.to_string()).unwrap();

        let mut store = SessionStore::new(storage.clone());
        assert!(store.restore().unwrap().is_none());
        assert_eq!(storage.get(EXPIRATION_KEY).unwrap(), None);
    }

    #[test]
    fn test_remaining_is_clamped_at_zero() {
        let session = SessionData {
            token: "abc123".to_string(),
            expires_at: Utc::now().timestamp_millis() - 1000,
        };
        assert_eq!(session.remaining_ms(), 0);
        assert!(session.is_expired());
    }

    #[test]
    fn test_checked_remaining_absent_and_corrupt() {
        let mut store = SessionStore::new(Arc::new(MemoryStorage::new()));
        assert!(store.checked_remaining().unwrap().is_none());

        store.login("abc123", 60).unwrap();
        let remaining = store.checked_remaining().unwrap().unwrap();
        assert!(remaining > 58_000 && remaining <= 60_000);

        let storage = Arc::new(MemoryStorage::new());
        storage.set(EXPIRATION_KEY, "garbage").unwrap();
        let store = SessionStore::new(storage);
        assert!(store.checked_remaining().is_err());
    }
}
