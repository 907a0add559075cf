//! Session lifecycle management.
//!
//! This module provides:
//! - `SessionStore`: the single owner of the persisted `token` and
//!   `expirationTime` entries, with `login`/`logout`/`restore` as the only
//!   mutators
//! - `ExpirationWatcher`: a cancellable recurring task that publishes
//!   remaining session time and forces logout at expiry
//!
//! Consumers read session state through the store and subscribe to the
//! watcher; they never touch the persisted keys directly.

pub mod session;
pub mod watcher;

pub use session::{SessionData, SessionStore};
pub use watcher::{ExpirationWatcher, SessionTick, WatcherState};
