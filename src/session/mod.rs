//! Session key lifecycle.
//!
//! `SessionKeyManager` is the only place the derived key lives between
//! unlock and lock.  It is a cheap, cloneable handle: every clone shares
//! the same key slot, so the profile layer can unlock it and the record
//! store can read from it without either owning the other.
//!
//! States:
//!
//! ```text
//!   Locked --set_key--> Unlocked --clear_key / idle timeout / drop--> Locked
//! ```
//!
//! The slot holds an `Arc<DerivedKey>`.  `set_key` and `clear_key` swap
//! the whole `Option` under a write lock, so a reader either sees the old
//! key, the new key, or nothing; never a mix.  A key is zeroized as soon
//! as the manager and every in-flight reader have dropped their `Arc`.
//!
//! There is no background timer.  The idle timeout is checked whenever the
//! key is requested, and an external timer can call `lock_if_idle`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::crypto::keys::DerivedKey;
use crate::errors::{FinVaultError, Result};

/// Whether a session currently holds a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked,
}

/// Shared, injectable holder for the session key.
#[derive(Clone)]
pub struct SessionKeyManager {
    inner: Arc<Inner>,
}

struct Inner {
    slot: RwLock<Option<Arc<DerivedKey>>>,
    /// Lock automatically after this much inactivity.
    auto_lock: Option<Duration>,
    /// Reference point for `last_activity_ms`.
    epoch: Instant,
    last_activity_ms: AtomicU64,
}

impl Default for SessionKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionKeyManager {
    /// A locked session with no idle timeout.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A locked session that locks itself after `idle` without activity.
    pub fn with_auto_lock(idle: Duration) -> Self {
        Self::build(Some(idle))
    }

    fn build(auto_lock: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: RwLock::new(None),
                auto_lock,
                epoch: Instant::now(),
                last_activity_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Return the current key, or `SessionLocked` if there is none.
    ///
    /// Counts as activity for the idle timeout.  If the timeout has
    /// already elapsed the session is locked first and `SessionLocked`
    /// is returned.
    pub fn current_key(&self) -> Result<Arc<DerivedKey>> {
        loop {
            let key = {
                let slot = self.inner.slot.read().unwrap_or_else(PoisonError::into_inner);
                slot.as_ref().cloned().ok_or(FinVaultError::SessionLocked)?
            };

            if !self.idle_expired() {
                self.touch();
                return Ok(key);
            }

            if self.expire(&key) {
                debug!("session auto-locked after idle timeout");
                return Err(FinVaultError::SessionLocked);
            }
            // The key was replaced or used meanwhile; look again.
        }
    }

    /// Install a freshly derived key, replacing any previous one.
    pub fn set_key(&self, key: DerivedKey) {
        let key = Arc::new(key);
        {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(key);
            // Under the write lock, so an expiry check never sees the new
            // key with the old timestamp.
            self.touch();
        }
        info!("session unlocked");
    }

    /// Drop the key.  Returns `true` if the session was unlocked.
    pub fn clear_key(&self) -> bool {
        let previous = {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        self.finish_lock(previous)
    }

    /// Lock the session if the idle timeout has elapsed.
    ///
    /// Meant to be called from an external timer.  Returns `true` if this
    /// call locked the session.
    pub fn lock_if_idle(&self) -> bool {
        let previous = {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() || !self.idle_expired() {
                return false;
            }
            slot.take()
        };
        debug!("session auto-locked by idle check");
        self.finish_lock(previous)
    }

    /// Whether the session holds a usable key.
    ///
    /// A key past its idle timeout reports `Locked` even before the next
    /// access drops it.
    pub fn state(&self) -> SessionState {
        let slot = self.inner.slot.read().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() && !self.idle_expired() {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    /// The configured idle timeout, if any.
    pub fn auto_lock(&self) -> Option<Duration> {
        self.inner.auto_lock
    }

    /// Drop `seen` if it is still the installed key and still idle.
    ///
    /// Both checks run under one write lock, so a key installed after
    /// `seen` was read is never taken.
    fn expire(&self, seen: &Arc<DerivedKey>) -> bool {
        let previous = {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            let still_installed = slot.as_ref().is_some_and(|k| Arc::ptr_eq(k, seen));
            if !still_installed || !self.idle_expired() {
                return false;
            }
            slot.take()
        };
        self.finish_lock(previous)
    }

    fn finish_lock(&self, previous: Option<Arc<DerivedKey>>) -> bool {
        let was_unlocked = previous.is_some();
        // Zeroized here unless a reader still holds a clone.
        drop(previous);

        if was_unlocked {
            info!("session locked");
        }
        was_unlocked
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.inner.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn touch(&self) {
        self.inner
            .last_activity_ms
            .store(self.now_ms(), Ordering::Relaxed);
    }

    fn idle_expired(&self) -> bool {
        let Some(timeout) = self.inner.auto_lock else {
            return false;
        };
        let last = self.inner.last_activity_ms.load(Ordering::Relaxed);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.now_ms().saturating_sub(last) >= timeout_ms
    }
}

impl fmt::Debug for SessionKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyManager")
            .field("state", &self.state())
            .field("auto_lock", &self.inner.auto_lock)
            .finish()
    }
}
