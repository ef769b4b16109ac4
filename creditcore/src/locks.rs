//! Per-record serialization for read-check-write sequences.
//!
//! The store has no transactions, so the engine holds one of these locks
//! from the read that a decision is based on until the write that records it.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::{TaskId, WalletId};

/// Registry of async locks keyed by record id.
pub struct KeyedLocks<K> {
    locks: Arc<StdMutex<HashMap<K, Arc<Mutex<()>>>>>,
}

/// Locks held around balance checks and the writes that follow them.
pub type WalletLocks = KeyedLocks<WalletId>;

/// Locks held around task status checks and the task write that follows.
pub type TaskLocks = KeyedLocks<TaskId>;

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Copy,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the record.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<K> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held = self.locks.lock().map_or(0, |locks| locks.len());
        f.debug_struct("KeyedLocks").field("keys", &held).finish()
    }
}
