// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process persistence store: cooperative locks and key/value maps.
//!
//! Lock holders are identified by realm id, so two realms on one server
//! compete for a lock the way two client processes would.
//!
//! # Lock transfer
//!
//! [`Lock::steal`] only records intent. The lock changes hands at the next
//! lock-requiring operation of either party:
//!
//! - the stealer's operation succeeds and makes it the holder;
//! - the holder's operation fails and hands the lock to the stealer.
//!
//! Either way the previous holder receives a `LOCK_LOST` advisory.

mod lock;
mod map;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub use lock::Lock;
pub use map::{Map, MapIterator};

use crate::error::{Error, Result};
use crate::message::Message;

/// Outcome of a lock-requiring operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// Caller already held the lock.
    Held,
    /// Lock was free and is now the caller's.
    Granted,
    /// Caller had a pending steal and took the lock from `previous`.
    Transferred { previous: u64 },
    /// Caller held the lock but a steal was pending; the stealer has it now.
    Lost,
}

#[derive(Debug, Default)]
struct LockState {
    holder: Option<u64>,
    stealer: Option<u64>,
}

impl LockState {
    fn is_idle(&self) -> bool {
        self.holder.is_none() && self.stealer.is_none()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    locks: Mutex<HashMap<String, LockState>>,
    maps: Mutex<HashMap<String, Arc<MapData>>>,
}

impl Store {
    // ========================================================================
    // Locks
    // ========================================================================

    /// Resolve ownership for a lock-requiring operation by `client`.
    ///
    /// With `grant` false the lock is never newly granted, only checked (and
    /// transferred if a steal is pending); a lock the caller does not hold is
    /// then `IllegalState` instead of `ResourceUnavailable`.
    pub(crate) fn acquire(&self, name: &str, client: u64, grant: bool) -> Result<Acquire> {
        let mut locks = self.locks.lock();
        let lock = locks.entry(name.to_string()).or_default();
        let outcome = match (lock.holder, lock.stealer) {
            (Some(holder), Some(stealer)) if holder == client && stealer != client => {
                lock.holder = Some(stealer);
                lock.stealer = None;
                Ok(Acquire::Lost)
            }
            (Some(holder), _) if holder == client => Ok(Acquire::Held),
            (Some(holder), Some(stealer)) if stealer == client => {
                lock.holder = Some(client);
                lock.stealer = None;
                Ok(Acquire::Transferred { previous: holder })
            }
            (None, _) if grant => {
                lock.holder = Some(client);
                if lock.stealer == Some(client) {
                    lock.stealer = None;
                }
                Ok(Acquire::Granted)
            }
            _ if !grant => Err(Error::IllegalState(format!("lock '{}' is not held", name))),
            _ => Err(Error::ResourceUnavailable(format!(
                "lock '{}' is held by another client",
                name
            ))),
        };
        if lock.is_idle() {
            locks.remove(name);
        }
        outcome
    }

    /// Record a steal. A free lock is granted at once.
    pub(crate) fn steal(&self, name: &str, client: u64) {
        let mut locks = self.locks.lock();
        let lock = locks.entry(name.to_string()).or_default();
        match lock.holder {
            None => lock.holder = Some(client),
            Some(holder) if holder == client => {}
            Some(_) => lock.stealer = Some(client),
        }
    }

    /// Give up the lock and any pending steal. Returns true if it was held.
    pub(crate) fn release(&self, name: &str, client: u64) -> bool {
        let mut locks = self.locks.lock();
        let Some(lock) = locks.get_mut(name) else {
            return false;
        };
        if lock.stealer == Some(client) {
            lock.stealer = None;
        }
        let held = lock.holder == Some(client);
        if held {
            lock.holder = None;
        }
        if lock.is_idle() {
            locks.remove(name);
        }
        held
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().len()
    }

    pub(crate) fn holder(&self, name: &str) -> Option<u64> {
        self.locks.lock().get(name).and_then(|l| l.holder)
    }

    /// Release everything `client` holds or wants. Returns the lock names.
    pub(crate) fn release_all(&self, client: u64) -> Vec<String> {
        let mut released = Vec::new();
        self.locks.lock().retain(|name, lock| {
            if lock.stealer == Some(client) {
                lock.stealer = None;
            }
            if lock.holder == Some(client) {
                lock.holder = None;
                released.push(name.clone());
            }
            !lock.is_idle()
        });
        released
    }

    // ========================================================================
    // Maps
    // ========================================================================

    pub(crate) fn open_map(&self, name: &str) -> Arc<MapData> {
        let mut maps = self.maps.lock();
        Arc::clone(
            maps.entry(name.to_string())
                .or_insert_with(|| Arc::new(MapData::new(name))),
        )
    }

    /// Delete a map. Open handles fail with `IllegalState` afterwards.
    pub(crate) fn remove_map(&self, name: &str) -> Result<()> {
        let removed = self.maps.lock().remove(name);
        match removed {
            Some(data) => {
                data.removed.store(true, Ordering::Release);
                data.entries.lock().clear();
                Ok(())
            }
            None => Err(Error::NotFound(format!("map '{}'", name))),
        }
    }
}

/// Entries ordered by insertion sequence so iterators see later additions.
#[derive(Debug, Default)]
struct MapEntries {
    by_key: HashMap<String, (u64, Message)>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl MapEntries {
    fn set(&mut self, key: &str, value: Message) {
        if let Some(entry) = self.by_key.get_mut(key) {
            entry.1 = value;
            return;
        }
        self.next_seq += 1;
        self.order.insert(self.next_seq, key.to_string());
        self.by_key.insert(key.to_string(), (self.next_seq, value));
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.by_key.remove(key) {
            Some((seq, _)) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// First entry inserted after `seq`.
    fn next_after(&self, seq: u64) -> Option<(u64, &str, &Message)> {
        let (&next, key) = self.order.range(seq + 1..).next()?;
        let (_, value) = self.by_key.get(key)?;
        Some((next, key.as_str(), value))
    }

    fn clear(&mut self) {
        self.by_key.clear();
        self.order.clear();
    }
}

#[derive(Debug)]
pub(crate) struct MapData {
    name: String,
    removed: AtomicBool,
    entries: Mutex<MapEntries>,
}

impl MapData {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            removed: AtomicBool::new(false),
            entries: Mutex::new(MapEntries::default()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ensure_present(&self) -> Result<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(Error::IllegalState(format!("map '{}' was removed", self.name)));
        }
        Ok(())
    }

    pub(crate) fn set(&self, key: &str, value: Message) {
        self.entries.lock().set(key, value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<Message> {
        self.entries.lock().by_key.get(key).map(|(_, v)| v.mutable_copy())
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().by_key.len()
    }

    /// Copy of the first entry inserted after `seq`.
    pub(crate) fn next_after(&self, seq: u64) -> Option<(u64, String, Message)> {
        self.entries
            .lock()
            .next_after(seq)
            .map(|(next, key, value)| (next, key.to_string(), value.mutable_copy()))
    }
}
