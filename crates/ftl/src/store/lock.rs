// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::sync::Arc;

use super::Acquire;
use crate::advisory;
use crate::error::{Error, Result};
use crate::realm::RealmInner;

/// Named lock in the persistence store.
///
/// Locks are taken on demand by the `*_with_lock` map operations and kept
/// until [`Lock::return_lock`] (or realm close).
pub struct Lock {
    name: String,
    realm: Arc<RealmInner>,
}

impl Lock {
    pub(crate) fn new(realm: Arc<RealmInner>, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArg("lock name is empty".into()));
        }
        realm.ensure_open()?;
        Ok(Self {
            name: name.to_string(),
            realm,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compatibility call: always succeeds and acquires nothing.
    pub fn request(&self) -> Result<bool> {
        self.realm.ensure_open()?;
        Ok(true)
    }

    /// Ask for the lock even if another client holds it. The transfer
    /// happens at the next lock-requiring operation of either party.
    pub fn steal(&self) -> Result<()> {
        self.realm.ensure_open()?;
        self.realm.server().store().steal(&self.name, self.realm.id());
        log::debug!("[lock] realm {} steals '{}'", self.realm.id(), self.name);
        Ok(())
    }

    /// Release the lock if this client holds it.
    pub fn return_lock(&self) -> Result<()> {
        self.realm.ensure_open()?;
        if self.realm.server().store().release(&self.name, self.realm.id()) {
            log::debug!("[lock] realm {} returned '{}'", self.realm.id(), self.name);
        }
        Ok(())
    }

    /// True if this client currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.realm.server().store().holder(&self.name) == Some(self.realm.id())
    }

    /// Destroy the handle, returning the lock if held.
    pub fn destroy(self) -> Result<()> {
        self.return_lock()
    }

    pub(crate) fn realm(&self) -> &Arc<RealmInner> {
        &self.realm
    }

    /// Take the lock if needed for an operation that leaves it held.
    pub(crate) fn ensure_held(&self) -> Result<()> {
        self.resolve(true)
    }

    /// Check the lock is held without acquiring it.
    pub(crate) fn verify_held(&self) -> Result<()> {
        self.resolve(false).map_err(|e| match e {
            Error::ResourceUnavailable(msg) => Error::IllegalState(msg),
            other => other,
        })
    }

    fn resolve(&self, grant: bool) -> Result<()> {
        self.realm.ensure_open()?;
        let me = self.realm.id();
        match self.realm.server().store().acquire(&self.name, me, grant)? {
            Acquire::Held | Acquire::Granted => Ok(()),
            Acquire::Transferred { previous } => {
                log::debug!("[lock] '{}' stolen from realm {} by {}", self.name, previous, me);
                self.notify_lost(previous);
                Ok(())
            }
            Acquire::Lost => {
                log::debug!("[lock] realm {} lost '{}' to a pending steal", me, self.name);
                self.notify_lost(me);
                Err(Error::ResourceUnavailable(format!(
                    "lock '{}' was stolen",
                    self.name
                )))
            }
        }
    }

    fn notify_lost(&self, previous: u64) {
        let Some(realm) = self.realm.server().realm(previous) else {
            return;
        };
        match advisory::lock_lost(&self.name, advisory::REASON_LOCK_STOLEN) {
            Ok(msg) => realm.publish_advisory(msg),
            Err(e) => log::warn!("[lock] cannot build lock lost advisory: {}", e),
        }
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("name", &self.name)
            .field("realm", &self.realm.id())
            .finish()
    }
}
