// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::sync::Arc;

use super::{Lock, MapData};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::realm::RealmInner;

/// Key/value map in the persistence store. Values are messages, copied in
/// and out.
pub struct Map {
    data: Arc<MapData>,
    realm: Arc<RealmInner>,
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArg("map key is empty".into()));
    }
    Ok(())
}

impl Map {
    pub(crate) fn open(realm: Arc<RealmInner>, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArg("map name is empty".into()));
        }
        realm.ensure_open()?;
        let data = realm.server().store().open_map(name);
        Ok(Self { data, realm })
    }

    pub fn name(&self) -> &str {
        self.data.name()
    }

    fn check(&self) -> Result<()> {
        self.realm.ensure_open()?;
        self.data.ensure_present()
    }

    fn take_lock(&self, lock: &Lock) -> Result<()> {
        if !Arc::ptr_eq(lock.realm(), &self.realm) {
            return Err(Error::InvalidArg(format!(
                "lock '{}' belongs to another realm",
                lock.name()
            )));
        }
        lock.ensure_held()
    }

    pub fn set(&self, key: &str, value: &Message) -> Result<()> {
        self.check()?;
        check_key(key)?;
        self.data.set(key, value.mutable_copy());
        Ok(())
    }

    /// Copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<Message>> {
        self.check()?;
        check_key(key)?;
        Ok(self.data.get(key))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        check_key(key)?;
        self.data.remove(key);
        Ok(())
    }

    /// [`Map::set`] under `lock`, acquiring it if needed. The lock stays
    /// held afterwards. Nothing is written when the lock is unavailable.
    pub fn set_with_lock(&self, key: &str, value: &Message, lock: &Lock) -> Result<()> {
        self.check()?;
        check_key(key)?;
        self.take_lock(lock)?;
        self.data.set(key, value.mutable_copy());
        Ok(())
    }

    pub fn get_with_lock(&self, key: &str, lock: &Lock) -> Result<Option<Message>> {
        self.check()?;
        check_key(key)?;
        self.take_lock(lock)?;
        Ok(self.data.get(key))
    }

    pub fn remove_with_lock(&self, key: &str, lock: &Lock) -> Result<()> {
        self.check()?;
        check_key(key)?;
        self.take_lock(lock)?;
        self.data.remove(key);
        Ok(())
    }

    /// Live iterator: entries added later are visited too.
    pub fn create_iterator(&self) -> Result<MapIterator<'_>> {
        self.check()?;
        Ok(MapIterator::new(self, None))
    }

    /// Live iterator that requires `lock` to be held for every step.
    pub fn create_iterator_with_lock<'a>(&'a self, lock: &'a Lock) -> Result<MapIterator<'a>> {
        self.check()?;
        self.take_lock(lock)?;
        Ok(MapIterator::new(self, Some(lock)))
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map").field("name", &self.data.name()).finish()
    }
}

/// Cursor over a map.
///
/// ```ignore
/// let mut it = map.create_iterator()?;
/// while it.next()? {
///     println!("{} = {}", it.current_key()?, it.current_value()?);
/// }
/// ```
pub struct MapIterator<'a> {
    map: &'a Map,
    lock: Option<&'a Lock>,
    seq: u64,
    current: Option<(String, Message)>,
}

impl<'a> MapIterator<'a> {
    fn new(map: &'a Map, lock: Option<&'a Lock>) -> Self {
        Self {
            map,
            lock,
            seq: 0,
            current: None,
        }
    }

    /// Advance to the next entry. Returns false when none is left (for now:
    /// entries added later are picked up by later calls).
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<bool> {
        self.map.check()?;
        if let Some(lock) = self.lock {
            lock.verify_held()?;
        }
        match self.map.data.next_after(self.seq) {
            Some((seq, key, value)) => {
                self.seq = seq;
                self.current = Some((key, value));
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    pub fn current_key(&self) -> Result<&str> {
        self.current
            .as_ref()
            .map(|(k, _)| k.as_str())
            .ok_or_else(|| Error::NotFound("iterator has no current entry".into()))
    }

    pub fn current_value(&self) -> Result<&Message> {
        self.current
            .as_ref()
            .map(|(_, v)| v)
            .ok_or_else(|| Error::NotFound("iterator has no current entry".into()))
    }
}
