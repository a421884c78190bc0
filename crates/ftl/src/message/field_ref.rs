// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cached field references.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{FieldKey, Message};
use crate::error::{Error, Result};

const NO_HINT: usize = usize::MAX;

/// Field name plus a cached slot.
///
/// The slot learned from one message is tried first on the next; a miss
/// falls back to a name lookup and refreshes the cache. One `FieldRef` can be
/// shared between threads and used with messages of different formats.
pub struct FieldRef {
    name: Arc<str>,
    hint: AtomicUsize,
}

impl FieldRef {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArg("field name is empty".into()));
        }
        Ok(Self {
            name: Arc::from(name),
            hint: AtomicUsize::new(NO_HINT),
        })
    }

    pub(super) fn placeholder() -> Self {
        Self {
            name: Arc::from(""),
            hint: AtomicUsize::new(NO_HINT),
        }
    }

    /// Repoint at `name`/`slot` in place (used by message iteration).
    pub(super) fn retarget(&mut self, name: Arc<str>, slot: usize) {
        self.name = name;
        *self.hint.get_mut() = slot;
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FieldKey for FieldRef {
    fn field_name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, msg: &Message) -> Option<usize> {
        let hint = self.hint.load(Ordering::Relaxed);
        if msg.slot_name(hint).is_some_and(|n| *n == self.name) {
            return Some(hint);
        }
        let slot = msg.slot_by_name(&self.name)?;
        self.hint.store(slot, Ordering::Relaxed);
        Some(slot)
    }
}

impl Clone for FieldRef {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            hint: AtomicUsize::new(self.hint.load(Ordering::Relaxed)),
        }
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRef").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{FieldDef, FieldType, Format};

    #[test]
    fn test_ref_across_formats() {
        let fmt_a = Arc::new(
            Format::new(
                "a",
                vec![
                    FieldDef::new("x", FieldType::Long),
                    FieldDef::new("y", FieldType::Long),
                ],
            )
            .unwrap(),
        );
        let fmt_b = Arc::new(Format::new("b", vec![FieldDef::new("y", FieldType::Long)]).unwrap());

        let y = FieldRef::new("y").unwrap();
        let mut a = Message::with_format(fmt_a);
        let mut b = Message::with_format(fmt_b);
        a.set_long(&y, 1).unwrap();
        b.set_long(&y, 2).unwrap();

        assert_eq!(a.get_long(&y).unwrap(), 1);
        assert_eq!(b.get_long(&y).unwrap(), 2);
        assert_eq!(y.resolve(&a), Some(1));
        assert_eq!(y.resolve(&b), Some(0));
    }

    #[test]
    fn test_ref_shared_between_threads() {
        let r = Arc::new(FieldRef::new("n").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let r = Arc::clone(&r);
                std::thread::spawn(move || {
                    let mut m = Message::new();
                    m.set_long("pad", 0).unwrap();
                    m.set_long(&*r, i).unwrap();
                    m.get_long(&*r).unwrap()
                })
            })
            .collect();
        let mut got: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(FieldRef::new("").is_err());
    }
}
