// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field iteration.

use std::sync::Arc;

use super::{FieldRef, Message};
use crate::error::{Error, Result};

/// Cursor over the set fields of a message, in format order.
///
/// [`next_ref`](Self::next_ref) hands out a reference to a `FieldRef` owned by
/// the iterator; it is repointed by the following call, so the borrow ends
/// there.
pub struct MessageIterator<'m> {
    msg: &'m Message,
    pos: usize,
    current: FieldRef,
}

impl<'m> MessageIterator<'m> {
    pub(super) fn new(msg: &'m Message) -> Self {
        Self {
            msg,
            pos: 0,
            current: FieldRef::placeholder(),
        }
    }

    fn next_set_slot(&self) -> Option<usize> {
        (self.pos..self.msg.slot_count()).find(|&slot| self.msg.slot_is_set(slot))
    }

    pub fn has_next(&self) -> bool {
        self.next_set_slot().is_some()
    }

    /// Advance to the next set field. Fails with `NotFound` once exhausted.
    pub fn next_ref(&mut self) -> Result<&FieldRef> {
        let slot = self
            .next_set_slot()
            .ok_or_else(|| Error::NotFound("no more fields".into()))?;
        let name = self
            .msg
            .slot_name(slot)
            .map(Arc::clone)
            .ok_or_else(|| Error::NotFound("no more fields".into()))?;
        self.current.retarget(name, slot);
        self.pos = slot + 1;
        Ok(&self.current)
    }

    /// Restart from the first field.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    pub fn message(&self) -> &'m Message {
        self.msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FieldType;

    #[test]
    fn test_iterates_set_fields_in_order() {
        let mut msg = Message::new();
        msg.set_long("a", 1).unwrap();
        msg.set_string("b", "x").unwrap();
        msg.set_double("c", 2.0).unwrap();
        msg.clear_field("b").unwrap();

        let mut it = msg.iter();
        let mut names = Vec::new();
        while it.has_next() {
            let r = it.next_ref().unwrap();
            names.push(r.name().to_string());
            assert_ne!(msg.field_type(r).unwrap(), FieldType::Unknown);
        }
        assert_eq!(names, vec!["a", "c"]);
        assert!(matches!(it.next_ref(), Err(Error::NotFound(_))));

        it.reset();
        assert_eq!(it.next_ref().unwrap().name(), "a");
    }

    #[test]
    fn test_empty_message() {
        let msg = Message::new();
        let mut it = msg.iter();
        assert!(!it.has_next());
        assert!(it.next_ref().is_err());
    }
}
