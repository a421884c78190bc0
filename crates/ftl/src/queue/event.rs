// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queued events and the inbound message wrapper handed to callbacks.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Closure, MessageCallback};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::queue::timer::TimerShared;

/// Pending explicit acknowledgement of one inbound message.
#[derive(Debug)]
pub(crate) struct AckToken {
    pending: Arc<AtomicUsize>,
}

impl AckToken {
    /// Count one more unacknowledged message against `pending`.
    pub(crate) fn issue(pending: &Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::AcqRel);
        Self {
            pending: Arc::clone(pending),
        }
    }

    /// Settle the token. Used both for acknowledgement and for discards.
    fn settle(self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Message delivered to a subscriber callback.
///
/// Dereferences to the (immutable) [`Message`]. The message is released when
/// the callback returns unless the subscriber was created with the
/// release-to-callback property, in which case [`InboundMessage::take`] moves
/// it out exactly once.
#[derive(Debug)]
pub struct InboundMessage {
    message: Message,
    taken: bool,
    release_allowed: bool,
    ack: Option<AckToken>,
}

impl InboundMessage {
    pub(crate) fn new(message: Message, release_allowed: bool, ack: Option<AckToken>) -> Self {
        Self {
            message,
            taken: false,
            release_allowed,
            ack,
        }
    }

    /// Take ownership of the message.
    ///
    /// Fails with `NotPermitted` unless the subscriber releases messages to
    /// callbacks, and with `IllegalState` on the second call.
    pub fn take(&mut self) -> Result<Message> {
        if !self.release_allowed {
            return Err(Error::NotPermitted(
                "subscriber does not release messages to callbacks".into(),
            ));
        }
        if self.taken {
            return Err(Error::IllegalState("message already taken".into()));
        }
        self.taken = true;
        Ok(std::mem::take(&mut self.message))
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }

    /// Acknowledge the message. No-op for subscribers without explicit ack,
    /// and after the first call.
    pub fn acknowledge(&mut self) {
        if let Some(token) = self.ack.take() {
            token.settle();
        }
    }

    pub fn needs_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Drop the message without it ever reaching a callback.
    pub(crate) fn discard(mut self) {
        if let Some(token) = self.ack.take() {
            token.settle();
        }
    }
}

impl Deref for InboundMessage {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

/// One entry of an event queue.
pub(crate) enum Event {
    Message {
        source: u64,
        callback: MessageCallback,
        closure: Option<Closure>,
        message: InboundMessage,
    },
    Timer {
        timer: Arc<TimerShared>,
    },
}

impl Event {
    pub(crate) fn source(&self) -> u64 {
        match self {
            Event::Message { source, .. } => *source,
            Event::Timer { timer } => timer.id,
        }
    }

    pub(crate) fn is_message(&self) -> bool {
        matches!(self, Event::Message { .. })
    }

    /// Same callback instance as `cb`.
    pub(crate) fn has_callback(&self, cb: &MessageCallback) -> bool {
        match self {
            Event::Message { callback, .. } => same_callback(callback, cb),
            Event::Timer { .. } => false,
        }
    }
}

/// Callback identity: the address of the shared closure, vtable ignored.
pub(crate) fn same_callback(a: &MessageCallback, b: &MessageCallback) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_requires_release() {
        let mut msg = Message::new();
        msg.set_long("n", 1).unwrap();

        let mut kept = InboundMessage::new(msg.frozen_copy(), false, None);
        assert!(matches!(kept.take(), Err(Error::NotPermitted(_))));
        assert_eq!(kept.get_long("n").unwrap(), 1);

        let mut released = InboundMessage::new(msg.frozen_copy(), true, None);
        let owned = released.take().unwrap();
        assert_eq!(owned.get_long("n").unwrap(), 1);
        assert!(released.is_taken());
        assert!(matches!(released.take(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_ack_settles_once() {
        let pending = Arc::new(AtomicUsize::new(0));
        let mut a = InboundMessage::new(Message::new(), false, Some(AckToken::issue(&pending)));
        let b = InboundMessage::new(Message::new(), false, Some(AckToken::issue(&pending)));
        assert_eq!(pending.load(Ordering::Acquire), 2);

        assert!(a.needs_ack());
        a.acknowledge();
        a.acknowledge();
        assert!(!a.needs_ack());
        assert_eq!(pending.load(Ordering::Acquire), 1);

        b.discard();
        assert_eq!(pending.load(Ordering::Acquire), 0);
    }
}
