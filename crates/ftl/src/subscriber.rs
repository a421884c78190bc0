// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscribers.
//!
//! A subscriber binds an endpoint (or an inbox) and an optional content
//! matcher. It receives nothing until attached to an event queue:
//!
//! ```text
//! Detached --add_subscriber--> Attached(queue)
//!    ^                              |
//!    |                       remove_subscriber
//!    |                              v
//!    +------ completion ------- Detaching
//!
//! any state --close--> Closed
//! ```
//!
//! Lock order is attachment state first, then queue state. Loss advisories
//! are published after both are released.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::{subscriber as props, ADVISORY_ENDPOINT};
use crate::error::{Error, Result};
use crate::matcher::ContentMatcher;
use crate::message::{Inbox, Message};
use crate::properties::Properties;
use crate::queue::{
    AckToken, Closure, CompletionCallback, EventQueue, InboundMessage, MessageCallback, QueueShared,
};
use crate::realm::server::Server;
use crate::realm::RealmInner;

enum Attachment {
    Detached,
    Attached {
        queue: Weak<QueueShared>,
        callback: MessageCallback,
        closure: Option<Closure>,
    },
    Detaching,
    Closed,
}

impl Attachment {
    fn label(&self) -> &'static str {
        match self {
            Attachment::Detached => "detached",
            Attachment::Attached { .. } => "attached",
            Attachment::Detaching => "detaching",
            Attachment::Closed => "closed",
        }
    }
}

pub(crate) struct SubscriberShared {
    id: u64,
    endpoint: Option<String>,
    inbox: Option<Inbox>,
    matcher: Option<ContentMatcher>,
    name: Option<String>,
    durable_name: Option<String>,
    key_field: Option<String>,
    explicit_ack: bool,
    release_to_callback: bool,
    realm_id: u64,
    realm: Weak<RealmInner>,
    server: Arc<Server>,
    pending_acks: Arc<AtomicUsize>,
    state: Mutex<Attachment>,
}

impl SubscriberShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub(crate) fn inbox(&self) -> Option<&Inbox> {
        self.inbox.as_ref()
    }

    pub(crate) fn realm_id(&self) -> u64 {
        self.realm_id
    }

    /// `ClientShutdown` once the owning realm is closed.
    fn ensure_realm(&self) -> Result<()> {
        match self.realm.upgrade() {
            Some(realm) => realm.ensure_open(),
            None => Err(Error::ClientShutdown),
        }
    }

    fn is_advisory(&self) -> bool {
        self.endpoint.as_deref() == Some(ADVISORY_ENDPOINT)
    }

    /// Queue copies of the matching messages on the attached queue.
    ///
    /// `point_to_point` deliveries (inbox sends) skip the matcher.
    pub(crate) fn deliver(&self, msgs: &[Message], point_to_point: bool) {
        let matched: Vec<&Message> = msgs
            .iter()
            .filter(|m| point_to_point || self.matcher.as_ref().map_or(true, |c| c.matches(m)))
            .collect();
        if matched.is_empty() {
            return;
        }

        let (queue, lost) = {
            let state = self.state.lock();
            let Attachment::Attached {
                queue,
                callback,
                closure,
            } = &*state
            else {
                return;
            };
            let Some(queue) = queue.upgrade() else {
                return;
            };
            let queue = EventQueue::from_shared(queue);
            let inbound = matched
                .into_iter()
                .map(|m| {
                    let ack = self
                        .explicit_ack
                        .then(|| AckToken::issue(&self.pending_acks));
                    InboundMessage::new(m.frozen_copy(), self.release_to_callback, ack)
                })
                .collect();
            let lost = queue.enqueue(self.id, callback, closure, inbound);
            (queue, lost)
        };

        if lost > 0 {
            if self.is_advisory() {
                log::warn!(
                    "[subscriber] {} dropped {} advisory message(s) on overflow",
                    self.id,
                    lost
                );
            } else {
                queue.report_loss(lost);
            }
        }
    }

    fn finish_detach(&self) {
        let mut state = self.state.lock();
        if matches!(*state, Attachment::Detaching) {
            *state = Attachment::Detached;
        }
    }

    /// Move to `Closed`, retiring the queue source if attached.
    fn shut(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), Attachment::Closed);
        if matches!(previous, Attachment::Closed) {
            return false;
        }
        if let Attachment::Attached { queue, .. } = previous {
            if let Some(queue) = queue.upgrade() {
                let ready = EventQueue::from_shared(queue).retire_source(self.id, None);
                ready.into_iter().for_each(|done| done());
            }
        }
        self.server.deregister_subscriber(self.id);
        log::debug!("[subscriber] {} closed", self.id);
        true
    }

    /// Realm shutdown path.
    pub(crate) fn close_from_realm(&self) {
        self.shut();
    }
}

/// Receives messages from an endpoint or an inbox once attached to a queue.
pub struct Subscriber {
    shared: Arc<SubscriberShared>,
}

impl Subscriber {
    pub(crate) fn create(
        realm: &Arc<RealmInner>,
        endpoint: Option<&str>,
        matcher: Option<&ContentMatcher>,
        props: &Properties,
    ) -> Result<Self> {
        let explicit_ack = props.bool_or(props::EXPLICIT_ACK, false)?;
        let release_to_callback = props.bool_or(props::RELEASE_TO_CALLBACK, false)?;
        let name = props.opt_string(props::NAME)?;
        let durable_name = props.opt_string(props::DURABLE_NAME)?;
        let key_field = props.opt_string(props::KEY_FIELD_NAME)?;

        let id = crate::runtime::next_handle_id();
        let server = Arc::clone(realm.server());
        let inbox = match endpoint {
            Some(_) => None,
            None => Some(Inbox::new(Arc::clone(server.url()), id)),
        };

        if let Some(durable) = &durable_name {
            log::debug!(
                "[subscriber] {} durable name '{}' recorded (no persistence)",
                id,
                durable
            );
        }

        let shared = Arc::new(SubscriberShared {
            id,
            endpoint: endpoint.map(str::to_string),
            inbox,
            matcher: matcher.cloned(),
            name,
            durable_name,
            key_field,
            explicit_ack,
            release_to_callback,
            realm_id: realm.id(),
            realm: Arc::downgrade(realm),
            server,
            pending_acks: Arc::new(AtomicUsize::new(0)),
            state: Mutex::new(Attachment::Detached),
        });
        shared.server.register_subscriber(&shared);
        realm.track_subscriber(&shared);

        log::debug!(
            "[subscriber] {} created on {}",
            id,
            match (&shared.endpoint, &shared.inbox) {
                (Some(ep), _) => format!("endpoint '{}'", ep),
                (None, Some(inbox)) => inbox.to_string(),
                (None, None) => "nothing".to_string(),
            }
        );
        Ok(Self { shared })
    }

    /// Subscriber on a fresh inbox of `realm`.
    pub fn create_on_inbox(realm: &crate::realm::Realm, props: Option<&Properties>) -> Result<Self> {
        realm.create_inbox_subscriber(props)
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Endpoint name; `None` for inbox subscribers.
    pub fn endpoint(&self) -> Option<&str> {
        self.shared.endpoint()
    }

    /// Inbox of an inbox subscriber.
    pub fn inbox(&self) -> Result<Inbox> {
        self.shared
            .inbox
            .clone()
            .ok_or_else(|| Error::IllegalState("not an inbox subscriber".into()))
    }

    pub fn matcher(&self) -> Option<&ContentMatcher> {
        self.shared.matcher.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    pub fn durable_name(&self) -> Option<&str> {
        self.shared.durable_name.as_deref()
    }

    pub fn key_field_name(&self) -> Option<&str> {
        self.shared.key_field.as_deref()
    }

    pub fn is_explicit_ack(&self) -> bool {
        self.shared.explicit_ack
    }

    /// Delivered messages not yet acknowledged.
    pub fn pending_acks(&self) -> usize {
        self.shared.pending_acks.load(Ordering::Acquire)
    }

    pub fn is_attached(&self) -> bool {
        matches!(*self.shared.state.lock(), Attachment::Attached { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.shared.state.lock(), Attachment::Closed)
    }

    pub(crate) fn attach(
        &self,
        queue: &EventQueue,
        callback: MessageCallback,
        closure: Option<Closure>,
    ) -> Result<()> {
        self.shared.ensure_realm()?;
        let mut state = self.shared.state.lock();
        match &*state {
            Attachment::Detached => {}
            Attachment::Attached { .. } => {
                return Err(Error::AlreadyExists(format!(
                    "subscriber {} is already attached to a queue",
                    self.shared.id
                )))
            }
            other => {
                return Err(Error::IllegalState(format!(
                    "subscriber {} is {}",
                    self.shared.id,
                    other.label()
                )))
            }
        }
        queue.register_source(self.shared.id)?;
        *state = Attachment::Attached {
            queue: queue.downgrade(),
            callback,
            closure,
        };
        log::debug!("[subscriber] {} attached to queue {}", self.shared.id, queue.id());
        Ok(())
    }

    pub(crate) fn detach(&self, queue: &EventQueue, done: Option<CompletionCallback>) -> Result<()> {
        self.shared.ensure_realm()?;
        let ready = {
            let mut state = self.shared.state.lock();
            match &*state {
                Attachment::Attached { queue: attached, .. } if queue.ptr_eq_shared(attached) => {}
                Attachment::Attached { .. } => {
                    return Err(Error::IllegalState(format!(
                        "subscriber {} is attached to another queue",
                        self.shared.id
                    )))
                }
                other => {
                    return Err(Error::IllegalState(format!(
                        "subscriber {} is {}",
                        self.shared.id,
                        other.label()
                    )))
                }
            }
            *state = Attachment::Detaching;

            let weak = Arc::downgrade(&self.shared);
            let finish: CompletionCallback = Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.finish_detach();
                }
                if let Some(done) = done {
                    done();
                }
            });
            queue.retire_source(self.shared.id, Some(finish))
        };
        log::debug!("[subscriber] {} detaching from queue {}", self.shared.id, queue.id());
        ready.into_iter().for_each(|done| done());
        Ok(())
    }

    /// Close the subscriber. Queued messages are still dispatched.
    pub fn close(&self) -> Result<()> {
        self.shared.ensure_realm()?;
        if self.shared.shut() {
            Ok(())
        } else {
            Err(Error::IllegalState("subscriber already closed".into()))
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shared.shut();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.shared.state.lock().label())
            .finish()
    }
}
