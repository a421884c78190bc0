// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publishers.
//!
//! Sending bypasses event queues on the sending side: messages are routed
//! straight to the endpoint's subscribers and land on their queues before
//! `send` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::publisher as props;
use crate::error::{Error, Result};
use crate::message::{Inbox, Message};
use crate::properties::Properties;
use crate::realm::RealmInner;

/// Sends messages to one endpoint.
pub struct Publisher {
    id: u64,
    endpoint: String,
    release: bool,
    realm: Arc<RealmInner>,
    closed: AtomicBool,
}

impl Publisher {
    pub(crate) fn create(realm: Arc<RealmInner>, endpoint: &str, props: &Properties) -> Result<Self> {
        let release = props.bool_or(props::RELEASE, false)?;
        let id = crate::runtime::next_handle_id();
        log::debug!(
            "[publisher] {} created on '{}' (release={})",
            id,
            endpoint,
            release
        );
        Ok(Self {
            id,
            endpoint: endpoint.to_string(),
            release,
            realm,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True when created with the release property.
    pub fn releases_messages(&self) -> bool {
        self.release
    }

    fn check(&self) -> Result<()> {
        self.realm.ensure_open()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::IllegalState(format!(
                "publisher {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    /// Send a copy of `msg`; the caller keeps it.
    pub fn send(&self, msg: &Message) -> Result<()> {
        self.send_messages(std::slice::from_ref(msg))
    }

    /// Send `msg`, handing it over to the library.
    ///
    /// Only allowed when the publisher was created with the release property.
    pub fn send_owned(&self, msg: Message) -> Result<()> {
        if !self.release {
            return Err(Error::NotPermitted(
                "send_owned needs a publisher created with the release property".into(),
            ));
        }
        self.send_messages(std::slice::from_ref(&msg))
    }

    /// Send a batch; subscribers see the messages in slice order.
    pub fn send_messages(&self, msgs: &[Message]) -> Result<()> {
        self.check()?;
        if msgs.is_empty() {
            return Ok(());
        }
        let reached = self.realm.server().route(&self.endpoint, msgs);
        log::trace!(
            "[publisher] {} sent {} message(s) to {} subscriber(s)",
            self.id,
            msgs.len(),
            reached
        );
        Ok(())
    }

    /// Send `msg` to one inbox subscriber, ignoring content matchers.
    ///
    /// An unknown or closed inbox drops the message.
    pub fn send_to_inbox(&self, inbox: &Inbox, msg: &Message) -> Result<()> {
        self.check()?;
        let server = self.realm.server();
        if !server.route_to_inbox(inbox, std::slice::from_ref(msg)) {
            log::debug!(
                "[publisher] {} dropped message for unreachable {}",
                self.id,
                inbox
            );
        }
        Ok(())
    }

    /// Close the publisher. A second call is `IllegalState`.
    pub fn close(&self) -> Result<()> {
        self.realm.ensure_open()?;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::IllegalState("publisher already closed".into()));
        }
        log::debug!("[publisher] {} closed", self.id);
        Ok(())
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("release", &self.release)
            .finish()
    }
}
