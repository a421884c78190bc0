// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process realm servers.
//!
//! Realms that connect to the same server URL share one [`Server`]: its
//! endpoint routing table, inbox table and persistence store. Two realms on
//! one URL therefore behave like two client processes of one deployment.
//!
//! ```text
//! SERVERS (static)
//! +-- url -> Weak<Server>
//!
//! Server
//! +-- realms:      id -> Weak<RealmInner>
//! +-- subscribers: id -> Weak<SubscriberShared>   (endpoint routing)
//! +-- inboxes:     id -> Weak<SubscriberShared>   (point-to-point)
//! +-- direct:      id -> Weak<DirectSubShared>
//! +-- store:       locks + maps
//! ```
//!
//! Routing snapshots the matching subscribers before delivering, so no table
//! lock is held while queues are locked.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::RealmInner;
use crate::config::ADVISORY_ENDPOINT;
use crate::direct::{DirectBuffer, DirectSubShared};
use crate::message::{Inbox, Message};
use crate::store::Store;
use crate::subscriber::SubscriberShared;

type Registry = Mutex<HashMap<String, Weak<Server>>>;

static SERVERS: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    SERVERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Forget every server. Live realms keep theirs; new connects start fresh.
pub(crate) fn clear_registry() {
    if let Some(servers) = SERVERS.get() {
        let mut servers = servers.lock();
        log::debug!("[server] clearing {} registry entries", servers.len());
        servers.clear();
    }
}

pub(crate) struct Server {
    url: Arc<str>,
    realms: DashMap<u64, Weak<RealmInner>>,
    subscribers: DashMap<u64, Weak<SubscriberShared>>,
    inboxes: DashMap<u64, Weak<SubscriberShared>>,
    direct: DashMap<u64, Weak<DirectSubShared>>,
    store: Store,
}

impl Server {
    /// Server for `url`, created on first use.
    pub(crate) fn obtain(url: &str) -> Arc<Server> {
        let mut servers = registry().lock();
        if let Some(server) = servers.get(url).and_then(Weak::upgrade) {
            return server;
        }
        let server = Arc::new(Server {
            url: Arc::from(url),
            realms: DashMap::new(),
            subscribers: DashMap::new(),
            inboxes: DashMap::new(),
            direct: DashMap::new(),
            store: Store::default(),
        });
        servers.insert(url.to_string(), Arc::downgrade(&server));
        log::debug!("[server] {} started", url);
        server
    }

    pub(crate) fn url(&self) -> &Arc<str> {
        &self.url
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    // ========================================================================
    // Membership
    // ========================================================================

    pub(crate) fn register_realm(&self, id: u64, realm: Weak<RealmInner>) {
        self.realms.insert(id, realm);
    }

    pub(crate) fn deregister_realm(&self, id: u64) {
        self.realms.remove(&id);
    }

    pub(crate) fn realm(&self, id: u64) -> Option<Arc<RealmInner>> {
        self.realms.get(&id).and_then(|r| r.upgrade())
    }

    pub(crate) fn register_subscriber(&self, sub: &Arc<SubscriberShared>) {
        let weak = Arc::downgrade(sub);
        if sub.inbox().is_some() {
            self.inboxes.insert(sub.id(), weak);
        } else {
            self.subscribers.insert(sub.id(), weak);
        }
    }

    pub(crate) fn deregister_subscriber(&self, id: u64) {
        self.subscribers.remove(&id);
        self.inboxes.remove(&id);
    }

    pub(crate) fn register_direct(&self, sub: &Arc<DirectSubShared>) {
        self.direct.insert(sub.id(), Arc::downgrade(sub));
    }

    pub(crate) fn deregister_direct(&self, id: u64) {
        self.direct.remove(&id);
    }

    // ========================================================================
    // Routing
    // ========================================================================

    fn endpoint_subscribers(&self, endpoint: &str, realm: Option<u64>) -> Vec<Arc<SubscriberShared>> {
        self.subscribers
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .filter(|sub| sub.endpoint() == Some(endpoint))
            .filter(|sub| realm.map_or(true, |id| sub.realm_id() == id))
            .collect()
    }

    /// Deliver `msgs` to every subscriber of `endpoint`, in order.
    pub(crate) fn route(&self, endpoint: &str, msgs: &[Message]) -> usize {
        let targets = self.endpoint_subscribers(endpoint, None);
        for sub in &targets {
            sub.deliver(msgs, false);
        }
        targets.len()
    }

    /// Deliver advisories to the advisory subscribers of one realm.
    pub(crate) fn route_advisory(&self, realm: u64, msgs: &[Message]) -> usize {
        let targets = self.endpoint_subscribers(ADVISORY_ENDPOINT, Some(realm));
        for sub in &targets {
            sub.deliver(msgs, false);
        }
        targets.len()
    }

    /// Deliver to one inbox, bypassing content matchers. Returns false when
    /// the inbox is unknown or closed.
    pub(crate) fn route_to_inbox(&self, inbox: &Inbox, msgs: &[Message]) -> bool {
        if inbox.server() != &*self.url {
            return false;
        }
        let target = self.inboxes.get(&inbox.id()).and_then(|w| w.upgrade());
        match target {
            Some(sub) => {
                sub.deliver(msgs, true);
                true
            }
            None => false,
        }
    }

    pub(crate) fn route_direct(&self, endpoint: &str, buffer: DirectBuffer) -> usize {
        let targets: Vec<Arc<DirectSubShared>> = self
            .direct
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .filter(|sub| sub.endpoint() == endpoint)
            .collect();
        let buffer = Arc::new(buffer);
        for sub in &targets {
            sub.push(Arc::clone(&buffer));
        }
        targets.len()
    }
}
