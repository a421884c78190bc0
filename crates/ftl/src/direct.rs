// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Direct publish/subscribe.
//!
//! Direct endpoints skip messages and event queues: a publisher reserves a
//! raw buffer, fills it with `count` packed payloads, and sends it; direct
//! subscribers receive the buffer itself.
//!
//! ```ignore
//! let mut r = publisher.reserve(2, 64)?;
//! r.data_mut()[..5].copy_from_slice(b"hello");
//! r.data_mut()[5..10].copy_from_slice(b"world");
//! r.sizes_mut().copy_from_slice(&[5, 5]);
//! r.send_reserved()?;
//!
//! subscriber.dispatch(Timeout::Forever, |buf| {
//!     for payload in buf.messages() { /* ... */ }
//! })?;
//! ```
//!
//! A publisher has at most one outstanding reservation. Other threads that
//! call [`DirectPublisher::reserve`] block until it is sent, dropped, or the
//! publisher closes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::queue::Timeout;
use crate::realm::server::Server;
use crate::realm::RealmInner;

// ============================================================================
// Buffers
// ============================================================================

/// One sent reservation: packed payloads and their sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectBuffer {
    data: Vec<u8>,
    sizes: Vec<usize>,
}

impl DirectBuffer {
    /// Number of payloads.
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Payload slices in send order.
    pub fn messages(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut offset = 0;
        self.sizes.iter().map(move |&len| {
            let chunk = &self.data[offset..offset + len];
            offset += len;
            chunk
        })
    }
}

// ============================================================================
// Subscriber
// ============================================================================

#[derive(Default)]
struct Inbound {
    buffers: VecDeque<Arc<DirectBuffer>>,
    closed: bool,
}

pub(crate) struct DirectSubShared {
    id: u64,
    endpoint: String,
    /// Set on push; lets `has_data` skip the lock.
    data_ready: AtomicBool,
    inbound: Mutex<Inbound>,
    cond: Condvar,
}

impl DirectSubShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn push(&self, buffer: Arc<DirectBuffer>) {
        let mut inbound = self.inbound.lock();
        if inbound.closed {
            return;
        }
        inbound.buffers.push_back(buffer);
        self.data_ready.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    /// Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        let mut inbound = self.inbound.lock();
        if inbound.closed {
            return false;
        }
        inbound.closed = true;
        inbound.buffers.clear();
        self.data_ready.store(false, Ordering::Release);
        self.cond.notify_all();
        true
    }
}

/// Receives raw buffers sent by direct publishers on one endpoint.
pub struct DirectSubscriber {
    shared: Arc<DirectSubShared>,
    server: Arc<Server>,
}

impl DirectSubscriber {
    pub(crate) fn create(realm: &Arc<RealmInner>, endpoint: &str) -> Result<Self> {
        let shared = Arc::new(DirectSubShared {
            id: crate::runtime::next_handle_id(),
            endpoint: endpoint.to_string(),
            data_ready: AtomicBool::new(false),
            inbound: Mutex::new(Inbound::default()),
            cond: Condvar::new(),
        });
        let server = Arc::clone(realm.server());
        server.register_direct(&shared);
        realm.track_direct_sub(&shared);
        log::debug!("[direct] subscriber {} on '{}'", shared.id, endpoint);
        Ok(Self { shared, server })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// True when a buffer is waiting.
    pub fn has_data(&self) -> bool {
        self.shared.data_ready.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for data, then hand every available buffer to
    /// `callback` in arrival order. Returns the number of buffers handled.
    ///
    /// Closing the subscriber wakes a waiting call, which returns `Ok(0)`.
    pub fn dispatch<F>(&self, timeout: impl Into<Timeout>, mut callback: F) -> Result<usize>
    where
        F: FnMut(&DirectBuffer),
    {
        let drained: Vec<Arc<DirectBuffer>> = {
            let mut inbound = self.shared.inbound.lock();
            if inbound.closed {
                return Err(Error::IllegalState("direct subscriber is closed".into()));
            }
            if inbound.buffers.is_empty() {
                let deadline = match timeout.into() {
                    Timeout::NoWait => Some(Instant::now()),
                    Timeout::Forever => None,
                    Timeout::After(d) => Instant::now().checked_add(d),
                };
                while inbound.buffers.is_empty() && !inbound.closed {
                    match deadline {
                        None => self.shared.cond.wait(&mut inbound),
                        Some(deadline) => {
                            if self.shared.cond.wait_until(&mut inbound, deadline).timed_out() {
                                break;
                            }
                        }
                    }
                }
            }
            self.shared.data_ready.store(false, Ordering::Release);
            inbound.buffers.drain(..).collect()
        };

        for buffer in &drained {
            callback(buffer);
        }
        Ok(drained.len())
    }

    /// Close the subscriber. A second call is `IllegalState`.
    pub fn close(&self) -> Result<()> {
        if !self.shared.close() {
            return Err(Error::IllegalState("direct subscriber already closed".into()));
        }
        self.server.deregister_direct(self.shared.id);
        log::debug!("[direct] subscriber {} closed", self.shared.id);
        Ok(())
    }
}

impl Drop for DirectSubscriber {
    fn drop(&mut self) {
        self.shared.close();
        self.server.deregister_direct(self.shared.id);
    }
}

impl std::fmt::Debug for DirectSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSubscriber")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.endpoint)
            .finish()
    }
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Default)]
struct ReserveState {
    owner: Option<ThreadId>,
    closed: bool,
}

pub(crate) struct DirectPubShared {
    id: u64,
    state: Mutex<ReserveState>,
    cond: Condvar,
}

impl DirectPubShared {
    /// Returns false if already closed. Wakes every blocked `reserve`.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        self.cond.notify_all();
        true
    }

    fn release(&self) {
        self.state.lock().owner = None;
        self.cond.notify_all();
    }
}

/// Sends raw buffers to direct subscribers of one endpoint.
pub struct DirectPublisher {
    shared: Arc<DirectPubShared>,
    endpoint: String,
    realm: Arc<RealmInner>,
}

impl DirectPublisher {
    pub(crate) fn create(realm: Arc<RealmInner>, endpoint: &str) -> Result<Self> {
        let shared = Arc::new(DirectPubShared {
            id: crate::runtime::next_handle_id(),
            state: Mutex::new(ReserveState::default()),
            cond: Condvar::new(),
        });
        realm.track_direct_pub(&shared);
        log::debug!("[direct] publisher {} on '{}'", shared.id, endpoint);
        Ok(Self {
            shared,
            endpoint: endpoint.to_string(),
            realm,
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Reserve room for `count` payloads totalling at most `total_size` bytes.
    ///
    /// Blocks while another thread holds the reservation. A second reserve on
    /// the thread that already holds it is `IllegalState`, as is reserving on
    /// (or being woken by closing) a closed publisher.
    pub fn reserve(&self, count: usize, total_size: usize) -> Result<Reservation<'_>> {
        self.realm.ensure_open()?;
        if count == 0 {
            return Err(Error::InvalidArg("reserve needs at least one payload".into()));
        }
        let me = thread::current().id();
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(Error::IllegalState("direct publisher is closed".into()));
            }
            match state.owner {
                None => break,
                Some(owner) if owner == me => {
                    return Err(Error::IllegalState(
                        "a reservation is already outstanding on this thread".into(),
                    ))
                }
                Some(_) => self.shared.cond.wait(&mut state),
            }
        }
        state.owner = Some(me);
        drop(state);

        Ok(Reservation {
            publisher: self,
            data: vec![0; total_size],
            sizes: vec![0; count],
            done: false,
        })
    }

    /// Close the publisher, failing every blocked `reserve`.
    pub fn close(&self) -> Result<()> {
        if !self.shared.close() {
            return Err(Error::IllegalState("direct publisher already closed".into()));
        }
        log::debug!("[direct] publisher {} closed", self.shared.id);
        Ok(())
    }
}

impl Drop for DirectPublisher {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for DirectPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectPublisher")
            .field("id", &self.shared.id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Outstanding reservation. Dropping it unsent releases the publisher.
pub struct Reservation<'a> {
    publisher: &'a DirectPublisher,
    data: Vec<u8>,
    sizes: Vec<usize>,
    done: bool,
}

impl Reservation<'_> {
    /// Payload area, `total_size` bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Size of each payload, `count` entries.
    pub fn sizes_mut(&mut self) -> &mut [usize] {
        &mut self.sizes
    }

    /// Send the reserved buffer. Returns the number of subscribers reached.
    pub fn send_reserved(mut self) -> Result<usize> {
        let used = self
            .sizes
            .iter()
            .try_fold(0usize, |acc, &size| acc.checked_add(size))
            .ok_or_else(|| Error::InvalidArg("payload sizes overflow".into()))?;
        if used > self.data.len() {
            return Err(Error::InvalidArg(format!(
                "payload sizes add up to {} but {} bytes were reserved",
                used,
                self.data.len()
            )));
        }
        let publisher = self.publisher;
        publisher.realm.ensure_open()?;
        if publisher.shared.state.lock().closed {
            return Err(Error::IllegalState("direct publisher is closed".into()));
        }

        let mut data = std::mem::take(&mut self.data);
        data.truncate(used);
        let buffer = DirectBuffer {
            data,
            sizes: std::mem::take(&mut self.sizes),
        };
        self.done = true;
        publisher.shared.release();

        let reached = publisher
            .realm
            .server()
            .route_direct(&publisher.endpoint, buffer);
        Ok(reached)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.publisher.shared.release();
        }
    }
}
