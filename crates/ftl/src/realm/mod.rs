// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Realm connections.
//!
//! A [`Realm`] is the application's connection to a realm server and the
//! factory for everything else: messages, matchers, queues, publishers,
//! subscribers, locks and maps.
//!
//! ```no_run
//! use ftl::Realm;
//!
//! ftl::open(ftl::COMPATIBILITY_VERSION)?;
//! let realm = Realm::connect("inproc://demo", "quotes-app", None)?;
//! let publisher = realm.create_publisher("quotes", None)?;
//!
//! let mut msg = realm.create_message(None)?;
//! msg.set_string("symbol", "ACME")?;
//! publisher.send(&msg)?;
//! realm.close()?;
//! # Ok::<(), ftl::Error>(())
//! ```
//!
//! Closing a realm returns every lock it holds, closes the subscribers and
//! direct endpoints created from it, and makes later calls on its publishers,
//! locks and maps fail with `ClientShutdown`.

pub(crate) mod server;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::{realm as props, RealmConfig, ADVISORY_ENDPOINT, MONITORING_ENDPOINT};
use crate::direct::{DirectPubShared, DirectPublisher, DirectSubShared, DirectSubscriber};
use crate::error::{Error, Result};
use crate::matcher::ContentMatcher;
use crate::message::{Format, Message};
use crate::properties::Properties;
use crate::publisher::Publisher;
use crate::queue::EventQueue;
use crate::store::{Lock, Map};
use crate::subscriber::{Subscriber, SubscriberShared};
use server::Server;

/// Handles closed together with their realm.
#[derive(Default)]
struct Owned {
    subscribers: Vec<Weak<SubscriberShared>>,
    direct_subs: Vec<Weak<DirectSubShared>>,
    direct_pubs: Vec<Weak<DirectPubShared>>,
}

impl Owned {
    fn prune(&mut self) {
        self.subscribers.retain(|w| w.strong_count() > 0);
        self.direct_subs.retain(|w| w.strong_count() > 0);
        self.direct_pubs.retain(|w| w.strong_count() > 0);
    }
}

pub(crate) struct RealmInner {
    id: u64,
    server: Arc<Server>,
    app_name: String,
    props: Properties,
    config: RealmConfig,
    formats: HashMap<String, Arc<Format>>,
    closed: AtomicBool,
    owned: Mutex<Owned>,
}

impl RealmInner {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ClientShutdown);
        }
        Ok(())
    }

    pub(crate) fn format(&self, name: &str) -> Option<Arc<Format>> {
        Format::builtin_by_name(name).or_else(|| self.formats.get(name).cloned())
    }

    /// Check an endpoint name. `reserved_ok` admits the advisory and
    /// monitoring endpoints, which only subscribers may use.
    pub(crate) fn check_endpoint(&self, endpoint: &str, reserved_ok: bool) -> Result<()> {
        if endpoint.is_empty() {
            return Err(Error::InvalidArg("endpoint name is empty".into()));
        }
        if endpoint == ADVISORY_ENDPOINT || endpoint == MONITORING_ENDPOINT {
            if reserved_ok {
                return Ok(());
            }
            return Err(Error::NotPermitted(format!(
                "endpoint '{}' is reserved",
                endpoint
            )));
        }
        if !self.config.allows_endpoint(endpoint) {
            return Err(Error::InvalidArg(format!(
                "endpoint '{}' is not configured",
                endpoint
            )));
        }
        Ok(())
    }

    pub(crate) fn track_subscriber(&self, sub: &Arc<SubscriberShared>) {
        let mut owned = self.owned.lock();
        owned.prune();
        owned.subscribers.push(Arc::downgrade(sub));
    }

    pub(crate) fn track_direct_sub(&self, sub: &Arc<DirectSubShared>) {
        let mut owned = self.owned.lock();
        owned.prune();
        owned.direct_subs.push(Arc::downgrade(sub));
    }

    pub(crate) fn track_direct_pub(&self, publisher: &Arc<DirectPubShared>) {
        let mut owned = self.owned.lock();
        owned.prune();
        owned.direct_pubs.push(Arc::downgrade(publisher));
    }

    /// Deliver an advisory to this realm's advisory subscribers.
    pub(crate) fn publish_advisory(&self, msg: Message) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let delivered = self.server.route_advisory(self.id, std::slice::from_ref(&msg));
        log::debug!(
            "[realm] {} advisory {} to {} subscriber(s)",
            self.id,
            msg.get_string(crate::advisory::FIELD_NAME).unwrap_or("?"),
            delivered
        );
    }

    fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let released = self.server.store().release_all(self.id);
        if !released.is_empty() {
            log::debug!("[realm] {} returned locks {:?}", self.id, released);
        }

        let owned = std::mem::take(&mut *self.owned.lock());
        for sub in owned.subscribers.iter().filter_map(Weak::upgrade) {
            sub.close_from_realm();
        }
        for sub in owned.direct_subs.iter().filter_map(Weak::upgrade) {
            sub.close();
        }
        for publisher in owned.direct_pubs.iter().filter_map(Weak::upgrade) {
            publisher.close();
        }

        self.server.deregister_realm(self.id);
        log::info!(
            "[realm] {} ({}) disconnected from {}",
            self.id,
            self.app_name,
            self.server.url()
        );
        true
    }
}

/// Connection to a realm server.
pub struct Realm {
    inner: Arc<RealmInner>,
}

fn validate_connect_props(p: &Properties) -> Result<()> {
    for name in [
        props::USERNAME,
        props::USERPASSWORD,
        props::SECONDARY_SERVER,
        props::APPINSTANCE_IDENTIFIER,
        props::CLIENT_LABEL,
    ] {
        p.opt_string(name)?;
    }
    if !p.exists(props::TRUST_TYPE) {
        return Ok(());
    }
    match p.get_int(props::TRUST_TYPE)? {
        props::TRUST_EVERYONE => Ok(()),
        props::TRUST_FILE_KIND => p
            .opt_string(props::TRUST_FILE)?
            .map(|_| ())
            .ok_or_else(|| Error::InvalidArg("trust type file needs a trust file".into())),
        props::TRUST_PEM_STRING_KIND => p
            .opt_string(props::TRUST_PEM_STRING)?
            .map(|_| ())
            .ok_or_else(|| Error::InvalidArg("trust type pem needs a PEM string".into())),
        other => Err(Error::InvalidArg(format!("unknown trust type {}", other))),
    }
}

impl Realm {
    /// Connect to the realm server at `server_url`.
    ///
    /// Requires an open runtime ([`crate::open`]).
    pub fn connect(server_url: &str, app_name: &str, props: Option<&Properties>) -> Result<Self> {
        Self::connect_with_config(server_url, app_name, props, RealmConfig::default())
    }

    /// Connect with a realm configuration (formats, endpoints, queue profiles).
    pub fn connect_with_config(
        server_url: &str,
        app_name: &str,
        props: Option<&Properties>,
        config: RealmConfig,
    ) -> Result<Self> {
        if !crate::runtime::is_open() {
            return Err(Error::NotInitialized);
        }
        if server_url.is_empty() {
            return Err(Error::InvalidArg("server url is empty".into()));
        }
        let props = props.cloned().unwrap_or_default();
        validate_connect_props(&props)?;
        config.validate()?;
        let formats = config.build_formats()?;

        let server = Server::obtain(server_url);
        let inner = Arc::new(RealmInner {
            id: crate::runtime::next_handle_id(),
            server,
            app_name: app_name.to_string(),
            props,
            config,
            formats,
            closed: AtomicBool::new(false),
            owned: Mutex::new(Owned::default()),
        });
        inner.server.register_realm(inner.id, Arc::downgrade(&inner));
        log::info!(
            "[realm] {} ({}) connected to {}",
            inner.id,
            app_name,
            server_url
        );
        Ok(Self { inner })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn server_url(&self) -> &str {
        self.inner.server.url()
    }

    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    /// Copy of the connect properties.
    pub fn properties(&self) -> Properties {
        self.inner.props.clone()
    }

    pub fn config(&self) -> &RealmConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Look up a built-in or configured format.
    pub fn format(&self, name: &str) -> Result<Arc<Format>> {
        self.inner
            .format(name)
            .ok_or_else(|| Error::FormatUnavailable(name.to_string()))
    }

    // ========================================================================
    // Messages and matchers
    // ========================================================================

    /// New mutable message; `None` gives an unnamed dynamic format.
    pub fn create_message(&self, format: Option<&str>) -> Result<Message> {
        self.inner.ensure_open()?;
        match format {
            None => Ok(Message::new()),
            Some(name) => Ok(Message::with_format(self.format(name)?)),
        }
    }

    /// Decode a message, resolving configured format names.
    pub fn create_message_from_bytes(&self, bytes: &[u8]) -> Result<Message> {
        self.inner.ensure_open()?;
        let inner = &self.inner;
        Message::read_from_byte_array_with(bytes, &|name| inner.format(name))
    }

    pub fn create_content_matcher(&self, match_string: &str) -> Result<ContentMatcher> {
        self.inner.ensure_open()?;
        ContentMatcher::new(match_string)
    }

    // ========================================================================
    // Queues
    // ========================================================================

    pub fn create_queue(&self, props: Option<&Properties>) -> Result<EventQueue> {
        self.inner.ensure_open()?;
        let props = props.cloned().unwrap_or_default();
        EventQueue::create(Arc::downgrade(&self.inner), &props)
    }

    /// Create a queue from a named profile of the realm configuration.
    pub fn create_queue_from_profile(&self, profile: &str) -> Result<EventQueue> {
        self.inner.ensure_open()?;
        let settings = self
            .inner
            .config
            .queues
            .get(profile)
            .ok_or_else(|| Error::NotFound(format!("queue profile '{}'", profile)))?;
        let props = settings.to_properties(profile)?;
        EventQueue::create(Arc::downgrade(&self.inner), &props)
    }

    // ========================================================================
    // Publishers and subscribers
    // ========================================================================

    pub fn create_publisher(&self, endpoint: &str, props: Option<&Properties>) -> Result<Publisher> {
        self.inner.ensure_open()?;
        self.inner.check_endpoint(endpoint, false)?;
        let props = props.cloned().unwrap_or_default();
        Publisher::create(Arc::clone(&self.inner), endpoint, &props)
    }

    /// Subscribe to `endpoint`, optionally filtered by `matcher` (copied).
    pub fn create_subscriber(
        &self,
        endpoint: &str,
        matcher: Option<&ContentMatcher>,
        props: Option<&Properties>,
    ) -> Result<Subscriber> {
        self.inner.ensure_open()?;
        self.inner.check_endpoint(endpoint, true)?;
        let props = props.cloned().unwrap_or_default();
        Subscriber::create(&self.inner, Some(endpoint), matcher, &props)
    }

    /// Subscriber on a fresh inbox. Inbox deliveries bypass matchers.
    pub fn create_inbox_subscriber(&self, props: Option<&Properties>) -> Result<Subscriber> {
        self.inner.ensure_open()?;
        let props = props.cloned().unwrap_or_default();
        Subscriber::create(&self.inner, None, None, &props)
    }

    pub fn create_direct_publisher(
        &self,
        endpoint: &str,
        _props: Option<&Properties>,
    ) -> Result<DirectPublisher> {
        self.inner.ensure_open()?;
        self.inner.check_endpoint(endpoint, false)?;
        DirectPublisher::create(Arc::clone(&self.inner), endpoint)
    }

    pub fn create_direct_subscriber(
        &self,
        endpoint: &str,
        _props: Option<&Properties>,
    ) -> Result<DirectSubscriber> {
        self.inner.ensure_open()?;
        self.inner.check_endpoint(endpoint, false)?;
        DirectSubscriber::create(&self.inner, endpoint)
    }

    // ========================================================================
    // Persistence store
    // ========================================================================

    pub fn create_lock(&self, name: &str, _props: Option<&Properties>) -> Result<Lock> {
        Lock::new(Arc::clone(&self.inner), name)
    }

    pub fn create_map(&self, name: &str, _props: Option<&Properties>) -> Result<Map> {
        Map::open(Arc::clone(&self.inner), name)
    }

    /// Delete a map and its contents. Handles open on it start failing.
    pub fn remove_map(&self, name: &str) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.server.store().remove_map(name)?;
        log::debug!("[realm] {} removed map '{}'", self.inner.id, name);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Disconnect. A second call is `IllegalState`.
    pub fn close(&self) -> Result<()> {
        if self.inner.shutdown() {
            Ok(())
        } else {
            Err(Error::IllegalState("realm already closed".into()))
        }
    }
}

impl Drop for Realm {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.inner.id)
            .field("server", &self.inner.server.url())
            .field("app_name", &self.inner.app_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() {
        crate::open(crate::COMPATIBILITY_VERSION).unwrap();
    }

    #[test]
    fn test_trust_properties() {
        let mut p = Properties::new();
        assert!(validate_connect_props(&p).is_ok());
        p.set_int(props::TRUST_TYPE, props::TRUST_FILE_KIND);
        assert!(matches!(validate_connect_props(&p), Err(Error::InvalidArg(_))));
        p.set_string(props::TRUST_FILE, "/etc/ftl/ca.pem".into());
        assert!(validate_connect_props(&p).is_ok());
        p.set_int(props::TRUST_TYPE, props::TRUST_PEM_STRING_KIND);
        assert!(validate_connect_props(&p).is_err());
        p.set_int(props::TRUST_TYPE, 7);
        assert!(validate_connect_props(&p).is_err());
        p.set_int(props::TRUST_TYPE, props::TRUST_EVERYONE);
        p.set_long(props::USERNAME, 3);
        assert!(matches!(validate_connect_props(&p), Err(Error::InvalidType(_))));
    }

    #[test]
    fn test_reserved_endpoints() {
        runtime();
        let realm = Realm::connect("inproc://realm-reserved", "t", None).unwrap();
        assert!(matches!(
            realm.create_publisher(ADVISORY_ENDPOINT, None),
            Err(Error::NotPermitted(_))
        ));
        assert!(matches!(realm.create_publisher("", None), Err(Error::InvalidArg(_))));
        assert!(realm.create_subscriber(ADVISORY_ENDPOINT, None, None).is_ok());
        assert!(realm.create_subscriber(MONITORING_ENDPOINT, None, None).is_ok());
    }

    #[test]
    fn test_configured_endpoints_and_formats() {
        runtime();
        let config = RealmConfig {
            endpoints: vec!["orders".into()],
            ..RealmConfig::default()
        };
        let realm = Realm::connect_with_config("inproc://realm-config", "t", None, config).unwrap();
        assert!(realm.create_publisher("orders", None).is_ok());
        assert!(matches!(
            realm.create_publisher("quotes", None),
            Err(Error::InvalidArg(_))
        ));
        assert!(matches!(
            realm.create_message(Some("nope")),
            Err(Error::FormatUnavailable(_))
        ));
        assert!(realm.create_message(Some(crate::config::KEYED_OPAQUE_FORMAT)).is_ok());
        assert!(matches!(
            realm.create_queue_from_profile("missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_close_shuts_everything() {
        runtime();
        let realm = Realm::connect("inproc://realm-close", "t", None).unwrap();
        let publisher = realm.create_publisher("ep", None).unwrap();
        let sub = realm.create_subscriber("ep", None, None).unwrap();
        realm.close().unwrap();
        assert!(realm.is_closed());
        assert!(sub.is_closed());
        assert!(matches!(publisher.send(&Message::new()), Err(Error::ClientShutdown)));
        assert!(matches!(realm.create_queue(None), Err(Error::ClientShutdown)));
        assert!(matches!(realm.close(), Err(Error::IllegalState(_))));
    }
}
