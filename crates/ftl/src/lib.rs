// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # FTL - in-process message-oriented middleware client core
//!
//! Realms, publishers, subscribers, content matchers and event queues, with
//! discard policies, timers, completion-callback lifecycles, advisories, a
//! cooperative lock/map store and a direct (raw buffer) fast path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ftl::{message_callback, ContentMatcher, Realm, Timeout};
//!
//! fn main() -> ftl::Result<()> {
//!     ftl::open(ftl::COMPATIBILITY_VERSION)?;
//!     let realm = Realm::connect("inproc://quotes", "quote-reader", None)?;
//!
//!     let queue = realm.create_queue(None)?;
//!     let matcher = ContentMatcher::new(r#"{"symbol":"ACME"}"#)?;
//!     let sub = realm.create_subscriber("quotes", Some(&matcher), None)?;
//!     queue.add_subscriber(
//!         &sub,
//!         message_callback(|_status, _queue, msgs, _closures| {
//!             for m in msgs.iter() {
//!                 println!("{}", **m);
//!             }
//!         }),
//!         None,
//!     )?;
//!
//!     let publisher = realm.create_publisher("quotes", None)?;
//!     let mut msg = realm.create_message(None)?;
//!     msg.set_string("symbol", "ACME")?;
//!     msg.set_double("bid", 10.5)?;
//!     publisher.send(&msg)?;
//!
//!     queue.dispatch(Timeout::NoWait)?;
//!     realm.close()?;
//!     ftl::close()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Application threads                         |
//! |      Publisher::send             EventQueue::dispatch -> callbacks  |
//! +------------|----------------------------------^---------------------+
//! |            v             Realm                |                     |
//! |   Server (per URL): endpoint routing -> Subscriber -> EventQueue    |
//! |                     inbox routing            (matcher)  (discard)   |
//! |                     direct routing -> DirectSubscriber              |
//! |                     Store: locks, maps                              |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Realm`] | Connection to a realm server, factory for everything else |
//! | [`Message`] | Typed field container |
//! | [`ContentMatcher`] | Predicate over field presence, absence and equality |
//! | [`Publisher`] | Sends messages to an endpoint or an inbox |
//! | [`Subscriber`] | Receives an endpoint's (or inbox's) messages once attached |
//! | [`EventQueue`] | FIFO of message and timer events, drained by `dispatch` |
//! | [`Lock`], [`Map`] | Cooperative locks and key/value maps |
//! | [`DirectPublisher`], [`DirectSubscriber`] | Raw buffer fast path |
//!
//! ## Error handling
//!
//! Every fallible call returns [`Result`]. Callbacks receive a [`Status`]
//! carrier instead; what they leave in it is logged, never propagated.

/// Advisory message names, fields and builders.
pub mod advisory;
/// Constants, property names and the realm configuration loader.
pub mod config;
/// Direct (raw buffer) publish/subscribe.
pub mod direct;
/// Error codes, `Error` and the `Status` carrier.
pub mod error;
/// Log levels and built-in log sinks.
pub mod logging;
/// Content matchers.
pub mod matcher;
/// Messages, formats, field references and the byte codec.
pub mod message;
/// Typed property bags.
pub mod properties;
pub mod publisher;
/// Event queues, timers and dispatch.
pub mod queue;
/// Realm connections.
pub mod realm;
mod runtime;
/// In-process persistence store (locks, maps).
pub mod store;
pub mod subscriber;

pub use config::{RealmConfig, COMPATIBILITY_VERSION, TIMEOUT_NO_WAIT, TIMEOUT_WAIT_FOREVER};
pub use direct::{DirectBuffer, DirectPublisher, DirectSubscriber, Reservation};
pub use error::{Error, ErrorCode, Result, Status};
pub use logging::{set_log_callback, set_log_level, LogLevel};
pub use matcher::ContentMatcher;
pub use message::{
    DateTime, FieldDef, FieldKey, FieldRef, FieldType, FieldValue, Format, Inbox, Message,
    MessageIterator,
};
pub use properties::{Properties, PropertyValue};
pub use publisher::Publisher;
pub use queue::{
    completion, message_callback, timer_callback, Closure, CompletionCallback, DiscardPolicy,
    EventQueue, InboundMessage, MessageCallback, Timeout, Timer, TimerCallback,
};
pub use realm::Realm;
pub use runtime::{close, is_open, open, version, VERSION};
pub use store::{Lock, Map, MapIterator};
pub use subscriber::Subscriber;
