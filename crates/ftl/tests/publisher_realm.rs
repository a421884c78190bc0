// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime, realm configuration and publisher behaviour.

use std::sync::Arc;

use ftl::config::{publisher as pprops, queue as qprops};
use ftl::{
    message_callback, Error, Message, Properties, Realm, RealmConfig, Timeout,
};
use parking_lot::Mutex;

const CONFIG: &str = r#"
formats:
  quote:
    - { name: symbol, type: string }
    - { name: bid, type: double }
endpoints: [quotes]
queues:
  small:
    discard_policy: new
    max_events: 2
"#;

fn open() {
    ftl::open(ftl::COMPATIBILITY_VERSION).expect("open runtime");
}

fn connect(url: &str) -> Realm {
    open();
    Realm::connect(url, "publisher-realm", None).expect("connect")
}

fn configured(url: &str) -> Realm {
    open();
    let config = RealmConfig::from_yaml_str(CONFIG).expect("config");
    Realm::connect_with_config(url, "publisher-realm", None, config).expect("connect")
}

#[test]
fn test_open_checks_compatibility_version() {
    assert!(matches!(
        ftl::open(ftl::COMPATIBILITY_VERSION + 1),
        Err(Error::VersionMismatch { .. })
    ));
    open();
    assert!(ftl::is_open());
    assert!(!ftl::version().is_empty());
}

#[test]
fn test_connect_rejects_bad_arguments() {
    open();
    assert!(matches!(
        Realm::connect("", "app", None),
        Err(Error::InvalidArg(_))
    ));
    let mut p = Properties::new();
    p.set_int(ftl::config::realm::TRUST_TYPE, ftl::config::realm::TRUST_FILE_KIND);
    assert!(matches!(
        Realm::connect("inproc://connect-args", "app", Some(&p)),
        Err(Error::InvalidArg(_))
    ));
}

#[test]
fn test_send_reaches_every_subscriber_on_endpoint() {
    let realm = connect("inproc://fanout");
    let queue = realm.create_queue(None).expect("queue");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut subs = Vec::new();
    for tag in ["a", "b"] {
        let sink = Arc::clone(&seen);
        let sub = realm.create_subscriber("news", None, None).expect("sub");
        queue
            .add_subscriber(
                &sub,
                message_callback(move |_, _, msgs, _| {
                    for m in msgs.iter() {
                        let n = m.get_long("n").expect("n");
                        sink.lock().push((tag, n));
                    }
                }),
                None,
            )
            .expect("attach");
        subs.push(sub);
    }
    let _elsewhere = realm.create_subscriber("sports", None, None).expect("sub");

    let publisher = realm.create_publisher("news", None).expect("pub");
    let mut msg = Message::new();
    msg.set_long("n", 1).expect("n");
    publisher.send(&msg).expect("send");
    msg.set_long("n", 2).expect("caller keeps message");
    publisher.send(&msg).expect("send");

    while queue.count().expect("count") > 0 {
        queue.dispatch(Timeout::NoWait).expect("dispatch");
    }
    let mut got = seen.lock().clone();
    got.sort();
    assert_eq!(got, vec![("a", 1), ("a", 2), ("b", 1), ("b", 2)]);
}

#[test]
fn test_send_owned_requires_release_property() {
    let realm = connect("inproc://release");
    let plain = realm.create_publisher("ep", None).expect("pub");
    assert!(!plain.releases_messages());
    assert!(matches!(
        plain.send_owned(Message::new()),
        Err(Error::NotPermitted(_))
    ));

    let mut p = Properties::new();
    p.set_bool(pprops::RELEASE, true);
    let releasing = realm.create_publisher("ep", Some(&p)).expect("pub");
    assert!(releasing.releases_messages());
    releasing.send_owned(Message::new()).expect("send owned");
}

#[test]
fn test_closed_publisher_and_realm() {
    let realm = connect("inproc://closed-pub");
    let publisher = realm.create_publisher("ep", None).expect("pub");
    publisher.close().expect("close");
    assert!(matches!(
        publisher.send(&Message::new()),
        Err(Error::IllegalState(_))
    ));
    assert!(matches!(publisher.close(), Err(Error::IllegalState(_))));

    let other = realm.create_publisher("ep", None).expect("pub");
    realm.close().expect("close realm");
    assert!(realm.is_closed());
    assert!(matches!(other.send(&Message::new()), Err(Error::ClientShutdown)));
    assert!(matches!(
        realm.create_publisher("ep", None),
        Err(Error::ClientShutdown)
    ));
    assert!(matches!(realm.close(), Err(Error::IllegalState(_))));
}

#[test]
fn test_reserved_endpoint_is_not_publishable() {
    let realm = connect("inproc://reserved-pub");
    assert!(matches!(
        realm.create_publisher(ftl::config::ADVISORY_ENDPOINT, None),
        Err(Error::NotPermitted(_))
    ));
    realm
        .create_subscriber(ftl::config::ADVISORY_ENDPOINT, None, None)
        .expect("advisory subscriber allowed");
}

#[test]
fn test_configured_formats_and_endpoints() {
    let realm = configured("inproc://configured");
    assert!(matches!(
        realm.create_publisher("orders", None),
        Err(Error::InvalidArg(_))
    ));
    assert!(matches!(
        realm.create_message(Some("missing")),
        Err(Error::FormatUnavailable(_))
    ));

    let mut quote = realm.create_message(Some("quote")).expect("quote");
    assert_eq!(quote.format_name(), Some("quote"));
    quote.set_string("symbol", "ACME").expect("symbol");
    quote.set_double("bid", 10.5).expect("bid");
    assert!(matches!(quote.set_long("volume", 5), Err(Error::InvalidArg(_))));
    assert!(matches!(quote.set_long("bid", 5), Err(Error::InvalidType(_))));

    let bytes = quote.to_bytes().expect("encode");
    assert!(matches!(
        Message::read_from_byte_array(&bytes),
        Err(Error::FormatUnavailable(_))
    ));
    let decoded = realm.create_message_from_bytes(&bytes).expect("decode");
    assert_eq!(decoded.get_string("symbol").expect("symbol"), "ACME");
    assert_eq!(decoded.get_double("bid").expect("bid"), 10.5);
}

#[test]
fn test_queue_profile_applies_discard_settings() {
    let realm = configured("inproc://profiles");
    assert!(matches!(
        realm.create_queue_from_profile("nope"),
        Err(Error::NotFound(_))
    ));
    let queue = realm.create_queue_from_profile("small").expect("queue");
    assert_eq!(queue.discard_policy(), ftl::DiscardPolicy::New);

    let sub = realm.create_subscriber("quotes", None, None).expect("sub");
    queue
        .add_subscriber(&sub, message_callback(|_, _, _, _| {}), None)
        .expect("attach");
    let publisher = realm.create_publisher("quotes", None).expect("pub");
    let batch: Vec<Message> = (0..5).map(|_| Message::new()).collect();
    publisher.send_messages(&batch).expect("send");
    assert_eq!(queue.count().expect("count"), 2);
}

#[test]
fn test_properties_round_trip_through_realm() {
    open();
    let mut p = Properties::new();
    p.set_string(ftl::config::realm::CLIENT_LABEL, "label-1".into());
    let realm = Realm::connect("inproc://props", "app", Some(&p)).expect("connect");
    assert_eq!(
        realm
            .properties()
            .get_string(ftl::config::realm::CLIENT_LABEL)
            .expect("label"),
        "label-1"
    );
    assert_eq!(realm.app_name(), "app");
    assert_eq!(realm.server_url(), "inproc://props");

    let mut q = Properties::new();
    q.set_string(qprops::DISCARD_POLICY, "old".into());
    assert!(matches!(
        realm.create_queue(Some(&q)),
        Err(Error::InvalidType(_))
    ));
}
