// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Locks and maps shared by two realms on one server.

use std::sync::Arc;

use ftl::advisory;
use ftl::config::ADVISORY_ENDPOINT;
use ftl::{message_callback, Error, Message, Realm, Timeout};
use parking_lot::Mutex;

fn connect(url: &str, app: &str) -> Realm {
    ftl::open(ftl::COMPATIBILITY_VERSION).expect("open runtime");
    Realm::connect(url, app, None).expect("connect")
}

fn value(n: i64) -> Message {
    let mut msg = Message::new();
    msg.set_long("v", n).expect("set v");
    msg
}

#[test]
fn test_map_basic_ops_copy_values() {
    let realm = connect("inproc://store-basic", "a");
    let map = realm.create_map("prices", None).expect("map");
    assert_eq!(map.name(), "prices");

    let mut original = value(1);
    map.set("acme", &original).expect("set");
    original.set_long("v", 99).expect("caller keeps its copy");
    let stored = map.get("acme").expect("get").expect("present");
    assert_eq!(stored.get_long("v").expect("v"), 1);
    assert!(stored.is_mutable());

    map.remove("acme").expect("remove");
    assert!(map.get("acme").expect("get").is_none());
    assert!(matches!(map.set("", &original), Err(Error::InvalidArg(_))));
}

#[test]
fn test_maps_are_shared_per_server() {
    let a = connect("inproc://store-shared", "a");
    let b = connect("inproc://store-shared", "b");
    a.create_map("m", None)
        .expect("map a")
        .set("k", &value(5))
        .expect("set");
    let seen = b
        .create_map("m", None)
        .expect("map b")
        .get("k")
        .expect("get")
        .expect("present");
    assert_eq!(seen.get_long("v").expect("v"), 5);
}

#[test]
fn test_with_lock_contention_and_return() {
    let a = connect("inproc://store-contention", "a");
    let b = connect("inproc://store-contention", "b");
    let map_a = a.create_map("m", None).expect("map");
    let map_b = b.create_map("m", None).expect("map");
    let lock_a = a.create_lock("L", None).expect("lock");
    let lock_b = b.create_lock("L", None).expect("lock");
    assert!(lock_a.request().expect("request"));

    map_a.set_with_lock("k", &value(1), &lock_a).expect("a takes lock");
    assert!(lock_a.is_held());
    assert!(matches!(
        map_b.set_with_lock("k", &value(2), &lock_b),
        Err(Error::ResourceUnavailable(_))
    ));
    assert_eq!(
        map_b.get("k").expect("get").expect("present").get_long("v").expect("v"),
        1
    );

    lock_a.return_lock().expect("return");
    map_b.set_with_lock("k", &value(2), &lock_b).expect("b takes lock");
    assert!(lock_b.is_held());
    assert!(!lock_a.is_held());
}

#[test]
fn test_steal_notifies_previous_holder() {
    let a = connect("inproc://store-steal", "a");
    let b = connect("inproc://store-steal", "b");
    let queue = a.create_queue(None).expect("queue");
    let lost = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lost);
    let adv_sub = a
        .create_subscriber(ADVISORY_ENDPOINT, None, None)
        .expect("advisory sub");
    queue
        .add_subscriber(
            &adv_sub,
            message_callback(move |_, _, msgs, _| {
                for m in msgs.iter() {
                    sink.lock().push((
                        m.get_string(advisory::FIELD_NAME).expect("name").to_string(),
                        m.get_string(advisory::FIELD_LOCK_NAME).expect("lock").to_string(),
                    ));
                }
            }),
            None,
        )
        .expect("attach");

    let map_a = a.create_map("m", None).expect("map");
    let map_b = b.create_map("m", None).expect("map");
    let lock_a = a.create_lock("L", None).expect("lock");
    let lock_b = b.create_lock("L", None).expect("lock");

    map_a.set_with_lock("k", &value(1), &lock_a).expect("a holds");
    lock_b.steal().expect("steal");
    assert!(lock_a.is_held(), "transfer waits for the next operation");

    map_b.set_with_lock("k", &value(2), &lock_b).expect("stealer proceeds");
    assert!(lock_b.is_held());
    assert!(matches!(
        map_a.get_with_lock("k", &lock_a),
        Err(Error::ResourceUnavailable(_))
    ));

    queue.dispatch(Timeout::NoWait).expect("dispatch");
    assert_eq!(
        *lost.lock(),
        vec![("LOCK_LOST".to_string(), "L".to_string())]
    );
}

#[test]
fn test_holder_loses_on_its_next_operation() {
    let a = connect("inproc://store-steal-holder", "a");
    let b = connect("inproc://store-steal-holder", "b");
    let map_a = a.create_map("m", None).expect("map");
    let lock_a = a.create_lock("L", None).expect("lock");
    let lock_b = b.create_lock("L", None).expect("lock");

    map_a.set_with_lock("k", &value(1), &lock_a).expect("a holds");
    lock_b.steal().expect("steal");
    assert!(matches!(
        map_a.remove_with_lock("k", &lock_a),
        Err(Error::ResourceUnavailable(_))
    ));
    assert!(lock_b.is_held());
    assert!(map_a.get("k").expect("get").is_some(), "nothing removed");
}

#[test]
fn test_realm_close_returns_locks() {
    let a = connect("inproc://store-disconnect", "a");
    let b = connect("inproc://store-disconnect", "b");
    let map_b = b.create_map("m", None).expect("map");
    let lock_a = a.create_lock("L", None).expect("lock");
    let lock_b = b.create_lock("L", None).expect("lock");

    a.create_map("m", None)
        .expect("map")
        .set_with_lock("k", &value(1), &lock_a)
        .expect("a holds");
    a.close().expect("close");
    assert!(matches!(lock_a.return_lock(), Err(Error::ClientShutdown)));
    map_b.set_with_lock("k", &value(2), &lock_b).expect("b takes lock");
}

#[test]
fn test_live_iterator_sees_later_entries() {
    let realm = connect("inproc://store-iter", "a");
    let map = realm.create_map("m", None).expect("map");
    map.set("one", &value(1)).expect("set");
    map.set("two", &value(2)).expect("set");

    let mut it = map.create_iterator().expect("iterator");
    assert!(matches!(it.current_key(), Err(Error::NotFound(_))));
    assert!(it.next().expect("next"));
    assert_eq!(it.current_key().expect("key"), "one");
    map.set("three", &value(3)).expect("set during iteration");

    let mut keys = vec![it.current_key().expect("key").to_string()];
    while it.next().expect("next") {
        keys.push(it.current_key().expect("key").to_string());
        assert!(it.current_value().expect("value").get_long("v").is_ok());
    }
    assert_eq!(keys, vec!["one", "two", "three"]);
}

#[test]
fn test_locked_iterator_requires_lock() {
    let a = connect("inproc://store-iter-lock", "a");
    let b = connect("inproc://store-iter-lock", "b");
    let map = a.create_map("m", None).expect("map");
    map.set("k", &value(1)).expect("set");
    let lock_a = a.create_lock("L", None).expect("lock");
    let lock_b = b.create_lock("L", None).expect("lock");

    let mut it = map.create_iterator_with_lock(&lock_a).expect("iterator");
    assert!(it.next().expect("next"));
    lock_a.return_lock().expect("return");
    assert!(matches!(it.next(), Err(Error::IllegalState(_))));

    b.create_map("m", None)
        .expect("map")
        .get_with_lock("k", &lock_b)
        .expect("b takes lock");
    assert!(matches!(
        map.create_iterator_with_lock(&lock_a),
        Err(Error::ResourceUnavailable(_))
    ));
}

#[test]
fn test_removed_map_handles_fail() {
    let realm = connect("inproc://store-remove", "a");
    let map = realm.create_map("gone", None).expect("map");
    map.set("k", &value(1)).expect("set");
    realm.remove_map("gone").expect("remove");
    assert!(matches!(map.get("k"), Err(Error::IllegalState(_))));
    assert!(matches!(realm.remove_map("gone"), Err(Error::NotFound(_))));
    let fresh = realm.create_map("gone", None).expect("map again");
    assert!(fresh.get("k").expect("get").is_none());
}
