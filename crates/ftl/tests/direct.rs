// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Direct publish/subscribe: reservations and raw buffer delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ftl::{Error, Realm, Timeout};

fn connect(url: &str) -> Realm {
    ftl::open(ftl::COMPATIBILITY_VERSION).expect("open runtime");
    Realm::connect(url, "direct", None).expect("connect")
}

#[test]
fn test_buffer_reaches_subscriber() {
    let realm = connect("inproc://direct-deliver");
    let sub = realm.create_direct_subscriber("raw", None).expect("sub");
    let publisher = realm.create_direct_publisher("raw", None).expect("pub");
    assert!(!sub.has_data());

    let mut res = publisher.reserve(2, 16).expect("reserve");
    res.data_mut()[..8].copy_from_slice(b"helloabc");
    res.sizes_mut().copy_from_slice(&[5, 3]);
    assert_eq!(res.send_reserved().expect("send"), 1);
    assert!(sub.has_data());

    let mut parts = Vec::new();
    let handled = sub
        .dispatch(Timeout::NoWait, |buf| {
            assert_eq!(buf.count(), 2);
            assert_eq!(buf.total_size(), 8);
            parts.extend(buf.messages().map(<[u8]>::to_vec));
        })
        .expect("dispatch");
    assert_eq!(handled, 1);
    assert_eq!(parts, vec![b"hello".to_vec(), b"abc".to_vec()]);
    assert!(!sub.has_data());
}

#[test]
fn test_other_endpoints_not_reached() {
    let realm = connect("inproc://direct-endpoints");
    let sub = realm.create_direct_subscriber("a", None).expect("sub");
    let publisher = realm.create_direct_publisher("b", None).expect("pub");
    let mut res = publisher.reserve(1, 1).expect("reserve");
    res.sizes_mut()[0] = 1;
    assert_eq!(res.send_reserved().expect("send"), 0);
    assert_eq!(sub.dispatch(Timeout::NoWait, |_| {}).expect("dispatch"), 0);
}

#[test]
fn test_reserve_blocks_other_thread_until_sent() {
    let realm = connect("inproc://direct-reserve");
    let publisher = realm.create_direct_publisher("raw", None).expect("pub");
    let sent = AtomicBool::new(false);

    let first = publisher.reserve(1, 64).expect("first reserve");
    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let res = publisher.reserve(1, 64).expect("second reserve");
            let after_send = sent.load(Ordering::SeqCst);
            drop(res);
            after_send
        });
        thread::sleep(Duration::from_millis(50));
        sent.store(true, Ordering::SeqCst);
        first.send_reserved().expect("send");
        assert!(waiter.join().expect("join"), "second reserve returned early");
    });
}

#[test]
fn test_reserve_twice_on_one_thread_is_illegal() {
    let realm = connect("inproc://direct-reentrant");
    let publisher = realm.create_direct_publisher("raw", None).expect("pub");
    let res = publisher.reserve(1, 8).expect("reserve");
    assert!(matches!(publisher.reserve(1, 8), Err(Error::IllegalState(_))));
    drop(res);
    publisher.reserve(1, 8).expect("reserve after drop");
    assert!(matches!(publisher.reserve(0, 8), Err(Error::InvalidArg(_))));
}

#[test]
fn test_oversized_sizes_rejected_and_released() {
    let realm = connect("inproc://direct-oversize");
    let publisher = realm.create_direct_publisher("raw", None).expect("pub");
    let mut res = publisher.reserve(2, 4).expect("reserve");
    res.sizes_mut().copy_from_slice(&[3, 3]);
    assert!(matches!(res.send_reserved(), Err(Error::InvalidArg(_))));
    publisher.reserve(1, 4).expect("publisher released");

    let mut res = publisher.reserve(2, 8).expect("reserve");
    res.sizes_mut().copy_from_slice(&[usize::MAX, 2]);
    assert!(matches!(res.send_reserved(), Err(Error::InvalidArg(_))));
    publisher.reserve(1, 4).expect("publisher released after overflow");
}

#[test]
fn test_close_fails_blocked_reserve() {
    let realm = connect("inproc://direct-close-pub");
    let publisher = realm.create_direct_publisher("raw", None).expect("pub");
    let held = publisher.reserve(1, 8).expect("reserve");
    thread::scope(|s| {
        let waiter = s.spawn(|| publisher.reserve(1, 8).map(|_| ()));
        thread::sleep(Duration::from_millis(50));
        publisher.close().expect("close");
        assert!(matches!(
            waiter.join().expect("join"),
            Err(Error::IllegalState(_))
        ));
    });
    assert!(matches!(held.send_reserved(), Err(Error::IllegalState(_))));
    assert!(matches!(publisher.close(), Err(Error::IllegalState(_))));
}

#[test]
fn test_close_wakes_waiting_dispatch() {
    let realm = connect("inproc://direct-close-sub");
    let sub = realm.create_direct_subscriber("raw", None).expect("sub");
    thread::scope(|s| {
        let waiter = s.spawn(|| sub.dispatch(Timeout::Forever, |_| {}));
        thread::sleep(Duration::from_millis(50));
        sub.close().expect("close");
        assert_eq!(waiter.join().expect("join").expect("dispatch"), 0);
    });
    assert!(matches!(
        sub.dispatch(Timeout::NoWait, |_| {}),
        Err(Error::IllegalState(_))
    ));
}

#[test]
fn test_reserved_endpoints_rejected() {
    let realm = connect("inproc://direct-reserved");
    assert!(matches!(
        realm.create_direct_subscriber(ftl::config::ADVISORY_ENDPOINT, None),
        Err(Error::NotPermitted(_))
    ));
    assert!(matches!(
        realm.create_direct_publisher("", None),
        Err(Error::InvalidArg(_))
    ));
}
