// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;

fn order_format() -> Arc<Format> {
    Arc::new(
        Format::new(
            "order",
            vec![
                FieldDef::new("id", FieldType::Long),
                FieldDef::new("symbol", FieldType::String),
                FieldDef::new("price", FieldType::Double),
            ],
        )
        .unwrap(),
    )
}

fn every_type() -> Message {
    let mut nested = Message::new();
    nested.set_string("leaf", "x").unwrap();

    let inbox = Inbox::new(Arc::from("inproc://a"), 42);

    let mut msg = Message::new();
    msg.set_opaque("opaque", &[1, 2, 3]).unwrap();
    msg.set_long("long", -5).unwrap();
    msg.set_long_array("long_array", &[i64::MIN, 0, i64::MAX]).unwrap();
    msg.set_double("double", 0.25).unwrap();
    msg.set_double_array("double_array", &[1.0, f64::INFINITY]).unwrap();
    msg.set_string("string", "héllo").unwrap();
    msg.set_string_array("string_array", &["a", "", "c"]).unwrap();
    msg.set_message("message", &nested).unwrap();
    msg.set_message_array("message_array", &[nested.clone(), Message::new()])
        .unwrap();
    msg.set_inbox("inbox", &inbox).unwrap();
    msg.set_datetime("datetime", DateTime::new(1_700_000_000, 5)).unwrap();
    msg.set_datetime_array("datetime_array", &[DateTime::new(1, 2)])
        .unwrap();
    msg
}

#[test]
fn test_every_field_type_survives_serialization() {
    let msg = every_type();
    assert_eq!(msg.field_count(), 12);

    for bytes in [msg.to_bytes().unwrap(), msg.to_portable_bytes().unwrap()] {
        let back = Message::read_from_byte_array(&bytes).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.get_inbox("inbox").unwrap().id(), 42);
        assert_eq!(back.get_message("message").unwrap().get_string("leaf").unwrap(), "x");
        assert!(back.is_mutable());
    }
}

#[test]
fn test_absent_and_mismatched_gets() {
    let mut msg = Message::new();
    msg.set_long("n", 1).unwrap();

    assert!(matches!(msg.get_long("missing"), Err(Error::NotFound(_))));
    assert!(matches!(msg.get_string("n"), Err(Error::InvalidType(_))));
    assert!(matches!(msg.get_opaque("n"), Err(Error::InvalidType(_))));
    assert!(matches!(msg.field_type("missing"), Err(Error::NotFound(_))));
}

#[test]
fn test_named_format_rules() {
    let mut msg = Message::with_format(order_format());
    assert_eq!(msg.format_name(), Some("order"));

    msg.set_long("id", 1).unwrap();
    assert!(matches!(msg.set_long("qty", 3), Err(Error::InvalidArg(_))));
    assert!(matches!(msg.set_string("id", "x"), Err(Error::InvalidType(_))));
    assert!(matches!(msg.clear_field("qty"), Err(Error::InvalidArg(_))));

    // Declared type is reported even while unset.
    assert_eq!(msg.field_type("price").unwrap(), FieldType::Double);
    assert!(!msg.is_field_set("price"));
    assert!(matches!(msg.get_double("price"), Err(Error::NotFound(_))));
}

#[test]
fn test_dynamic_retype_only_after_clear() {
    let mut msg = Message::new();
    msg.set_long("v", 1).unwrap();
    assert!(matches!(msg.set_string("v", "s"), Err(Error::InvalidType(_))));

    msg.clear_field("v").unwrap();
    msg.set_string("v", "s").unwrap();
    assert_eq!(msg.field_type("v").unwrap(), FieldType::String);

    // Clearing an unknown dynamic field is a no-op.
    msg.clear_field("never").unwrap();
}

#[test]
fn test_clear_all_then_reset_matches_fresh() {
    let mut reused = Message::new();
    reused.set_long("stale", 9).unwrap();
    reused.set_string("a", "x").unwrap();
    reused.clear_all_fields().unwrap();
    reused.set_string("a", "y").unwrap();
    reused.set_long("b", 2).unwrap();

    let mut fresh = Message::new();
    fresh.set_string("a", "y").unwrap();
    fresh.set_long("b", 2).unwrap();

    let names = |m: &Message| {
        let mut it = m.iter();
        let mut out = Vec::new();
        while let Ok(r) = it.next_ref() {
            out.push((r.name().to_string(), m.get(r).unwrap().clone()));
        }
        out
    };
    assert_eq!(names(&reused), names(&fresh));
    assert_eq!(reused, fresh);

    let mut named = Message::with_format(order_format());
    named.set_long("id", 1).unwrap();
    named.clear_all_fields().unwrap();
    assert_eq!(named.field_count(), 0);
    assert_eq!(named.field_type("id").unwrap(), FieldType::Long);
}

#[test]
fn test_immutable_rejects_changes() {
    let mut msg = Message::new();
    msg.set_long("n", 1).unwrap();
    let mut frozen = msg.frozen_copy();

    assert!(!frozen.is_mutable());
    assert!(matches!(frozen.set_long("n", 2), Err(Error::IllegalState(_))));
    assert!(matches!(frozen.clear_field("n"), Err(Error::IllegalState(_))));
    assert!(matches!(frozen.clear_all_fields(), Err(Error::IllegalState(_))));
    assert_eq!(frozen.get_long("n").unwrap(), 1);

    let mut copy = frozen.mutable_copy();
    copy.set_long("n", 2).unwrap();
    assert_eq!(frozen.get_long("n").unwrap(), 1);
}

#[test]
fn test_sub_message_is_copied_in() {
    let mut child = Message::new();
    child.set_long("depth", 1).unwrap();

    let mut parent = Message::new();
    parent.set_message("child", &child).unwrap();
    child.set_long("depth", 2).unwrap();
    assert_eq!(parent.get_message("child").unwrap().get_long("depth").unwrap(), 1);

    // Nesting a message into itself stores a snapshot, never a cycle.
    let snapshot = parent.clone();
    parent.set_message("self", &snapshot).unwrap();
    let inner = parent.get_message("self").unwrap();
    assert!(!inner.is_field_set("self"));
}

#[test]
fn test_keyed_opaque_key_limit() {
    let mut msg = Message::with_format(Format::keyed_opaque());
    msg.set_string("_key", &"k".repeat(255)).unwrap();
    assert!(matches!(
        msg.set_string("_key", &"k".repeat(256)),
        Err(Error::InvalidArg(_))
    ));
    msg.set_opaque_owned("_data", vec![0u8; 20_000]).unwrap();
    assert_eq!(msg.get_opaque("_data").unwrap().len(), 20_000);
}

#[test]
fn test_field_type_names() {
    for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11] {
        let t = FieldType::from_i32(code).unwrap();
        assert_eq!(t.as_i32(), code);
        assert_eq!(FieldType::parse(t.as_str()), Some(t));
    }
    assert_eq!(FieldType::from_i32(2048), Some(FieldType::Unknown));
    assert_eq!(FieldType::parse("unknown"), None);
    assert_eq!(FieldType::parse("LONG"), Some(FieldType::Long));
    assert_eq!(FieldType::DateTimeArray.to_string(), "datetime_array");
}

#[test]
fn test_empty_field_name_rejected() {
    let mut msg = Message::new();
    assert!(matches!(msg.set_long("", 1), Err(Error::InvalidArg(_))));
}
