// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Human-readable rendering of messages.

use std::fmt::{self, Write};

use super::{FieldValue, Message};
use crate::config::MAX_MESSAGE_DEPTH;
use crate::error::write_truncated;

/// Opaque payloads longer than this are summarized by size.
const OPAQUE_PREVIEW: usize = 16;

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut item: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    f.write_char('[')?;
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item(f, v)?;
    }
    f.write_char(']')
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &FieldValue, depth: usize) -> fmt::Result {
    match value {
        FieldValue::Opaque(data) if data.len() <= OPAQUE_PREVIEW => {
            f.write_str("<")?;
            for b in data {
                write!(f, "{:02x}", b)?;
            }
            f.write_str(">")
        }
        FieldValue::Opaque(data) => write!(f, "<{} bytes>", data.len()),
        FieldValue::Long(v) => write!(f, "{}", v),
        FieldValue::LongArray(vs) => write_list(f, vs, |f, v| write!(f, "{}", v)),
        FieldValue::Double(v) => write!(f, "{:?}", v),
        FieldValue::DoubleArray(vs) => write_list(f, vs, |f, v| write!(f, "{:?}", v)),
        FieldValue::String(s) => write!(f, "{:?}", s),
        FieldValue::StringArray(vs) => write_list(f, vs, |f, v| write!(f, "{:?}", v)),
        FieldValue::Message(m) => write_nested(f, m, depth),
        FieldValue::MessageArray(ms) => write_list(f, ms, |f, m| write_nested(f, m, depth)),
        FieldValue::Inbox(inbox) => write!(f, "{}", inbox),
        FieldValue::DateTime(dt) => write!(f, "{}", dt),
        FieldValue::DateTimeArray(dts) => write_list(f, dts, |f, d| write!(f, "{}", d)),
    }
}

/// Sub-message of a message at `depth`; elided past the nesting limit.
fn write_nested(f: &mut fmt::Formatter<'_>, msg: &Message, depth: usize) -> fmt::Result {
    if depth >= MAX_MESSAGE_DEPTH {
        return f.write_str("{...}");
    }
    write_message(f, msg, depth + 1)
}

fn write_message(f: &mut fmt::Formatter<'_>, msg: &Message, depth: usize) -> fmt::Result {
    f.write_char('{')?;
    for (i, (name, value)) in msg.fields().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}:{}=", value.field_type(), name)?;
        write_value(f, value, depth)?;
    }
    f.write_char('}')
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 1)
    }
}

/// `{long:count=3, string:name="x"}`
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_message(f, self, 1)
    }
}

impl Message {
    /// Render into `buf`, truncating if needed. Returns the number of bytes written.
    pub fn write_string(&self, buf: &mut [u8]) -> usize {
        write_truncated(&self.to_string(), buf)
    }
}
