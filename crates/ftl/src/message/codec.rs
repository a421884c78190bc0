// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-array serialization of messages.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic "FTLM" | version u8 | flags u8 | format name (u16 len + utf8)
//! field count u32
//! per field:
//!   compact + named format : slot u16
//!   otherwise              : name (u16 len + utf8) | type i32
//!   value
//! ```
//!
//! The compact encoding omits field names and types for named formats, so the
//! reader must know the format. The portable encoding carries that metadata
//! and can be read anywhere. Dynamic messages always carry it.

use std::sync::Arc;

use super::{DateTime, FieldDef, FieldType, FieldValue, Format, Inbox, Message};
use crate::config::MAX_MESSAGE_DEPTH;
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"FTLM";
const VERSION: u8 = 1;
const FLAG_PORTABLE: u8 = 0x01;

/// Maps a format name found in encoded data to its definition.
pub type FormatResolver<'a> = &'a dyn Fn(&str) -> Option<Arc<Format>>;

// ============================================================================
// Cursors
// ============================================================================

macro_rules! impl_put_le {
    ($name:ident, $type:ty) => {
        fn $name(&mut self, value: $type) {
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    };
}

macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        fn $name(&mut self) -> Result<$type> {
            let bytes = self.take($size)?;
            let mut raw = [0u8; $size];
            raw.copy_from_slice(bytes);
            Ok(<$type>::from_le_bytes(raw))
        }
    };
}

/// Growable write cursor.
struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    impl_put_le!(put_u8, u8);
    impl_put_le!(put_u16, u16);
    impl_put_le!(put_u32, u32);
    impl_put_le!(put_i32, i32);
    impl_put_le!(put_i64, i64);

    fn put_f64(&mut self, value: f64) {
        self.put_i64(value.to_bits() as i64);
    }

    fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| Error::LimitReached(format!("length {} exceeds u32", len)))?;
        self.put_u32(len);
        Ok(())
    }

    fn put_short_str(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| Error::LimitReached(format!("name of {} bytes is too long", s.len())))?;
        self.put_u16(len);
        self.buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn put_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.put_len(data.len())?;
        self.buffer.extend_from_slice(data);
        Ok(())
    }
}

/// Bounds-checked read cursor.
struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::Malformed(format!(
                "need {} bytes at offset {}, {} left",
                n,
                self.offset,
                self.remaining()
            )));
        }
        let out = &self.buffer[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u16, u16, 2);
    impl_read_le!(read_u32, u32, 4);
    impl_read_le!(read_i32, i32, 4);
    impl_read_le!(read_i64, i64, 8);

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    /// Element count, checked against the bytes left so corrupt input cannot
    /// trigger a huge allocation.
    fn read_count(&mut self, min_elem_size: usize) -> Result<usize> {
        let n = self.read_u32()? as usize;
        if n.saturating_mul(min_elem_size.max(1)) > self.remaining() {
            return Err(Error::Malformed(format!(
                "count {} exceeds remaining {} bytes",
                n,
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let n = self.read_count(1)?;
        self.take(n)
    }

    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        utf8(bytes)
    }

    fn read_short_str(&mut self) -> Result<String> {
        let n = self.read_u16()? as usize;
        let bytes = self.take(n)?;
        utf8(bytes)
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::Malformed("invalid utf-8".into()))
}

// ============================================================================
// Encoding
// ============================================================================

fn encode_message(enc: &mut Encoder, msg: &Message, portable: bool, depth: usize) -> Result<()> {
    enc.buffer.extend_from_slice(MAGIC);
    enc.put_u8(VERSION);
    enc.put_u8(if portable { FLAG_PORTABLE } else { 0 });
    enc.put_short_str(msg.format_name().unwrap_or_default())?;

    let compact_slots = !portable && !msg.format().is_dynamic();
    enc.put_len(msg.field_count())?;
    for (slot, name, value) in msg.set_slots() {
        if compact_slots {
            let slot = u16::try_from(slot)
                .map_err(|_| Error::LimitReached("format has too many fields".into()))?;
            enc.put_u16(slot);
        } else {
            enc.put_short_str(name)?;
            enc.put_i32(value.field_type().as_i32());
        }
        encode_value(enc, value, portable, depth)?;
    }
    Ok(())
}

fn encode_nested(enc: &mut Encoder, msg: &Message, portable: bool, depth: usize) -> Result<()> {
    if depth >= MAX_MESSAGE_DEPTH {
        return Err(Error::LimitReached(format!(
            "sub-messages nested deeper than {} levels",
            MAX_MESSAGE_DEPTH
        )));
    }
    let mut inner = Encoder::new();
    encode_message(&mut inner, msg, portable, depth + 1)?;
    enc.put_bytes(&inner.buffer)
}

fn encode_value(enc: &mut Encoder, value: &FieldValue, portable: bool, depth: usize) -> Result<()> {
    match value {
        FieldValue::Opaque(data) => enc.put_bytes(data)?,
        FieldValue::Long(v) => enc.put_i64(*v),
        FieldValue::LongArray(vs) => {
            enc.put_len(vs.len())?;
            for v in vs {
                enc.put_i64(*v);
            }
        }
        FieldValue::Double(v) => enc.put_f64(*v),
        FieldValue::DoubleArray(vs) => {
            enc.put_len(vs.len())?;
            for v in vs {
                enc.put_f64(*v);
            }
        }
        FieldValue::String(s) => enc.put_bytes(s.as_bytes())?,
        FieldValue::StringArray(vs) => {
            enc.put_len(vs.len())?;
            for s in vs {
                enc.put_bytes(s.as_bytes())?;
            }
        }
        FieldValue::Message(m) => encode_nested(enc, m, portable, depth)?,
        FieldValue::MessageArray(ms) => {
            enc.put_len(ms.len())?;
            for m in ms {
                encode_nested(enc, m, portable, depth)?;
            }
        }
        FieldValue::Inbox(inbox) => {
            enc.put_bytes(inbox.server().as_bytes())?;
            enc.put_i64(inbox.id() as i64);
        }
        FieldValue::DateTime(dt) => {
            enc.put_i64(dt.sec());
            enc.put_i64(dt.nsec());
        }
        FieldValue::DateTimeArray(dts) => {
            enc.put_len(dts.len())?;
            for dt in dts {
                enc.put_i64(dt.sec());
                enc.put_i64(dt.nsec());
            }
        }
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_message(
    cur: &mut Cursor<'_>,
    resolve: FormatResolver<'_>,
    depth: usize,
) -> Result<Message> {
    if cur.take(4)? != MAGIC {
        return Err(Error::Malformed("bad magic".into()));
    }
    let version = cur.read_u8()?;
    if version != VERSION {
        return Err(Error::Malformed(format!("unsupported encoding version {}", version)));
    }
    let portable = cur.read_u8()? & FLAG_PORTABLE != 0;
    let format_name = cur.read_short_str()?;
    let count = cur.read_count(2)?;

    if format_name.is_empty() {
        let mut msg = Message::new();
        for _ in 0..count {
            let (name, value) = decode_described_field(cur, resolve, depth)?;
            msg.set(name.as_str(), value)?;
        }
        return Ok(msg);
    }

    let known = resolve(&format_name);
    if !portable {
        let format = known.ok_or_else(|| Error::FormatUnavailable(format_name.clone()))?;
        let mut msg = Message::with_format(Arc::clone(&format));
        for _ in 0..count {
            let slot = cur.read_u16()? as usize;
            let def = format.fields().get(slot).ok_or_else(|| {
                Error::Malformed(format!("slot {} outside format '{}'", slot, format_name))
            })?;
            let value = decode_value(cur, def.field_type, resolve, depth)?;
            msg.set(&*def.name, value)?;
        }
        return Ok(msg);
    }

    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        fields.push(decode_described_field(cur, resolve, depth)?);
    }
    let format = match known {
        Some(format) => format,
        // Unknown here: rebuild the layout from the carried metadata.
        None => Arc::new(Format::new(
            &format_name,
            fields
                .iter()
                .map(|(name, value)| FieldDef::new(name, value.field_type()))
                .collect(),
        )?),
    };
    let mut msg = Message::with_format(format);
    for (name, value) in fields {
        msg.set(name.as_str(), value)?;
    }
    Ok(msg)
}

fn decode_described_field(
    cur: &mut Cursor<'_>,
    resolve: FormatResolver<'_>,
    depth: usize,
) -> Result<(String, FieldValue)> {
    let name = cur.read_short_str()?;
    let code = cur.read_i32()?;
    let field_type = FieldType::from_i32(code)
        .filter(|t| *t != FieldType::Unknown)
        .ok_or_else(|| Error::Malformed(format!("unknown field type {}", code)))?;
    let value = decode_value(cur, field_type, resolve, depth)?;
    Ok((name, value))
}

fn decode_nested(
    cur: &mut Cursor<'_>,
    resolve: FormatResolver<'_>,
    depth: usize,
) -> Result<Message> {
    if depth >= MAX_MESSAGE_DEPTH {
        return Err(Error::Malformed(format!(
            "sub-messages nested deeper than {} levels",
            MAX_MESSAGE_DEPTH
        )));
    }
    let bytes = cur.read_bytes()?;
    decode_message(&mut Cursor::new(bytes), resolve, depth + 1)
}

fn decode_value(
    cur: &mut Cursor<'_>,
    field_type: FieldType,
    resolve: FormatResolver<'_>,
    depth: usize,
) -> Result<FieldValue> {
    Ok(match field_type {
        FieldType::Opaque => FieldValue::Opaque(cur.read_bytes()?.to_vec()),
        FieldType::Long => FieldValue::Long(cur.read_i64()?),
        FieldType::LongArray => {
            let n = cur.read_count(8)?;
            let mut vs = Vec::with_capacity(n);
            for _ in 0..n {
                vs.push(cur.read_i64()?);
            }
            FieldValue::LongArray(vs)
        }
        FieldType::Double => FieldValue::Double(cur.read_f64()?),
        FieldType::DoubleArray => {
            let n = cur.read_count(8)?;
            let mut vs = Vec::with_capacity(n);
            for _ in 0..n {
                vs.push(cur.read_f64()?);
            }
            FieldValue::DoubleArray(vs)
        }
        FieldType::String => FieldValue::String(cur.read_string()?),
        FieldType::StringArray => {
            let n = cur.read_count(4)?;
            let mut vs = Vec::with_capacity(n);
            for _ in 0..n {
                vs.push(cur.read_string()?);
            }
            FieldValue::StringArray(vs)
        }
        FieldType::Message => FieldValue::Message(Box::new(decode_nested(cur, resolve, depth)?)),
        FieldType::MessageArray => {
            let n = cur.read_count(4)?;
            let mut ms = Vec::with_capacity(n);
            for _ in 0..n {
                ms.push(decode_nested(cur, resolve, depth)?);
            }
            FieldValue::MessageArray(ms)
        }
        FieldType::Inbox => {
            let server = cur.read_string()?;
            let id = cur.read_i64()? as u64;
            FieldValue::Inbox(Inbox::new(Arc::from(server), id))
        }
        FieldType::DateTime => {
            let sec = cur.read_i64()?;
            let nsec = cur.read_i64()?;
            FieldValue::DateTime(DateTime::new(sec, nsec))
        }
        FieldType::DateTimeArray => {
            let n = cur.read_count(16)?;
            let mut dts = Vec::with_capacity(n);
            for _ in 0..n {
                let sec = cur.read_i64()?;
                let nsec = cur.read_i64()?;
                dts.push(DateTime::new(sec, nsec));
            }
            FieldValue::DateTimeArray(dts)
        }
        FieldType::Unknown => {
            return Err(Error::Malformed("field of unknown type".into()));
        }
    })
}

fn copy_out(encoded: &[u8], buf: &mut [u8]) -> Result<usize> {
    if buf.len() < encoded.len() {
        return Err(Error::BufferTooSmall {
            required: encoded.len(),
        });
    }
    buf[..encoded.len()].copy_from_slice(encoded);
    Ok(encoded.len())
}

impl Message {
    pub(crate) fn set_slots(&self) -> impl Iterator<Item = (usize, &str, &FieldValue)> {
        (0..self.slot_count()).filter_map(move |slot| {
            let name = self.slot_name(slot)?;
            let value = self.get_slot(slot)?;
            Some((slot, &**name, value))
        })
    }

    /// Compact encoding as a new buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        encode_message(&mut enc, self, false, 1)?;
        Ok(enc.buffer)
    }

    /// Portable encoding as a new buffer.
    pub fn to_portable_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        encode_message(&mut enc, self, true, 1)?;
        Ok(enc.buffer)
    }

    /// Write the compact encoding into `buf`.
    ///
    /// Returns the number of bytes written. When `buf` is too small nothing is
    /// written and the error carries the required size.
    pub fn write_to_byte_array(&self, buf: &mut [u8]) -> Result<usize> {
        copy_out(&self.to_bytes()?, buf)
    }

    /// Write the portable encoding into `buf`; see
    /// [`write_to_byte_array`](Self::write_to_byte_array).
    pub fn write_to_portable_byte_array(&self, buf: &mut [u8]) -> Result<usize> {
        copy_out(&self.to_portable_bytes()?, buf)
    }

    /// Decode a message; only built-in formats are known for compact data.
    pub fn read_from_byte_array(bytes: &[u8]) -> Result<Message> {
        Self::read_from_byte_array_with(bytes, &Format::builtin_by_name)
    }

    /// Decode a message, resolving format names with `resolve`.
    pub fn read_from_byte_array_with(bytes: &[u8], resolve: FormatResolver<'_>) -> Result<Message> {
        let mut cur = Cursor::new(bytes);
        let msg = decode_message(&mut cur, resolve, 1)?;
        if cur.remaining() != 0 {
            return Err(Error::Malformed(format!(
                "{} trailing bytes",
                cur.remaining()
            )));
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_format() -> Arc<Format> {
        Arc::new(
            Format::new(
                "sensor",
                vec![
                    FieldDef::new("id", FieldType::Long),
                    FieldDef::new("label", FieldType::String),
                    FieldDef::new("temps", FieldType::DoubleArray),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_compact_named_needs_format() {
        let format = sensor_format();
        let mut msg = Message::with_format(Arc::clone(&format));
        msg.set_long("id", 7).unwrap();
        msg.set_double_array("temps", &[1.5, -2.0]).unwrap();

        let bytes = msg.to_bytes().unwrap();
        let err = Message::read_from_byte_array(&bytes).unwrap_err();
        assert!(matches!(err, Error::FormatUnavailable(ref n) if n == "sensor"));

        let f = Arc::clone(&format);
        let resolver = move |name: &str| (name == "sensor").then(|| Arc::clone(&f));
        let back = Message::read_from_byte_array_with(&bytes, &resolver).unwrap();
        assert_eq!(back, msg);
        assert!(Arc::ptr_eq(back.format(), &format));
    }

    #[test]
    fn test_portable_rebuilds_unknown_format() {
        let mut msg = Message::with_format(sensor_format());
        msg.set_string("label", "north").unwrap();
        let bytes = msg.to_portable_bytes().unwrap();
        assert!(bytes.len() > msg.to_bytes().unwrap().len());

        let back = Message::read_from_byte_array(&bytes).unwrap();
        assert_eq!(back.format_name(), Some("sensor"));
        assert_eq!(back.get_string("label").unwrap(), "north");
    }

    #[test]
    fn test_size_probe() {
        let mut msg = Message::new();
        msg.set_opaque("blob", &[9u8; 40]).unwrap();

        let mut tiny = [0xEEu8; 8];
        let err = msg.write_to_byte_array(&mut tiny).unwrap_err();
        let required = err.required_size().unwrap();
        assert_eq!(tiny, [0xEE; 8], "no partial write");

        let mut buf = vec![0u8; required];
        assert_eq!(msg.write_to_byte_array(&mut buf).unwrap(), required);
        assert_eq!(Message::read_from_byte_array(&buf).unwrap(), msg);

        let err = msg.write_to_portable_byte_array(&mut tiny).unwrap_err();
        assert!(err.required_size().unwrap() >= required);
    }

    #[test]
    fn test_rejects_corrupt_input() {
        let mut msg = Message::new();
        msg.set_string_array("names", &["a", "b"]).unwrap();
        let bytes = msg.to_bytes().unwrap();

        for cut in [0, 3, 6, bytes.len() - 1] {
            assert!(
                matches!(Message::read_from_byte_array(&bytes[..cut]), Err(Error::Malformed(_))),
                "truncated at {}",
                cut
            );
        }

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(Message::read_from_byte_array(&trailing).is_err());

        let mut bad_magic = bytes;
        bad_magic[0] = b'X';
        assert!(Message::read_from_byte_array(&bad_magic).is_err());
    }

    #[test]
    fn test_huge_count_does_not_allocate() {
        let mut enc = Encoder::new();
        enc.buffer.extend_from_slice(MAGIC);
        enc.put_u8(VERSION);
        enc.put_u8(0);
        enc.put_u16(0);
        enc.put_u32(u32::MAX);
        assert!(matches!(
            Message::read_from_byte_array(&enc.buffer),
            Err(Error::Malformed(_))
        ));
    }

    /// Dynamic message whose only field "m" holds `inner` as a sub-message.
    fn wrap_in_message(inner: &[u8]) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.buffer.extend_from_slice(MAGIC);
        enc.put_u8(VERSION);
        enc.put_u8(0);
        enc.put_short_str("").unwrap();
        enc.put_len(1).unwrap();
        enc.put_short_str("m").unwrap();
        enc.put_i32(FieldType::Message.as_i32());
        enc.put_bytes(inner).unwrap();
        enc.buffer
    }

    fn nested_bytes(levels: usize) -> Vec<u8> {
        let mut bytes = Message::new().to_bytes().unwrap();
        for _ in 1..levels {
            bytes = wrap_in_message(&bytes);
        }
        bytes
    }

    #[test]
    fn test_deep_nesting_is_malformed() {
        let bytes = nested_bytes(2_000);
        assert!(matches!(
            Message::read_from_byte_array(&bytes),
            Err(Error::Malformed(_))
        ));

        let bytes = nested_bytes(MAX_MESSAGE_DEPTH + 1);
        assert!(matches!(
            Message::read_from_byte_array(&bytes),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_nesting_at_limit_round_trips() {
        let bytes = nested_bytes(MAX_MESSAGE_DEPTH);
        let msg = Message::read_from_byte_array(&bytes).unwrap();
        assert_eq!(msg.depth(), MAX_MESSAGE_DEPTH);
        assert_eq!(msg.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_set_message_past_limit_rejected() {
        let mut msg = Message::new();
        for _ in 1..MAX_MESSAGE_DEPTH {
            let mut outer = Message::new();
            outer.set_message("m", &msg).unwrap();
            msg = outer;
        }
        assert_eq!(msg.depth(), MAX_MESSAGE_DEPTH);

        let mut outer = Message::new();
        assert!(matches!(
            outer.set_message("m", &msg),
            Err(Error::LimitReached(_))
        ));
        assert_eq!(outer.field_count(), 0);
    }
}
