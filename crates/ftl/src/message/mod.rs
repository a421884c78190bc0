// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messages: typed field containers.
//!
//! A [`Message`] holds named, typed fields laid out by its [`Format`]. Fields
//! are addressed either by name (`&str`) or by a [`FieldRef`], which caches
//! the field's slot for repeated access.
//!
//! ```
//! use ftl::message::{FieldType, Message};
//!
//! let mut msg = Message::new();
//! msg.set_string("status", "active").unwrap();
//! msg.set_long("retries", 3).unwrap();
//!
//! assert_eq!(msg.get_long("retries").unwrap(), 3);
//! assert_eq!(msg.field_type("status").unwrap(), FieldType::String);
//! ```
//!
//! Messages received from a subscriber are immutable; use
//! [`Message::mutable_copy`] to obtain an editable copy. Sub-messages are
//! copied into their parent, so a message can never contain itself.

mod codec;
mod datetime;
mod field_ref;
mod format;
mod inbox;
mod iter;
mod text;

pub use datetime::DateTime;
pub use field_ref::FieldRef;
pub use format::{FieldDef, Format};
pub use inbox::Inbox;
pub use iter::MessageIterator;

use std::fmt;
use std::sync::Arc;

use crate::config::MAX_MESSAGE_DEPTH;
use crate::error::{Error, Result};

/// Type of a message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FieldType {
    Opaque = 0,
    Long = 1,
    LongArray = 2,
    Double = 3,
    DoubleArray = 4,
    String = 5,
    StringArray = 6,
    Message = 7,
    MessageArray = 8,
    Inbox = 9,
    DateTime = 10,
    DateTimeArray = 11,
    Unknown = 2048,
}

impl FieldType {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::Opaque,
            1 => Self::Long,
            2 => Self::LongArray,
            3 => Self::Double,
            4 => Self::DoubleArray,
            5 => Self::String,
            6 => Self::StringArray,
            7 => Self::Message,
            8 => Self::MessageArray,
            9 => Self::Inbox,
            10 => Self::DateTime,
            11 => Self::DateTimeArray,
            2048 => Self::Unknown,
            _ => return None,
        })
    }

    /// Name used in format definitions and message text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::Long => "long",
            Self::LongArray => "long_array",
            Self::Double => "double",
            Self::DoubleArray => "double_array",
            Self::String => "string",
            Self::StringArray => "string_array",
            Self::Message => "message",
            Self::MessageArray => "message_array",
            Self::Inbox => "inbox",
            Self::DateTime => "datetime",
            Self::DateTimeArray => "datetime_array",
            Self::Unknown => "unknown",
        }
    }

    /// Inverse of [`as_str`](Self::as_str). `unknown` is rejected.
    pub fn parse(name: &str) -> Option<Self> {
        [
            Self::Opaque,
            Self::Long,
            Self::LongArray,
            Self::Double,
            Self::DoubleArray,
            Self::String,
            Self::StringArray,
            Self::Message,
            Self::MessageArray,
            Self::Inbox,
            Self::DateTime,
            Self::DateTimeArray,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a message field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Opaque(Vec<u8>),
    Long(i64),
    LongArray(Vec<i64>),
    Double(f64),
    DoubleArray(Vec<f64>),
    String(String),
    StringArray(Vec<String>),
    Message(Box<Message>),
    MessageArray(Vec<Message>),
    Inbox(Inbox),
    DateTime(DateTime),
    DateTimeArray(Vec<DateTime>),
}

impl FieldValue {
    /// Nesting depth of the sub-messages held; 0 for scalar fields.
    pub(crate) fn depth(&self) -> usize {
        match self {
            Self::Message(m) => m.depth(),
            Self::MessageArray(ms) => ms.iter().map(Message::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Opaque(_) => FieldType::Opaque,
            Self::Long(_) => FieldType::Long,
            Self::LongArray(_) => FieldType::LongArray,
            Self::Double(_) => FieldType::Double,
            Self::DoubleArray(_) => FieldType::DoubleArray,
            Self::String(_) => FieldType::String,
            Self::StringArray(_) => FieldType::StringArray,
            Self::Message(_) => FieldType::Message,
            Self::MessageArray(_) => FieldType::MessageArray,
            Self::Inbox(_) => FieldType::Inbox,
            Self::DateTime(_) => FieldType::DateTime,
            Self::DateTimeArray(_) => FieldType::DateTimeArray,
        }
    }
}

/// Anything that names a field: `&str`, `String` or a [`FieldRef`].
pub trait FieldKey {
    fn field_name(&self) -> &str;

    /// Slot of the field in `msg`, if the message has one.
    fn resolve(&self, msg: &Message) -> Option<usize> {
        msg.slot_by_name(self.field_name())
    }
}

impl FieldKey for str {
    fn field_name(&self) -> &str {
        self
    }
}

impl FieldKey for String {
    fn field_name(&self) -> &str {
        self
    }
}

#[derive(Debug, Clone)]
struct Slot {
    name: Arc<str>,
    field_type: FieldType,
    max_len: Option<usize>,
    value: Option<FieldValue>,
}

/// Typed field container.
#[derive(Debug, Clone)]
pub struct Message {
    format: Arc<Format>,
    slots: Vec<Slot>,
    mutable: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! scalar_accessors {
    ($set:ident, $get:ident, $variant:ident, $ty:ty) => {
        pub fn $set<F: FieldKey + ?Sized>(&mut self, field: &F, value: $ty) -> Result<()> {
            self.set(field, FieldValue::$variant(value))
        }

        pub fn $get<F: FieldKey + ?Sized>(&self, field: &F) -> Result<$ty> {
            match self.get(field)? {
                FieldValue::$variant(v) => Ok(*v),
                other => Err(type_mismatch(field.field_name(), FieldType::$variant, other)),
            }
        }
    };
}

macro_rules! borrowed_getter {
    ($get:ident, $variant:ident, $ret:ty) => {
        pub fn $get<F: FieldKey + ?Sized>(&self, field: &F) -> Result<&$ret> {
            match self.get(field)? {
                FieldValue::$variant(v) => Ok(v),
                other => Err(type_mismatch(field.field_name(), FieldType::$variant, other)),
            }
        }
    };
}

fn type_mismatch(name: &str, wanted: FieldType, found: &FieldValue) -> Error {
    Error::InvalidType(format!(
        "field '{}' is {}, not {}",
        name,
        found.field_type(),
        wanted
    ))
}

impl Message {
    /// Empty message with the dynamic format.
    pub fn new() -> Self {
        Self::with_format(Format::dynamic())
    }

    /// Empty message laid out by `format`.
    pub fn with_format(format: Arc<Format>) -> Self {
        let slots = format
            .fields()
            .iter()
            .map(|def| Slot {
                name: Arc::clone(&def.name),
                field_type: def.field_type,
                max_len: def.max_len,
                value: None,
            })
            .collect();
        Self {
            format,
            slots,
            mutable: true,
        }
    }

    pub fn format(&self) -> &Arc<Format> {
        &self.format
    }

    pub fn format_name(&self) -> Option<&str> {
        self.format.name()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Editable deep copy.
    pub fn mutable_copy(&self) -> Message {
        let mut copy = self.clone();
        copy.mutable = true;
        copy
    }

    /// Immutable deep copy, as handed to subscribers.
    pub(crate) fn frozen_copy(&self) -> Message {
        let mut copy = self.clone();
        copy.mutable = false;
        copy
    }

    pub(crate) fn slot_by_name(&self, name: &str) -> Option<usize> {
        if self.format.is_dynamic() {
            self.slots.iter().position(|s| &*s.name == name)
        } else {
            self.format.slot_of(name)
        }
    }

    pub(crate) fn slot_name(&self, slot: usize) -> Option<&Arc<str>> {
        self.slots.get(slot).map(|s| &s.name)
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot_is_set(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.value.is_some())
    }

    pub(crate) fn get_slot(&self, slot: usize) -> Option<&FieldValue> {
        self.slots.get(slot).and_then(|s| s.value.as_ref())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(Error::IllegalState("message is immutable".into()))
        }
    }

    /// Set `field` to `value`.
    ///
    /// Named formats reject fields they do not define (`InvalidArg`) and
    /// values of a different type (`InvalidType`). The dynamic format adds the
    /// field on first use; a set field keeps its type until cleared.
    pub fn set<F: FieldKey + ?Sized>(&mut self, field: &F, value: FieldValue) -> Result<()> {
        self.ensure_mutable()?;
        let name = field.field_name();
        if name.is_empty() {
            return Err(Error::InvalidArg("field name is empty".into()));
        }
        let value_type = value.field_type();
        if value.depth() >= MAX_MESSAGE_DEPTH {
            return Err(Error::LimitReached(format!(
                "field '{}' nests sub-messages deeper than {} levels",
                name, MAX_MESSAGE_DEPTH
            )));
        }

        let Some(slot_idx) = field.resolve(self) else {
            if !self.format.is_dynamic() {
                return Err(Error::InvalidArg(format!(
                    "field '{}' is not defined by format '{}'",
                    name,
                    self.format.name().unwrap_or_default()
                )));
            }
            self.slots.push(Slot {
                name: Arc::from(name),
                field_type: value_type,
                max_len: None,
                value: Some(value),
            });
            return Ok(());
        };

        let dynamic = self.format.is_dynamic();
        let slot = &mut self.slots[slot_idx];
        if slot.field_type != value_type {
            if dynamic && slot.value.is_none() {
                slot.field_type = value_type;
            } else {
                return Err(Error::InvalidType(format!(
                    "field '{}' is {}, cannot hold {}",
                    name, slot.field_type, value_type
                )));
            }
        }
        if let (Some(max), FieldValue::String(s)) = (slot.max_len, &value) {
            if s.len() > max {
                return Err(Error::InvalidArg(format!(
                    "field '{}' is limited to {} bytes, got {}",
                    name,
                    max,
                    s.len()
                )));
            }
        }
        slot.value = Some(value);
        Ok(())
    }

    /// Value of `field`.
    pub fn get<F: FieldKey + ?Sized>(&self, field: &F) -> Result<&FieldValue> {
        field
            .resolve(self)
            .and_then(|idx| self.slots[idx].value.as_ref())
            .ok_or_else(|| Error::NotFound(format!("field '{}'", field.field_name())))
    }

    scalar_accessors!(set_long, get_long, Long, i64);
    scalar_accessors!(set_double, get_double, Double, f64);
    scalar_accessors!(set_datetime, get_datetime, DateTime, DateTime);

    borrowed_getter!(get_long_array, LongArray, [i64]);
    borrowed_getter!(get_double_array, DoubleArray, [f64]);
    borrowed_getter!(get_string, String, str);
    borrowed_getter!(get_string_array, StringArray, [String]);
    borrowed_getter!(get_opaque, Opaque, [u8]);
    borrowed_getter!(get_message, Message, Message);
    borrowed_getter!(get_message_array, MessageArray, [Message]);
    borrowed_getter!(get_inbox, Inbox, Inbox);
    borrowed_getter!(get_datetime_array, DateTimeArray, [DateTime]);

    pub fn set_string<F: FieldKey + ?Sized>(&mut self, field: &F, value: &str) -> Result<()> {
        self.set(field, FieldValue::String(value.to_string()))
    }

    /// Copy `value` into the field.
    pub fn set_opaque<F: FieldKey + ?Sized>(&mut self, field: &F, value: &[u8]) -> Result<()> {
        self.set(field, FieldValue::Opaque(value.to_vec()))
    }

    /// Move `value` into the field without copying.
    pub fn set_opaque_owned<F: FieldKey + ?Sized>(
        &mut self,
        field: &F,
        value: Vec<u8>,
    ) -> Result<()> {
        self.set(field, FieldValue::Opaque(value))
    }

    /// Copy `value` into the field as a sub-message.
    pub fn set_message<F: FieldKey + ?Sized>(&mut self, field: &F, value: &Message) -> Result<()> {
        self.set(field, FieldValue::Message(Box::new(value.clone())))
    }

    pub fn set_inbox<F: FieldKey + ?Sized>(&mut self, field: &F, value: &Inbox) -> Result<()> {
        self.set(field, FieldValue::Inbox(value.clone()))
    }

    pub fn set_long_array<F: FieldKey + ?Sized>(
        &mut self,
        field: &F,
        values: &[i64],
    ) -> Result<()> {
        self.set(field, FieldValue::LongArray(values.to_vec()))
    }

    pub fn set_double_array<F: FieldKey + ?Sized>(
        &mut self,
        field: &F,
        values: &[f64],
    ) -> Result<()> {
        self.set(field, FieldValue::DoubleArray(values.to_vec()))
    }

    pub fn set_string_array<F: FieldKey + ?Sized, S: AsRef<str>>(
        &mut self,
        field: &F,
        values: &[S],
    ) -> Result<()> {
        let values = values.iter().map(|s| s.as_ref().to_string()).collect();
        self.set(field, FieldValue::StringArray(values))
    }

    pub fn set_message_array<F: FieldKey + ?Sized>(
        &mut self,
        field: &F,
        values: &[Message],
    ) -> Result<()> {
        self.set(field, FieldValue::MessageArray(values.to_vec()))
    }

    pub fn set_datetime_array<F: FieldKey + ?Sized>(
        &mut self,
        field: &F,
        values: &[DateTime],
    ) -> Result<()> {
        self.set(field, FieldValue::DateTimeArray(values.to_vec()))
    }

    /// Unset `field`. Clearing an unset field is not an error.
    pub fn clear_field<F: FieldKey + ?Sized>(&mut self, field: &F) -> Result<()> {
        self.ensure_mutable()?;
        match field.resolve(self) {
            Some(idx) => {
                self.slots[idx].value = None;
                Ok(())
            }
            None if self.format.is_dynamic() => Ok(()),
            None => Err(Error::InvalidArg(format!(
                "field '{}' is not defined by format '{}'",
                field.field_name(),
                self.format.name().unwrap_or_default()
            ))),
        }
    }

    /// Unset every field. Dynamic messages also forget their field layout.
    pub fn clear_all_fields(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        if self.format.is_dynamic() {
            self.slots.clear();
        } else {
            for slot in &mut self.slots {
                slot.value = None;
            }
        }
        Ok(())
    }

    pub fn is_field_set<F: FieldKey + ?Sized>(&self, field: &F) -> bool {
        field
            .resolve(self)
            .is_some_and(|idx| self.slots[idx].value.is_some())
    }

    /// Type of `field`. Named formats report the declared type even when unset.
    pub fn field_type<F: FieldKey + ?Sized>(&self, field: &F) -> Result<FieldType> {
        match field.resolve(self) {
            Some(idx) if !self.format.is_dynamic() || self.slots[idx].value.is_some() => {
                Ok(self.slots[idx].field_type)
            }
            _ => Err(Error::NotFound(format!("field '{}'", field.field_name()))),
        }
    }

    /// Levels of nesting: 1 for a message without sub-messages.
    pub(crate) fn depth(&self) -> usize {
        1 + self
            .slots
            .iter()
            .filter_map(|s| s.value.as_ref())
            .map(FieldValue::depth)
            .max()
            .unwrap_or(0)
    }

    /// Number of set fields.
    pub fn field_count(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    /// Set fields in format order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.slots
            .iter()
            .filter_map(|s| s.value.as_ref().map(|v| (&*s.name, v)))
    }

    /// Restartable cursor over the set fields.
    pub fn iter(&self) -> MessageIterator<'_> {
        MessageIterator::new(self)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.format.name() == other.format.name() && self.fields().eq(other.fields())
    }
}

#[cfg(test)]
mod tests;
