// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed property bags.
//!
//! Properties configure realms, queues, publishers and subscribers. Every
//! create call copies the bag it is given, so callers may reuse or drop it
//! immediately afterwards.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::message::Message;

/// A single property value.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Message(Message),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Message(_) => "message",
        }
    }
}

/// Ordered map of property name to typed value.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: BTreeMap<String, PropertyValue>,
}

macro_rules! typed_property {
    ($set:ident, $get:ident, $get_or:ident, $variant:ident, $ty:ty) => {
        pub fn $set(&mut self, name: &str, value: $ty) -> &mut Self {
            self.entries
                .insert(name.to_string(), PropertyValue::$variant(value));
            self
        }

        pub fn $get(&self, name: &str) -> Result<$ty> {
            match self.entries.get(name) {
                Some(PropertyValue::$variant(v)) => Ok(v.clone()),
                Some(other) => Err(Error::InvalidType(format!(
                    "property '{}' is {}, not {}",
                    name,
                    other.type_name(),
                    stringify!($variant).to_lowercase()
                ))),
                None => Err(Error::NotFound(format!("property '{}'", name))),
            }
        }

        /// Value of `name`, or `default` when unset. A value of another type is an error.
        pub fn $get_or(&self, name: &str, default: $ty) -> Result<$ty> {
            match self.$get(name) {
                Err(Error::NotFound(_)) => Ok(default),
                other => other,
            }
        }
    };
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    typed_property!(set_bool, get_bool, bool_or, Bool, bool);
    typed_property!(set_int, get_int, int_or, Int, i32);
    typed_property!(set_long, get_long, long_or, Long, i64);
    typed_property!(set_double, get_double, double_or, Double, f64);
    typed_property!(set_string, get_string, string_or, String, String);

    /// Store a copy of `msg`.
    pub fn set_message(&mut self, name: &str, msg: &Message) -> &mut Self {
        self.entries
            .insert(name.to_string(), PropertyValue::Message(msg.clone()));
        self
    }

    pub fn get_message(&self, name: &str) -> Result<&Message> {
        match self.entries.get(name) {
            Some(PropertyValue::Message(m)) => Ok(m),
            Some(other) => Err(Error::InvalidType(format!(
                "property '{}' is {}, not message",
                name,
                other.type_name()
            ))),
            None => Err(Error::NotFound(format!("property '{}'", name))),
        }
    }

    /// Optional string property: `Ok(None)` when unset.
    pub fn opt_string(&self, name: &str) -> Result<Option<String>> {
        match self.get_string(name) {
            Ok(v) => Ok(Some(v)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove `name`. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
