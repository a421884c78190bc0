// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message formats.
//!
//! A named format fixes the set of fields, their order and their types. The
//! dynamic format (no name) lets a message grow fields as they are set.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::FieldType;
use crate::config::{
    BUILTIN_DATA_FIELD, BUILTIN_KEY_FIELD, DEFAULT_OPAQUE_FORMAT, KEYED_OPAQUE_FORMAT,
    KEYED_OPAQUE_KEY_MAX,
};
use crate::error::{Error, Result};

/// One field of a named format.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: Arc<str>,
    pub field_type: FieldType,
    /// Upper bound on string length in bytes.
    pub max_len: Option<usize>,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: Arc::from(name),
            field_type,
            max_len: None,
        }
    }

    fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

/// Layout shared by every message created from it.
#[derive(Debug)]
pub struct Format {
    name: Option<Arc<str>>,
    fields: Vec<FieldDef>,
    index: HashMap<Arc<str>, usize>,
}

impl Format {
    /// Define a named format.
    pub fn new(name: &str, fields: Vec<FieldDef>) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidFormat("format name is empty".into()));
        }
        let mut index = HashMap::with_capacity(fields.len());
        for (slot, def) in fields.iter().enumerate() {
            if def.name.is_empty() {
                return Err(Error::InvalidFormat(format!(
                    "format '{}' has a field with an empty name",
                    name
                )));
            }
            if def.field_type == FieldType::Unknown {
                return Err(Error::InvalidFormat(format!(
                    "field '{}' of format '{}' has no type",
                    def.name, name
                )));
            }
            if index.insert(Arc::clone(&def.name), slot).is_some() {
                return Err(Error::InvalidFormat(format!(
                    "field '{}' appears twice in format '{}'",
                    def.name, name
                )));
            }
        }
        Ok(Self {
            name: Some(Arc::from(name)),
            fields,
            index,
        })
    }

    /// Shared dynamic format.
    pub fn dynamic() -> Arc<Format> {
        static DYNAMIC: OnceLock<Arc<Format>> = OnceLock::new();
        Arc::clone(DYNAMIC.get_or_init(|| {
            Arc::new(Format {
                name: None,
                fields: Vec::new(),
                index: HashMap::new(),
            })
        }))
    }

    /// `_default_opaque`: one `_data` opaque field.
    pub fn default_opaque() -> Arc<Format> {
        static FORMAT: OnceLock<Arc<Format>> = OnceLock::new();
        Arc::clone(FORMAT.get_or_init(|| {
            Arc::new(Format::builtin(
                DEFAULT_OPAQUE_FORMAT,
                vec![FieldDef::new(BUILTIN_DATA_FIELD, FieldType::Opaque)],
            ))
        }))
    }

    /// `_keyed_opaque`: a bounded `_key` string and a `_data` opaque field.
    pub fn keyed_opaque() -> Arc<Format> {
        static FORMAT: OnceLock<Arc<Format>> = OnceLock::new();
        Arc::clone(FORMAT.get_or_init(|| {
            Arc::new(Format::builtin(
                KEYED_OPAQUE_FORMAT,
                vec![
                    FieldDef::new(BUILTIN_KEY_FIELD, FieldType::String)
                        .with_max_len(KEYED_OPAQUE_KEY_MAX),
                    FieldDef::new(BUILTIN_DATA_FIELD, FieldType::Opaque),
                ],
            ))
        }))
    }

    /// Built-in format by name.
    pub fn builtin_by_name(name: &str) -> Option<Arc<Format>> {
        match name {
            DEFAULT_OPAQUE_FORMAT => Some(Self::default_opaque()),
            KEYED_OPAQUE_FORMAT => Some(Self::keyed_opaque()),
            _ => None,
        }
    }

    fn builtin(name: &str, fields: Vec<FieldDef>) -> Format {
        let index = fields
            .iter()
            .enumerate()
            .map(|(slot, def)| (Arc::clone(&def.name), slot))
            .collect();
        Format {
            name: Some(Arc::from(name)),
            fields,
            index,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.name.is_none()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.index.get(name).map(|&slot| &self.fields[slot])
    }

    pub(crate) fn slot_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let opaque = Format::default_opaque();
        assert_eq!(opaque.name(), Some("_default_opaque"));
        assert_eq!(opaque.fields().len(), 1);

        let keyed = Format::keyed_opaque();
        let key = keyed.field("_key").unwrap();
        assert_eq!(key.field_type, FieldType::String);
        assert_eq!(key.max_len, Some(255));
        assert!(Arc::ptr_eq(
            &keyed,
            &Format::builtin_by_name("_keyed_opaque").unwrap()
        ));
        assert!(Format::builtin_by_name("nope").is_none());
        assert!(Format::dynamic().is_dynamic());
    }

    #[test]
    fn test_rejects_bad_definitions() {
        let dup = Format::new(
            "f",
            vec![
                FieldDef::new("a", FieldType::Long),
                FieldDef::new("a", FieldType::String),
            ],
        );
        assert!(matches!(dup, Err(Error::InvalidFormat(_))));
        assert!(Format::new("", vec![]).is_err());
        assert!(Format::new("f", vec![FieldDef::new("x", FieldType::Unknown)]).is_err());
        assert!(Format::new("f", vec![FieldDef::new("", FieldType::Long)]).is_err());

        let ok = Format::new("f", vec![FieldDef::new("a", FieldType::Long)]).unwrap();
        assert_eq!(ok.slot_of("a"), Some(0));
        assert_eq!(ok.slot_of("b"), None);
    }
}
