// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Realm configuration documents.
//!
//! A realm configuration declares named message formats, the endpoints
//! applications may use, and reusable event queue profiles.
//!
//! # Example YAML
//!
//! ```yaml
//! formats:
//!   quote:
//!     - { name: symbol, type: string }
//!     - { name: bid,    type: double }
//!     - { name: ask,    type: double }
//!
//! endpoints: [quotes, orders]
//!
//! queues:
//!   market_data:
//!     discard_policy: OLD
//!     max_events: 10000
//!     discard_amount: 100
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[cfg(feature = "config-loaders")]
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::message::{FieldDef, FieldType, Format};
use crate::properties::Properties;

/// Root configuration document.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "config-loaders", derive(Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct RealmConfig {
    /// Named formats, each an ordered field list.
    pub formats: BTreeMap<String, FormatConfig>,

    /// Allowed endpoint names. Empty means any endpoint is allowed.
    pub endpoints: Vec<String>,

    /// Named event queue profiles.
    pub queues: BTreeMap<String, QueueProfile>,
}

/// Ordered field list of one format.
pub type FormatConfig = Vec<FieldConfig>;

/// One field of a configured format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-loaders", derive(Deserialize))]
pub struct FieldConfig {
    pub name: String,
    /// Field type name (`long`, `string_array`, ...).
    #[cfg_attr(feature = "config-loaders", serde(rename = "type"))]
    pub field_type: String,
}

/// Event queue settings.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "config-loaders", derive(Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct QueueProfile {
    /// NONE, OLD or NEW.
    pub discard_policy: Option<String>,
    pub max_events: Option<i32>,
    pub discard_amount: Option<i32>,
    pub inline: Option<bool>,
    /// Queue name reported in advisories; defaults to the profile name.
    pub name: Option<String>,
}

impl QueueProfile {
    /// Translate to event queue properties.
    pub fn to_properties(&self, profile_name: &str) -> Result<Properties> {
        use super::queue;

        let mut props = Properties::new();
        if let Some(policy) = &self.discard_policy {
            let code = match policy.to_ascii_uppercase().as_str() {
                "NONE" => 0,
                "OLD" => 1,
                "NEW" => 2,
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "queue '{}': unknown discard policy '{}'",
                        profile_name, other
                    )))
                }
            };
            props.set_int(queue::DISCARD_POLICY, code);
        }
        if let Some(max) = self.max_events {
            props.set_int(queue::DISCARD_MAX_EVENTS, max);
        }
        if let Some(amount) = self.discard_amount {
            props.set_int(queue::DISCARD_AMOUNT, amount);
        }
        if let Some(inline) = self.inline {
            props.set_bool(queue::INLINE, inline);
        }
        let name = self.name.clone().unwrap_or_else(|| profile_name.to_string());
        props.set_string(queue::NAME, name);
        Ok(props)
    }
}

impl RealmConfig {
    /// Parse a YAML document.
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RealmConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidConfig(format!("YAML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a YAML file.
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Check formats and queue profiles without building anything.
    pub fn validate(&self) -> Result<()> {
        self.build_formats()?;
        for (name, profile) in &self.queues {
            profile.to_properties(name)?;
        }
        if let Some(reserved) = self.endpoints.iter().find(|e| e.starts_with('_')) {
            return Err(Error::InvalidConfig(format!(
                "endpoint name '{}' is reserved",
                reserved
            )));
        }
        Ok(())
    }

    /// Build the configured formats.
    pub fn build_formats(&self) -> Result<HashMap<String, Arc<Format>>> {
        let mut out = HashMap::with_capacity(self.formats.len());
        for (name, fields) in &self.formats {
            if name.starts_with('_') {
                return Err(Error::InvalidConfig(format!(
                    "format name '{}' is reserved",
                    name
                )));
            }
            let defs = fields
                .iter()
                .map(|f| {
                    FieldType::parse(&f.field_type)
                        .map(|t| FieldDef::new(&f.name, t))
                        .ok_or_else(|| {
                            Error::InvalidConfig(format!(
                                "format '{}': field '{}' has unknown type '{}'",
                                name, f.name, f.field_type
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let format = Format::new(name, defs)
                .map_err(|e| Error::InvalidConfig(format!("format '{}': {}", name, e)))?;
            out.insert(name.clone(), Arc::new(format));
        }
        Ok(out)
    }

    /// True when `endpoint` may be used with this configuration.
    pub fn allows_endpoint(&self, endpoint: &str) -> bool {
        self.endpoints.is_empty() || self.endpoints.iter().any(|e| e == endpoint)
    }
}

#[cfg(all(test, feature = "config-loaders"))]
mod tests {
    use super::*;
    use crate::config::queue;
    use std::io::Write;

    const SAMPLE: &str = r#"
formats:
  quote:
    - { name: symbol, type: string }
    - { name: bid, type: double }
    - { name: sizes, type: long_array }
endpoints: [quotes, orders]
queues:
  market_data:
    discard_policy: old
    max_events: 100
    discard_amount: 10
"#;

    #[test]
    fn test_parse_sample() {
        let config = RealmConfig::from_yaml_str(SAMPLE).unwrap();
        let formats = config.build_formats().unwrap();
        let quote = &formats["quote"];
        assert_eq!(quote.fields().len(), 3);
        assert_eq!(quote.field("sizes").unwrap().field_type, FieldType::LongArray);

        assert!(config.allows_endpoint("quotes"));
        assert!(!config.allows_endpoint("trades"));

        let props = config.queues["market_data"]
            .to_properties("market_data")
            .unwrap();
        assert_eq!(props.get_int(queue::DISCARD_POLICY).unwrap(), 1);
        assert_eq!(props.get_int(queue::DISCARD_AMOUNT).unwrap(), 10);
        assert_eq!(props.get_string(queue::NAME).unwrap(), "market_data");
    }

    #[test]
    fn test_rejects_invalid_documents() {
        let bad_type = "formats:\n  f:\n    - { name: x, type: decimal }\n";
        assert!(matches!(
            RealmConfig::from_yaml_str(bad_type),
            Err(Error::InvalidConfig(_))
        ));

        let reserved = "formats:\n  _mine:\n    - { name: x, type: long }\n";
        assert!(RealmConfig::from_yaml_str(reserved).is_err());

        let dup = "formats:\n  f:\n    - { name: x, type: long }\n    - { name: x, type: long }\n";
        assert!(RealmConfig::from_yaml_str(dup).is_err());

        let policy = "queues:\n  q:\n    discard_policy: SOMETIMES\n";
        assert!(RealmConfig::from_yaml_str(policy).is_err());

        assert!(RealmConfig::from_yaml_str("endpoints: [_advisoryEndpoint]").is_err());
        assert!(RealmConfig::from_yaml_str("formats: [").is_err());
    }

    #[test]
    fn test_empty_document_allows_everything() {
        let config = RealmConfig::from_yaml_str("{}").unwrap();
        assert!(config.allows_endpoint("anything"));
        assert!(config.build_formats().unwrap().is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = RealmConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.endpoints, vec!["quotes", "orders"]);

        assert!(matches!(
            RealmConfig::from_yaml_file("/nonexistent/realm.yaml"),
            Err(Error::Io(_))
        ));
    }
}
