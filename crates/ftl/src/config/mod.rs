// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration constants.
//!
//! Single source of truth for property names, defaults and limits. Property
//! names keep their historical `com.tibco.ftl.*` spelling so existing
//! configuration files and applications keep working.

pub mod loader;

pub use loader::{FieldConfig, FormatConfig, QueueProfile, RealmConfig};

// ============================================================================
// Versioning
// ============================================================================

/// Compatibility version the application must pass to [`crate::open`].
pub const COMPATIBILITY_VERSION: i32 = 2;

// ============================================================================
// Timeouts (seconds, as accepted by `Timeout::from_secs_f64`)
// ============================================================================

/// Block until an event arrives.
pub const TIMEOUT_WAIT_FOREVER: f64 = -1.0;
/// Return immediately when nothing is queued.
pub const TIMEOUT_NO_WAIT: f64 = 0.0;

// ============================================================================
// Limits
// ============================================================================

/// Longest string literal accepted in a content matcher, in bytes.
pub const MATCHER_STRING_MAX: usize = 256;
/// Longest key accepted by the keyed opaque format, in bytes.
pub const KEYED_OPAQUE_KEY_MAX: usize = 255;
/// Opaque payloads up to this size are carried most efficiently.
///
/// Larger payloads are accepted.
pub const OPAQUE_EFFICIENT_MAX: usize = 12000;
/// Deepest sub-message nesting, counting the outer message as level 1.
pub const MAX_MESSAGE_DEPTH: usize = 64;

// ============================================================================
// Built-in formats
// ============================================================================

/// Format with a single opaque field.
pub const DEFAULT_OPAQUE_FORMAT: &str = "_default_opaque";
/// Format with a string key and an opaque payload.
pub const KEYED_OPAQUE_FORMAT: &str = "_keyed_opaque";
/// Opaque payload field of the built-in formats.
pub const BUILTIN_DATA_FIELD: &str = "_data";
/// Key field of the keyed opaque format.
pub const BUILTIN_KEY_FIELD: &str = "_key";

// ============================================================================
// Reserved endpoints
// ============================================================================

/// Endpoint on which a realm delivers advisory messages.
pub const ADVISORY_ENDPOINT: &str = "_advisoryEndpoint";
/// Endpoint reserved for monitoring data.
pub const MONITORING_ENDPOINT: &str = "_monitoringEndpoint";

// ============================================================================
// Event queue
// ============================================================================

/// Event queue property names.
pub mod queue {
    /// bool: dispatch in the delivering thread where possible.
    pub const INLINE: &str = "com.tibco.ftl.client.inline";
    /// int: discard policy (0 = none, 1 = old, 2 = new).
    pub const DISCARD_POLICY: &str = "com.tibco.ftl.client.discard.policy";
    /// int: maximum queued events before the discard policy applies.
    pub const DISCARD_MAX_EVENTS: &str = "com.tibco.ftl.client.discard.max_events";
    /// int: events evicted at a time under the old-events policy.
    pub const DISCARD_AMOUNT: &str = "com.tibco.ftl.client.discard.amount";
    /// string: queue name reported in advisories.
    pub const NAME: &str = "com.tibco.ftl.client.queue.name";

    /// Default discard amount.
    pub const DEFAULT_DISCARD_AMOUNT: i32 = 1;
}

// ============================================================================
// Subscriber / publisher
// ============================================================================

/// Subscriber property names.
pub mod subscriber {
    /// string: subscriber name.
    pub const NAME: &str = "com.tibco.ftl.client.subscriber.name";
    /// string: durable name (recorded, durability is served by the store).
    pub const DURABLE_NAME: &str = "com.tibco.ftl.client.durable.name";
    /// bool: messages must be acknowledged explicitly.
    pub const EXPLICIT_ACK: &str = "com.tibco.ftl.client.subscriber.explicitack";
    /// bool: the callback may take ownership of delivered messages.
    pub const RELEASE_TO_CALLBACK: &str = "com.tibco.ftl.client.subscriber.release";
    /// string: key field of a keyed durable.
    pub const KEY_FIELD_NAME: &str = "com.tibco.ftl.client.subscriber.keyfieldname";
}

/// Publisher property names.
pub mod publisher {
    /// bool: `send_owned` transfers the message into the library.
    pub const RELEASE: &str = "com.tibco.ftl.client.publisher.release";
}

// ============================================================================
// Realm
// ============================================================================

/// Realm connection property names.
pub mod realm {
    pub const USERNAME: &str = "com.tibco.ftl.client.username";
    pub const USERPASSWORD: &str = "com.tibco.ftl.client.userpassword";
    pub const SECONDARY_SERVER: &str = "com.tibco.ftl.client.secondary";
    /// int: trust policy (see the `TRUST_*` constants).
    pub const TRUST_TYPE: &str = "com.tibco.ftl.trust.type";
    pub const TRUST_FILE: &str = "com.tibco.ftl.trust.file";
    pub const TRUST_PEM_STRING: &str = "com.tibco.ftl.trust.pem.string";
    pub const APPINSTANCE_IDENTIFIER: &str = "com.tibco.ftl.client.appinstance.identifier";
    pub const CLIENT_LABEL: &str = "com.tibco.ftl.client.label";

    /// Trust every server certificate.
    pub const TRUST_EVERYONE: i32 = 0;
    /// Trust the certificate stored in [`TRUST_FILE`].
    pub const TRUST_FILE_KIND: i32 = 1;
    /// Trust the certificate given inline in [`TRUST_PEM_STRING`].
    pub const TRUST_PEM_STRING_KIND: i32 = 2;
}
