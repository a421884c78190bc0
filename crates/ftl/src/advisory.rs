// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Advisory messages.
//!
//! Advisories are ordinary messages delivered to subscribers of
//! [`ADVISORY_ENDPOINT`](crate::config::ADVISORY_ENDPOINT). Every advisory
//! carries the `_advisory` marker field plus `severity`, `module`, `name`,
//! `reason` and `timestamp`; the remaining fields depend on the name.
//!
//! | Name        | Reason                    | Extra fields                                           |
//! |-------------|---------------------------|--------------------------------------------------------|
//! | `DATALOSS`  | `QUEUE_LIMIT_EXCEEDED`    | `queue_name`, `aggregation_count`, `aggregation_time`  |
//! | `LOCK_LOST` | `LOCK_STOLEN`             | `lock_name`                                            |

use std::time::Duration;

use crate::error::Result;
use crate::matcher::ContentMatcher;
use crate::message::{DateTime, Message};

// ============================================================================
// Field names
// ============================================================================

pub const FIELD_ADVISORY: &str = "_advisory";
pub const FIELD_SEVERITY: &str = "severity";
pub const FIELD_MODULE: &str = "module";
pub const FIELD_NAME: &str = "name";
pub const FIELD_REASON: &str = "reason";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_AGGREGATION_COUNT: &str = "aggregation_count";
/// Seconds covered by an aggregated advisory.
pub const FIELD_AGGREGATION_TIME: &str = "aggregation_time";
pub const FIELD_QUEUE_NAME: &str = "queue_name";
pub const FIELD_ENDPOINTS: &str = "endpoints";
pub const FIELD_SUBSCRIBER_NAME: &str = "subscriber_name";
pub const FIELD_LOCK_NAME: &str = "lock_name";

// ============================================================================
// Severities and modules
// ============================================================================

pub const SEVERITY_WARN: &str = "WARN";
pub const SEVERITY_INFO: &str = "INFO";
pub const SEVERITY_DEBUG: &str = "DEBUG";

pub const MODULE_BASE: &str = "BASE";

// ============================================================================
// Names
// ============================================================================

pub const NAME_DATALOSS: &str = "DATALOSS";
pub const NAME_SUBSCRIBER_FORCE_CLOSE: &str = "SUBSCRIBER_FORCE_CLOSE";
pub const NAME_RESOURCE_UNAVAILABLE: &str = "RESOURCE_UNAVAILABLE";
pub const NAME_RESOURCE_AVAILABLE: &str = "RESOURCE_AVAILABLE";
pub const NAME_RETRANSMISSION: &str = "RETRANSMISSION";
pub const NAME_LOCK_LOST: &str = "LOCK_LOST";

// ============================================================================
// Reasons
// ============================================================================

pub const REASON_QUEUE_LIMIT_EXCEEDED: &str = "QUEUE_LIMIT_EXCEEDED";
pub const REASON_TPORT_DATALOSS: &str = "TPORT_DATALOSS";
pub const REASON_SENDER_DISCARD: &str = "SENDER_DISCARD";
pub const REASON_RECONNECT_LOSS: &str = "RECONNECT_LOSS";
pub const REASON_FAILOVER_LOSS: &str = "FAILOVER_LOSS";
pub const REASON_UPSTREAM_LOSS: &str = "UPSTREAM_LOSS";
pub const REASON_INCOMPLETE_MESSAGE: &str = "INCOMPLETE_MESSAGE";
pub const REASON_DURABLE_SUBSCRIBER_COLLISION: &str = "DURABLE_SUBSCRIBER_COLLISION";
pub const REASON_PERSISTENCE_STORE_UNAVAILABLE: &str = "PERSISTENCE_STORE_UNAVAILABLE";
pub const REASON_PERSISTENCE_STORE_AVAILABLE: &str = "PERSISTENCE_STORE_AVAILABLE";
pub const REASON_RETRANSMISSION_REQUEST: &str = "RETRANSMISSION_REQUEST";
pub const REASON_RETRANSMISSION_SENT: &str = "RETRANSMISSION_SENT";
pub const REASON_RETRANSMISSION_REQUEST_SUPPRESSED: &str = "RETRANSMISSION_REQUEST_SUPPRESSED";
pub const REASON_STORE_DISCARD_DATALOSS: &str = "STORE_DISCARD_DATALOSS";
pub const REASON_DIRECT_SUBSCRIBER_LOSS: &str = "DIRECT_SUBSCRIBER_LOSS";
pub const REASON_LOCK_STOLEN: &str = "LOCK_STOLEN";
pub const REASON_LOCK_LOST_ON_DISCONNECT: &str = "LOCK_LOST_ON_DISCONNECT";

/// Advisory header shared by every advisory kind.
fn header(severity: &str, name: &str, reason: &str) -> Result<Message> {
    let mut msg = Message::new();
    msg.set_long(FIELD_ADVISORY, 1)?;
    msg.set_string(FIELD_SEVERITY, severity)?;
    msg.set_string(FIELD_MODULE, MODULE_BASE)?;
    msg.set_string(FIELD_NAME, name)?;
    msg.set_string(FIELD_REASON, reason)?;
    msg.set_datetime(FIELD_TIMESTAMP, DateTime::now())?;
    Ok(msg)
}

/// `DATALOSS` / `QUEUE_LIMIT_EXCEEDED` advisory.
///
/// `interval` is the time since the previous loss advisory of the same queue
/// (zero for the first one).
pub fn queue_data_loss(queue_name: Option<&str>, count: u64, interval: Duration) -> Result<Message> {
    let mut msg = header(SEVERITY_WARN, NAME_DATALOSS, REASON_QUEUE_LIMIT_EXCEEDED)?;
    if let Some(name) = queue_name {
        msg.set_string(FIELD_QUEUE_NAME, name)?;
    }
    msg.set_long(FIELD_AGGREGATION_COUNT, i64::try_from(count).unwrap_or(i64::MAX))?;
    msg.set_double(FIELD_AGGREGATION_TIME, interval.as_secs_f64())?;
    Ok(msg)
}

/// `LOCK_LOST` advisory sent to the previous holder of a lock.
pub fn lock_lost(lock_name: &str, reason: &str) -> Result<Message> {
    let mut msg = header(SEVERITY_WARN, NAME_LOCK_LOST, reason)?;
    msg.set_string(FIELD_LOCK_NAME, lock_name)?;
    Ok(msg)
}

/// True when `msg` carries the advisory marker.
pub fn is_advisory(msg: &Message) -> bool {
    msg.is_field_set(FIELD_ADVISORY)
}

/// Matcher selecting advisories of one name, e.g. `DATALOSS`.
pub fn matcher_for(name: &str) -> Result<ContentMatcher> {
    let mut spec = String::from("{\"");
    spec.push_str(FIELD_NAME);
    spec.push_str("\":\"");
    for ch in name.chars() {
        match ch {
            '"' => spec.push_str("\\\""),
            '\\' => spec.push_str("\\\\"),
            other => spec.push(other),
        }
    }
    spec.push_str("\"}");
    ContentMatcher::new(&spec)
}
