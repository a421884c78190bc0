// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbox addresses for point-to-point delivery.

use std::fmt;
use std::sync::Arc;

/// Address of one inbox subscriber.
///
/// Obtained from [`crate::Subscriber::inbox`] and usually carried to peers
/// inside a message field so they can reply with
/// [`crate::Publisher::send_to_inbox`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Inbox {
    server: Arc<str>,
    id: u64,
}

impl Inbox {
    pub(crate) fn new(server: Arc<str>, id: u64) -> Self {
        Self { server, id }
    }

    /// URL of the realm server the inbox lives on.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inbox:{}#{}", self.server, self.id)
    }
}
