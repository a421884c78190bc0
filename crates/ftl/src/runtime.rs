// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide runtime lifetime.
//!
//! [`open`] and [`close`] bracket all use of the library. Calls nest: the
//! runtime is torn down when the last `open` is matched by a `close`.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{const_mutex, Mutex};

use crate::config::COMPATIBILITY_VERSION;
use crate::error::{Error, Result};
use crate::realm::server;

/// Release string of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nesting counter for open/close pairs.
#[derive(Debug, Default)]
pub(crate) struct OpenCount {
    count: usize,
}

impl OpenCount {
    /// Returns true on the first open.
    pub(crate) fn open(&mut self) -> bool {
        self.count += 1;
        self.count == 1
    }

    /// Returns true when the last open is closed.
    pub(crate) fn close(&mut self) -> Result<bool> {
        if self.count == 0 {
            return Err(Error::IllegalState(
                "close called more often than open".into(),
            ));
        }
        self.count -= 1;
        Ok(self.count == 0)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.count > 0
    }
}

static RUNTIME: Mutex<OpenCount> = const_mutex(OpenCount { count: 0 });

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for realms, subscribers, timers and queues.
pub(crate) fn next_handle_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Open the runtime.
///
/// `compatible_version` must equal [`COMPATIBILITY_VERSION`].
pub fn open(compatible_version: i32) -> Result<()> {
    if compatible_version != COMPATIBILITY_VERSION {
        return Err(Error::VersionMismatch {
            expected: COMPATIBILITY_VERSION,
            found: compatible_version,
        });
    }
    if RUNTIME.lock().open() {
        log::debug!("[runtime] opened (version {})", VERSION);
    }
    Ok(())
}

/// Close one level of [`open`]. The last close tears the runtime down.
pub fn close() -> Result<()> {
    let last = RUNTIME.lock().close()?;
    if last {
        server::clear_registry();
        log::debug!("[runtime] closed");
    }
    Ok(())
}

pub fn is_open() -> bool {
    RUNTIME.lock().is_open()
}

pub fn version() -> &'static str {
    VERSION
}
