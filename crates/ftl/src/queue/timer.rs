// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic timers feeding an event queue.
//!
//! Each timer owns a small thread that ticks at the configured interval and
//! enqueues a firing. A timer never has more than one firing waiting in the
//! queue: ticks that arrive while a firing is still queued are coalesced.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use super::{Closure, QueueShared, TimerCallback};
use crate::error::{Error, Result};

/// Callback data shared between the timer thread and queued firings.
pub(crate) struct TimerShared {
    pub(crate) id: u64,
    pub(crate) interval: Duration,
    pub(crate) callback: TimerCallback,
    pub(crate) closure: Option<Closure>,
}

/// Handle to a running timer.
///
/// Dropping the handle stops the timer; use
/// [`EventQueue::destroy_timer`](super::EventQueue::destroy_timer) to be told
/// when its last callback has returned.
pub struct Timer {
    shared: Arc<TimerShared>,
    queue: Weak<QueueShared>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Timer {
    pub(crate) fn start(shared: Arc<TimerShared>, queue: Weak<QueueShared>) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let thread_shared = Arc::clone(&shared);
        let thread_queue = queue.clone();

        let thread = std::thread::Builder::new()
            .name(format!("ftl-timer-{}", shared.id))
            .spawn(move || {
                let ticker = channel::tick(thread_shared.interval);
                log::debug!(
                    "[timer] {} started, interval {:?}",
                    thread_shared.id,
                    thread_shared.interval
                );
                loop {
                    channel::select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(queue) = thread_queue.upgrade() else {
                                break;
                            };
                            if !queue.fire_timer(&thread_shared) {
                                break;
                            }
                        }
                    }
                }
                log::debug!("[timer] {} stopped", thread_shared.id);
            })
            .map_err(Error::Io)?;

        Ok(Self {
            shared,
            queue,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    pub(crate) fn belongs_to(&self, queue: &Arc<QueueShared>) -> bool {
        std::ptr::eq(self.queue.as_ptr(), Arc::as_ptr(queue))
    }

    /// Stop ticking. Idempotent.
    fn stop_thread(&mut self) {
        // Dropping the sender disconnects the stop channel.
        drop(self.stop.take());
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Stop the thread and hand the timer's queue source over for retirement.
    pub(crate) fn shutdown(mut self) -> (u64, Weak<QueueShared>) {
        self.stop_thread();
        (self.shared.id, std::mem::take(&mut self.queue))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop_thread();
        if let Some(queue) = self.queue.upgrade() {
            queue.retire_timer(self.shared.id, None);
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.shared.id)
            .field("interval", &self.shared.interval)
            .finish()
    }
}
