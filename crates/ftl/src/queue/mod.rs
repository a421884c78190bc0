// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event queues: the dispatch core.
//!
//! Subscribers and timers attached to a queue append events at the tail.
//! Application threads call [`EventQueue::dispatch`], which removes one batch
//! from the head and runs its callback on the calling thread:
//!
//! ```text
//!  subscriber A ──┐
//!  subscriber B ──┼──> [ A A B timer A ... ] ──dispatch──> callback(batch)
//!  timer T ───────┘          head ^
//! ```
//!
//! A batch is the longest run of message events at the head that share one
//! callback instance; a timer firing is always a batch of its own.
//!
//! # Lifecycle
//!
//! Removing a subscriber, destroying a timer and destroying the queue all
//! return at once. Their completion callbacks run later, once no callback
//! touching the removed resource is still executing. Completions run on
//! whichever thread retires the last event (often a dispatcher), never while
//! a queue lock is held.
//!
//! # Discard policy
//!
//! | Policy | On overflow of `max_events`                                    |
//! |--------|----------------------------------------------------------------|
//! | NONE   | no bound                                                        |
//! | OLD    | evict `discard_amount` oldest messages, repeated until it fits |
//! | NEW    | drop the tail of the incoming batch                             |
//!
//! Every discard publishes a `DATALOSS` advisory on the realm's advisory
//! endpoint. The publisher never sees an error.

mod event;
mod state;
mod timer;


use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use event::InboundMessage;
pub(crate) use event::AckToken;
pub use timer::Timer;

use crate::advisory;
use crate::config::{queue as props, TIMEOUT_NO_WAIT, TIMEOUT_WAIT_FOREVER};
use crate::error::{Error, Result, Status};
use crate::properties::Properties;
use crate::realm::RealmInner;
use state::{Batch, DiscardConfig, QueueState};
use timer::TimerShared;

/// Application data attached to a subscriber or timer and passed back to its
/// callback.
pub type Closure = Arc<dyn Any + Send + Sync>;

/// Callback receiving a batch of messages and their closures (same length).
pub type MessageCallback = Arc<
    dyn Fn(&mut Status, &EventQueue, &mut [InboundMessage], &[Option<Closure>]) + Send + Sync,
>;

/// Callback receiving one timer firing: status, queue, timer id and closure.
pub type TimerCallback = Arc<dyn Fn(&mut Status, &EventQueue, u64, Option<&Closure>) + Send + Sync>;

/// Runs once a removed resource is no longer referenced by any callback.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Wrap a closure as a [`MessageCallback`].
pub fn message_callback<F>(f: F) -> MessageCallback
where
    F: Fn(&mut Status, &EventQueue, &mut [InboundMessage], &[Option<Closure>]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`TimerCallback`].
pub fn timer_callback<F>(f: F) -> TimerCallback
where
    F: Fn(&mut Status, &EventQueue, u64, Option<&Closure>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`CompletionCallback`].
pub fn completion<F: FnOnce() + Send + 'static>(f: F) -> CompletionCallback {
    Box::new(f)
}

/// How long [`EventQueue::dispatch`] waits for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Forever,
    NoWait,
    After(Duration),
}

impl From<f64> for Timeout {
    /// Seconds; negative means forever, zero (or NaN) means no wait.
    fn from(secs: f64) -> Self {
        if secs == TIMEOUT_WAIT_FOREVER || secs < 0.0 {
            Timeout::Forever
        } else if secs == TIMEOUT_NO_WAIT || secs.is_nan() {
            Timeout::NoWait
        } else {
            Duration::try_from_secs_f64(secs)
                .map(Timeout::After)
                .unwrap_or(Timeout::Forever)
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::NoWait
        } else {
            Timeout::After(d)
        }
    }
}

/// Queue overflow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum DiscardPolicy {
    #[default]
    None = 0,
    Old = 1,
    New = 2,
}

impl DiscardPolicy {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Old),
            2 => Some(Self::New),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Old => "OLD",
            Self::New => "NEW",
        }
    }
}

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a queue callback.
struct CallbackScope;

impl CallbackScope {
    fn enter() -> Self {
        IN_CALLBACK.with(|flag| flag.set(true));
        CallbackScope
    }

    fn active() -> bool {
        IN_CALLBACK.with(Cell::get)
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|flag| flag.set(false));
    }
}

pub(crate) struct QueueShared {
    id: u64,
    name: Option<String>,
    discard: DiscardConfig,
    inline: bool,
    realm: Weak<RealmInner>,
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl Drop for QueueShared {
    fn drop(&mut self) {
        let ready = self.state.get_mut().drain_completions();
        if !ready.is_empty() {
            log::debug!(
                "[queue] {} dropped with {} pending completions",
                self.label(),
                ready.len()
            );
        }
        self.run_ready(ready);
    }
}

impl QueueShared {
    fn run_ready(&self, ready: Vec<CompletionCallback>) {
        for done in ready {
            done();
        }
    }

    pub(crate) fn fire_timer(&self, timer: &Arc<TimerShared>) -> bool {
        let mut state = self.state.lock();
        if state.is_destroyed() {
            return false;
        }
        if state.push_timer(timer) {
            self.cond.notify_all();
        }
        true
    }

    pub(crate) fn retire_timer(&self, timer_id: u64, done: Option<CompletionCallback>) {
        let ready = {
            let mut state = self.state.lock();
            state.purge_timer(timer_id);
            state.retire_source(timer_id, done);
            state.take_ready()
        };
        self.run_ready(ready);
    }

    fn report_loss(&self, lost: usize) {
        let interval = self.state.lock().note_loss(Instant::now());
        log::debug!(
            "[queue] {} discarded {} event(s) ({} policy)",
            self.label(),
            lost,
            self.discard.policy.as_str()
        );
        let Some(realm) = self.realm.upgrade() else {
            return;
        };
        match advisory::queue_data_loss(self.name.as_deref(), lost as u64, interval) {
            Ok(msg) => realm.publish_advisory(msg),
            Err(e) => log::warn!("[queue] cannot build data loss advisory: {}", e),
        }
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("'{}'", name),
            None => format!("#{}", self.id),
        }
    }
}

/// Thread-safe FIFO of events, dispatched by application threads.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct EventQueue {
    shared: Arc<QueueShared>,
}

impl EventQueue {
    /// Build a queue from its properties.
    pub(crate) fn create(realm: Weak<RealmInner>, props: &Properties) -> Result<Self> {
        let policy_code = props.int_or(props::DISCARD_POLICY, DiscardPolicy::None as i32)?;
        let policy = DiscardPolicy::from_i32(policy_code).ok_or_else(|| {
            Error::InvalidArg(format!("unknown discard policy {}", policy_code))
        })?;
        let max_events = props.int_or(props::DISCARD_MAX_EVENTS, 0)?;
        let amount = props.int_or(props::DISCARD_AMOUNT, props::DEFAULT_DISCARD_AMOUNT)?;

        let discard = match policy {
            DiscardPolicy::None => DiscardConfig::UNBOUNDED,
            _ if max_events <= 0 => {
                return Err(Error::InvalidArg(format!(
                    "discard policy {} needs a positive max events, got {}",
                    policy.as_str(),
                    max_events
                )))
            }
            DiscardPolicy::Old if amount < 1 || amount >= max_events => {
                return Err(Error::InvalidArg(format!(
                    "discard amount {} must be in 1..{}",
                    amount, max_events
                )))
            }
            _ => DiscardConfig {
                policy,
                max_events: max_events as usize,
                amount: amount.max(1) as usize,
            },
        };

        let inline = props.bool_or(props::INLINE, false)?;
        let name = props.opt_string(props::NAME)?;
        let id = crate::runtime::next_handle_id();

        if inline {
            log::info!("[queue] #{} created in inline mode", id);
        }
        log::debug!(
            "[queue] #{} created (name={:?}, policy={}, max={}, amount={})",
            id,
            name,
            discard.policy.as_str(),
            discard.max_events,
            discard.amount
        );

        Ok(Self {
            shared: Arc::new(QueueShared {
                id,
                name,
                discard,
                inline,
                realm,
                state: Mutex::new(QueueState::default()),
                cond: Condvar::new(),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    pub fn discard_policy(&self) -> DiscardPolicy {
        self.shared.discard.policy
    }

    pub fn is_inline(&self) -> bool {
        self.shared.inline
    }

    /// Number of queued events.
    pub fn count(&self) -> Result<usize> {
        let state = self.shared.state.lock();
        if state.is_destroyed() {
            return Err(Error::IllegalState("queue is destroyed".into()));
        }
        Ok(state.len())
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.state.lock().is_destroyed()
    }

    pub(crate) fn downgrade(&self) -> Weak<QueueShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn ptr_eq_shared(&self, other: &Weak<QueueShared>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.shared), other.as_ptr())
    }

    pub(crate) fn from_shared(shared: Arc<QueueShared>) -> Self {
        Self { shared }
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    /// Attach `subscriber`; its messages will reach `callback` with `closure`.
    ///
    /// Fails with `AlreadyExists` when the subscriber is attached to a queue,
    /// and with `IllegalState` while a previous removal is still completing
    /// or when this queue is destroyed.
    pub fn add_subscriber(
        &self,
        subscriber: &crate::subscriber::Subscriber,
        callback: MessageCallback,
        closure: Option<Closure>,
    ) -> Result<()> {
        subscriber.attach(self, callback, closure)
    }

    /// Detach `subscriber`. Messages already queued are still dispatched;
    /// `done` runs after the last of their callbacks returns.
    pub fn remove_subscriber(
        &self,
        subscriber: &crate::subscriber::Subscriber,
        done: Option<CompletionCallback>,
    ) -> Result<()> {
        subscriber.detach(self, done)
    }

    pub(crate) fn register_source(&self, source: u64) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.is_destroyed() {
            return Err(Error::IllegalState("queue is destroyed".into()));
        }
        state.register_source(source);
        Ok(())
    }

    /// Retire a source; returns completions ready to run.
    pub(crate) fn retire_source(
        &self,
        source: u64,
        done: Option<CompletionCallback>,
    ) -> Vec<CompletionCallback> {
        let mut state = self.shared.state.lock();
        state.retire_source(source, done);
        state.take_ready()
    }

    /// Append messages delivered to `source`. Returns the number discarded.
    pub(crate) fn enqueue(
        &self,
        source: u64,
        callback: &MessageCallback,
        closure: &Option<Closure>,
        messages: Vec<InboundMessage>,
    ) -> usize {
        if messages.is_empty() {
            return 0;
        }
        let mut state = self.shared.state.lock();
        let lost = state.push_messages(self.shared.discard, source, callback, closure, messages);
        if !state.is_empty() {
            self.shared.cond.notify_all();
        }
        lost
    }

    /// Publish the data loss advisory for `lost` discarded messages.
    pub(crate) fn report_loss(&self, lost: usize) {
        self.shared.report_loss(lost);
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Start a timer firing every `interval` seconds until destroyed.
    pub fn create_timer(
        &self,
        interval: f64,
        callback: TimerCallback,
        closure: Option<Closure>,
    ) -> Result<Timer> {
        if interval.is_nan() || interval <= 0.0 {
            return Err(Error::InvalidArg(format!(
                "timer interval must be positive, got {}",
                interval
            )));
        }
        let interval = Duration::try_from_secs_f64(interval)
            .map_err(|e| Error::InvalidArg(format!("timer interval: {}", e)))?;
        let id = crate::runtime::next_handle_id();
        self.register_source(id)?;

        let shared = Arc::new(TimerShared {
            id,
            interval,
            callback,
            closure,
        });
        match Timer::start(shared, self.downgrade()) {
            Ok(timer) => Ok(timer),
            Err(e) => {
                self.shared.retire_timer(id, None);
                Err(e)
            }
        }
    }

    /// Stop `timer`, drop its queued firing, and run `done` once no callback
    /// for it is executing.
    pub fn destroy_timer(&self, timer: Timer, done: Option<CompletionCallback>) -> Result<()> {
        if !timer.belongs_to(&self.shared) {
            return Err(Error::InvalidArg("timer belongs to another queue".into()));
        }
        let (id, _) = timer.shutdown();
        self.shared.retire_timer(id, done);
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dispatch one batch, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `Ok(())` both when a batch ran and when the wait elapsed.
    /// Calling this from inside any queue callback is `IllegalState`, as is
    /// dispatching a destroyed queue.
    pub fn dispatch(&self, timeout: impl Into<Timeout>) -> Result<()> {
        if CallbackScope::active() {
            return Err(Error::IllegalState(
                "dispatch called from inside a callback".into(),
            ));
        }
        let timeout = timeout.into();

        let batch = {
            let mut state = self.shared.state.lock();
            if state.is_destroyed() {
                return Err(Error::IllegalState("queue is destroyed".into()));
            }
            if state.is_empty() {
                self.wait_for_event(&mut state, timeout);
                if state.is_destroyed() {
                    return Err(Error::IllegalState("queue destroyed while waiting".into()));
                }
            }
            state.pop_batch()
        };

        if let Some(batch) = batch {
            self.run_batch(batch);
        }
        Ok(())
    }

    fn wait_for_event(&self, state: &mut parking_lot::MutexGuard<'_, QueueState>, timeout: Timeout) {
        let deadline = match timeout {
            Timeout::NoWait => return,
            Timeout::Forever => None,
            Timeout::After(d) => Instant::now().checked_add(d),
        };
        while state.is_empty() && !state.is_destroyed() {
            match deadline {
                None => self.shared.cond.wait(state),
                Some(deadline) => {
                    if self.shared.cond.wait_until(state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
    }

    fn run_batch(&self, batch: Batch) {
        let mut status = Status::new();
        let sources = {
            let _scope = CallbackScope::enter();
            match batch {
                Batch::Messages {
                    callback,
                    mut messages,
                    closures,
                    sources,
                } => {
                    callback(&mut status, self, messages.as_mut_slice(), closures.as_slice());
                    sources
                }
                Batch::Timer(timer) => {
                    (timer.callback)(&mut status, self, timer.id, timer.closure.as_ref());
                    vec![timer.id]
                }
            }
        };
        if let Some(err) = status.error() {
            log::debug!("[queue] {} callback reported: {}", self.shared.label(), err);
        }

        let ready = {
            let mut state = self.shared.state.lock();
            state.finish_batch(&sources);
            state.take_ready()
        };
        self.shared.run_ready(ready);
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Destroy the queue. See [`EventQueue::destroy_ex`].
    pub fn destroy(&self) -> Result<()> {
        self.destroy_ex(None)
    }

    /// Destroy the queue, dropping queued events and stopping its timers.
    ///
    /// Subscribers stay attached until removed, but receive nothing more.
    /// `done` runs once no callback of this queue is executing.
    pub fn destroy_ex(&self, done: Option<CompletionCallback>) -> Result<()> {
        let ready = {
            let mut state = self.shared.state.lock();
            if !state.destroy(done) {
                return Err(Error::IllegalState("queue already destroyed".into()));
            }
            self.shared.cond.notify_all();
            state.take_ready()
        };
        log::debug!("[queue] {} destroyed", self.shared.label());
        self.shared.run_ready(ready);
        Ok(())
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("discard", &self.shared.discard)
            .finish()
    }
}
