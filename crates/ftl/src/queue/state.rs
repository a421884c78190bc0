// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lock-protected queue contents.
//!
//! Everything here runs under the queue mutex and never calls user code.
//! Completions that become ready are parked in `ready` and handed to the
//! caller, which runs them after the lock is released.
//!
//! # Source accounting
//!
//! Every subscriber and timer feeding the queue is a *source*. A source's
//! `pending` count covers its queued events plus events whose callback is
//! currently running. Retiring a source (subscriber removal, timer
//! destruction) arms its completions; they become ready when `pending`
//! drops to zero.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use super::event::{Event, InboundMessage};
use super::timer::TimerShared;
use super::{Closure, CompletionCallback, DiscardPolicy, MessageCallback};

/// Immutable overflow settings of one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DiscardConfig {
    pub(crate) policy: DiscardPolicy,
    pub(crate) max_events: usize,
    pub(crate) amount: usize,
}

impl DiscardConfig {
    pub(crate) const UNBOUNDED: DiscardConfig = DiscardConfig {
        policy: DiscardPolicy::None,
        max_events: 0,
        amount: 1,
    };
}

#[derive(Default)]
struct SourceEntry {
    pending: usize,
    retiring: bool,
    completions: Vec<CompletionCallback>,
}

/// Work removed from the head of the queue by one dispatch.
pub(crate) enum Batch {
    Messages {
        callback: MessageCallback,
        messages: Vec<InboundMessage>,
        closures: Vec<Option<Closure>>,
        sources: Vec<u64>,
    },
    Timer(Arc<TimerShared>),
}

impl Batch {
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        match self {
            Batch::Messages { messages, .. } => messages.len(),
            Batch::Timer(_) => 1,
        }
    }
}

#[derive(Default)]
pub(crate) struct QueueState {
    events: VecDeque<Event>,
    message_count: usize,
    sources: HashMap<u64, SourceEntry>,
    queued_timers: HashSet<u64>,
    in_dispatch: usize,
    destroyed: bool,
    destroy_completion: Option<CompletionCallback>,
    last_loss: Option<Instant>,
    ready: Vec<CompletionCallback>,
}

impl QueueState {
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Completions that became ready since the last call.
    pub(crate) fn take_ready(&mut self) -> Vec<CompletionCallback> {
        std::mem::take(&mut self.ready)
    }

    pub(crate) fn register_source(&mut self, source: u64) {
        self.sources.entry(source).or_default();
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, source: u64) -> bool {
        self.sources.contains_key(&source)
    }

    /// Arm `completion` for when `source` has nothing queued or running.
    pub(crate) fn retire_source(&mut self, source: u64, completion: Option<CompletionCallback>) {
        let entry = self.sources.entry(source).or_default();
        entry.retiring = true;
        entry.completions.extend(completion);
        if entry.pending == 0 {
            self.release_source(source);
        }
    }

    fn release_source(&mut self, source: u64) {
        if let Some(entry) = self.sources.remove(&source) {
            self.ready.extend(entry.completions);
        }
    }

    fn settle(&mut self, source: u64, count: usize) {
        let Some(entry) = self.sources.get_mut(&source) else {
            return;
        };
        entry.pending = entry.pending.saturating_sub(count);
        if entry.pending == 0 && entry.retiring {
            self.release_source(source);
        }
    }

    fn drop_event(&mut self, event: Event) {
        let source = event.source();
        match event {
            Event::Message { message, .. } => {
                self.message_count -= 1;
                message.discard();
            }
            Event::Timer { timer } => {
                self.queued_timers.remove(&timer.id);
            }
        }
        self.settle(source, 1);
    }

    /// Append messages from one source, applying the discard policy.
    ///
    /// Returns the number of messages discarded. Only message events count
    /// against `max_events`, and only message events are evicted.
    pub(crate) fn push_messages(
        &mut self,
        config: DiscardConfig,
        source: u64,
        callback: &MessageCallback,
        closure: &Option<Closure>,
        messages: Vec<InboundMessage>,
    ) -> usize {
        if self.destroyed {
            messages.into_iter().for_each(InboundMessage::discard);
            return 0;
        }

        let mut lost = 0;
        let accept = match config.policy {
            DiscardPolicy::New => config.max_events.saturating_sub(self.message_count),
            _ => messages.len(),
        };

        let mut incoming = messages.into_iter();
        let mut accepted = 0;
        for message in incoming.by_ref().take(accept) {
            self.events.push_back(Event::Message {
                source,
                callback: Arc::clone(callback),
                closure: closure.clone(),
                message,
            });
            accepted += 1;
        }
        for message in incoming {
            message.discard();
            lost += 1;
        }
        self.message_count += accepted;
        self.sources.entry(source).or_default().pending += accepted;

        if config.policy == DiscardPolicy::Old {
            while self.message_count > config.max_events {
                let evicted = self.evict_oldest(config.amount);
                if evicted == 0 {
                    break;
                }
                lost += evicted;
            }
        }
        lost
    }

    fn evict_oldest(&mut self, amount: usize) -> usize {
        let mut evicted = 0;
        let mut idx = 0;
        while evicted < amount && idx < self.events.len() {
            if !self.events[idx].is_message() {
                idx += 1;
                continue;
            }
            if let Some(event) = self.events.remove(idx) {
                self.drop_event(event);
                evicted += 1;
            }
        }
        evicted
    }

    /// Queue a firing of `timer` unless one is already waiting.
    pub(crate) fn push_timer(&mut self, timer: &Arc<TimerShared>) -> bool {
        if self.destroyed || !self.queued_timers.insert(timer.id) {
            return false;
        }
        self.events.push_back(Event::Timer {
            timer: Arc::clone(timer),
        });
        self.sources.entry(timer.id).or_default().pending += 1;
        true
    }

    /// Drop queued firings of one timer.
    pub(crate) fn purge_timer(&mut self, timer_id: u64) -> usize {
        if !self.queued_timers.contains(&timer_id) {
            return 0;
        }
        let mut purged = Vec::new();
        let mut kept = VecDeque::with_capacity(self.events.len());
        for event in self.events.drain(..) {
            match &event {
                Event::Timer { timer } if timer.id == timer_id => purged.push(event),
                _ => kept.push_back(event),
            }
        }
        self.events = kept;
        let count = purged.len();
        purged.into_iter().for_each(|e| self.drop_event(e));
        count
    }

    /// Remove the next batch: a run of same-callback messages, or one timer.
    pub(crate) fn pop_batch(&mut self) -> Option<Batch> {
        let first = self.events.pop_front()?;
        self.in_dispatch += 1;
        match first {
            Event::Timer { timer } => {
                self.queued_timers.remove(&timer.id);
                Some(Batch::Timer(timer))
            }
            Event::Message {
                source,
                callback,
                closure,
                message,
            } => {
                let mut messages = vec![message];
                let mut closures = vec![closure];
                let mut sources = vec![source];
                while self
                    .events
                    .front()
                    .is_some_and(|next| next.has_callback(&callback))
                {
                    if let Some(Event::Message {
                        source,
                        closure,
                        message,
                        ..
                    }) = self.events.pop_front()
                    {
                        messages.push(message);
                        closures.push(closure);
                        sources.push(source);
                    }
                }
                self.message_count -= messages.len();
                Some(Batch::Messages {
                    callback,
                    messages,
                    closures,
                    sources,
                })
            }
        }
    }

    /// Account for a batch whose callback returned.
    pub(crate) fn finish_batch(&mut self, sources: &[u64]) {
        for &source in sources {
            self.settle(source, 1);
        }
        self.in_dispatch = self.in_dispatch.saturating_sub(1);
        if self.destroyed && self.in_dispatch == 0 {
            if let Some(done) = self.destroy_completion.take() {
                self.ready.push(done);
            }
        }
    }

    /// Mark destroyed and drop everything queued. Returns false when the
    /// queue was already destroyed.
    pub(crate) fn destroy(&mut self, completion: Option<CompletionCallback>) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        while let Some(event) = self.events.pop_front() {
            self.drop_event(event);
        }
        if self.in_dispatch == 0 {
            self.ready.extend(completion);
        } else {
            self.destroy_completion = completion;
        }
        true
    }

    /// Drop everything queued and collect every completion still armed:
    /// retired sources, the deferred destroy completion and ready ones.
    /// Used when the last handle to the queue goes away.
    pub(crate) fn drain_completions(&mut self) -> Vec<CompletionCallback> {
        while let Some(event) = self.events.pop_front() {
            self.drop_event(event);
        }
        let retiring: Vec<u64> = self
            .sources
            .iter()
            .filter(|(_, entry)| entry.retiring)
            .map(|(&id, _)| id)
            .collect();
        for source in retiring {
            self.release_source(source);
        }
        if let Some(done) = self.destroy_completion.take() {
            self.ready.push(done);
        }
        self.take_ready()
    }

    /// Time since the previous loss report, zero for the first one.
    pub(crate) fn note_loss(&mut self, now: Instant) -> std::time::Duration {
        let interval = self
            .last_loss
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or_default();
        self.last_loss = Some(now);
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn callback() -> MessageCallback {
        crate::queue::message_callback(|_, _, _, _| {})
    }

    fn messages(tags: &[i64]) -> Vec<InboundMessage> {
        tags.iter()
            .map(|&tag| {
                let mut msg = Message::new();
                msg.set_long("tag", tag).unwrap();
                InboundMessage::new(msg.frozen_copy(), false, None)
            })
            .collect()
    }

    fn drain_tags(state: &mut QueueState) -> Vec<i64> {
        let mut tags = Vec::new();
        while let Some(batch) = state.pop_batch() {
            if let Batch::Messages {
                messages, sources, ..
            } = batch
            {
                tags.extend(messages.iter().map(|m| m.get_long("tag").unwrap()));
                state.finish_batch(&sources);
            }
        }
        tags
    }

    fn old(max: usize, amount: usize) -> DiscardConfig {
        DiscardConfig {
            policy: DiscardPolicy::Old,
            max_events: max,
            amount,
        }
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut state = QueueState::default();
        let cb = callback();
        let lost = state.push_messages(DiscardConfig::UNBOUNDED, 1, &cb, &None, messages(&[1, 2, 3]));
        assert_eq!(lost, 0);
        assert_eq!(state.len(), 3);
        assert_eq!(drain_tags(&mut state), vec![1, 2, 3]);
    }

    #[test]
    fn test_old_evicts_amount_from_head() {
        let mut state = QueueState::default();
        let cb = callback();
        let cfg = old(4, 2);
        for tag in 0..4 {
            assert_eq!(state.push_messages(cfg, 1, &cb, &None, messages(&[tag])), 0);
        }
        assert_eq!(state.push_messages(cfg, 1, &cb, &None, messages(&[4])), 2);
        assert_eq!(drain_tags(&mut state), vec![2, 3, 4]);
    }

    #[test]
    fn test_old_repeats_for_large_batches() {
        let mut state = QueueState::default();
        let cb = callback();
        let lost = state.push_messages(old(3, 2), 1, &cb, &None, messages(&[0, 1, 2, 3, 4, 5]));
        // 6 -> 4 -> 2
        assert_eq!(lost, 4);
        assert_eq!(drain_tags(&mut state), vec![4, 5]);
    }

    #[test]
    fn test_new_truncates_incoming_tail() {
        let mut state = QueueState::default();
        let cb = callback();
        let cfg = DiscardConfig {
            policy: DiscardPolicy::New,
            max_events: 3,
            amount: 1,
        };
        assert_eq!(state.push_messages(cfg, 1, &cb, &None, messages(&[0, 1])), 0);
        assert_eq!(state.push_messages(cfg, 1, &cb, &None, messages(&[2, 3, 4])), 2);
        assert_eq!(state.push_messages(cfg, 1, &cb, &None, messages(&[5])), 1);
        assert_eq!(drain_tags(&mut state), vec![0, 1, 2]);
    }

    #[test]
    fn test_discard_accounting_is_consistent() {
        for _ in 0..32 {
            let mut state = QueueState::default();
            let cb = callback();
            let max = fastrand::usize(2..20);
            let cfg = old(max, fastrand::usize(1..max));
            let mut sent = 0;
            let mut lost = 0;
            for _ in 0..fastrand::usize(1..10) {
                let n = fastrand::usize(1..8);
                let tags: Vec<i64> = (sent..sent + n as i64).collect();
                sent += n as i64;
                lost += state.push_messages(cfg, 7, &cb, &None, messages(&tags));
                assert!(state.len() <= max);
            }
            let delivered = drain_tags(&mut state);
            assert_eq!(delivered.len() + lost, sent as usize);
            assert!(delivered.windows(2).all(|w| w[0] < w[1]));
            assert!(!state.is_registered(7) || state.sources[&7].pending == 0);
        }
    }

    #[test]
    fn test_batches_split_on_callback_change() {
        let mut state = QueueState::default();
        let a = callback();
        let b = callback();
        let cfg = DiscardConfig::UNBOUNDED;
        state.push_messages(cfg, 1, &a, &None, messages(&[1, 2]));
        state.push_messages(cfg, 2, &b, &None, messages(&[3]));
        state.push_messages(cfg, 1, &a, &None, messages(&[4]));

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            let batch = state.pop_batch()?;
            let len = batch.len();
            if let Batch::Messages { sources, .. } = &batch {
                state.finish_batch(sources);
            }
            Some(len)
        })
        .collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }

    #[test]
    fn test_retire_waits_for_in_flight_batch() {
        let mut state = QueueState::default();
        let cb = callback();
        let fired = Arc::new(AtomicUsize::new(0));
        state.register_source(1);
        state.push_messages(DiscardConfig::UNBOUNDED, 1, &cb, &None, messages(&[1]));

        let batch = state.pop_batch().unwrap();
        let f = Arc::clone(&fired);
        state.retire_source(1, Some(Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(state.take_ready().is_empty());

        if let Batch::Messages { sources, .. } = batch {
            state.finish_batch(&sources);
        }
        let ready = state.take_ready();
        assert_eq!(ready.len(), 1);
        ready.into_iter().for_each(|c| c());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!state.is_registered(1));
    }

    #[test]
    fn test_destroy_defers_completion_while_dispatching() {
        let mut state = QueueState::default();
        let cb = callback();
        state.push_messages(DiscardConfig::UNBOUNDED, 1, &cb, &None, messages(&[1, 2]));
        let batch = state.pop_batch().unwrap();

        assert!(state.destroy(Some(Box::new(|| {}))));
        assert!(!state.destroy(None));
        assert!(state.take_ready().is_empty());
        assert!(state.is_empty());

        if let Batch::Messages { sources, .. } = batch {
            state.finish_batch(&sources);
        }
        assert_eq!(state.take_ready().len(), 1);
    }

    #[test]
    fn test_drain_completions_releases_retired_sources() {
        let mut state = QueueState::default();
        let cb = callback();
        let fired = Arc::new(AtomicUsize::new(0));
        state.register_source(1);
        state.register_source(2);
        state.push_messages(DiscardConfig::UNBOUNDED, 1, &cb, &None, messages(&[1, 2]));

        let f = Arc::clone(&fired);
        state.retire_source(1, Some(Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(state.take_ready().is_empty());

        let ready = state.drain_completions();
        assert_eq!(ready.len(), 1);
        ready.into_iter().for_each(|c| c());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(state.is_empty());
        assert!(!state.is_registered(1));
        // Still attached: nothing armed for it.
        assert!(state.is_registered(2));
    }

    #[test]
    fn test_loss_interval() {
        let mut state = QueueState::default();
        let t0 = Instant::now();
        assert!(state.note_loss(t0).is_zero());
        let later = t0 + std::time::Duration::from_millis(250);
        assert_eq!(state.note_loss(later).as_millis(), 250);
    }
}
