// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conditions - event notification predicates for waitsets.
//!
//! A condition wakes every waitset it is attached to when its trigger value
//! flips to `true`. Waitsets register a [`WaitsetSignal`] with each attached
//! condition; conditions only keep weak references to those signals.

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Base interface of everything a [`crate::waitset::WaitSet`] can block on.
pub trait Condition: Send + Sync {
    fn get_trigger_value(&self) -> bool;

    /// Unique identifier (stable for the lifetime of the condition).
    fn condition_id(&self) -> u64;

    /// Register a waitset signal so this condition can wake blocked waiters.
    fn add_waitset_signal(&self, signal: Arc<WaitsetSignal>);

    fn remove_waitset_signal(&self, signal_id: u64);

    /// Downcast support for dynamic condition handling.
    fn as_any(&self) -> &dyn Any;
}

/// Wake-up latch shared between a waitset and its conditions.
pub struct WaitsetSignal {
    id: u64,
    raised: Mutex<bool>,
    cvar: Condvar,
}

impl WaitsetSignal {
    pub fn new() -> Self {
        Self {
            id: next_id(),
            raised: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn signal(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.cvar.notify_all();
    }

    /// Clear the latch before re-evaluating conditions.
    pub fn reset(&self) {
        *self.raised.lock() = false;
    }

    /// Block until raised or `deadline` passes. Returns whether it was raised.
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut raised = self.raised.lock();
        while !*raised {
            match deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut raised, deadline).timed_out() {
                        return *raised;
                    }
                }
                None => self.cvar.wait(&mut raised),
            }
        }
        true
    }
}

impl Default for WaitsetSignal {
    fn default() -> Self {
        Self::new()
    }
}

struct WaitsetHook {
    id: u64,
    signal: Weak<WaitsetSignal>,
}

/// Registered waitset signals of a condition.
#[derive(Default)]
pub(crate) struct WaitsetHooks {
    hooks: Mutex<Vec<WaitsetHook>>,
}

impl WaitsetHooks {
    pub(crate) fn add(&self, signal: &Arc<WaitsetSignal>) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| hook.signal.upgrade().is_some());
        hooks.push(WaitsetHook {
            id: signal.id(),
            signal: Arc::downgrade(signal),
        });
    }

    pub(crate) fn remove(&self, signal_id: u64) {
        self.hooks.lock().retain(|hook| hook.id != signal_id);
    }

    pub(crate) fn notify(&self) {
        self.hooks.lock().retain(|hook| {
            if let Some(signal) = hook.signal.upgrade() {
                signal.signal();
                true
            } else {
                false
            }
        });
    }
}

/// Manually-triggered condition.
///
/// Used for the graph change notification, for the listener thread's
/// shutdown wake-up, and as the data condition of loopback readers.
pub struct GuardCondition {
    id: u64,
    trigger_value: AtomicBool,
    hooks: WaitsetHooks,
}

impl GuardCondition {
    pub fn new() -> Self {
        Self {
            id: next_id(),
            trigger_value: AtomicBool::new(false),
            hooks: WaitsetHooks::default(),
        }
    }

    /// When set to `true`, any waitset waiting on this condition wakes up.
    pub fn set_trigger_value(&self, value: bool) {
        self.trigger_value.store(value, Ordering::Release);
        if value {
            self.hooks.notify();
        }
    }

    /// Convenience for `set_trigger_value(true)`.
    pub fn trigger(&self) {
        self.set_trigger_value(true);
    }

    /// Read and clear the trigger value.
    pub fn take_trigger(&self) -> bool {
        self.trigger_value.swap(false, Ordering::AcqRel)
    }
}

impl Condition for GuardCondition {
    fn get_trigger_value(&self) -> bool {
        self.trigger_value.load(Ordering::Acquire)
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<WaitsetSignal>) {
        self.hooks.add(&signal);
        if self.get_trigger_value() {
            signal.signal();
        }
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.remove(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Default for GuardCondition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn guard_condition_signals_attached_waitset() {
        let guard = GuardCondition::new();
        let signal = Arc::new(WaitsetSignal::new());
        guard.add_waitset_signal(Arc::clone(&signal));

        assert!(!signal.wait_until(Some(Instant::now() + Duration::from_millis(10))));
        guard.trigger();
        assert!(signal.wait_until(Some(Instant::now())));
        assert!(guard.take_trigger());
        assert!(!guard.get_trigger_value());
    }

    #[test]
    fn already_triggered_guard_raises_on_attach() {
        let guard = GuardCondition::new();
        guard.trigger();
        let signal = Arc::new(WaitsetSignal::new());
        guard.add_waitset_signal(Arc::clone(&signal));
        assert!(signal.wait_until(Some(Instant::now())));
    }

    #[test]
    fn removed_signal_is_not_raised() {
        let guard = GuardCondition::new();
        let signal = Arc::new(WaitsetSignal::new());
        guard.add_waitset_signal(Arc::clone(&signal));
        guard.remove_waitset_signal(signal.id());
        guard.trigger();
        assert!(!signal.wait_until(Some(Instant::now() + Duration::from_millis(5))));
    }

    #[test]
    fn condition_ids_are_unique() {
        let a = GuardCondition::new();
        let b = GuardCondition::new();
        assert_ne!(a.condition_id(), b.condition_id());
    }
}
