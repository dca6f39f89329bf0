// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WaitSet - blocking wait for condition triggers.
//!
//! This is the blocking wait primitive used by the gossip listener thread and
//! by applications watching the graph guard condition.

use crate::condition::{Condition, WaitsetSignal};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wait until at least one attached condition has `trigger_value == true`.
pub struct WaitSet {
    signal: Arc<WaitsetSignal>,
    conditions: Mutex<Vec<Arc<dyn Condition>>>,
}

impl WaitSet {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(WaitsetSignal::new()),
            conditions: Mutex::new(Vec::new()),
        }
    }

    pub fn attach_condition(&self, condition: Arc<dyn Condition>) -> Result<()> {
        let mut conditions = self.conditions.lock();
        let id = condition.condition_id();
        if conditions.iter().any(|c| c.condition_id() == id) {
            return Err(Error::InvalidArgument(format!(
                "condition {} already attached",
                id
            )));
        }
        condition.add_waitset_signal(Arc::clone(&self.signal));
        conditions.push(condition);
        Ok(())
    }

    pub fn detach_condition(&self, condition: &Arc<dyn Condition>) -> Result<()> {
        let mut conditions = self.conditions.lock();
        let id = condition.condition_id();
        let Some(index) = conditions.iter().position(|c| c.condition_id() == id) else {
            return Err(Error::InvalidArgument(format!("condition {} not attached", id)));
        };
        let removed = conditions.swap_remove(index);
        removed.remove_waitset_signal(self.signal.id());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.conditions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until a condition triggers, returning the triggered ones.
    ///
    /// `None` waits forever. Elapsed timeouts return [`Error::Timeout`].
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Arc<dyn Condition>>> {
        if self.is_empty() {
            return Err(Error::InvalidState("wait on an empty waitset".into()));
        }
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // Reset before evaluating so a trigger racing with the scan
            // leaves the latch raised for the next wait.
            self.signal.reset();

            let triggered: Vec<_> = self
                .conditions
                .lock()
                .iter()
                .filter(|c| c.get_trigger_value())
                .cloned()
                .collect();
            if !triggered.is_empty() {
                return Ok(triggered);
            }

            if !self.signal.wait_until(deadline) {
                return Err(Error::Timeout);
            }
        }
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitSet {
    fn drop(&mut self) {
        for condition in self.conditions.get_mut().drain(..) {
            condition.remove_waitset_signal(self.signal.id());
        }
    }
}
