// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of detached tasks (watchdogs, confidential handoffs).
//!
//! Detached tasks are spawned and never awaited by request handlers, so
//! they are tracked here for diagnostics: `/health` reports how many are
//! live, and decommissioning a client can abort the lot. Finished entries
//! are reaped lazily on access.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task under `name`. A task re-registered under an existing
    /// name replaces (and aborts) its predecessor.
    pub fn register(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        let mut tasks = self.inner.lock();
        if let Some(previous) = tasks.insert(name.into(), handle) {
            previous.abort();
        }
    }

    /// Number of tasks still running.
    pub fn live(&self) -> usize {
        let mut tasks = self.inner.lock();
        tasks.retain(|_, handle| !handle.is_finished());
        tasks.len()
    }

    /// Names of tasks still running.
    pub fn names(&self) -> Vec<String> {
        let mut tasks = self.inner.lock();
        tasks.retain(|_, handle| !handle.is_finished());
        let mut names: Vec<String> = tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Abort everything. Used when a client is decommissioned mid-flight.
    pub fn abort_all(&self) {
        let mut tasks = self.inner.lock();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
