//! Health counters for a pollable source.
//!
//! The polling worker is the only writer; a monitoring task may hold another
//! `Arc<SourceCounter>` and call [`SourceCounter::snapshot`] at any time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{CycleError, FailureKind};

/// The most recent failure cause.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time copy of all counters, safe to serialize for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub name: String,
    pub running: bool,
    pub events_received: u64,
    pub failures: u64,
    pub transform_failures: u64,
    pub queue_failures: u64,
    pub downstream_failures: u64,
    pub events_discarded: u64,
    pub batches_dispatched: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureRecord>,
}

/// Received/failure counters with a start/stop lifecycle.
#[derive(Debug)]
pub struct SourceCounter {
    name: String,
    running: AtomicBool,
    events_received: AtomicU64,
    failures: AtomicU64,
    transform_failures: AtomicU64,
    queue_failures: AtomicU64,
    downstream_failures: AtomicU64,
    events_discarded: AtomicU64,
    batches_dispatched: AtomicU64,
    started_at: RwLock<Option<DateTime<Utc>>>,
    stopped_at: RwLock<Option<DateTime<Utc>>>,
    last_failure: RwLock<Option<FailureRecord>>,
}

// A poisoned lock only means a reader panicked; the value is still usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl SourceCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: AtomicBool::new(false),
            events_received: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            transform_failures: AtomicU64::new(0),
            queue_failures: AtomicU64::new(0),
            downstream_failures: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            started_at: RwLock::new(None),
            stopped_at: RwLock::new(None),
            last_failure: RwLock::new(None),
        }
    }

    /// Reset every count and begin counting.
    pub fn start(&self) {
        for counter in [
            &self.events_received,
            &self.failures,
            &self.transform_failures,
            &self.queue_failures,
            &self.downstream_failures,
            &self.events_discarded,
            &self.batches_dispatched,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *write(&self.last_failure) = None;
        *write(&self.stopped_at) = None;
        *write(&self.started_at) = Some(Utc::now());
        self.running.store(true, Ordering::Release);
        debug!(counter = %self.name, "counter started");
    }

    /// Stop counting. Totals stay readable until the next `start`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        *write(&self.stopped_at) = Some(Utc::now());
        debug!(counter = %self.name, "counter stopped");
    }

    pub fn add_received(&self, n: u64) {
        self.events_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one failed cycle and keep `err` as the latest cause.
    pub fn record_failure(&self, err: &CycleError) {
        let kind = err.kind();
        self.failures.fetch_add(1, Ordering::Relaxed);
        let per_kind = match kind {
            FailureKind::Transform => &self.transform_failures,
            FailureKind::Queue => &self.queue_failures,
            FailureKind::Downstream => &self.downstream_failures,
        };
        per_kind.fetch_add(1, Ordering::Relaxed);
        *write(&self.last_failure) = Some(FailureRecord {
            kind,
            message: err.to_string(),
            at: Utc::now(),
        });
    }

    /// Count events that were taken off the queue but never dispatched.
    pub fn add_discarded(&self, n: u64) {
        self.events_discarded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_batch_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            name: self.name.clone(),
            running: self.is_running(),
            events_received: self.events_received(),
            failures: self.failures(),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            queue_failures: self.queue_failures.load(Ordering::Relaxed),
            downstream_failures: self.downstream_failures.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            started_at: *read(&self.started_at),
            stopped_at: *read(&self.stopped_at),
            last_failure: read(&self.last_failure).clone(),
        }
    }
}
