//! Dispatch event tracing and metrics.
//!
//! The dispatcher reports every local/remote decision, remote outcome and
//! conflict through a [`DispatchObserver`]. Observation is opt-in: the
//! default [`NoOpObserver`] does nothing. [`MetricsObserver`] aggregates
//! counters and keeps a bounded log of recent events for diagnostics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use remtx_types::{ActionId, ObjectId};
use serde::Serialize;

/// Default capacity of the recent-event log.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// DispatchEvent
// ---------------------------------------------------------------------------

/// A single event emitted by the action dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DispatchEvent {
    /// The action ran in-process.
    LocalExecution {
        action: ActionId,
        timestamp_ns: u64,
    },

    /// The action was submitted to the remote facade.
    RemoteSubmitted {
        action: ActionId,
        /// Target identity, if the target had one when encoded.
        target: Option<ObjectId>,
        parameters: usize,
        timestamp_ns: u64,
    },

    /// The remote call returned and its results were applied locally.
    RemoteApplied {
        action: ActionId,
        updates: usize,
        disposed: usize,
        messages: usize,
        warnings: usize,
        timestamp_ns: u64,
    },

    /// A stale object was reloaded after a conflict.
    ConflictReloaded {
        action: ActionId,
        oid: ObjectId,
        timestamp_ns: u64,
    },

    /// A conflict with no identifiable source object was re-raised.
    ConflictUnrecoverable {
        action: ActionId,
        timestamp_ns: u64,
    },

    /// The remote call failed for a reason other than a conflict.
    RemoteFailed {
        action: ActionId,
        category: FailureCategory,
        timestamp_ns: u64,
    },
}

/// Non-conflict remote failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureCategory {
    Transport,
    Server,
}

impl DispatchEvent {
    #[must_use]
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Self::LocalExecution { timestamp_ns, .. }
            | Self::RemoteSubmitted { timestamp_ns, .. }
            | Self::RemoteApplied { timestamp_ns, .. }
            | Self::ConflictReloaded { timestamp_ns, .. }
            | Self::ConflictUnrecoverable { timestamp_ns, .. }
            | Self::RemoteFailed { timestamp_ns, .. } => *timestamp_ns,
        }
    }

    #[must_use]
    pub fn action(&self) -> &ActionId {
        match self {
            Self::LocalExecution { action, .. }
            | Self::RemoteSubmitted { action, .. }
            | Self::RemoteApplied { action, .. }
            | Self::ConflictReloaded { action, .. }
            | Self::ConflictUnrecoverable { action, .. }
            | Self::RemoteFailed { action, .. } => action,
        }
    }

    /// Whether this event reports a concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConflictReloaded { .. } | Self::ConflictUnrecoverable { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// DispatchObserver
// ---------------------------------------------------------------------------

/// Observer for dispatch events.
///
/// Called synchronously on the dispatch path; implementations must not block.
pub trait DispatchObserver: Send + Sync {
    fn on_event(&self, event: &DispatchEvent);

    /// Monotonic timestamp used for emitted events. Zero when the observer
    /// has no clock.
    fn now_ns(&self) -> u64 {
        0
    }
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl DispatchObserver for NoOpObserver {
    #[inline(always)]
    fn on_event(&self, _event: &DispatchEvent) {}
}

// ---------------------------------------------------------------------------
// DispatchRingBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity log of recent events; the oldest entry is overwritten
/// when full.
pub struct DispatchRingBuffer {
    events: Mutex<RingBuf>,
}

struct RingBuf {
    buf: Vec<DispatchEvent>,
    capacity: usize,
    head: usize,
    len: usize,
}

impl RingBuf {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, event: DispatchEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() < self.capacity {
            self.buf.push(event);
            self.len += 1;
            return;
        }
        self.buf[self.head] = event;
        self.head = (self.head + 1) % self.capacity;
    }

    fn ordered(&self) -> Vec<DispatchEvent> {
        (0..self.len)
            .map(|i| self.buf[(self.head + i) % self.capacity].clone())
            .collect()
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
        self.len = 0;
    }
}

impl DispatchRingBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(RingBuf::new(capacity)),
        }
    }

    pub fn push(&self, event: DispatchEvent) {
        self.events.lock().push(event);
    }

    /// All stored events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DispatchEvent> {
        self.events.lock().ordered()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.events.lock().capacity
    }
}

// ---------------------------------------------------------------------------
// DispatchMetrics
// ---------------------------------------------------------------------------

/// Aggregated dispatch statistics.
///
/// Counters are atomic; the per-object conflict table sits behind a mutex.
pub struct DispatchMetrics {
    pub local_executions: AtomicU64,
    pub remote_submissions: AtomicU64,
    pub remote_applied: AtomicU64,
    /// Objects decoded from remote update lists.
    pub objects_updated: AtomicU64,
    /// Objects reported disposed by the server.
    pub objects_disposed: AtomicU64,
    pub conflicts_total: AtomicU64,
    pub conflicts_reloaded: AtomicU64,
    pub transport_failures: AtomicU64,
    pub server_failures: AtomicU64,
    conflict_hotspots: Mutex<HashMap<ObjectId, u64>>,
    created_at: Instant,
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            local_executions: AtomicU64::new(0),
            remote_submissions: AtomicU64::new(0),
            remote_applied: AtomicU64::new(0),
            objects_updated: AtomicU64::new(0),
            objects_disposed: AtomicU64::new(0),
            conflicts_total: AtomicU64::new(0),
            conflicts_reloaded: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            server_failures: AtomicU64::new(0),
            conflict_hotspots: Mutex::new(HashMap::new()),
            created_at: Instant::now(),
        }
    }

    pub fn record(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::LocalExecution { .. } => {
                self.local_executions.fetch_add(1, Ordering::Relaxed);
            }
            DispatchEvent::RemoteSubmitted { .. } => {
                self.remote_submissions.fetch_add(1, Ordering::Relaxed);
            }
            DispatchEvent::RemoteApplied {
                updates, disposed, ..
            } => {
                self.remote_applied.fetch_add(1, Ordering::Relaxed);
                self.objects_updated
                    .fetch_add(*updates as u64, Ordering::Relaxed);
                self.objects_disposed
                    .fetch_add(*disposed as u64, Ordering::Relaxed);
            }
            DispatchEvent::ConflictReloaded { oid, .. } => {
                self.conflicts_total.fetch_add(1, Ordering::Relaxed);
                self.conflicts_reloaded.fetch_add(1, Ordering::Relaxed);
                *self
                    .conflict_hotspots
                    .lock()
                    .entry(oid.clone())
                    .or_insert(0) += 1;
            }
            DispatchEvent::ConflictUnrecoverable { .. } => {
                self.conflicts_total.fetch_add(1, Ordering::Relaxed);
            }
            DispatchEvent::RemoteFailed { category, .. } => {
                let counter = match category {
                    FailureCategory::Transport => &self.transport_failures,
                    FailureCategory::Server => &self.server_failures,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.local_executions,
            &self.remote_submissions,
            &self.remote_applied,
            &self.objects_updated,
            &self.objects_disposed,
            &self.conflicts_total,
            &self.conflicts_reloaded,
            &self.transport_failures,
            &self.server_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.conflict_hotspots.lock().clear();
    }

    /// Top `n` objects by conflict count, most conflicted first.
    #[must_use]
    pub fn top_conflicted(&self, n: usize) -> Vec<(ObjectId, u64)> {
        let mut entries: Vec<(ObjectId, u64)> = {
            let map = self.conflict_hotspots.lock();
            map.iter().map(|(k, &v)| (k.clone(), v)).collect()
        };
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }

    #[must_use]
    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            local_executions: self.local_executions.load(Ordering::Relaxed),
            remote_submissions: self.remote_submissions.load(Ordering::Relaxed),
            remote_applied: self.remote_applied.load(Ordering::Relaxed),
            objects_updated: self.objects_updated.load(Ordering::Relaxed),
            objects_disposed: self.objects_disposed.load(Ordering::Relaxed),
            conflicts_total: self.conflicts_total.load(Ordering::Relaxed),
            conflicts_reloaded: self.conflicts_reloaded.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            server_failures: self.server_failures.load(Ordering::Relaxed),
            elapsed_secs: self.created_at.elapsed().as_secs_f64(),
            top_conflicted: self.top_conflicted(10),
        }
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of [`DispatchMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct DispatchMetricsSnapshot {
    pub local_executions: u64,
    pub remote_submissions: u64,
    pub remote_applied: u64,
    pub objects_updated: u64,
    pub objects_disposed: u64,
    pub conflicts_total: u64,
    pub conflicts_reloaded: u64,
    pub transport_failures: u64,
    pub server_failures: u64,
    pub elapsed_secs: f64,
    pub top_conflicted: Vec<(ObjectId, u64)>,
}

// ---------------------------------------------------------------------------
// MetricsObserver
// ---------------------------------------------------------------------------

/// Observer that feeds both a [`DispatchMetrics`] and a [`DispatchRingBuffer`].
pub struct MetricsObserver {
    metrics: DispatchMetrics,
    log: DispatchRingBuffer,
    epoch: Instant,
}

impl MetricsObserver {
    #[must_use]
    pub fn new(log_capacity: usize) -> Self {
        Self {
            metrics: DispatchMetrics::new(),
            log: DispatchRingBuffer::new(log_capacity),
            epoch: Instant::now(),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn log(&self) -> &DispatchRingBuffer {
        &self.log
    }

    pub fn reset(&self) {
        self.metrics.reset();
        self.log.clear();
    }
}

impl Default for MetricsObserver {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl DispatchObserver for MetricsObserver {
    fn on_event(&self, event: &DispatchEvent) {
        self.metrics.record(event);
        self.log.push(event.clone());
    }

    fn now_ns(&self) -> u64 {
        #[allow(clippy::cast_possible_truncation)] // clamped to u64::MAX
        {
            self.epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
