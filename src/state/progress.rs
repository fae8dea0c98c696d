use std::ops::AddAssign;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A single mutex-protected counter
#[derive(Debug, Default)]
pub struct Counter<T> {
    value: Mutex<T>,
}

impl<T> Counter<T>
where
    T: Copy + AddAssign,
{
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }

    /// Adds `amount` and returns the new value
    pub fn increment(&self, amount: T) -> T {
        let mut value = self.lock();
        *value += amount;
        *value
    }

    pub fn get(&self) -> T {
        *self.lock()
    }

    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    // Counters hold plain numbers, so a poisoned lock still holds a usable value
    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of comparing the per-worker counters with the global counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Sum of all per-worker counters
    pub worker_sum: u64,
    /// Value of the global counter
    pub global: u64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.worker_sum == self.global
    }

    /// Absolute difference between the two totals
    pub fn difference(&self) -> u64 {
        self.worker_sum.abs_diff(self.global)
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub per_worker: Vec<u64>,
    pub fetch_time: Duration,
    pub write_time: Duration,
    pub fetch_ops: u64,
    pub write_ops: u64,
}

/// Run-wide progress counters shared by every worker
///
/// Each counter is locked independently. Recording a committed page touches
/// the worker's counter and the global counter in two separate steps, so the
/// two totals are only compared after the run, by [`ProgressCounters::reconcile`].
#[derive(Debug)]
pub struct ProgressCounters {
    total: Counter<u64>,
    per_worker: Vec<Counter<u64>>,
    fetch_time: Counter<Duration>,
    write_time: Counter<Duration>,
    fetch_ops: Counter<u64>,
    write_ops: Counter<u64>,
}

impl ProgressCounters {
    /// Creates counters with a pre-allocated slot for each of `num_workers` workers
    pub fn new(num_workers: usize) -> Self {
        Self {
            total: Counter::new(0),
            per_worker: (0..num_workers).map(|_| Counter::new(0)).collect(),
            fetch_time: Counter::new(Duration::ZERO),
            write_time: Counter::new(Duration::ZERO),
            fetch_ops: Counter::new(0),
            write_ops: Counter::new(0),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.per_worker.len()
    }

    /// Global count of committed records
    pub fn total(&self) -> &Counter<u64> {
        &self.total
    }

    /// Counter for one worker, `None` if the id has no slot
    pub fn worker(&self, worker_id: usize) -> Option<&Counter<u64>> {
        self.per_worker.get(worker_id)
    }

    /// Whether the global count has reached `target`
    pub fn target_reached(&self, target: u64) -> bool {
        self.total.get() >= target
    }

    /// Adds one completed API call to the fetch statistics
    pub fn record_fetch(&self, elapsed: Duration) {
        self.fetch_time.increment(elapsed);
        self.fetch_ops.increment(1);
    }

    /// Adds one committed batch to the write statistics
    pub fn record_write(&self, elapsed: Duration) {
        self.write_time.increment(elapsed);
        self.write_ops.increment(1);
    }

    /// Adds `count` records to the worker's counter and then to the global counter
    ///
    /// Returns the new global total.
    pub fn record_committed(&self, worker_id: usize, count: u64) -> u64 {
        match self.per_worker.get(worker_id) {
            Some(counter) => {
                counter.increment(count);
            }
            None => tracing::warn!(
                "No progress slot for worker {} ({} workers allocated)",
                worker_id,
                self.per_worker.len()
            ),
        }
        self.total.increment(count)
    }

    /// Current value of every per-worker counter, indexed by worker id
    pub fn worker_counts(&self) -> Vec<u64> {
        self.per_worker.iter().map(Counter::get).collect()
    }

    /// Compares the sum of per-worker counters with the global counter
    pub fn reconcile(&self) -> Reconciliation {
        Reconciliation {
            worker_sum: self.worker_counts().iter().sum(),
            global: self.total.get(),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.get(),
            per_worker: self.worker_counts(),
            fetch_time: self.fetch_time.get(),
            write_time: self.write_time.get(),
            fetch_ops: self.fetch_ops.get(),
            write_ops: self.write_ops.get(),
        }
    }
}
