use crate::crawler::YearMonth;

/// Per-worker crawl state
///
/// Owned by exactly one worker and updated only at well-defined checkpoints:
/// after a committed page, after a failed attempt, and when entering a new
/// partition. The last checkpoint is what gets reported if the worker fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerState {
    /// Index into the per-worker counter table
    pub worker_id: usize,

    /// Month currently being crawled
    pub partition: YearMonth,

    /// Records committed from the current partition
    pub fetched_in_partition: u64,

    /// Pagination cursor within the current partition
    pub cursor: Option<String>,

    /// Failed fetch attempts since the last successful fetch
    pub consecutive_failures: u32,

    /// Pages fetched but not stored; each is fetched again from the same cursor
    pub failed_writes: u32,

    /// Partitions entered so far, including the starting one
    pub partitions_visited: u32,

    /// Partitions given up after exhausting retries
    pub partitions_abandoned: u32,
}

impl WorkerState {
    /// Creates the state for a worker starting at `partition`
    pub fn new(worker_id: usize, partition: YearMonth) -> Self {
        Self {
            worker_id,
            partition,
            fetched_in_partition: 0,
            cursor: None,
            consecutive_failures: 0,
            failed_writes: 0,
            partitions_visited: 1,
            partitions_abandoned: 0,
        }
    }

    /// Name used in log output
    pub fn label(&self) -> String {
        format!("worker-{}", self.worker_id)
    }

    /// Records a committed page and moves the cursor past it
    pub fn record_page(&mut self, count: u64, next_cursor: Option<String>) {
        self.fetched_in_partition += count;
        self.cursor = next_cursor;
        self.consecutive_failures = 0;
    }

    /// Records a failed fetch attempt and returns the consecutive failure count
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// Clears the failure streak after a fetch succeeds
    pub fn record_fetch_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Records a page that could not be stored; the cursor is left where it was
    pub fn record_write_failure(&mut self) -> u32 {
        self.failed_writes += 1;
        self.failed_writes
    }

    /// Records that the current partition is being given up
    pub fn record_abandoned(&mut self) {
        self.partitions_abandoned += 1;
    }

    /// Switches to `partition`, clearing the per-partition count, cursor and failures
    pub fn enter_partition(&mut self, partition: YearMonth) {
        self.partition = partition;
        self.fetched_in_partition = 0;
        self.cursor = None;
        self.consecutive_failures = 0;
        self.partitions_visited += 1;
    }
}
