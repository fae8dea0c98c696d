//! Crawl orchestration
//!
//! The orchestrator spawns one task per worker. Each worker runs a
//! fetch → write → count cycle against its own month partition until the
//! shared total reaches the target or it walks past the earliest year:
//!
//! 1. Check the global total and stop if the target is reached
//! 2. Move to the previous month if the partition threshold is reached
//! 3. Fetch the page at the cursor through the retry loop
//! 4. Upsert the page and add its size to the progress counters
//! 5. Advance the cursor, or the partition when the API has no more pages
//!
//! Workers share only the search client, the writer and the counters. A worker
//! that fails stops alone; the others keep going.

use crate::config::Config;
use crate::crawler::fetcher::{FetchResult, SearchApi};
use crate::crawler::query::SearchCriteria;
use crate::crawler::retry::{FetchOutcome, RetryLoop, RetryPolicy};
use crate::crawler::scheduler::{initial_partitions, DatePartitionScheduler, YearMonth};
use crate::state::{ProgressCounters, Reconciliation, WorkerState};
use crate::storage::{BatchUpsertWriter, RepositoryStore};
use crate::CrawlerError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Run-wide parameters shared by every worker
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Base search filters; each worker adds its partition's date range
    pub criteria: SearchCriteria,
    /// Global number of records after which workers stop
    pub target: u64,
    pub num_workers: usize,
    /// Partition of the first worker; the others start one month earlier each
    pub start: YearMonth,
    pub partition_threshold: u64,
    pub earliest_year: Option<i32>,
    pub retry: RetryPolicy,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Result<Self, CrawlerError> {
        let crawler = &config.crawler;
        let start = YearMonth::new(crawler.start_year, crawler.start_month).ok_or(
            CrawlerError::InvalidPartition {
                year: crawler.start_year,
                month: crawler.start_month,
            },
        )?;

        Ok(Self {
            criteria: SearchCriteria::from_config(&config.search, crawler.batch_size),
            target: crawler.total_num_repo,
            num_workers: crawler.num_threads,
            start,
            partition_threshold: crawler.partition_threshold,
            earliest_year: Some(crawler.earliest_year),
            retry: RetryPolicy::from_config(crawler),
        })
    }
}

/// Why a worker finished without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// The worker walked past the earliest crawlable month
    PartitionsExhausted,
}

/// A worker that finished normally
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub state: WorkerState,
    pub reason: StopReason,
}

/// A worker that stopped on an error or panicked
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub error: String,
    /// State at the worker's last checkpoint
    pub last_state: WorkerState,
}

/// Outcome of a crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub target: u64,
    /// Global count of committed records
    pub total: u64,
    /// Committed records per worker, indexed by worker id
    pub per_worker: Vec<u64>,
    pub reconciliation: Reconciliation,
    pub wall_time: Duration,
    pub fetch_time: Duration,
    pub write_time: Duration,
    pub fetch_ops: u64,
    pub write_ops: u64,
    pub workers: Vec<WorkerSummary>,
    pub failures: Vec<WorkerFailure>,
}

impl CrawlReport {
    /// Whether at least one worker failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn avg_fetch_time(&self) -> Option<Duration> {
        average(self.fetch_time, self.fetch_ops)
    }

    pub fn avg_write_time(&self) -> Option<Duration> {
        average(self.write_time, self.write_ops)
    }

    /// Cumulative fetch and write time divided by wall-clock time
    pub fn parallel_speedup(&self) -> Option<f64> {
        let wall = self.wall_time.as_secs_f64();
        (wall > 0.0).then(|| (self.fetch_time + self.write_time).as_secs_f64() / wall)
    }

    pub fn records_per_second(&self) -> Option<f64> {
        let wall = self.wall_time.as_secs_f64();
        (wall > 0.0).then(|| self.total as f64 / wall)
    }
}

fn average(total: Duration, ops: u64) -> Option<Duration> {
    u32::try_from(ops)
        .ok()
        .filter(|&ops| ops > 0)
        .map(|ops| total / ops)
}

/// Runs a pool of workers against a search API and a repository store
pub struct CrawlOrchestrator<A: ?Sized, S> {
    api: Arc<A>,
    writer: Arc<BatchUpsertWriter<S>>,
    settings: CrawlSettings,
}

impl<A, S> CrawlOrchestrator<A, S>
where
    A: SearchApi + ?Sized + 'static,
    S: RepositoryStore + 'static,
{
    pub fn new(api: Arc<A>, writer: Arc<BatchUpsertWriter<S>>, settings: CrawlSettings) -> Self {
        Self {
            api,
            writer,
            settings,
        }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Spawns every worker and waits for all of them
    ///
    /// Worker failures never fail the run; they are logged and listed in the
    /// report. A mismatch between the per-worker counters and the global
    /// counter is logged as a warning.
    pub async fn run(&self) -> CrawlReport {
        let settings = &self.settings;
        let progress = Arc::new(ProgressCounters::new(settings.num_workers));
        let scheduler = DatePartitionScheduler::new(
            settings.partition_threshold,
            settings.earliest_year,
        );
        let retry = RetryLoop::new(settings.retry);

        tracing::info!(
            "Starting {} workers from {} with target {}",
            settings.num_workers,
            settings.start,
            settings.target
        );

        let started = Instant::now();
        let mut handles = Vec::with_capacity(settings.num_workers);

        for (worker_id, partition) in initial_partitions(settings.start, settings.num_workers)
            .into_iter()
            .enumerate()
        {
            let state = WorkerState::new(worker_id, partition);
            let checkpoint = Arc::new(Mutex::new(state.clone()));
            let worker = Worker {
                api: Arc::clone(&self.api),
                writer: Arc::clone(&self.writer),
                progress: Arc::clone(&progress),
                scheduler: scheduler.clone(),
                retry: retry.clone(),
                criteria: settings.criteria.clone(),
                target: settings.target,
                checkpoint: Arc::clone(&checkpoint),
            };

            tracing::info!("{} starting at {}", state.label(), partition);
            handles.push((worker_id, checkpoint, tokio::spawn(worker.run(state))));
        }

        let mut workers = Vec::new();
        let mut failures = Vec::new();

        for (worker_id, checkpoint, handle) in handles {
            let error = match handle.await {
                Ok(Ok(summary)) => {
                    tracing::info!(
                        "{} finished ({:?}) in {} after {} partitions",
                        summary.state.label(),
                        summary.reason,
                        summary.state.partition,
                        summary.state.partitions_visited
                    );
                    workers.push(summary);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(join_error) => CrawlerError::WorkerPanicked {
                    worker_id,
                    message: join_error.to_string(),
                },
            };

            let last_state = checkpoint
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            tracing::error!(
                "worker-{} failed: {} (last checkpoint: {:?})",
                worker_id,
                error,
                last_state
            );
            failures.push(WorkerFailure {
                worker_id,
                error: error.to_string(),
                last_state,
            });
        }

        let wall_time = started.elapsed();
        let reconciliation = progress.reconcile();
        if !reconciliation.is_consistent() {
            tracing::warn!(
                "Count mismatch: workers sum to {}, global counter is {} (difference {})",
                reconciliation.worker_sum,
                reconciliation.global,
                reconciliation.difference()
            );
        }

        let snapshot = progress.snapshot();
        CrawlReport {
            target: settings.target,
            total: snapshot.total,
            per_worker: snapshot.per_worker,
            reconciliation,
            wall_time,
            fetch_time: snapshot.fetch_time,
            write_time: snapshot.write_time,
            fetch_ops: snapshot.fetch_ops,
            write_ops: snapshot.write_ops,
            workers,
            failures,
        }
    }
}

/// One worker's share of the run
struct Worker<A: ?Sized, S> {
    api: Arc<A>,
    writer: Arc<BatchUpsertWriter<S>>,
    progress: Arc<ProgressCounters>,
    scheduler: DatePartitionScheduler,
    retry: RetryLoop,
    criteria: SearchCriteria,
    target: u64,
    checkpoint: Arc<Mutex<WorkerState>>,
}

impl<A, S> Worker<A, S>
where
    A: SearchApi + ?Sized,
    S: RepositoryStore,
{
    async fn run(self, mut state: WorkerState) -> Result<WorkerSummary, CrawlerError> {
        loop {
            if self.progress.target_reached(self.target) {
                return Ok(self.finish(state, StopReason::TargetReached));
            }

            if self.scheduler.is_partition_full(&state) {
                self.scheduler.advance(&mut state);
                self.save_checkpoint(&state);
            }

            if self.scheduler.is_exhausted(state.partition) {
                return Ok(self.finish(state, StopReason::PartitionsExhausted));
            }

            let (start, end) = state.partition.date_range()?;
            let criteria = self.criteria.with_date_range(start, end);

            match self
                .retry
                .fetch(self.api.as_ref(), &criteria, &mut state)
                .await
            {
                FetchOutcome::Page { result, elapsed } => {
                    self.progress.record_fetch(elapsed);
                    self.handle_page(&mut state, result);
                }
                FetchOutcome::Abandoned { last_error } => {
                    tracing::warn!(
                        "{} abandoning {}: {}",
                        state.label(),
                        state.partition,
                        last_error
                    );
                    state.record_abandoned();
                    self.scheduler.advance(&mut state);
                }
            }

            self.save_checkpoint(&state);
        }
    }

    /// Commits a fetched page and moves the cursor or the partition forward
    fn handle_page(&self, state: &mut WorkerState, result: FetchResult) {
        let count = result.records.len() as u64;

        if count > 0 {
            let write_started = Instant::now();
            match self.writer.write_batch(&result.records) {
                Ok(summary) => {
                    self.progress.record_write(write_started.elapsed());
                    let total = self.progress.record_committed(state.worker_id, count);
                    tracing::info!(
                        "{} ({}) +{} records ({} new, {} updated), total {}/{}",
                        state.label(),
                        state.partition,
                        count,
                        summary.inserted,
                        summary.updated,
                        total,
                        self.target
                    );
                }
                Err(e) => {
                    // The cursor stays put so the same page is fetched again
                    let failed = state.record_write_failure();
                    tracing::warn!(
                        "{} ({}) failed to store page, will fetch it again: {} ({} failed writes)",
                        state.label(),
                        state.partition,
                        e,
                        failed
                    );
                    return;
                }
            }
        }

        let exhausted = !result.has_next_page || result.end_cursor.is_none();
        state.record_page(count, result.end_cursor);
        if exhausted {
            tracing::debug!(
                "{} ({}) no more pages, {} of {} reported results fetched",
                state.label(),
                state.partition,
                state.fetched_in_partition,
                result.repository_count
            );
            self.scheduler.advance(state);
        }
    }

    fn save_checkpoint(&self, state: &WorkerState) {
        *self.checkpoint.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
    }

    fn finish(&self, state: WorkerState, reason: StopReason) -> WorkerSummary {
        self.save_checkpoint(&state);
        WorkerSummary { state, reason }
    }
}
