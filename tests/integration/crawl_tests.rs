//! Orchestrator tests with in-process search APIs

use crate::common::{page, record, settings, sqlite_writer, ym};
use async_trait::async_trait;
use star_crawler::crawler::{
    CrawlOrchestrator, FetchError, FetchResult, SearchApi, SearchCriteria, StopReason,
};
use star_crawler::storage::{
    BatchUpsertWriter, PersistedRecord, RepositoryStore, RunRecord, RunStatus, SqliteStorage,
    StorageError, StorageResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Serves fixed pages keyed by (partition start date, cursor); anything else is empty
struct ScriptedApi {
    pages: HashMap<(String, Option<String>), FetchResult>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedApi {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_page(mut self, month_start: &str, cursor: Option<&str>, result: FetchResult) -> Self {
        self.pages
            .insert((month_start.to_string(), cursor.map(str::to_string)), result);
        self
    }
}

#[async_trait]
impl SearchApi for ScriptedApi {
    async fn search(
        &self,
        criteria: &SearchCriteria,
        cursor: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let month = criteria
            .created_after
            .map(|d| d.to_string())
            .unwrap_or_default();
        let key = (month, cursor.map(str::to_string));
        self.calls.lock().unwrap().push(key.clone());
        Ok(self
            .pages
            .get(&key)
            .cloned()
            .unwrap_or_else(|| page(vec![], None)))
    }
}

/// Never runs out of pages; every record has a fresh id
struct EndlessApi {
    next_id: AtomicU64,
}

#[async_trait]
impl SearchApi for EndlessApi {
    async fn search(
        &self,
        criteria: &SearchCriteria,
        _cursor: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let records = (0..criteria.page_size)
            .map(|_| {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                record(&format!("R_{}", id), 10)
            })
            .collect();
        tokio::task::yield_now().await;
        Ok(page(records, Some("more")))
    }
}

/// Panics the first time any worker queries one partition; serves one page otherwise
struct PanickyApi {
    poisoned_month: String,
    tripped: AtomicBool,
}

#[async_trait]
impl SearchApi for PanickyApi {
    async fn search(
        &self,
        criteria: &SearchCriteria,
        _cursor: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let month = criteria
            .created_after
            .map(|d| d.to_string())
            .unwrap_or_default();
        if month == self.poisoned_month && !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("simulated failure for {}", month);
        }
        Ok(page(vec![record(&format!("R_{}", month), 50)], None))
    }
}

/// Lets the first `healthy_writes` transactions through, then fails the next `failures_left`
struct FlakyStore {
    inner: SqliteStorage,
    healthy_writes: u32,
    failures_left: u32,
}

impl RepositoryStore for FlakyStore {
    fn find_existing(&self, ids: &[String]) -> StorageResult<HashMap<String, PersistedRecord>> {
        self.inner.find_existing(ids)
    }

    fn apply_changes(
        &mut self,
        inserts: &[PersistedRecord],
        updates: &[PersistedRecord],
    ) -> StorageResult<()> {
        if self.healthy_writes > 0 {
            self.healthy_writes -= 1;
        } else if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(StorageError::Database("disk I/O error".to_string()));
        }
        self.inner.apply_changes(inserts, updates)
    }

    fn get_record(&self, id: &str) -> StorageResult<Option<PersistedRecord>> {
        self.inner.get_record(id)
    }

    fn count_records(&self) -> StorageResult<u64> {
        self.inner.count_records()
    }

    fn top_starred(&self, limit: usize) -> StorageResult<Vec<PersistedRecord>> {
        self.inner.top_starred(limit)
    }

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.inner.create_run(config_hash)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus, records_fetched: u64) -> StorageResult<()> {
        self.inner.finish_run(run_id, status, records_fetched)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }
}

#[tokio::test]
async fn test_single_worker_stops_at_target() {
    let dir = tempfile::tempdir().unwrap();
    let writer = sqlite_writer(&dir.path().join("crawl.db"));

    let first: Vec<_> = (0..5).map(|i| record(&format!("R_{}", i), 20)).collect();
    let second: Vec<_> = (5..10).map(|i| record(&format!("R_{}", i), 20)).collect();
    let api = Arc::new(
        ScriptedApi::new()
            .with_page("2024-06-01", None, page(first, Some("c1")))
            .with_page("2024-06-01", Some("c1"), page(second, None)),
    );

    let orchestrator =
        CrawlOrchestrator::new(Arc::clone(&api), Arc::clone(&writer), settings(10, 1, 5));
    let report = orchestrator.run().await;

    assert_eq!(report.total, 10);
    assert_eq!(report.per_worker, vec![10]);
    assert!(report.reconciliation.is_consistent());
    assert!(report.failures.is_empty());

    let worker = &report.workers[0];
    assert_eq!(worker.reason, StopReason::TargetReached);
    assert_eq!(worker.state.partitions_visited, 2);
    assert_eq!(worker.state.partition, ym(2024, 5));

    assert_eq!(
        api.calls.lock().unwrap().clone(),
        vec![
            ("2024-06-01".to_string(), None),
            ("2024-06-01".to_string(), Some("c1".to_string())),
        ]
    );

    let store = writer.store().lock().unwrap();
    assert_eq!(store.count_records().unwrap(), 10);
}

#[tokio::test]
async fn test_partition_threshold_moves_worker_on() {
    let dir = tempfile::tempdir().unwrap();
    let writer = sqlite_writer(&dir.path().join("crawl.db"));

    let api = Arc::new(
        ScriptedApi::new()
            .with_page("2024-06-01", None, page(vec![record("A", 1), record("B", 2)], Some("c1")))
            .with_page("2024-06-01", Some("c1"), page(vec![record("C", 3)], Some("c2")))
            .with_page("2024-05-01", None, page(vec![record("D", 4)], None)),
    );

    let mut settings = settings(4, 1, 2);
    settings.partition_threshold = 3;
    let report = CrawlOrchestrator::new(Arc::clone(&api), writer, settings)
        .run()
        .await;

    assert_eq!(report.total, 4);
    let months: Vec<_> = api
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(month, _)| month.clone())
        .collect();
    assert_eq!(months, vec!["2024-06-01", "2024-06-01", "2024-05-01"]);
}

#[tokio::test]
async fn test_workers_share_target_with_bounded_overshoot() {
    let dir = tempfile::tempdir().unwrap();
    let writer = sqlite_writer(&dir.path().join("crawl.db"));
    let api = Arc::new(EndlessApi {
        next_id: AtomicU64::new(0),
    });

    let workers = 3;
    let page_size = 5;
    let target = 23;
    let report = CrawlOrchestrator::new(api, Arc::clone(&writer), settings(target, workers, page_size))
        .run()
        .await;

    assert!(report.total >= target);
    assert!(report.total < target + (workers as u64) * u64::from(page_size));
    assert!(report.reconciliation.is_consistent());
    assert_eq!(report.per_worker.iter().sum::<u64>(), report.total);
    assert_eq!(report.workers.len(), workers);
    assert!(report
        .workers
        .iter()
        .all(|w| w.reason == StopReason::TargetReached));

    let store = writer.store().lock().unwrap();
    assert_eq!(store.count_records().unwrap(), report.total);
}

#[tokio::test]
async fn test_workers_start_on_staggered_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let writer = sqlite_writer(&dir.path().join("crawl.db"));
    let api = Arc::new(ScriptedApi::new());

    let report = CrawlOrchestrator::new(Arc::clone(&api), writer, settings(100, 3, 5))
        .run()
        .await;

    // Every partition is empty, so each worker walks down to the 2024 floor
    assert_eq!(report.total, 0);
    assert!(report
        .workers
        .iter()
        .all(|w| w.reason == StopReason::PartitionsExhausted));

    let starts: HashSet<_> = report
        .workers
        .iter()
        .map(|w| w.state.partitions_visited)
        .collect();
    // Starting at 2024-06, 2024-05 and 2024-04 and stopping at 2023-12
    assert_eq!(starts, HashSet::from([7, 6, 5]));
    assert_eq!(api.calls.lock().unwrap().len(), 6 + 5 + 4);
}

#[tokio::test]
async fn test_panicking_worker_does_not_stop_others() {
    let dir = tempfile::tempdir().unwrap();
    let writer = sqlite_writer(&dir.path().join("crawl.db"));
    let api = Arc::new(PanickyApi {
        poisoned_month: "2024-05-01".to_string(),
        tripped: AtomicBool::new(false),
    });

    let report = CrawlOrchestrator::new(api, Arc::clone(&writer), settings(1000, 2, 5))
        .run()
        .await;

    assert!(report.is_partial());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.workers.len(), 1);

    let failure = &report.failures[0];
    assert!(failure.error.contains("panicked"));
    assert_eq!(failure.last_state.partition, ym(2024, 5));
    assert_eq!(report.workers[0].reason, StopReason::PartitionsExhausted);
    assert!(report.reconciliation.is_consistent());

    // The surviving worker still covers every month from 2024-05 down to 2024-01
    let store = writer.store().lock().unwrap();
    assert_eq!(store.count_records().unwrap(), 6);
}

#[tokio::test]
async fn test_failed_write_refetches_same_page() {
    let store = FlakyStore {
        inner: SqliteStorage::new_in_memory().unwrap(),
        healthy_writes: 1,
        failures_left: 4,
    };
    // Two attempts per batch, so the second page fails twice before it lands
    let writer = Arc::new(BatchUpsertWriter::new(Arc::new(Mutex::new(store)), 2));

    let first: Vec<_> = (0..5).map(|i| record(&format!("R_{}", i), 20)).collect();
    let second: Vec<_> = (5..10).map(|i| record(&format!("R_{}", i), 20)).collect();
    let api = Arc::new(
        ScriptedApi::new()
            .with_page("2024-06-01", None, page(first, Some("c1")))
            .with_page("2024-06-01", Some("c1"), page(second, None)),
    );

    let mut settings = settings(10, 1, 5);
    settings.retry.max_retries = 2;
    let report = CrawlOrchestrator::new(Arc::clone(&api), Arc::clone(&writer), settings)
        .run()
        .await;

    assert_eq!(
        api.calls.lock().unwrap().clone(),
        vec![
            ("2024-06-01".to_string(), None),
            ("2024-06-01".to_string(), Some("c1".to_string())),
            ("2024-06-01".to_string(), Some("c1".to_string())),
            ("2024-06-01".to_string(), Some("c1".to_string())),
        ]
    );

    assert_eq!(report.total, 10);
    assert_eq!(report.per_worker, vec![10]);
    assert!(report.reconciliation.is_consistent());
    assert_eq!(report.fetch_ops, 4);
    assert_eq!(report.write_ops, 2);

    let worker = &report.workers[0];
    assert_eq!(worker.reason, StopReason::TargetReached);
    assert_eq!(worker.state.partitions_abandoned, 0);
    assert_eq!(worker.state.failed_writes, 2);
    assert_eq!(worker.state.consecutive_failures, 0);

    let store = writer.store().lock().unwrap();
    assert_eq!(store.count_records().unwrap(), 10);
    assert!(store.get_record("R_9").unwrap().is_some());
}
