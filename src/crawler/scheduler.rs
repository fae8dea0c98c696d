//! Calendar-month partitioning of the search space
//!
//! The search API returns at most 1000 results per query, so every worker
//! narrows its query to one month of repository creation dates and walks
//! backwards in time, one month at a time.

use crate::state::WorkerState;
use crate::CrawlerError;
use chrono::NaiveDate;
use std::fmt;

/// A calendar month; the month is always in `1..=12`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Returns `None` when `month` is outside `1..=12`
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month before this one
    pub fn previous(&self) -> Self {
        let (year, month) = advance(self.year, self.month);
        Self { year, month }
    }

    /// First and last day of this month
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate), CrawlerError> {
        month_range(self.year, self.month).ok_or(CrawlerError::InvalidPartition {
            year: self.year,
            month: self.month,
        })
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Returns the first and last calendar day of the given month
///
/// Returns `None` for an invalid month or a year outside the supported date range.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    Some((first, last))
}

/// Returns the month preceding `(year, month)`, rolling back a year after January
pub fn advance(year: i32, month: u32) -> (i32, u32) {
    match month.clamp(1, 12) {
        1 => (year - 1, 12),
        m => (year, m - 1),
    }
}

/// Starting partitions for `count` workers, one month apart going backwards
///
/// Partitions stay disjoint while `count` does not exceed the number of months
/// before the sequence reaches territory another worker walks into.
pub fn initial_partitions(start: YearMonth, count: usize) -> Vec<YearMonth> {
    std::iter::successors(Some(start), |p| Some(p.previous()))
        .take(count)
        .collect()
}

/// Decides when a worker leaves its partition and where it goes next
#[derive(Debug, Clone)]
pub struct DatePartitionScheduler {
    partition_threshold: u64,
    earliest: Option<YearMonth>,
}

impl DatePartitionScheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    ///
    /// * `partition_threshold` - Records fetched from one month before moving on
    /// * `earliest_year` - Partitions before January of this year are never crawled
    pub fn new(partition_threshold: u64, earliest_year: Option<i32>) -> Self {
        Self {
            partition_threshold,
            earliest: earliest_year.and_then(|y| YearMonth::new(y, 1)),
        }
    }

    pub fn partition_threshold(&self) -> u64 {
        self.partition_threshold
    }

    /// Whether the worker has taken enough records from its current month
    pub fn is_partition_full(&self, state: &WorkerState) -> bool {
        state.fetched_in_partition >= self.partition_threshold
    }

    /// Whether `partition` lies before the earliest crawlable month
    pub fn is_exhausted(&self, partition: YearMonth) -> bool {
        self.earliest.is_some_and(|earliest| partition < earliest)
    }

    /// Moves the worker to the previous month and resets its per-partition state
    pub fn advance(&self, state: &mut WorkerState) {
        let next = state.partition.previous();
        tracing::debug!(
            "{} moving from {} to {}",
            state.label(),
            state.partition,
            next
        );
        state.enter_partition(next);
    }
}
