//! Output module for crawl summaries and database statistics
//!
//! This module handles:
//! - Printing the end-of-run report of a pipeline crawl
//! - Printing the result of a single fetch
//! - Reading and printing statistics from the database

mod report;
pub mod stats;

pub use report::{format_fetch_summary, format_run_report, print_fetch_summary, print_run_report};
pub use stats::{format_statistics, load_statistics, print_statistics, CrawlStatistics};
