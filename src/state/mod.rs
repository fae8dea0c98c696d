//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `WorkerState`: the partition cursor and failure bookkeeping owned by one worker
//! - `ProgressCounters`: run-wide counters shared by all workers
//! - `Counter`: a single mutex-protected counter

mod progress;
mod worker;

// Re-export main types
pub use progress::{Counter, ProgressCounters, ProgressSnapshot, Reconciliation};
pub use worker::WorkerState;
