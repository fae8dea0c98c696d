//! Console summaries of crawl runs and single fetches

use crate::crawler::{CrawlReport, FetchResult};
use std::time::Duration;

fn seconds(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

/// Renders the end-of-run summary
pub fn format_run_report(report: &CrawlReport) -> String {
    let mut out = String::from("=== Crawl Summary ===\n\n");

    out.push_str(&format!("Target repositories: {}\n", report.target));
    out.push_str(&format!("Total fetched: {}\n", report.total));
    for (worker_id, count) in report.per_worker.iter().enumerate() {
        out.push_str(&format!("  worker-{}: {}\n", worker_id, count));
    }

    let reconciliation = &report.reconciliation;
    if reconciliation.is_consistent() {
        out.push_str("Counters consistent\n");
    } else {
        out.push_str(&format!(
            "WARNING: count mismatch, workers {} vs global {} (difference {})\n",
            reconciliation.worker_sum,
            reconciliation.global,
            reconciliation.difference()
        ));
    }

    out.push_str("\nTiming:\n");
    out.push_str(&format!("  Wall-clock time: {}\n", seconds(report.wall_time)));
    out.push_str(&format!(
        "  Fetch time: {} over {} calls",
        seconds(report.fetch_time),
        report.fetch_ops
    ));
    if let Some(avg) = report.avg_fetch_time() {
        out.push_str(&format!(" (avg {})", seconds(avg)));
    }
    out.push('\n');
    out.push_str(&format!(
        "  Write time: {} over {} batches",
        seconds(report.write_time),
        report.write_ops
    ));
    if let Some(avg) = report.avg_write_time() {
        out.push_str(&format!(" (avg {})", seconds(avg)));
    }
    out.push('\n');
    if let Some(speedup) = report.parallel_speedup() {
        out.push_str(&format!("  Parallel speedup: {:.2}x\n", speedup));
    }
    if let Some(rate) = report.records_per_second() {
        out.push_str(&format!("  Rate: {:.1} repositories/s\n", rate));
    }

    if report.is_partial() {
        out.push_str(&format!("\nFailed workers ({}):\n", report.failures.len()));
        for failure in &report.failures {
            out.push_str(&format!(
                "  worker-{} at {}: {}\n",
                failure.worker_id, failure.last_state.partition, failure.error
            ));
        }
    }

    out
}

pub fn print_run_report(report: &CrawlReport) {
    print!("{}", format_run_report(report));
}

/// Renders the result of a single search request
pub fn format_fetch_summary(result: &FetchResult) -> String {
    let mut out = format!(
        "Fetched {} repositories ({} matching in total)\n",
        result.records.len(),
        result.repository_count
    );

    for record in &result.records {
        out.push_str(&format!(
            "  {} ({} stars, created {})\n",
            record.name,
            record.star_count,
            record.created_at.format("%Y-%m-%d")
        ));
    }

    match (&result.end_cursor, result.has_next_page) {
        (Some(cursor), true) => out.push_str(&format!("Next cursor: {}\n", cursor)),
        _ => out.push_str("No further pages\n"),
    }
    out.push_str(&format!(
        "Rate limit: {}/{} remaining, resets {}\n",
        result.rate_limit.remaining,
        result.rate_limit.limit,
        result.rate_limit.reset_at.to_rfc3339()
    ));

    out
}

pub fn print_fetch_summary(result: &FetchResult) {
    print!("{}", format_fetch_summary(result));
}
