//! Scrape run metrics.
//!
//! Recorded through the `metrics` facade; a binary that wants them exported
//! installs its own recorder.

use metrics::{counter, histogram};

/// Per-item results counted by the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Produced,
    Rejected,
    Failed,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Produced => "produced",
            ItemOutcome::Rejected => "rejected",
            ItemOutcome::Failed => "failed",
        }
    }
}

pub struct RunMetrics;

impl RunMetrics {
    /// Record a finished run, `status` is `ok` or `error`
    pub fn record_run(source_id: &str, status: &'static str, duration_secs: f64) {
        counter!("scrape_runs_total", "source" => source_id.to_string(), "status" => status).increment(1);
        histogram!("scrape_run_duration_seconds", "source" => source_id.to_string()).record(duration_secs);
    }

    pub fn record_item(source_id: &str, outcome: ItemOutcome) {
        counter!("scrape_items_total", "source" => source_id.to_string(), "outcome" => outcome.as_str())
            .increment(1);
    }

    pub fn record_bookings(source_id: &str, created: usize) {
        if created > 0 {
            counter!("scrape_bookings_created_total", "source" => source_id.to_string())
                .increment(created as u64);
        }
    }
}
