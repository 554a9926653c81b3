// src/models/summary.rs

//! Run summary reported at the end of every crawl.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-carrier crawl statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierRunStats {
    pub carrier: String,
    /// Tasks built for this carrier in the full task space
    pub tasks_total: usize,
    /// Tasks skipped because a resumed checkpoint already covered them
    #[serde(default)]
    pub skipped: usize,
    pub completed: usize,
    pub failed: usize,
    /// Unified records committed by this carrier's tasks
    pub records: usize,
    pub elapsed_secs: f64,
    /// Rate-plan discovery failed; the carrier contributed zero tasks
    #[serde(default)]
    pub discovery_failed: bool,
}

/// Final (or partial, on interrupt) report of a crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub carriers: Vec<CarrierRunStats>,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub total_records: usize,
    pub duplicates_dropped: usize,
    pub shape_mismatches: usize,
    /// Run was cut short by an external interrupt; a checkpoint was left
    /// behind for resumption
    pub interrupted: bool,
}

impl RunSummary {
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Key/value lines for the end-of-run log block.
    pub fn report_lines(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            ("tasks completed".into(), self.tasks_completed.to_string()),
            ("tasks failed".into(), self.tasks_failed.to_string()),
            ("unified records".into(), self.total_records.to_string()),
            (
                "duplicates dropped".into(),
                self.duplicates_dropped.to_string(),
            ),
            (
                "rows dropped (shape)".into(),
                self.shape_mismatches.to_string(),
            ),
            ("elapsed".into(), format!("{:.1}s", self.elapsed_secs())),
        ];
        if self.interrupted {
            lines.push(("interrupted".into(), "yes".into()));
        }
        lines
    }
}
