// src/pipeline/aggregate.rs

//! Thread-safe result accumulation.
//!
//! The aggregator is the only state shared across workers besides the
//! checkpoint store. All mutation goes through one mutex; readers take a
//! cloned snapshot rather than iterating live state, so checkpoint writes
//! never observe a half-committed task.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::models::{DedupKey, UnifiedRecord};

/// Running counters for the current run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    /// Tasks that ran to a successful outcome this run
    pub completed: usize,
    /// Tasks marked permanently failed this run
    pub failed: usize,
    /// Records held, including any restored from a checkpoint
    pub records: usize,
    /// Records dropped because their dedup key was already committed
    pub duplicates: usize,
    /// Rows dropped because they could not be mapped
    pub shape_mismatches: usize,
}

#[derive(Default)]
struct State {
    records: Vec<UnifiedRecord>,
    seen: HashSet<DedupKey>,
    counters: Counters,
}

/// Append-only store of unified records plus run counters.
#[derive(Default)]
pub struct ResultAggregator {
    state: Mutex<State>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the aggregator with records restored from a checkpoint.
    /// Their dedup keys are registered so re-executed tasks cannot
    /// double-count.
    pub fn restore(records: Vec<UnifiedRecord>) -> Self {
        let seen = records.iter().map(|r| r.dedup_key()).collect();
        let counters = Counters {
            records: records.len(),
            ..Counters::default()
        };
        Self {
            state: Mutex::new(State {
                records,
                seen,
                counters,
            }),
        }
    }

    /// Commit a batch of normalized records, dropping duplicates.
    /// Returns how many were actually added.
    pub fn commit(&self, records: Vec<UnifiedRecord>) -> usize {
        let mut state = self.state.lock().unwrap();
        let mut added = 0;
        for record in records {
            if state.seen.insert(record.dedup_key()) {
                state.records.push(record);
                added += 1;
            } else {
                state.counters.duplicates += 1;
            }
        }
        state.counters.records += added;
        added
    }

    pub fn record_task(&self, succeeded: bool) {
        let mut state = self.state.lock().unwrap();
        if succeeded {
            state.counters.completed += 1;
        } else {
            state.counters.failed += 1;
        }
    }

    pub fn record_shape_mismatches(&self, count: usize) {
        if count > 0 {
            self.state.lock().unwrap().counters.shape_mismatches += count;
        }
    }

    /// Consistent copy of everything committed so far.
    pub fn snapshot_records(&self) -> Vec<UnifiedRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn counters(&self) -> Counters {
        self.state.lock().unwrap().counters
    }

    /// Move the records out. Consumes the aggregator at end of run.
    pub fn into_records(self) -> Vec<UnifiedRecord> {
        self.state.into_inner().unwrap().records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(device: &str, subscription: &str) -> UnifiedRecord {
        UnifiedRecord {
            carrier: "SKT".into(),
            subscription_type: subscription.into(),
            network_type: "5G".into(),
            plan_name: "Plan".into(),
            plan_id: "NA001".into(),
            plan_category: String::new(),
            monthly_fee: 50_000,
            device_name: device.into(),
            manufacturer: "Samsung".into(),
            release_price: 1_000_000,
            public_support_fee: 300_000,
            additional_support_fee: 45_000,
            total_support_fee: 345_000,
            total_mismatch: false,
            disclosure_date: "2025-01-10".into(),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn commit_drops_duplicate_keys() {
        let agg = ResultAggregator::new();
        let added = agg.commit(vec![
            record("갤럭시 S24", "기기변경"),
            record("갤럭시 S24", "기기변경"),
            record("갤럭시 S24", "신규가입"),
        ]);
        assert_eq!(added, 2);

        let counters = agg.counters();
        assert_eq!(counters.records, 2);
        assert_eq!(counters.duplicates, 1);
    }

    #[test]
    fn restore_seeds_dedup_keys() {
        let agg = ResultAggregator::restore(vec![record("갤럭시 S24", "기기변경")]);
        let added = agg.commit(vec![
            record("갤럭시 S24", "기기변경"),
            record("아이폰 15", "기기변경"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(agg.counters().records, 2);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let agg = ResultAggregator::new();
        agg.commit(vec![record("갤럭시 S24", "기기변경")]);
        let snapshot = agg.snapshot_records();
        agg.commit(vec![record("아이폰 15", "기기변경")]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(agg.snapshot_records().len(), 2);
    }

    #[test]
    fn task_counters_split_by_outcome() {
        let agg = ResultAggregator::new();
        agg.record_task(true);
        agg.record_task(true);
        agg.record_task(false);
        let counters = agg.counters();
        assert_eq!(counters.completed, 2);
        assert_eq!(counters.failed, 1);
    }
}
