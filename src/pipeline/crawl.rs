// src/pipeline/crawl.rs

//! The crawl orchestrator.
//!
//! Wires discovery, task expansion, checkpoint resumption, the worker
//! pool, normalization and aggregation into one run. Carriers execute
//! sequentially, each with its own concurrency level; results commit as
//! they finish and a checkpoint is flushed every K commits, so a killed
//! run resumes without redoing completed work or duplicating records.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;

use crate::adapter::SessionFactory;
use crate::error::{AppError, Result};
use crate::models::{
    CarrierConfig, CarrierRunStats, Config, CrawlTask, FilterOption, RunSummary, UnifiedRecord,
};
use crate::pipeline::aggregate::ResultAggregator;
use crate::pipeline::normalize::Normalizer;
use crate::pipeline::pagination::PaginationEngine;
use crate::pipeline::pool::WorkerPool;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::tasks::TaskSpaceBuilder;
use crate::pipeline::ShutdownSignal;
use crate::storage::CheckpointStore;

/// One carrier's configuration paired with its session factory.
pub struct CarrierHandle {
    pub config: CarrierConfig,
    pub factory: Arc<dyn SessionFactory>,
}

impl CarrierHandle {
    pub fn new(config: CarrierConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self { config, factory }
    }
}

/// Everything a run produces: the summary and the unified record set
/// (final, or partial on interrupt). Serializing the records to whatever
/// output format is required is the caller's business.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub summary: RunSummary,
    pub records: Vec<UnifiedRecord>,
}

/// Tracks the contiguous prefix of completed task indices.
///
/// Completion order is unconstrained, but the resume cursor may only
/// advance past an index once everything below it is done too; anything
/// beyond the prefix is protected by dedup instead.
struct CompletionTracker {
    next: usize,
    done: BTreeSet<usize>,
}

impl CompletionTracker {
    fn new(resume_index: usize) -> Self {
        Self {
            next: resume_index,
            done: BTreeSet::new(),
        }
    }

    fn mark(&mut self, index: usize) {
        self.done.insert(index);
        while self.done.remove(&self.next) {
            self.next += 1;
        }
    }

    fn cursor(&self) -> Option<u64> {
        (self.next > 0).then(|| self.next as u64 - 1)
    }
}

/// Run the full crawl across `carriers`.
///
/// The only fatal misconfiguration is an empty carrier list; everything
/// else (failed discovery, failed tasks, unwritable checkpoints) scopes
/// to its own unit and the run carries on to a summary.
pub async fn run_crawl(
    config: &Config,
    carriers: &[CarrierHandle],
    store: &dyn CheckpointStore,
    shutdown: &ShutdownSignal,
) -> Result<CrawlOutcome> {
    if carriers.is_empty() {
        return Err(AppError::config("no carriers configured"));
    }

    let started_at = Utc::now();
    let normalizer = Normalizer::from_config(&config.normalizer);
    let policy = RetryPolicy::from_config(&config.crawler);
    let engine = PaginationEngine::from_config(&config.crawler);

    // Rate-plan discovery and task space expansion, carrier by carrier.
    // Task indices are global and sequential, which is what makes the
    // resume cursor meaningful across the whole run.
    let mut builder = TaskSpaceBuilder::new();
    let mut ranges: Vec<(Range<usize>, bool)> = Vec::new();
    for handle in carriers {
        let name = &handle.config.name;
        let start = builder.len();
        let mut discovery_failed = false;
        match handle.factory.discover_rate_plans().await {
            Ok(plans) if plans.is_empty() => {
                log::warn!("{name}: discovered no rate plans, carrier contributes no tasks");
            }
            Ok(plans) => {
                log::info!("{name}: discovered {} rate plans", plans.len());
                builder.push_carrier(&handle.config, &plans);
            }
            Err(e) => {
                log::warn!("{name}: rate plan discovery failed ({e}), skipping carrier");
                discovery_failed = true;
            }
        }
        ranges.push((start..builder.len(), discovery_failed));
    }
    let tasks = builder.build();
    log::info!("task space: {} tasks across {} carriers", tasks.len(), carriers.len());

    // Checkpoint resumption. A load error means we start over, never
    // that we abort.
    let checkpoint = match store.load().await {
        Ok(checkpoint) => checkpoint,
        Err(e) => {
            log::warn!("checkpoint load failed ({e}), starting over");
            None
        }
    };
    let (aggregator, resume_index) = match checkpoint {
        Some(checkpoint) => {
            let resume_index = checkpoint.resume_index();
            log::info!(
                "resuming: {} records restored, dispatch continues at task {}",
                checkpoint.records.len(),
                resume_index
            );
            (ResultAggregator::restore(checkpoint.records), resume_index)
        }
        None => {
            // Establish the empty checkpoint up front; this also surfaces
            // an unwritable checkpoint location before hours of work
            if let Err(e) = store.save(None, &[]).await {
                log::warn!("initial checkpoint save failed ({e}), continuing without");
            }
            (ResultAggregator::new(), 0)
        }
    };

    let mut tracker = CompletionTracker::new(resume_index);
    let mut completions_since_save = 0usize;
    let mut carrier_stats: Vec<CarrierRunStats> = Vec::new();

    for (handle, (range, discovery_failed)) in carriers.iter().zip(ranges) {
        let name = handle.config.name.clone();
        let carrier_started = Instant::now();

        let carrier_tasks: Vec<CrawlTask> = tasks[range.clone()]
            .iter()
            .filter(|task| task.index >= resume_index)
            .cloned()
            .collect();
        let skipped = range.len() - carrier_tasks.len();
        if skipped > 0 {
            log::info!("{name}: {skipped} tasks already covered by the checkpoint");
        }

        let mut stats = CarrierRunStats {
            carrier: name.clone(),
            tasks_total: range.len(),
            skipped,
            discovery_failed,
            ..CarrierRunStats::default()
        };

        let fan_out: Option<Vec<FilterOption>> = handle
            .config
            .fan_out_subscription_types
            .then(|| handle.config.subscription_types.clone());

        let pool = WorkerPool::new(handle.config.max_concurrent, policy.clone(), engine.clone());
        let mut results = pool.run(handle.factory.as_ref(), carrier_tasks, shutdown);

        while let Some(result) = results.next().await {
            let succeeded = result.outcome.is_success();

            let mut mapped = Vec::new();
            let mut dropped = 0usize;
            if succeeded {
                let collected_at = Utc::now();
                for raw in &result.records {
                    match normalizer.normalize(&result.task, raw, fan_out.as_deref(), collected_at)
                    {
                        Ok(records) => mapped.extend(records),
                        Err(e) => {
                            log::warn!("{e}");
                            dropped += 1;
                        }
                    }
                }
            }

            let added = aggregator.commit(mapped);
            aggregator.record_shape_mismatches(dropped);
            aggregator.record_task(succeeded);
            if succeeded {
                stats.completed += 1;
                stats.records += added;
                log::info!(
                    "{} done: {} records in {} attempt(s)",
                    result.task.label(),
                    added,
                    result.attempts
                );
            } else {
                stats.failed += 1;
            }
            tracker.mark(result.task.index);

            // Snapshots only ever follow a commit, so a crash can only
            // lose work that was never counted as done
            completions_since_save += 1;
            if completions_since_save >= config.crawler.checkpoint_every {
                completions_since_save = 0;
                save_snapshot(store, &tracker, &aggregator).await;
            }
        }
        drop(results);

        stats.elapsed_secs = carrier_started.elapsed().as_secs_f64();
        log::info!(
            "{name}: {} completed, {} failed, {} records in {:.1}s",
            stats.completed,
            stats.failed,
            stats.records,
            stats.elapsed_secs
        );
        carrier_stats.push(stats);
    }

    let interrupted = shutdown.is_triggered();
    if interrupted {
        save_snapshot(store, &tracker, &aggregator).await;
        log::warn!("run interrupted, checkpoint retained for resumption");
    } else if let Err(e) = store.clear().await {
        log::warn!("failed to clear checkpoint after full run ({e})");
    }

    let counters = aggregator.counters();
    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        carriers: carrier_stats,
        tasks_completed: counters.completed,
        tasks_failed: counters.failed,
        total_records: counters.records,
        duplicates_dropped: counters.duplicates,
        shape_mismatches: counters.shape_mismatches,
        interrupted,
    };
    for (key, value) in summary.report_lines() {
        log::info!("{key}: {value}");
    }

    Ok(CrawlOutcome {
        summary,
        records: aggregator.into_records(),
    })
}

async fn save_snapshot(
    store: &dyn CheckpointStore,
    tracker: &CompletionTracker,
    aggregator: &ResultAggregator,
) {
    let records = aggregator.snapshot_records();
    if let Err(e) = store.save(tracker.cursor(), &records).await {
        log::warn!("checkpoint save failed ({e}), continuing");
    }
}
