// src/pipeline/mod.rs

//! Crawl orchestration pipeline.
//!
//! - `tasks`: expand filter dimensions into the stable task list
//! - `pagination`: drive one session through its result pages
//! - `retry`: classify failures and re-attempt transient ones
//! - `pool`: bounded concurrent execution with session ownership
//! - `normalize`: raw rows into the unified schema
//! - `aggregate`: thread-safe result accumulation
//! - `crawl`: the orchestrator entry point

pub mod aggregate;
pub mod crawl;
pub mod normalize;
pub mod pagination;
pub mod pool;
pub mod retry;
pub mod tasks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use aggregate::ResultAggregator;
pub use crawl::{run_crawl, CarrierHandle, CrawlOutcome};
pub use normalize::Normalizer;
pub use pagination::PaginationEngine;
pub use pool::WorkerPool;
pub use retry::RetryPolicy;
pub use tasks::TaskSpaceBuilder;

/// Cooperative cancellation flag.
///
/// Triggering stops the pool from dispatching new tasks; in-flight tasks
/// drain, a final checkpoint is flushed, and the partial result set is
/// returned. Already-aggregated records are never discarded.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
