// src/adapter/mod.rs

//! The capability surface the orchestrator drives.
//!
//! A [`PageAdapter`] knows how to apply one task's filters on one site and
//! read the resulting paginated table. The orchestrator never inspects a
//! carrier name; everything site-specific lives behind these two traits.

mod http_table;
#[cfg(test)]
pub mod testing;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CrawlTask, RatePlan, RawRecord};

pub use http_table::{HttpTableAdapter, HttpTableFactory};

/// Site-specific capability consumed by the pagination engine.
///
/// Implementations are free to back this with a real browser session or a
/// plain HTTP client; either way one adapter instance is one isolated
/// session and is never shared between tasks.
#[async_trait]
pub trait PageAdapter: Send {
    /// Apply the task's filters and navigate to the first result page.
    async fn configure_filters(&mut self, task: &CrawlTask) -> Result<()>;

    /// Wait until the result table is ready, up to `timeout`.
    async fn is_result_ready(&mut self, timeout: Duration) -> Result<bool>;

    /// Read all rows visible on the current page.
    async fn read_current_page_rows(&mut self) -> Result<Vec<RawRecord>>;

    /// Whether another result page exists after the current one.
    async fn has_next_page(&mut self) -> Result<bool>;

    /// Advance to the next result page.
    async fn advance_page(&mut self) -> Result<()>;

    /// Tear the session down. Idempotent.
    async fn close(&mut self);
}

/// Opens fresh sessions for one carrier and performs its one-time
/// rate-plan discovery.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Carrier this factory serves, for log lines.
    fn carrier(&self) -> &str;

    /// Open a fresh, isolated session.
    async fn open_session(&self) -> Result<Box<dyn PageAdapter>>;

    /// Scrape the carrier's rate-plan listing.
    async fn discover_rate_plans(&self) -> Result<Vec<RatePlan>>;
}

/// Owns exactly one adapter session for the duration of one task.
///
/// Workers close the handle on every exit path before their slot frees;
/// a handle is never shared between concurrently executing tasks.
pub struct SessionHandle {
    adapter: Option<Box<dyn PageAdapter>>,
}

impl SessionHandle {
    pub fn new(adapter: Box<dyn PageAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
        }
    }

    /// The owned adapter. Panics if the handle was already closed, which
    /// would be a worker lifecycle bug.
    pub fn adapter_mut(&mut self) -> &mut dyn PageAdapter {
        self.adapter
            .as_deref_mut()
            .expect("session used after close")
    }

    /// Close the underlying session.
    pub async fn close(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.close().await;
        }
    }
}
