// src/pipeline/pagination.rs

//! Pagination state machine.
//!
//! Drives one configured adapter session through its result pages:
//! `Loading → Extracting → CheckingNext → {Extracting | Done}`. Three
//! termination conditions, first to trigger wins:
//!
//! 1. the adapter reports no next page,
//! 2. the max-page ceiling is reached (bounds worst-case runtime against
//!    a site whose pager never ends),
//! 3. `empty_page_limit` consecutive pages yield zero rows (a site whose
//!    "next" control is clickable but inert).

use std::time::Duration;

use crate::adapter::PageAdapter;
use crate::error::{AppError, Result};
use crate::models::{CrawlTask, CrawlerConfig, RawRecord};

enum State {
    Loading,
    Extracting,
    CheckingNext,
    Done,
}

/// Per-run pagination limits, shared by every task.
#[derive(Debug, Clone)]
pub struct PaginationEngine {
    max_pages: usize,
    empty_page_limit: usize,
    ready_timeout: Duration,
}

impl PaginationEngine {
    pub fn new(max_pages: usize, empty_page_limit: usize, ready_timeout: Duration) -> Self {
        Self {
            max_pages,
            empty_page_limit,
            ready_timeout,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_pages,
            config.empty_page_limit,
            Duration::from_secs(config.ready_timeout_secs),
        )
    }

    /// Configure the adapter for `task` and read every result page.
    ///
    /// An empty first page gets exactly one re-read before the task
    /// concludes empty; transient render delay is the usual cause. An
    /// empty result is not a failure.
    pub async fn extract_all(
        &self,
        adapter: &mut dyn PageAdapter,
        task: &CrawlTask,
    ) -> Result<Vec<RawRecord>> {
        adapter.configure_filters(task).await?;

        let mut records = Vec::new();
        let mut pages_read = 0usize;
        let mut consecutive_empty = 0usize;
        let mut first_page_retried = false;
        let mut state = State::Loading;

        loop {
            match state {
                State::Loading => {
                    if !adapter.is_result_ready(self.ready_timeout).await? {
                        return Err(AppError::timeout(
                            "result table",
                            self.ready_timeout.as_millis() as u64,
                        ));
                    }
                    state = State::Extracting;
                }

                State::Extracting => {
                    let page_rows = adapter.read_current_page_rows().await?;
                    pages_read += 1;

                    if page_rows.is_empty() {
                        if pages_read == 1 && !first_page_retried {
                            first_page_retried = true;
                            pages_read = 0;
                            log::debug!("{}: first page empty, re-reading once", task.label());
                            continue;
                        }
                        if pages_read == 1 {
                            // Still nothing after the grace re-read: the
                            // combination has no disclosures
                            state = State::Done;
                            continue;
                        }
                        consecutive_empty += 1;
                        if consecutive_empty >= self.empty_page_limit {
                            log::debug!(
                                "{}: {} consecutive empty pages, stopping",
                                task.label(),
                                consecutive_empty
                            );
                            state = State::Done;
                            continue;
                        }
                    } else {
                        consecutive_empty = 0;
                        records.extend(page_rows);
                    }
                    state = State::CheckingNext;
                }

                State::CheckingNext => {
                    if pages_read >= self.max_pages {
                        log::debug!("{}: max page ceiling {} reached", task.label(), self.max_pages);
                        state = State::Done;
                    } else if adapter.has_next_page().await? {
                        adapter.advance_page().await?;
                        state = State::Extracting;
                    } else {
                        state = State::Done;
                    }
                }

                State::Done => return Ok(records),
            }
        }
    }
}
