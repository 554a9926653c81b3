// src/pipeline/pool.rs

//! Bounded worker pool.
//!
//! Dispatches tasks in stable index order, runs up to N concurrently, and
//! yields results in completion order. Every dispatched task owns one
//! fresh session which is torn down on success, failure and panic alike,
//! so a failing site can never leak sessions or wedge a slot.

use futures::future::{self, FutureExt};
use futures::stream::{self, Stream, StreamExt};
use std::panic::AssertUnwindSafe;

use crate::adapter::{SessionFactory, SessionHandle};
use crate::error::{AppError, Result};
use crate::models::{CrawlTask, RawRecord, TaskResult};
use crate::pipeline::pagination::PaginationEngine;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::ShutdownSignal;

pub struct WorkerPool {
    concurrency: usize,
    policy: RetryPolicy,
    engine: PaginationEngine,
}

impl WorkerPool {
    pub fn new(concurrency: usize, policy: RetryPolicy, engine: PaginationEngine) -> Self {
        Self {
            concurrency: concurrency.max(1),
            policy,
            engine,
        }
    }

    /// Run `tasks` against sessions from `factory`.
    ///
    /// The returned stream yields one [`TaskResult`] per dispatched task
    /// in completion order. A triggered shutdown stops further dispatch;
    /// tasks already in flight drain normally.
    pub fn run<'a>(
        &'a self,
        factory: &'a dyn SessionFactory,
        tasks: Vec<CrawlTask>,
        shutdown: &'a ShutdownSignal,
    ) -> impl Stream<Item = TaskResult> + 'a {
        stream::iter(tasks)
            .take_while(move |task| {
                let stop = shutdown.is_triggered();
                if stop {
                    log::info!("shutdown requested, not dispatching {}", task.label());
                }
                future::ready(!stop)
            })
            .map(move |task| self.execute_task(factory, task))
            .buffer_unordered(self.concurrency)
    }

    async fn execute_task(&self, factory: &dyn SessionFactory, task: CrawlTask) -> TaskResult {
        self.policy
            .run(&task, |_attempt| {
                self.execute_attempt(factory, &task).boxed()
            })
            .await
    }

    /// One attempt: open a session, paginate, close the session no matter
    /// what. A panic inside the attempt is caught and surfaced as a
    /// transient failure so the retry policy decides its fate.
    async fn execute_attempt(
        &self,
        factory: &dyn SessionFactory,
        task: &CrawlTask,
    ) -> Result<Vec<RawRecord>> {
        let adapter = factory.open_session().await?;
        let mut session = SessionHandle::new(adapter);

        let outcome = AssertUnwindSafe(self.engine.extract_all(session.adapter_mut(), task))
            .catch_unwind()
            .await;

        session.close().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(AppError::session(format!(
                "task attempt panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::{page_rows, plan_list, ScriptedFactory, Step};
    use crate::models::{CarrierConfig, FilterOption, TaskOutcome};
    use crate::pipeline::tasks::TaskSpaceBuilder;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn make_tasks(count: usize) -> Vec<CrawlTask> {
        let carrier = CarrierConfig {
            name: "SKT".into(),
            max_concurrent: 3,
            max_rate_plans: 0,
            fan_out_subscription_types: false,
            subscription_types: vec![FilterOption::new("31", "기기변경")],
            network_types: vec![FilterOption::new("5G", "5G")],
            site: None,
        };
        let mut builder = TaskSpaceBuilder::new();
        builder.push_carrier(&carrier, &plan_list(count));
        builder.build()
    }

    fn pool(concurrency: usize, max_attempts: u32) -> WorkerPool {
        WorkerPool::new(
            concurrency,
            RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2)),
            PaginationEngine::new(20, 3, Duration::from_millis(100)),
        )
    }

    #[tokio::test]
    async fn at_most_n_sessions_are_open() {
        let factory = ScriptedFactory::new("SKT", plan_list(8), |t| {
            vec![Step::Page(page_rows(t, 1))]
        })
        .with_read_delay(Duration::from_millis(20));

        let pool = pool(3, 1);
        let shutdown = ShutdownSignal::new();
        let results: Vec<_> = pool
            .run(&factory, make_tasks(8), &shutdown)
            .collect()
            .await;

        assert_eq!(results.len(), 8);
        assert!(factory.counters().max_active.load(Ordering::SeqCst) <= 3);
        assert_eq!(
            factory.counters().opened.load(Ordering::SeqCst),
            factory.counters().closed.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn all_failing_tasks_drain_without_deadlock() {
        let factory = ScriptedFactory::new("SKT", plan_list(6), |_| {
            vec![
                Step::FailTransient("dead"),
                Step::FailTransient("dead"),
                Step::FailTransient("dead"),
            ]
        });

        let pool = pool(2, 3);
        let shutdown = ShutdownSignal::new();
        let results: Vec<_> = pool
            .run(&factory, make_tasks(6), &shutdown)
            .collect()
            .await;

        assert_eq!(results.len(), 6);
        assert!(results
            .iter()
            .all(|r| matches!(r.outcome, TaskOutcome::FailedPermanently(_))));
        // Every attempt's session was released
        assert_eq!(
            factory.counters().opened.load(Ordering::SeqCst),
            factory.counters().closed.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn transient_failures_then_success_within_budget() {
        // The step queue persists across attempts: two bad reads, then a
        // good page on the third session
        let factory = ScriptedFactory::new("SKT", plan_list(1), |t| {
            vec![
                Step::FailTransient("stale element"),
                Step::FailTransient("stale element"),
                Step::Page(page_rows(t, 2)),
            ]
        });

        let pool = pool(1, 3);
        let shutdown = ShutdownSignal::new();
        let results: Vec<_> = pool
            .run(&factory, make_tasks(1), &shutdown)
            .collect()
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].outcome.is_success());
        assert_eq!(results[0].attempts, 3);
        assert_eq!(results[0].records.len(), 2);
        assert_eq!(factory.counters().opened.load(Ordering::SeqCst), 3);
        assert_eq!(factory.counters().closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_attempt_closes_its_session() {
        let factory =
            ScriptedFactory::new("SKT", plan_list(1), |_| vec![Step::Panic("selector gone")]);

        let pool = pool(1, 1);
        let shutdown = ShutdownSignal::new();
        let results: Vec<_> = pool
            .run(&factory, make_tasks(1), &shutdown)
            .collect()
            .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].outcome,
            TaskOutcome::FailedPermanently(_)
        ));
        assert_eq!(factory.counters().opened.load(Ordering::SeqCst), 1);
        assert_eq!(factory.counters().closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn triggered_shutdown_stops_dispatch() {
        let factory = ScriptedFactory::new("SKT", plan_list(4), |t| {
            vec![Step::Page(page_rows(t, 1))]
        });

        let pool = pool(2, 1);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let results: Vec<_> = pool
            .run(&factory, make_tasks(4), &shutdown)
            .collect()
            .await;

        assert!(results.is_empty());
        assert_eq!(factory.counters().opened.load(Ordering::SeqCst), 0);
    }
}
