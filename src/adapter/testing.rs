// src/adapter/testing.rs

//! Scripted in-memory adapters for exercising the orchestrator without a
//! network. Test-only.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{PageAdapter, SessionFactory};
use crate::error::{AppError, Result};
use crate::models::{CrawlTask, RatePlan, RawRecord};

/// One scripted response to a `read_current_page_rows` call.
#[derive(Clone)]
pub enum Step {
    /// Return these rows
    Page(Vec<RawRecord>),
    /// Fail with a transient session error
    FailTransient(&'static str),
    /// Fail with a permanent filter error
    FailPermanent(&'static str),
    /// Panic inside the read, for teardown tests
    Panic(&'static str),
}

/// Session lifecycle counters shared across every adapter a factory opens.
#[derive(Default)]
pub struct SessionCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl SessionCounters {
    fn on_open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

type StepQueue = Arc<Mutex<VecDeque<Step>>>;
type ScriptFn = dyn Fn(&CrawlTask) -> Vec<Step> + Send + Sync;

struct Inner {
    carrier: String,
    plans: Vec<RatePlan>,
    fail_discovery: bool,
    script: Box<ScriptFn>,
    /// Step queues persist across retry attempts of the same task
    queues: Mutex<HashMap<usize, StepQueue>>,
    counters: SessionCounters,
    /// Simulated per-read latency, to make concurrency observable
    read_delay: Duration,
}

impl Inner {
    fn queue_for(&self, task: &CrawlTask) -> StepQueue {
        let mut queues = self.queues.lock().unwrap();
        Arc::clone(queues.entry(task.index).or_insert_with(|| {
            Arc::new(Mutex::new(VecDeque::from((self.script)(task))))
        }))
    }
}

/// Factory producing [`ScriptedAdapter`] sessions driven by a per-task
/// step script.
#[derive(Clone)]
pub struct ScriptedFactory(Arc<Inner>);

impl ScriptedFactory {
    pub fn new(
        carrier: impl Into<String>,
        plans: Vec<RatePlan>,
        script: impl Fn(&CrawlTask) -> Vec<Step> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(Inner {
            carrier: carrier.into(),
            plans,
            fail_discovery: false,
            script: Box::new(script),
            queues: Mutex::new(HashMap::new()),
            counters: SessionCounters::default(),
            read_delay: Duration::ZERO,
        }))
    }

    pub fn failing_discovery(carrier: impl Into<String>) -> Self {
        let mut factory = Self::new(carrier, vec![], |_| vec![]);
        Arc::get_mut(&mut factory.0).unwrap().fail_discovery = true;
        factory
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        Arc::get_mut(&mut self.0).unwrap().read_delay = delay;
        self
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.0.counters
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    fn carrier(&self) -> &str {
        &self.0.carrier
    }

    async fn open_session(&self) -> Result<Box<dyn PageAdapter>> {
        self.0.counters.on_open();
        Ok(Box::new(ScriptedAdapter {
            inner: Arc::clone(&self.0),
            steps: None,
            remaining_after_read: 0,
            closed: false,
        }))
    }

    async fn discover_rate_plans(&self) -> Result<Vec<RatePlan>> {
        if self.0.fail_discovery {
            return Err(AppError::session("plan listing unreachable"));
        }
        Ok(self.0.plans.clone())
    }
}

/// Adapter whose page reads are driven by a scripted step queue.
pub struct ScriptedAdapter {
    inner: Arc<Inner>,
    steps: Option<StepQueue>,
    remaining_after_read: usize,
    closed: bool,
}

#[async_trait]
impl PageAdapter for ScriptedAdapter {
    async fn configure_filters(&mut self, task: &CrawlTask) -> Result<()> {
        self.steps = Some(self.inner.queue_for(task));
        Ok(())
    }

    async fn is_result_ready(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn read_current_page_rows(&mut self) -> Result<Vec<RawRecord>> {
        if !self.inner.read_delay.is_zero() {
            tokio::time::sleep(self.inner.read_delay).await;
        }
        let steps = self
            .steps
            .as_ref()
            .ok_or_else(|| AppError::session("read before configure"))?;
        let (step, remaining) = {
            let mut queue = steps.lock().unwrap();
            (queue.pop_front(), queue.len())
        };
        self.remaining_after_read = remaining;
        match step {
            Some(Step::Page(rows)) => Ok(rows),
            Some(Step::FailTransient(msg)) => Err(AppError::session(msg)),
            Some(Step::FailPermanent(msg)) => Err(AppError::filter_unavailable(msg)),
            Some(Step::Panic(msg)) => panic!("{msg}"),
            None => Ok(vec![]),
        }
    }

    async fn has_next_page(&mut self) -> Result<bool> {
        Ok(self.remaining_after_read > 0)
    }

    async fn advance_page(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.counters.on_close();
        }
    }
}

/// A page of `count` distinct, normalizer-ready rows for the given task.
pub fn page_rows(task: &CrawlTask, count: usize) -> Vec<RawRecord> {
    (0..count)
        .map(|i| {
            let mut row = RawRecord::new();
            row.insert("device_name", format!("Galaxy T{}-{}", task.index, i));
            row.insert("disclosure_date", "2025-01-10");
            row.insert("release_price", "1,200,000");
            row.insert("public_support_fee", "400,000");
            row.insert("additional_support_fee", "60,000");
            row
        })
        .collect()
}

/// A plan list of `count` sequentially named plans.
pub fn plan_list(count: usize) -> Vec<RatePlan> {
    (0..count)
        .map(|i| RatePlan {
            id: format!("NA{i:05}"),
            name: format!("Plan {i}"),
            monthly_fee: 50_000 + i as u64 * 10_000,
            category: String::new(),
        })
        .collect()
}
