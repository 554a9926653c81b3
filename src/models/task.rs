// src/models/task.rs

//! Crawl task descriptors and per-task results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One selectable option of a filter dimension (subscription type,
/// network type). Sites key these by an opaque code; the name is what
/// ends up in the unified output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    /// Site-side option code (e.g. "31")
    pub code: String,
    /// Display name (e.g. "기기변경")
    pub name: String,
}

impl FilterOption {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// A rate plan discovered from a carrier's plan listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePlan {
    pub id: String,
    pub name: String,
    /// Monthly fee in currency minor units
    #[serde(default)]
    pub monthly_fee: u64,
    /// Plan category as shown on the site (empty if the site has none)
    #[serde(default)]
    pub category: String,
}

/// One unit of crawl work: a specific (carrier, subscription type,
/// network type, rate plan) combination.
///
/// `index` is the position in the stable global task ordering and doubles
/// as the resume cursor. Indices are assigned once at build time and tasks
/// are never reordered afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub index: usize,
    pub carrier: String,
    pub subscription_type: FilterOption,
    pub network_type: FilterOption,
    pub rate_plan: RatePlan,
}

impl CrawlTask {
    /// Short human-readable label for log lines.
    pub fn label(&self) -> String {
        format!(
            "#{} {} {}/{} {}",
            self.index,
            self.carrier,
            self.network_type.name,
            self.subscription_type.name,
            self.rate_plan.name
        )
    }
}

/// A loosely-typed site-specific key/value bag produced by a page adapter.
///
/// Field names vary per carrier; the normalizer resolves them through its
/// alias tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord(serde_json::Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String view of a field; numbers are rendered as their decimal text.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Terminal outcome of one task after the retry policy has run its course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// Gave up, with the last failure reason
    FailedPermanently(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

/// Result of running one task to completion of the retry policy.
#[derive(Debug)]
pub struct TaskResult {
    pub task: CrawlTask,
    pub records: Vec<RawRecord>,
    pub attempts: u32,
    pub outcome: TaskOutcome,
}
