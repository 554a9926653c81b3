// src/pipeline/tasks.rs

//! Task space expansion.
//!
//! Expands each carrier's filter dimensions into a flat, stably ordered
//! list of [`CrawlTask`]s. Resume-by-index correctness depends on this
//! ordering being identical across runs given the same discovered rate
//! plans, so the expansion order is fixed: rate plan, then network type,
//! then subscription type.

use crate::models::{CarrierConfig, CrawlTask, RatePlan};

/// Builds the global task list with sequential indices across carriers.
#[derive(Default)]
pub struct TaskSpaceBuilder {
    tasks: Vec<CrawlTask>,
}

impl TaskSpaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand one carrier's dimensions over its discovered rate plans.
    ///
    /// A carrier with zero discovered plans contributes zero tasks; the
    /// caller logs that, it is never an error.
    pub fn push_carrier(&mut self, carrier: &CarrierConfig, plans: &[RatePlan]) {
        let plans = if carrier.max_rate_plans > 0 && plans.len() > carrier.max_rate_plans {
            log::info!(
                "{}: capping {} discovered plans to {}",
                carrier.name,
                plans.len(),
                carrier.max_rate_plans
            );
            &plans[..carrier.max_rate_plans]
        } else {
            plans
        };

        for plan in plans {
            for network in &carrier.network_types {
                for subscription in &carrier.subscription_types {
                    self.tasks.push(CrawlTask {
                        index: self.tasks.len(),
                        carrier: carrier.name.clone(),
                        subscription_type: subscription.clone(),
                        network_type: network.clone(),
                        rate_plan: plan.clone(),
                    });
                }
            }
        }
    }

    /// Number of tasks built so far.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn build(self) -> Vec<CrawlTask> {
        self.tasks
    }
}
