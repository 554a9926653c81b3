// src/models/record.rs

//! The canonical, carrier-agnostic subsidy record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device-subsidy disclosure row normalized to the unified schema.
///
/// All money amounts are non-negative integers in the site's currency
/// minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub carrier: String,
    pub subscription_type: String,
    pub network_type: String,
    pub plan_name: String,
    pub plan_id: String,
    #[serde(default)]
    pub plan_category: String,
    pub monthly_fee: u64,
    pub device_name: String,
    pub manufacturer: String,
    pub release_price: u64,
    pub public_support_fee: u64,
    pub additional_support_fee: u64,
    /// Explicit source total when the site supplies one, otherwise the
    /// component sum. Never forced to equal the sum when the source
    /// disagrees; see `total_mismatch`.
    pub total_support_fee: u64,
    /// True when the site supplied an explicit total that differs from
    /// `public_support_fee + additional_support_fee`.
    #[serde(default)]
    pub total_mismatch: bool,
    /// Disclosure date as printed by the site (format varies per carrier)
    #[serde(default)]
    pub disclosure_date: String,
    pub collected_at: DateTime<Utc>,
}

impl UnifiedRecord {
    /// Identity tuple used to drop records that would otherwise be
    /// double-counted across retries, resumed runs, or subscription-type
    /// fan-out.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            carrier: self.carrier.clone(),
            plan_id: self.plan_id.clone(),
            subscription_type: self.subscription_type.clone(),
            network_type: self.network_type.clone(),
            device_name: self.device_name.clone(),
        }
    }
}

/// Derived identity of a [`UnifiedRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub carrier: String,
    pub plan_id: String,
    pub subscription_type: String,
    pub network_type: String,
    pub device_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_record() -> UnifiedRecord {
        UnifiedRecord {
            carrier: "SKT".into(),
            subscription_type: "기기변경".into(),
            network_type: "5G".into(),
            plan_name: "5GX 프라임".into(),
            plan_id: "NA00007790".into(),
            plan_category: String::new(),
            monthly_fee: 89_000,
            device_name: "갤럭시 S24 Ultra".into(),
            manufacturer: "Samsung".into(),
            release_price: 1_698_400,
            public_support_fee: 500_000,
            additional_support_fee: 75_000,
            total_support_fee: 575_000,
            total_mismatch: false,
            disclosure_date: "2025-01-10".into(),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_key_ignores_amounts() {
        let a = sample_record();
        let mut b = sample_record();
        b.public_support_fee = 1;
        b.collected_at = Utc::now();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_distinguishes_subscription_type() {
        let a = sample_record();
        let mut b = sample_record();
        b.subscription_type = "신규가입".into();
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
