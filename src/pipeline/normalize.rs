// src/pipeline/normalize.rs

//! Raw record normalization.
//!
//! Pure mapping from a site's [`RawRecord`] shape to [`UnifiedRecord`]s:
//! field names resolve through per-site alias tables, prices are cleaned
//! to minor-unit integers, the manufacturer is inferred from the device
//! name, and carriers whose tables apply to every subscription type at
//! once are fanned out here, one record per type. Fan-out happens in this
//! stage and nowhere else: the dedup key includes the subscription type,
//! so an adapter quietly multiplying rows would corrupt dedup accounting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{CrawlTask, FilterOption, NormalizerConfig, RawRecord, UnifiedRecord};
use crate::utils::{extract_digits, normalize_whitespace};

const FALLBACK_MANUFACTURER: &str = "Other";

pub struct Normalizer {
    /// (lowercased token, canonical manufacturer), checked in order
    manufacturer_rules: Vec<(String, String)>,
    /// canonical field name -> lookup order (canonical first, then aliases)
    aliases: HashMap<String, Vec<String>>,
}

impl Normalizer {
    pub fn from_config(config: &NormalizerConfig) -> Self {
        let manufacturer_rules = config
            .manufacturers
            .iter()
            .map(|rule| (rule.token.to_lowercase(), rule.manufacturer.clone()))
            .collect();

        let aliases = config
            .field_aliases
            .iter()
            .map(|alias| {
                let mut names = vec![alias.canonical.clone()];
                names.extend(alias.aliases.iter().cloned());
                (alias.canonical.clone(), names)
            })
            .collect();

        Self {
            manufacturer_rules,
            aliases,
        }
    }

    /// Map one raw row into unified records.
    ///
    /// `fan_out` carries the subscription types to copy the row across,
    /// or `None` for carriers whose rows belong to the task's own type.
    /// A row without a device name cannot be identified at all and is
    /// rejected with [`AppError::ShapeMismatch`]; the caller drops it and
    /// moves on.
    pub fn normalize(
        &self,
        task: &CrawlTask,
        raw: &RawRecord,
        fan_out: Option<&[FilterOption]>,
        collected_at: DateTime<Utc>,
    ) -> Result<Vec<UnifiedRecord>> {
        let device_name = self
            .field(raw, "device_name")
            .map(|s| normalize_whitespace(&s))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::shape(format!("{}: row without a device name", task.label()))
            })?;

        let release_price = self.price(raw, "release_price");
        let public_support_fee = self.price(raw, "public_support_fee");
        let additional_support_fee = self.price(raw, "additional_support_fee");

        let component_sum = public_support_fee + additional_support_fee;
        // An explicit source total is trusted as-is; zero counts as "not
        // supplied", matching how the sites render missing cells
        let explicit_total = Some(self.price(raw, "total_support_fee")).filter(|t| *t > 0);
        let (total_support_fee, total_mismatch) = match explicit_total {
            Some(total) if total != component_sum => {
                log::warn!(
                    "{}: {} discloses total {} but components sum to {}",
                    task.label(),
                    device_name,
                    total,
                    component_sum
                );
                (total, true)
            }
            Some(total) => (total, false),
            None => (component_sum, false),
        };

        let disclosure_date = self.field(raw, "disclosure_date").unwrap_or_default();
        let manufacturer = self.infer_manufacturer(&device_name);

        let subscription_types: Vec<&str> = match fan_out {
            Some(options) => options.iter().map(|o| o.name.as_str()).collect(),
            None => vec![task.subscription_type.name.as_str()],
        };

        Ok(subscription_types
            .into_iter()
            .map(|subscription_type| UnifiedRecord {
                carrier: task.carrier.clone(),
                subscription_type: subscription_type.to_string(),
                network_type: task.network_type.name.clone(),
                plan_name: task.rate_plan.name.clone(),
                plan_id: task.rate_plan.id.clone(),
                plan_category: task.rate_plan.category.clone(),
                monthly_fee: task.rate_plan.monthly_fee,
                device_name: device_name.clone(),
                manufacturer: manufacturer.clone(),
                release_price,
                public_support_fee,
                additional_support_fee,
                total_support_fee,
                total_mismatch,
                disclosure_date: disclosure_date.clone(),
                collected_at,
            })
            .collect())
    }

    /// Canonical manufacturer for a device name, via the token table.
    pub fn infer_manufacturer(&self, device_name: &str) -> String {
        let lowered = device_name.to_lowercase();
        self.manufacturer_rules
            .iter()
            .find(|(token, _)| lowered.contains(token))
            .map(|(_, manufacturer)| manufacturer.clone())
            .unwrap_or_else(|| FALLBACK_MANUFACTURER.to_string())
    }

    fn field(&self, raw: &RawRecord, canonical: &str) -> Option<String> {
        match self.aliases.get(canonical) {
            Some(names) => names.iter().find_map(|name| raw.get_str(name)),
            None => raw.get_str(canonical),
        }
    }

    fn price(&self, raw: &RawRecord, canonical: &str) -> u64 {
        self.field(raw, canonical)
            .map(|text| extract_digits(&text))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::plan_list;

    fn normalizer() -> Normalizer {
        Normalizer::from_config(&NormalizerConfig::default())
    }

    fn task() -> CrawlTask {
        CrawlTask {
            index: 0,
            carrier: "SKT".into(),
            subscription_type: FilterOption::new("31", "기기변경"),
            network_type: FilterOption::new("5G", "5G"),
            rate_plan: plan_list(1).remove(0),
        }
    }

    fn raw(device: &str, public: &str, additional: &str) -> RawRecord {
        let mut row = RawRecord::new();
        row.insert("device_name", device);
        row.insert("public_support_fee", public);
        row.insert("additional_support_fee", additional);
        row
    }

    #[test]
    fn total_is_component_sum_without_explicit_total() {
        let records = normalizer()
            .normalize(&task(), &raw("갤럭시 S24", "400,000", "60,000"), None, Utc::now())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_support_fee, 460_000);
        assert!(!records[0].total_mismatch);
    }

    #[test]
    fn explicit_total_is_trusted_and_mismatch_flagged() {
        let mut row = raw("갤럭시 S24", "400,000", "60,000");
        row.insert("total_support_fee", "500,000");
        let records = normalizer()
            .normalize(&task(), &row, None, Utc::now())
            .unwrap();
        assert_eq!(records[0].total_support_fee, 500_000);
        assert!(records[0].total_mismatch);
        // Components survive untouched
        assert_eq!(records[0].public_support_fee, 400_000);
        assert_eq!(records[0].additional_support_fee, 60_000);
    }

    #[test]
    fn matching_explicit_total_is_not_flagged() {
        let mut row = raw("갤럭시 S24", "400,000", "60,000");
        row.insert("total_support_fee", "460,000");
        let records = normalizer()
            .normalize(&task(), &row, None, Utc::now())
            .unwrap();
        assert_eq!(records[0].total_support_fee, 460_000);
        assert!(!records[0].total_mismatch);
    }

    #[test]
    fn korean_field_aliases_resolve() {
        let mut row = RawRecord::new();
        row.insert("단말기명", "아이폰 15 Pro");
        row.insert("공시지원금", "450,000");
        row.insert("출고가", "1,550,000");
        let records = normalizer()
            .normalize(&task(), &row, None, Utc::now())
            .unwrap();
        assert_eq!(records[0].device_name, "아이폰 15 Pro");
        assert_eq!(records[0].manufacturer, "Apple");
        assert_eq!(records[0].release_price, 1_550_000);
        assert_eq!(records[0].public_support_fee, 450_000);
    }

    #[test]
    fn missing_device_name_is_shape_mismatch() {
        let mut row = RawRecord::new();
        row.insert("public_support_fee", "450,000");
        let err = normalizer()
            .normalize(&task(), &row, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::ShapeMismatch(_)));
    }

    #[test]
    fn fan_out_copies_row_across_subscription_types() {
        let options = vec![
            FilterOption::new("11", "신규가입"),
            FilterOption::new("31", "기기변경"),
            FilterOption::new("41", "번호이동"),
        ];
        let records = normalizer()
            .normalize(
                &task(),
                &raw("갤럭시 S24", "400,000", "60,000"),
                Some(&options),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(records.len(), 3);
        let keys: std::collections::HashSet<_> =
            records.iter().map(|r| r.dedup_key()).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn manufacturer_inference_table() {
        let n = normalizer();
        assert_eq!(n.infer_manufacturer("갤럭시 Z 플립6"), "Samsung");
        assert_eq!(n.infer_manufacturer("iPhone 15 Pro Max"), "Apple");
        assert_eq!(n.infer_manufacturer("Xiaomi 14T"), "Xiaomi");
        assert_eq!(n.infer_manufacturer("모토로라 엣지 50"), "Motorola");
        assert_eq!(n.infer_manufacturer("Nothing Phone (2a)"), "Other");
    }
}
