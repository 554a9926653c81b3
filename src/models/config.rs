//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FilterOption;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Crawl orchestration behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Checkpoint persistence settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Raw-record normalization rules
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Carrier definitions
    #[serde(default)]
    pub carriers: Vec<CarrierConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.max_pages == 0 {
            return Err(AppError::validation("crawler.max_pages must be > 0"));
        }
        if self.crawler.empty_page_limit == 0 {
            return Err(AppError::validation("crawler.empty_page_limit must be > 0"));
        }
        if self.crawler.max_attempts == 0 {
            return Err(AppError::validation("crawler.max_attempts must be > 0"));
        }
        if self.crawler.checkpoint_every == 0 {
            return Err(AppError::validation("crawler.checkpoint_every must be > 0"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.carriers.is_empty() {
            return Err(AppError::validation("No carriers defined"));
        }
        for carrier in &self.carriers {
            carrier.validate()?;
        }
        Ok(())
    }

    /// Carrier section by name, if configured.
    pub fn carrier(&self, name: &str) -> Option<&CarrierConfig> {
        self.carriers.iter().find(|c| c.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            checkpoint: CheckpointConfig::default(),
            normalizer: NormalizerConfig::default(),
            carriers: defaults::default_carriers(),
        }
    }
}

/// Crawl orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP-backed sessions
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// How long to wait for a result table to become ready, in seconds
    #[serde(default = "defaults::ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Hard ceiling on pages read per task
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Consecutive zero-row pages before pagination gives up
    #[serde(default = "defaults::empty_page_limit")]
    pub empty_page_limit: usize,

    /// Attempts per task before it is marked permanently failed
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay between retry attempts, in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Cap on the exponential retry backoff, in milliseconds
    #[serde(default = "defaults::max_retry_delay")]
    pub max_retry_delay_ms: u64,

    /// Checkpoint after every K completed tasks
    #[serde(default = "defaults::checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            ready_timeout_secs: defaults::ready_timeout(),
            max_pages: defaults::max_pages(),
            empty_page_limit: defaults::empty_page_limit(),
            max_attempts: defaults::max_attempts(),
            retry_delay_ms: defaults::retry_delay(),
            max_retry_delay_ms: defaults::max_retry_delay(),
            checkpoint_every: defaults::checkpoint_every(),
        }
    }
}

/// Checkpoint persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoint file location
    #[serde(default = "defaults::checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: defaults::checkpoint_path(),
        }
    }
}

/// Normalization rules: manufacturer inference and per-site field aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Device-name substring to canonical manufacturer mappings
    #[serde(default = "defaults::manufacturer_rules")]
    pub manufacturers: Vec<ManufacturerRule>,

    /// Canonical field name to per-site alias mappings
    #[serde(default = "defaults::field_aliases")]
    pub field_aliases: Vec<FieldAlias>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            manufacturers: defaults::manufacturer_rules(),
            field_aliases: defaults::field_aliases(),
        }
    }
}

/// A device-name token mapped to a canonical manufacturer name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturerRule {
    /// Case-insensitive substring to look for in the device name
    pub token: String,

    /// Canonical manufacturer name
    pub manufacturer: String,
}

/// Per-site spellings of one canonical raw-record field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAlias {
    pub canonical: String,
    pub aliases: Vec<String>,
}

/// One carrier's filter dimensions and crawl tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierConfig {
    /// Carrier name (e.g. "SKT")
    pub name: String,

    /// Concurrent sessions for this carrier; heavier sites warrant lower
    /// concurrency to avoid session instability
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Cap on discovered rate plans, 0 = unlimited
    #[serde(default)]
    pub max_rate_plans: usize,

    /// Copy each scraped row into one record per subscription type.
    /// Some sites publish one physical table that applies to every
    /// subscription type at once.
    #[serde(default)]
    pub fan_out_subscription_types: bool,

    /// Subscription-type filter options
    pub subscription_types: Vec<FilterOption>,

    /// Network-type filter options
    pub network_types: Vec<FilterOption>,

    /// HTTP table adapter profile, for sites whose filter state is
    /// URL-addressable. Carriers without one need an external adapter.
    #[serde(default)]
    pub site: Option<SiteProfile>,
}

impl CarrierConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("carrier name is empty"));
        }
        if self.max_concurrent == 0 {
            return Err(AppError::validation(format!(
                "carrier {}: max_concurrent must be > 0",
                self.name
            )));
        }
        if self.subscription_types.is_empty() {
            return Err(AppError::validation(format!(
                "carrier {}: no subscription types",
                self.name
            )));
        }
        if self.network_types.is_empty() {
            return Err(AppError::validation(format!(
                "carrier {}: no network types",
                self.name
            )));
        }
        Ok(())
    }
}

/// Query parameters and selectors for the generic HTTP table adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Disclosure list URL
    pub list_url: String,

    /// Query parameter carrying the network-type code
    #[serde(default)]
    pub network_param: String,

    /// Query parameter carrying the rate-plan id
    #[serde(default)]
    pub plan_param: String,

    /// Query parameter carrying the subscription-type code.
    /// Empty means the site has no such control; tasks that need it fail
    /// permanently.
    #[serde(default)]
    pub subscription_param: String,

    /// Query parameter carrying the page number (1-based)
    #[serde(default = "defaults::page_param")]
    pub page_param: String,

    /// Element that must be present before the table counts as ready
    pub ready_selector: String,

    /// CSS selector for result table rows
    pub row_selector: String,

    /// Canonical field name per table column, in order.
    /// Empty string skips the column.
    pub columns: Vec<String>,

    /// Rows per full page; a short page means no further pages
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Optional selector whose presence signals another page exists;
    /// when unset the page-size heuristic decides
    #[serde(default)]
    pub next_selector: Option<String>,

    /// Fixed query parameters sent with every request
    #[serde(default)]
    pub extra_params: Vec<Param>,

    /// Rate-plan discovery settings
    pub plans: PlanDiscovery,
}

/// A fixed key/value query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// How to scrape the carrier's rate-plan listing once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDiscovery {
    /// Plan listing URL
    pub url: String,

    /// CSS selector for one plan entry
    pub item_selector: String,

    /// Attribute holding the plan id
    pub id_attr: String,

    /// Attribute holding the plan name
    pub name_attr: String,

    /// Optional selector (inside the entry) for the monthly fee text
    #[serde(default)]
    pub fee_selector: Option<String>,

    /// Only keep plans whose id starts with this prefix (empty = keep all)
    #[serde(default)]
    pub id_prefix: String,
}

mod defaults {
    use std::path::PathBuf;

    use super::{CarrierConfig, FieldAlias, ManufacturerRule, Param, PlanDiscovery, SiteProfile};
    use crate::models::FilterOption;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; subsidy-crawl/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn ready_timeout() -> u64 {
        20
    }
    pub fn max_pages() -> usize {
        20
    }
    pub fn empty_page_limit() -> usize {
        3
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        2_000
    }
    pub fn max_retry_delay() -> u64 {
        30_000
    }
    pub fn checkpoint_every() -> usize {
        5
    }
    pub fn max_concurrent() -> usize {
        3
    }

    // Checkpoint defaults
    pub fn checkpoint_path() -> PathBuf {
        PathBuf::from("checkpoints/crawl.json")
    }

    // Site profile defaults
    pub fn page_param() -> String {
        "page".into()
    }
    pub fn page_size() -> usize {
        20
    }

    // Manufacturer defaults
    pub fn manufacturer_rules() -> Vec<ManufacturerRule> {
        let rules = [
            ("갤럭시", "Samsung"),
            ("galaxy", "Samsung"),
            ("아이폰", "Apple"),
            ("iphone", "Apple"),
            ("샤오미", "Xiaomi"),
            ("xiaomi", "Xiaomi"),
            ("redmi", "Xiaomi"),
            ("모토로라", "Motorola"),
            ("motorola", "Motorola"),
            ("lg", "LG"),
        ];
        rules
            .into_iter()
            .map(|(token, manufacturer)| ManufacturerRule {
                token: token.into(),
                manufacturer: manufacturer.into(),
            })
            .collect()
    }

    // Field alias defaults, covering the spellings the three carriers'
    // tables actually use
    pub fn field_aliases() -> Vec<FieldAlias> {
        let table: [(&str, &[&str]); 6] = [
            ("device_name", &["단말기명", "모델명", "기기명"]),
            ("disclosure_date", &["공시일자", "공시일", "date"]),
            ("release_price", &["출고가", "출고가격"]),
            ("public_support_fee", &["공시지원금", "지원금"]),
            ("additional_support_fee", &["추가지원금", "추가공시지원금"]),
            ("total_support_fee", &["총지원금", "지원금총액"]),
        ];
        table
            .into_iter()
            .map(|(canonical, aliases)| FieldAlias {
                canonical: canonical.into(),
                aliases: aliases.iter().map(|s| s.to_string()).collect(),
            })
            .collect()
    }

    // Carrier defaults mirror the three Korean carriers' filter spaces
    pub fn default_carriers() -> Vec<CarrierConfig> {
        vec![
            CarrierConfig {
                name: "SKT".into(),
                max_concurrent: 5,
                max_rate_plans: 0,
                // T world publishes one table per plan/network combination
                // that applies to every subscription type
                fan_out_subscription_types: true,
                subscription_types: vec![
                    FilterOption::new("11", "신규가입"),
                    FilterOption::new("31", "기기변경"),
                    FilterOption::new("41", "번호이동"),
                ],
                network_types: vec![
                    FilterOption::new("5G", "5G"),
                    FilterOption::new("PHONE", "LTE"),
                ],
                site: Some(SiteProfile {
                    list_url: "https://shop.tworld.co.kr/notice".into(),
                    network_param: "modelNwType".into(),
                    plan_param: "prodId".into(),
                    subscription_param: "scrbTypCd".into(),
                    page_param: page_param(),
                    extra_params: vec![
                        Param {
                            key: "saleMonth".into(),
                            value: "24".into(),
                        },
                        Param {
                            key: "saleYn".into(),
                            value: "Y".into(),
                        },
                        Param {
                            key: "order".into(),
                            value: "DISCOUNT".into(),
                        },
                    ],
                    ready_selector: "table.disclosure-list".into(),
                    row_selector: "table.disclosure-list tbody tr".into(),
                    columns: vec![
                        "device_name".into(),
                        "disclosure_date".into(),
                        "release_price".into(),
                        "public_support_fee".into(),
                        String::new(),
                        "additional_support_fee".into(),
                    ],
                    page_size: page_size(),
                    next_selector: None,
                    plans: PlanDiscovery {
                        url: "https://shop.tworld.co.kr/wireless/product/subscription/list".into(),
                        item_selector: "li.charge-item".into(),
                        id_attr: "data-subscription-id".into(),
                        name_attr: "data-subscription-nm".into(),
                        fee_selector: Some(".price .num".into()),
                        id_prefix: "NA".into(),
                    },
                }),
            },
            CarrierConfig {
                name: "KT".into(),
                max_concurrent: 3,
                max_rate_plans: 0,
                fan_out_subscription_types: false,
                subscription_types: vec![
                    FilterOption::new("01", "신규가입"),
                    FilterOption::new("02", "기기변경"),
                    FilterOption::new("03", "번호이동"),
                ],
                network_types: vec![
                    FilterOption::new("5G", "5G"),
                    FilterOption::new("LTE", "LTE"),
                ],
                // shop.kt.com drives its filters through script-rendered
                // modals; needs a browser-backed adapter
                site: None,
            },
            CarrierConfig {
                name: "LG U+".into(),
                max_concurrent: 1,
                max_rate_plans: 0,
                fan_out_subscription_types: false,
                subscription_types: vec![
                    FilterOption::new("3", "신규가입"),
                    FilterOption::new("1", "기기변경"),
                    FilterOption::new("2", "번호이동"),
                ],
                network_types: vec![
                    FilterOption::new("00", "5G"),
                    FilterOption::new("01", "LTE"),
                ],
                site: None,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_max_pages() {
        let mut config = Config::default();
        config.crawler.max_pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_carriers() {
        let mut config = Config::default();
        config.carriers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_carrier_without_network_types() {
        let mut config = Config::default();
        config.carriers[0].network_types.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_carriers_cover_all_three() {
        let config = Config::default();
        assert!(config.carrier("SKT").is_some());
        assert!(config.carrier("KT").is_some());
        assert!(config.carrier("LG U+").is_some());
        assert!(config.carrier("SKT").unwrap().site.is_some());
    }

    #[test]
    fn toml_roundtrip_preserves_carriers() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.carriers.len(), config.carriers.len());
        assert_eq!(parsed.crawler.max_pages, config.crawler.max_pages);
    }
}
