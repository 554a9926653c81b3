// src/adapter/http_table.rs

//! Generic HTTP table adapter.
//!
//! Serves sites whose filter state is fully addressable through URL query
//! parameters and whose disclosure list is a plain HTML table. Everything
//! site-specific comes from a [`SiteProfile`]: parameter names, row and
//! readiness selectors, and the canonical field name of each table column.
//!
//! Sites that render their filters through script-driven modals need a
//! browser-backed adapter instead; this crate only defines the trait for
//! those.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::adapter::{PageAdapter, SessionFactory};
use crate::error::{AppError, Result};
use crate::models::{CrawlTask, CrawlerConfig, RatePlan, RawRecord, SiteProfile};
use crate::utils::{extract_digits, normalize_whitespace};

/// Polling interval while waiting for the result table to appear.
const READY_POLL_MS: u64 = 500;

/// Opens [`HttpTableAdapter`] sessions for one carrier.
pub struct HttpTableFactory {
    carrier: String,
    profile: Arc<SiteProfile>,
    user_agent: String,
    timeout: Duration,
}

impl HttpTableFactory {
    pub fn new(carrier: impl Into<String>, profile: SiteProfile, crawler: &CrawlerConfig) -> Self {
        Self {
            carrier: carrier.into(),
            profile: Arc::new(profile),
            user_agent: crawler.user_agent.clone(),
            timeout: Duration::from_secs(crawler.timeout_secs),
        }
    }

    /// Each session gets its own client so cookie state never leaks
    /// between concurrently executing tasks.
    fn build_client(&self) -> Result<Client> {
        Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .cookie_store(true)
            .build()
            .map_err(AppError::from)
    }
}

#[async_trait]
impl SessionFactory for HttpTableFactory {
    fn carrier(&self) -> &str {
        &self.carrier
    }

    async fn open_session(&self) -> Result<Box<dyn PageAdapter>> {
        Ok(Box::new(HttpTableAdapter {
            client: self.build_client()?,
            profile: Arc::clone(&self.profile),
            filter_url: None,
            page: 1,
            html: None,
            last_row_count: 0,
        }))
    }

    async fn discover_rate_plans(&self) -> Result<Vec<RatePlan>> {
        let discovery = &self.profile.plans;
        let client = self.build_client()?;
        let body = client
            .get(&discovery.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let item_sel = parse_selector(&discovery.item_selector)?;
        let fee_sel = discovery
            .fee_selector
            .as_ref()
            .map(|s| parse_selector(s))
            .transpose()?;

        let document = Html::parse_document(&body);
        let mut plans = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for item in document.select(&item_sel) {
            let Some(id) = item.value().attr(&discovery.id_attr) else {
                continue;
            };
            let Some(name) = item.value().attr(&discovery.name_attr) else {
                continue;
            };
            if !discovery.id_prefix.is_empty() && !id.starts_with(&discovery.id_prefix) {
                continue;
            }
            if !seen.insert(id.to_string()) {
                continue;
            }

            let monthly_fee = fee_sel
                .as_ref()
                .and_then(|sel| item.select(sel).next())
                .map(|el| extract_digits(&el.text().collect::<String>()))
                .unwrap_or(0);

            plans.push(RatePlan {
                id: id.to_string(),
                name: normalize_whitespace(name),
                monthly_fee,
                category: String::new(),
            });
        }

        Ok(plans)
    }
}

/// One HTTP-backed scraping session. The current page's body is kept as a
/// string and parsed on demand, so nothing non-`Send` lives across awaits.
pub struct HttpTableAdapter {
    client: Client,
    profile: Arc<SiteProfile>,
    /// Filter URL without the page parameter, set by `configure_filters`
    filter_url: Option<Url>,
    page: usize,
    html: Option<String>,
    last_row_count: usize,
}

impl HttpTableAdapter {
    fn page_url(&self, page: usize) -> Result<Url> {
        let mut url = self
            .filter_url
            .clone()
            .ok_or_else(|| AppError::session("page requested before filters were configured"))?;
        url.query_pairs_mut()
            .append_pair(&self.profile.page_param, &page.to_string());
        Ok(url)
    }

    async fn fetch_page(&mut self, page: usize) -> Result<()> {
        let url = self.page_url(page)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        self.html = Some(body);
        self.page = page;
        Ok(())
    }

    fn current_body(&self) -> Result<&str> {
        self.html
            .as_deref()
            .ok_or_else(|| AppError::session("no page loaded"))
    }

    fn body_has(&self, selector: &Selector) -> Result<bool> {
        let document = Html::parse_document(self.current_body()?);
        Ok(document.select(selector).next().is_some())
    }

    /// Require a query parameter name for a filter dimension the task
    /// actually uses. A missing mapping means the control does not exist
    /// on this site at all, which no amount of retrying will fix.
    fn require_param<'a>(param: &'a str, code: &str, control: &str) -> Result<Option<&'a str>> {
        if code.is_empty() {
            return Ok(None);
        }
        if param.is_empty() {
            return Err(AppError::filter_unavailable(control));
        }
        Ok(Some(param))
    }
}

#[async_trait]
impl PageAdapter for HttpTableAdapter {
    async fn configure_filters(&mut self, task: &CrawlTask) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let mut url = Url::parse(&profile.list_url)?;

        {
            let mut pairs = url.query_pairs_mut();
            for param in &profile.extra_params {
                pairs.append_pair(&param.key, &param.value);
            }
            if let Some(key) = Self::require_param(
                &profile.network_param,
                &task.network_type.code,
                "network type",
            )? {
                pairs.append_pair(key, &task.network_type.code);
            }
            if let Some(key) =
                Self::require_param(&profile.plan_param, &task.rate_plan.id, "rate plan")?
            {
                pairs.append_pair(key, &task.rate_plan.id);
            }
            if let Some(key) = Self::require_param(
                &profile.subscription_param,
                &task.subscription_type.code,
                "subscription type",
            )? {
                pairs.append_pair(key, &task.subscription_type.code);
            }
        }

        self.filter_url = Some(url);
        self.last_row_count = 0;
        self.fetch_page(1).await
    }

    async fn is_result_ready(&mut self, timeout: Duration) -> Result<bool> {
        let ready_sel = parse_selector(&self.profile.ready_selector)?;
        let started = tokio::time::Instant::now();

        loop {
            if self.body_has(&ready_sel)? {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(READY_POLL_MS)).await;
            self.fetch_page(self.page).await?;
        }
    }

    async fn read_current_page_rows(&mut self) -> Result<Vec<RawRecord>> {
        let row_sel = parse_selector(&self.profile.row_selector)?;
        let cell_sel = parse_selector("td")?;

        let mut rows = Vec::new();
        {
            let document = Html::parse_document(self.current_body()?);
            for row in document.select(&row_sel) {
                let cells: Vec<String> = row
                    .select(&cell_sel)
                    .map(|td| normalize_whitespace(&td.text().collect::<String>()))
                    .collect();

                let record: RawRecord = self
                    .profile
                    .columns
                    .iter()
                    .zip(cells)
                    .filter(|(canonical, _)| !canonical.is_empty())
                    .map(|(canonical, text)| (canonical.clone(), text.into()))
                    .collect();

                // Header rows carry <th> cells only and map to nothing
                if !record.is_empty() {
                    rows.push(record);
                }
            }
        }

        self.last_row_count = rows.len();
        Ok(rows)
    }

    async fn has_next_page(&mut self) -> Result<bool> {
        if let Some(next) = &self.profile.next_selector {
            let next_sel = parse_selector(next)?;
            return self.body_has(&next_sel);
        }
        // No pagination control to inspect: a full page means more may
        // follow, a short page is the last one
        Ok(self.last_row_count >= self.profile.page_size)
    }

    async fn advance_page(&mut self) -> Result<()> {
        self.fetch_page(self.page + 1).await
    }

    async fn close(&mut self) {
        self.html = None;
        self.filter_url = None;
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
