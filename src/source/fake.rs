//! In-memory [`DataSource`] that records every call.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use super::*;

#[derive(Default)]
pub struct FakeSource {
    pub series: Mutex<HashMap<String, Vec<KpiRecord>>>,
    pub failing: Mutex<HashSet<String>>,
    pub panicking: Mutex<HashSet<String>>,
    pub listings: Mutex<HashMap<KpiGroup, Vec<String>>>,
    pub failing_listings: Mutex<HashSet<KpiGroup>>,
    pub templates: Mutex<Vec<TemplateSummary>>,
    pub details: Mutex<HashMap<String, TemplateDetail>>,
    pub delay: Mutex<Option<Duration>>,
    pub series_calls: Mutex<Vec<SeriesQuery>>,
    pub listing_calls: Mutex<Vec<KpiGroup>>,
    pub detail_calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` hourly points for a KPI, starting at midnight on 2024-01-01.
    pub fn with_hourly(self, kpi: &str, count: usize) -> Self {
        let records = (0..count)
            .map(|i| KpiRecord {
                timestamp: format!("2024-01-01T{:02}:00:00", i % 24),
                kpi_value: Some(i as f64),
                job_count: None,
            })
            .collect();
        self.series.lock().insert(kpi.to_string(), records);
        self
    }

    pub fn with_listing(self, group: KpiGroup, names: &[&str]) -> Self {
        self.listings
            .lock()
            .insert(group, names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn fail(&self, kpi: &str) {
        self.failing.lock().insert(kpi.to_string());
    }

    pub fn recover(&self, kpi: &str) {
        self.failing.lock().remove(kpi);
    }

    pub fn series_calls_for(&self, kpi: &str) -> usize {
        self.series_calls
            .lock()
            .iter()
            .filter(|q| q.kpi_name == kpi)
            .count()
    }

    pub fn total_series_calls(&self) -> usize {
        self.series_calls.lock().len()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn templates(&self, _user_id: &str) -> Result<Vec<TemplateSummary>, SourceError> {
        Ok(self.templates.lock().clone())
    }

    async fn template_detail(
        &self,
        template_id: &str,
    ) -> Result<Option<TemplateDetail>, SourceError> {
        self.detail_calls.lock().push(template_id.to_string());
        Ok(self.details.lock().get(template_id).cloned())
    }

    async fn kpi_names(&self, group: KpiGroup) -> Result<Vec<String>, SourceError> {
        self.listing_calls.lock().push(group);
        if self.failing_listings.lock().contains(&group) {
            return Err(SourceError::Status {
                endpoint: "kpi listing",
                status: reqwest::StatusCode::BAD_GATEWAY,
            });
        }
        Ok(self.listings.lock().get(&group).cloned().unwrap_or_default())
    }

    async fn kpi_series(&self, query: &SeriesQuery) -> Result<Vec<KpiRecord>, SourceError> {
        self.series_calls.lock().push(query.clone());
        self.pause().await;

        let panics = self.panicking.lock().contains(&query.kpi_name);
        if panics {
            panic!("series for {} cannot be produced", query.kpi_name);
        }

        if self.failing.lock().contains(&query.kpi_name) {
            return Err(SourceError::Status {
                endpoint: "os kpi data",
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            });
        }

        Ok(self
            .series
            .lock()
            .get(&query.kpi_name)
            .cloned()
            .unwrap_or_default())
    }
}
