//! The dashboard service: one explicitly constructed owner for the cache,
//! chart store, coordinator, refresh scheduler, templates and preferences.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, SeriesCache, DEFAULT_TTL};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::coordinator::{FetchCoordinator, FetchOutcome, FetchRequest, DEFAULT_TIMEOUT};
use crate::error::{DashboardError, SettingsError};
use crate::kpi::KpiInfo;
use crate::refresh::{AutoRefresh, DEFAULT_INTERVAL};
use crate::resolver::KpiGroupResolver;
use crate::settings::{Settings, SettingsChange, SettingsUpdate};
use crate::source::{DataSource, HttpSource};
use crate::store::ChartStore;
use crate::templates::TemplateCatalog;

pub struct DashboardOptions {
    pub user_id: String,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    /// Used when no preferences file exists yet.
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    pub preferences: Option<PathBuf>,
    pub clock: Arc<dyn Clock>,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            cache_ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_TIMEOUT,
            auto_refresh: false,
            refresh_interval: DEFAULT_INTERVAL,
            preferences: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl From<&Config> for DashboardOptions {
    fn from(config: &Config) -> Self {
        Self {
            user_id: config.general().user().to_string(),
            cache_ttl: config.cache().ttl(),
            fetch_timeout: config.general().timeout(),
            auto_refresh: config.refresh().enabled(),
            refresh_interval: config.refresh().interval(),
            preferences: config.general().preferences().map(Into::into),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct Dashboard {
    coordinator: FetchCoordinator,
    refresh: AutoRefresh,
    catalog: TemplateCatalog,
    settings: RwLock<Settings>,
    preferences: Option<PathBuf>,
}

impl Dashboard {
    /// Build a dashboard backed by the HTTP source named in `config`.
    pub fn create(config: &Config) -> Result<Self, DashboardError> {
        let source = HttpSource::new(config.general().source(), config.general().timeout())?;
        Self::new(Arc::new(source), config.into())
    }

    pub fn new(
        source: Arc<dyn DataSource>,
        options: DashboardOptions,
    ) -> Result<Self, DashboardError> {
        let settings = match &options.preferences {
            Some(path) if path.exists() => Settings::load(path)?,
            _ => Settings {
                auto_refresh: options.auto_refresh,
                refresh_interval_ms: u64::try_from(options.refresh_interval.as_millis())
                    .unwrap_or(u64::MAX),
                ..Default::default()
            },
        };

        let resolver = Arc::new(KpiGroupResolver::new(
            source.clone(),
            options.fetch_timeout,
        ));
        let cache = Arc::new(SeriesCache::new(options.cache_ttl, options.clock.clone()));
        let store = Arc::new(ChartStore::new(options.clock.clone()));
        let coordinator = FetchCoordinator::new(
            source.clone(),
            resolver.clone(),
            cache,
            store,
            options.clock,
            options.fetch_timeout,
        );
        coordinator.set_defaults(settings.fetch_defaults());

        let refresh = AutoRefresh::new(
            coordinator.clone(),
            settings.refresh_interval(),
            settings.auto_refresh,
        );
        let catalog = TemplateCatalog::new(source, resolver, options.user_id);

        Ok(Self {
            coordinator,
            refresh,
            catalog,
            settings: RwLock::new(settings),
            preferences: options.preferences,
        })
    }

    /// Fetch one chart and keep it refreshed. A request without its own
    /// range or aggregation follows the current settings, including on
    /// later refreshes.
    pub async fn fetch_chart_data(&self, request: FetchRequest) -> FetchOutcome {
        self.refresh.track(&request.chart_id);
        self.coordinator.fetch_chart_data(request).await
    }

    pub async fn fetch_many(&self, requests: Vec<FetchRequest>) -> Vec<(String, FetchOutcome)> {
        for request in &requests {
            self.refresh.track(&request.chart_id);
        }
        self.coordinator.fetch_many(requests).await
    }

    /// Fetch every graph of a template.
    pub async fn load_template(
        &self,
        template_id: &str,
    ) -> Result<Vec<(String, FetchOutcome)>, DashboardError> {
        let detail = self.catalog.detail(template_id).await?;

        let kpi_info = match self.catalog.kpi_info().await {
            Ok(info) => info,
            Err(e) => {
                // each kpi is resolved on its own instead
                warn!("unable to load kpi metadata: {e}");
                Arc::from(Vec::<KpiInfo>::new())
            }
        };

        let requests = TemplateCatalog::chart_requests(&detail, kpi_info, None, None);
        info!(
            "loading {} charts for template {}",
            requests.len(),
            detail.template_name
        );
        Ok(self.fetch_many(requests).await)
    }

    pub async fn refresh_chart(&self, chart_id: &str) -> Option<FetchOutcome> {
        self.coordinator.refresh_chart(chart_id).await
    }

    pub fn clear_chart(&self, chart_id: &str) -> bool {
        self.refresh.untrack(chart_id);
        self.coordinator.clear_chart(chart_id)
    }

    pub fn clear_all(&self) {
        self.refresh.shutdown();
        self.coordinator.clear_all();
    }

    pub fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        self.coordinator.invalidate_cache(pattern)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.coordinator.cache().stats()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Apply a partial settings update. Range or resolution changes drop
    /// every cached series and refetch the tracked charts; refresh changes
    /// reconfigure the scheduler.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<SettingsChange, SettingsError> {
        let (change, settings) = {
            let mut settings = self.settings.write();
            let change = settings.apply(update);
            (change, settings.clone())
        };

        if change.invalidates_cache() {
            self.coordinator.set_defaults(settings.fetch_defaults());
            let removed = self.coordinator.invalidate_cache(None);
            debug!("settings change invalidated {removed} cached series");

            let requests: Vec<FetchRequest> = self
                .refresh
                .tracked()
                .iter()
                .filter_map(|id| self.coordinator.last_request(id))
                .collect();
            if !requests.is_empty() {
                info!("refetching {} charts for new settings", requests.len());
                self.coordinator.fetch_many(requests).await;
            }
        }

        if change.refresh {
            self.refresh.set_interval(settings.refresh_interval());
            self.refresh.set_enabled(settings.auto_refresh);
        }

        if change.any() {
            if let Some(path) = &self.preferences {
                settings.save(path)?;
            }
        }

        Ok(change)
    }

    pub fn store(&self) -> &Arc<ChartStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn auto_refresh(&self) -> &AutoRefresh {
        &self.refresh
    }

    /// Stop all timers and drop every chart and cached series.
    pub fn dispose(&self) {
        self.refresh.shutdown();
        self.coordinator.clear_all();
        self.coordinator.invalidate_cache(None);
    }
}
