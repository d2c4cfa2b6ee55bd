//! Turns "chart id + KPI ids + date range" into chart data.
//!
//! A fetch walks the requested KPIs in order. Each KPI is routed to its group,
//! looked up in the [`SeriesCache`], and fetched from the [`DataSource`] on a
//! miss. The per-KPI series are concatenated and replace whatever the chart
//! held before.
//!
//! Concurrent requests for the same chart are coalesced: the first becomes the
//! leader and runs the fetch on its own task, later ones receive the leader's
//! outcome. Failures never escape; they are recorded against the chart in the
//! [`ChartStore`] and returned as [`FetchOutcome::Failed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinError;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::cache::{CacheKey, SeriesCache};
use crate::clock::Clock;
use crate::error::FetchError;
use crate::flight::{Attach, InFlight};
use crate::kpi::{self, DataPoint, DateRange, KpiInfo, RequestedRange};
use crate::resolver::KpiGroupResolver;
use crate::source::{DataSource, SeriesQuery};
use crate::store::{ChartStore, Generation};


/// Default bound on a single remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub chart_id: String,
    /// Concatenation order of the combined series.
    pub kpi_ids: Vec<String>,
    /// Known KPI groups. KPIs missing here are resolved remotely.
    pub kpi_info: Arc<[KpiInfo]>,
    /// Unset follows [`FetchDefaults`]. Absent or invalid ranges mean the
    /// last seven days.
    pub range: Option<RequestedRange>,
    /// Overrides the per-group default aggregation bucket.
    pub aggregation: Option<String>,
}

impl FetchRequest {
    pub fn new<I, S>(chart_id: impl Into<String>, kpi_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chart_id: chart_id.into(),
            kpi_ids: kpi_ids.into_iter().map(Into::into).collect(),
            kpi_info: Arc::from(Vec::new()),
            range: None,
            aggregation: None,
        }
    }

    pub fn kpi_info(mut self, kpi_info: impl Into<Arc<[KpiInfo]>>) -> Self {
        self.kpi_info = kpi_info.into();
        self
    }

    pub fn range(mut self, range: Option<RequestedRange>) -> Self {
        self.range = range;
        self
    }

    pub fn aggregation(mut self, aggregation: Option<String>) -> Self {
        self.aggregation = aggregation;
        self
    }
}

/// Range and aggregation applied to requests that leave them unset. Read
/// when a fetch runs, so replayed requests follow later changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchDefaults {
    pub range: Option<RequestedRange>,
    pub aggregation: Option<String>,
}

/// How a fetch ended, as observed by every caller attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded { points: usize },
    /// The fetch succeeded but returned no data.
    Empty,
    Failed(String),
    /// The chart was cleared before the result could be applied.
    Discarded,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Loaded { .. } | Self::Empty)
    }
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn DataSource>,
    resolver: Arc<KpiGroupResolver>,
    cache: Arc<SeriesCache>,
    store: Arc<ChartStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    flights: InFlight<FetchOutcome>,
    last_requests: Mutex<HashMap<String, FetchRequest>>,
    defaults: RwLock<FetchDefaults>,
}

impl FetchCoordinator {
    pub fn new(
        source: Arc<dyn DataSource>,
        resolver: Arc<KpiGroupResolver>,
        cache: Arc<SeriesCache>,
        store: Arc<ChartStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                resolver,
                cache,
                store,
                clock,
                timeout,
                flights: InFlight::new(),
                last_requests: Mutex::new(HashMap::new()),
                defaults: RwLock::new(FetchDefaults::default()),
            }),
        }
    }

    /// Fetch the data for one chart and apply it to the store.
    ///
    /// If a fetch for the same chart id is already pending this attaches to
    /// it instead of issuing new requests, and the arguments are ignored.
    pub async fn fetch_chart_data(&self, request: FetchRequest) -> FetchOutcome {
        let chart_id = request.chart_id.clone();

        let mut receiver = match self.inner.flights.try_attach(&chart_id) {
            Attach::Waiter(receiver) => {
                debug!("attaching to pending fetch for chart {chart_id}");
                receiver
            }
            Attach::Leader { id, receiver } => {
                self.inner
                    .last_requests
                    .lock()
                    .insert(chart_id.clone(), request.clone());
                let generation = self.inner.store.begin(&chart_id);

                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let worker = {
                        let inner = inner.clone();
                        let request = request.clone();
                        tokio::spawn(async move { inner.run(&request, generation).await })
                    };

                    // the flight is released even if the worker panics
                    let outcome = match worker.await {
                        Ok(outcome) => outcome,
                        Err(e) => inner.abort(&request.chart_id, generation, e),
                    };
                    inner.flights.complete(&request.chart_id, id, outcome);
                });

                receiver
            }
        };

        // a closed channel means the chart was cleared mid-flight
        receiver.recv().await.unwrap_or(FetchOutcome::Discarded)
    }

    /// Fetch several charts concurrently. Outcomes are returned in request
    /// order.
    pub async fn fetch_many(&self, requests: Vec<FetchRequest>) -> Vec<(String, FetchOutcome)> {
        let fetches = requests.into_iter().map(|request| {
            let chart_id = request.chart_id.clone();
            async move { (chart_id, self.fetch_chart_data(request).await) }
        });
        join_all(fetches).await
    }

    /// Drop the cached series of a chart's KPIs and fetch it again with its
    /// last request. Returns `None` for a chart that was never fetched.
    pub async fn refresh_chart(&self, chart_id: &str) -> Option<FetchOutcome> {
        let request = self.last_request(chart_id)?;
        for kpi_id in &request.kpi_ids {
            self.inner.cache.invalidate_kpi(kpi_id);
        }
        Some(self.fetch_chart_data(request).await)
    }

    /// The most recent request issued for a chart.
    pub fn last_request(&self, chart_id: &str) -> Option<FetchRequest> {
        self.inner.last_requests.lock().get(chart_id).cloned()
    }

    /// Forget a chart. A fetch still running for it completes but its result
    /// is discarded.
    pub fn clear_chart(&self, chart_id: &str) -> bool {
        self.inner.flights.cancel(chart_id);
        self.inner.last_requests.lock().remove(chart_id);
        self.inner.store.clear_chart(chart_id)
    }

    pub fn clear_all(&self) {
        let ids: Vec<String> = self.inner.last_requests.lock().drain().map(|(id, _)| id).collect();
        for id in ids {
            self.inner.flights.cancel(&id);
        }
        self.inner.store.clear_all();
    }

    /// Replace the defaults used by requests without their own range or
    /// aggregation.
    pub fn set_defaults(&self, defaults: FetchDefaults) {
        *self.inner.defaults.write() = defaults;
    }

    pub fn defaults(&self) -> FetchDefaults {
        self.inner.defaults.read().clone()
    }

    pub fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        self.inner.cache.invalidate(pattern)
    }

    pub fn is_pending(&self, chart_id: &str) -> bool {
        self.inner.flights.is_pending(chart_id)
    }

    /// Number of calls that attached to an already pending fetch.
    pub fn coalesced(&self) -> u64 {
        self.inner.flights.coalesced()
    }

    pub fn store(&self) -> &Arc<ChartStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<SeriesCache> {
        &self.inner.cache
    }

    pub fn resolver(&self) -> &Arc<KpiGroupResolver> {
        &self.inner.resolver
    }
}

impl Inner {
    async fn run(&self, request: &FetchRequest, generation: Generation) -> FetchOutcome {
        let chart_id = &request.chart_id;
        let defaults = self.defaults.read().clone();
        let requested = request.range.as_ref().or(defaults.range.as_ref());
        let range = DateRange::resolve(requested, self.clock.now());
        let aggregation = request
            .aggregation
            .as_deref()
            .or(defaults.aggregation.as_deref());

        match self.collect(request, &range, aggregation).await {
            Ok(data) => {
                let points = data.len();
                if !self
                    .store
                    .complete(chart_id, generation, data.into(), request.kpi_ids.clone())
                {
                    debug!("discarding result for cleared chart {chart_id}");
                    return FetchOutcome::Discarded;
                }

                debug!("chart {chart_id} updated with {points} points");
                if points == 0 {
                    FetchOutcome::Empty
                } else {
                    FetchOutcome::Loaded { points }
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!("error fetching chart data for {chart_id}: {message}");
                if !self.store.fail(chart_id, generation, message.clone()) {
                    return FetchOutcome::Discarded;
                }
                FetchOutcome::Failed(message)
            }
        }
    }

    /// Record a fetch task that ended without an outcome.
    fn abort(&self, chart_id: &str, generation: Generation, e: JoinError) -> FetchOutcome {
        let message = format!("fetch task for chart {chart_id} failed: {e}");
        error!("{message}");
        if !self.store.fail(chart_id, generation, message.clone()) {
            return FetchOutcome::Discarded;
        }
        FetchOutcome::Failed(message)
    }

    /// Combined series for every requested KPI. The first failure aborts the
    /// whole chart.
    async fn collect(
        &self,
        request: &FetchRequest,
        range: &DateRange,
        aggregation: Option<&str>,
    ) -> Result<Vec<DataPoint>, FetchError> {
        let mut data = Vec::new();
        for kpi_id in &request.kpi_ids {
            let series = self
                .series(kpi_id, &request.kpi_info, range, aggregation)
                .await?;
            data.extend_from_slice(&series);
        }
        Ok(data)
    }

    async fn series(
        &self,
        kpi_id: &str,
        known: &[KpiInfo],
        range: &DateRange,
        aggregation: Option<&str>,
    ) -> Result<Arc<[DataPoint]>, FetchError> {
        let group = self.resolver.resolve(kpi_id, known).await;
        let aggregation = aggregation.unwrap_or(group.default_aggregation());
        let key = CacheKey::for_range(kpi_id, range, aggregation);

        if let Some(series) = self.cache.get(&key) {
            debug!("cache hit: {key}");
            return Ok(series);
        }

        let query = SeriesQuery {
            kpi_name: kpi_id.to_string(),
            group,
            from: range.from_key(),
            to: range.to_key(),
            aggregation: aggregation.to_string(),
        };

        let records = tokio::time::timeout(self.timeout, self.source.kpi_series(&query))
            .await
            .map_err(|_| FetchError::Timeout {
                kpi: kpi_id.to_string(),
                timeout: self.timeout,
            })??;

        let series: Arc<[DataPoint]> = kpi::normalize(records, kpi_id).into();
        debug!("cache fill: {key} ({} points)", series.len());
        self.cache.put(key, series.clone());
        Ok(series)
    }
}
