//! Per-chart loading flags, errors and resolved data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::clock::Clock;
use crate::kpi::DataPoint;

/// Token handed out when a fetch begins. Results are only committed while the
/// token is still current for the chart, so a chart cleared mid-fetch never
/// receives the late result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug, Clone, Serialize)]
pub struct ChartRecord {
    pub chart_id: String,
    pub data: Arc<[DataPoint]>,
    /// KPIs of the most recent successful fetch, in request order.
    pub kpi_ids: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_stale: bool,
}

struct ChartEntry {
    record: ChartRecord,
    loading: bool,
    error: Option<String>,
    generation: Generation,
}

pub struct ChartStore {
    charts: RwLock<HashMap<String, ChartEntry>>,
    next_generation: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ChartStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            charts: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            clock,
        }
    }

    pub fn data(&self, chart_id: &str) -> Option<Arc<[DataPoint]>> {
        self.charts
            .read()
            .get(chart_id)
            .map(|e| e.record.data.clone())
    }

    pub fn is_loading(&self, chart_id: &str) -> bool {
        self.charts
            .read()
            .get(chart_id)
            .is_some_and(|e| e.loading)
    }

    pub fn error(&self, chart_id: &str) -> Option<String> {
        self.charts
            .read()
            .get(chart_id)
            .and_then(|e| e.error.clone())
    }

    pub fn record(&self, chart_id: &str) -> Option<ChartRecord> {
        self.charts.read().get(chart_id).map(|e| e.record.clone())
    }

    pub fn contains(&self, chart_id: &str) -> bool {
        self.charts.read().contains_key(chart_id)
    }

    /// Ids of every chart with a fetch in progress, sorted.
    pub fn loading_charts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .charts
            .read()
            .iter()
            .filter(|(_, e)| e.loading)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn chart_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.charts.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mark a chart as loading and clear its last error, creating the record
    /// on first use.
    pub(crate) fn begin(&self, chart_id: &str) -> Generation {
        let generation = Generation(self.next_generation.fetch_add(1, Ordering::Relaxed));

        let mut charts = self.charts.write();
        let entry = charts
            .entry(chart_id.to_string())
            .or_insert_with(|| ChartEntry {
                record: ChartRecord {
                    chart_id: chart_id.to_string(),
                    data: Arc::from(Vec::new()),
                    kpi_ids: Vec::new(),
                    last_updated: None,
                    is_stale: false,
                },
                loading: false,
                error: None,
                generation,
            });

        entry.loading = true;
        entry.error = None;
        entry.generation = generation;
        generation
    }

    /// Replace the chart's data and KPI set. Returns false if the generation
    /// is no longer current.
    pub(crate) fn complete(
        &self,
        chart_id: &str,
        generation: Generation,
        data: Arc<[DataPoint]>,
        kpi_ids: Vec<String>,
    ) -> bool {
        let now = self.clock.now();
        let mut charts = self.charts.write();
        let Some(entry) = charts
            .get_mut(chart_id)
            .filter(|e| e.generation == generation)
        else {
            return false;
        };

        entry.record.data = data;
        entry.record.kpi_ids = kpi_ids;
        entry.record.last_updated = Some(now);
        entry.record.is_stale = false;
        entry.loading = false;
        entry.error = None;
        true
    }

    /// Record a failure, leaving previously resolved data in place. Returns
    /// false if the generation is no longer current.
    pub(crate) fn fail(&self, chart_id: &str, generation: Generation, error: String) -> bool {
        let mut charts = self.charts.write();
        let Some(entry) = charts
            .get_mut(chart_id)
            .filter(|e| e.generation == generation)
        else {
            return false;
        };

        entry.loading = false;
        entry.error = Some(error);
        true
    }

    /// Flag a chart for background refresh without touching its data.
    pub fn mark_stale(&self, chart_id: &str) -> bool {
        match self.charts.write().get_mut(chart_id) {
            Some(entry) => {
                entry.record.is_stale = true;
                true
            }
            None => false,
        }
    }

    /// Drop a chart's data, loading flag and error.
    pub fn clear_chart(&self, chart_id: &str) -> bool {
        self.charts.write().remove(chart_id).is_some()
    }

    pub fn clear_all(&self) {
        self.charts.write().clear();
    }
}
