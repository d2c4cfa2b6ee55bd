//! Background refresh of tracked charts.
//!
//! While enabled, every tracked chart owns a repeating timer. Each tick marks
//! the chart stale and re-issues its last request through the coordinator,
//! so cached series are reused until they expire.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::coordinator::FetchCoordinator;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub struct AutoRefresh {
    coordinator: FetchCoordinator,
    state: Mutex<State>,
    // bumped whenever existing timers become invalid
    epoch: Arc<AtomicU64>,
}

struct State {
    enabled: bool,
    interval: Duration,
    tracked: HashSet<String>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl State {
    fn abort_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

impl AutoRefresh {
    pub fn new(coordinator: FetchCoordinator, interval: Duration, enabled: bool) -> Self {
        Self {
            coordinator,
            state: Mutex::new(State {
                enabled,
                interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
                tracked: HashSet::new(),
                timers: HashMap::new(),
            }),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }

    pub fn is_tracked(&self, chart_id: &str) -> bool {
        self.state.lock().tracked.contains(chart_id)
    }

    /// Tracked chart ids, sorted.
    pub fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().tracked.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn tracked_count(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// Number of live timers.
    pub fn active_timers(&self) -> usize {
        self.state
            .lock()
            .timers
            .values()
            .filter(|t| !t.is_finished())
            .count()
    }

    /// Start refreshing a chart. Must be called from within a tokio runtime
    /// when refresh is enabled.
    pub fn track(&self, chart_id: &str) {
        let mut state = self.state.lock();
        state.tracked.insert(chart_id.to_string());

        // a timer that gave up on a chart with no request is replaced
        let running = state
            .timers
            .get(chart_id)
            .is_some_and(|t| !t.is_finished());

        if state.enabled && !running {
            let timer = self.spawn_timer(chart_id, state.interval);
            state.timers.insert(chart_id.to_string(), timer);
        }
    }

    pub fn untrack(&self, chart_id: &str) -> bool {
        let mut state = self.state.lock();
        if let Some(timer) = state.timers.remove(chart_id) {
            timer.abort();
        }
        state.tracked.remove(chart_id)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.enabled == enabled {
            return;
        }
        state.enabled = enabled;

        if enabled {
            info!("auto-refresh enabled every {:?}", state.interval);
            self.restart(&mut state);
        } else {
            info!("auto-refresh disabled");
            self.epoch.fetch_add(1, Ordering::AcqRel);
            state.abort_all();
        }
    }

    pub fn set_interval(&self, interval: Duration) {
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        let mut state = self.state.lock();
        if state.interval == interval {
            return;
        }
        state.interval = interval;

        if state.enabled {
            debug!("auto-refresh interval changed to {interval:?}");
            self.restart(&mut state);
        }
    }

    /// Stop every timer and forget all tracked charts.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        state.abort_all();
        state.tracked.clear();
    }

    fn restart(&self, state: &mut State) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        state.abort_all();

        let interval = state.interval;
        let timers: Vec<_> = state
            .tracked
            .iter()
            .map(|id| (id.clone(), self.spawn_timer(id, interval)))
            .collect();
        state.timers.extend(timers);
    }

    fn spawn_timer(&self, chart_id: &str, period: Duration) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        let current = self.epoch.clone();
        let epoch = current.load(Ordering::Acquire);
        let chart_id = chart_id.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if current.load(Ordering::Acquire) != epoch {
                    return;
                }

                let Some(request) = coordinator.last_request(&chart_id) else {
                    debug!("chart {chart_id} has no request to refresh");
                    return;
                };

                coordinator.store().mark_stale(&chart_id);
                debug!("refreshing chart {chart_id}");
                coordinator.fetch_chart_data(request).await;
            }
        })
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.state.get_mut().abort_all();
    }
}
