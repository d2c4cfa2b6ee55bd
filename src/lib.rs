//! Chart data caching and fetch coordination for KPI dashboards.
//!
//! The [`Dashboard`] service wires together the pieces a dashboard front-end
//! needs to turn "chart id + KPI ids + date range" into chart data: a typed
//! client for the remote data source, a TTL cache of per-KPI series, a fetch
//! coordinator that coalesces concurrent requests per chart, a chart state
//! store with auto-refresh timers, and the template catalog.

pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod kpi;
pub mod refresh;
pub mod resolver;
pub mod settings;
pub mod source;
pub mod store;
pub mod templates;

mod flight;

pub use cache::{CacheKey, CacheStats, SeriesCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use coordinator::{FetchCoordinator, FetchDefaults, FetchOutcome, FetchRequest};
pub use dashboard::{Dashboard, DashboardOptions};
pub use error::{
    ConfigError, DashboardError, FetchError, SettingsError, SourceError, TemplateError,
};
pub use kpi::{DataPoint, DateRange, KpiGroup, KpiInfo, KpiRecord, RequestedRange};
pub use refresh::AutoRefresh;
pub use resolver::KpiGroupResolver;
pub use settings::{Settings, SettingsChange, SettingsUpdate};
pub use source::{DataSource, HttpSource, SeriesQuery};
pub use store::{ChartRecord, ChartStore};
pub use templates::{TemplateCatalog, TemplateStats};
