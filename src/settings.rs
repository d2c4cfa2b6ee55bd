//! Dashboard preferences that outlive a session.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::FetchDefaults;
use crate::error::SettingsError;
use crate::kpi::RequestedRange;

/// Resolution value that defers to each KPI group's default aggregation.
pub const AUTO_RESOLUTION: &str = "auto";

const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

fn theme() -> String {
    "default".into()
}

fn resolution() -> String {
    AUTO_RESOLUTION.into()
}

fn refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// `None` means the last seven days at fetch time.
    #[serde(default)]
    pub date_range: Option<RequestedRange>,
    #[serde(default = "theme")]
    pub theme: String,
    #[serde(default = "resolution")]
    pub resolution: String,
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default = "refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            date_range: None,
            theme: theme(),
            resolution: resolution(),
            auto_refresh: false,
            refresh_interval_ms: refresh_interval_ms(),
        }
    }
}

impl Settings {
    /// Load preferences from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read(path) {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no preferences at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The aggregation bucket forced on every fetch, if any.
    pub fn aggregation_override(&self) -> Option<String> {
        if self.resolution.is_empty() || self.resolution == AUTO_RESOLUTION {
            None
        } else {
            Some(self.resolution.clone())
        }
    }

    /// What charts without their own range or aggregation fetch with.
    pub fn fetch_defaults(&self) -> FetchDefaults {
        FetchDefaults {
            range: self.date_range.clone(),
            aggregation: self.aggregation_override(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    /// Apply a partial update and report what changed.
    pub fn apply(&mut self, update: SettingsUpdate) -> SettingsChange {
        let mut change = SettingsChange::default();

        if let Some(date_range) = update.date_range {
            change.date_range = self.date_range != date_range;
            self.date_range = date_range;
        }
        if let Some(resolution) = update.resolution {
            change.resolution = self.resolution != resolution;
            self.resolution = resolution;
        }
        if let Some(theme) = update.theme {
            change.theme = self.theme != theme;
            self.theme = theme;
        }
        if let Some(auto_refresh) = update.auto_refresh {
            change.refresh |= self.auto_refresh != auto_refresh;
            self.auto_refresh = auto_refresh;
        }
        if let Some(interval) = update.refresh_interval_ms {
            change.refresh |= self.refresh_interval_ms != interval;
            self.refresh_interval_ms = interval;
        }

        change
    }
}

/// A partial update. `None` leaves a field untouched; `date_range:
/// Some(None)` resets the range to the default window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub date_range: Option<Option<RequestedRange>>,
    pub theme: Option<String>,
    pub resolution: Option<String>,
    pub auto_refresh: Option<bool>,
    pub refresh_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub date_range: bool,
    pub resolution: bool,
    pub theme: bool,
    pub refresh: bool,
}

impl SettingsChange {
    /// Cached series no longer match what charts will request.
    pub fn invalidates_cache(&self) -> bool {
        self.date_range || self.resolution
    }

    pub fn any(&self) -> bool {
        self.date_range || self.resolution || self.theme || self.refresh
    }
}
