//! KPI metadata and time series values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod range;

pub use range::{DateRange, RequestedRange};

/// A single normalized sample of one KPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: String,
    /// The KPI id this sample belongs to.
    pub category: String,
    pub value: f64,
}

/// A raw time series record as returned by the remote source. OS KPIs report
/// `kpi_value`, job KPIs report `job_count`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KpiRecord {
    pub timestamp: String,
    #[serde(default)]
    pub kpi_value: Option<f64>,
    #[serde(default)]
    pub job_count: Option<f64>,
}

impl KpiRecord {
    pub fn into_point(self, kpi_id: &str) -> DataPoint {
        DataPoint {
            date: self.timestamp,
            category: kpi_id.to_string(),
            value: self.kpi_value.or(self.job_count).unwrap_or(0.0),
        }
    }
}

pub fn normalize(records: Vec<KpiRecord>, kpi_id: &str) -> Vec<DataPoint> {
    records.into_iter().map(|r| r.into_point(kpi_id)).collect()
}

/// The group that owns a KPI. Determines the remote endpoint and the default
/// aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiGroup {
    #[serde(alias = "OS")]
    Os,
    #[serde(alias = "JOBS")]
    Jobs,
}

impl KpiGroup {
    /// Groups in the order the dynamic lookup tries them.
    pub const CANDIDATES: [KpiGroup; 2] = [KpiGroup::Os, KpiGroup::Jobs];

    /// Group assumed for KPIs that no listing claims.
    pub const FALLBACK: KpiGroup = KpiGroup::Os;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Os => "os",
            Self::Jobs => "jobs",
        }
    }

    /// Name used by the remote KPI listing endpoint.
    pub fn listing_name(&self) -> &'static str {
        match self {
            Self::Os => "OS",
            Self::Jobs => "JOBS",
        }
    }

    pub fn default_aggregation(&self) -> &'static str {
        match self {
            Self::Os => "60s",
            Self::Jobs => "10m",
        }
    }
}

impl fmt::Display for KpiGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KpiGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "os" => Ok(Self::Os),
            "jobs" => Ok(Self::Jobs),
            other => Err(format!("unknown kpi group: {other}")),
        }
    }
}

/// Static metadata used to route a KPI id to its group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiInfo {
    pub kpi_name: String,
    pub kpi_group: KpiGroup,
}

impl KpiInfo {
    pub fn new(kpi_name: impl Into<String>, kpi_group: KpiGroup) -> Self {
        Self {
            kpi_name: kpi_name.into(),
            kpi_group,
        }
    }
}

/// Look up the recorded group of a KPI in caller supplied metadata.
pub fn known_group(kpi_id: &str, known: &[KpiInfo]) -> Option<KpiGroup> {
    known
        .iter()
        .find(|info| info.kpi_name == kpi_id)
        .map(|info| info.kpi_group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_value_prefers_kpi_value() {
        let record: KpiRecord = serde_json::from_str(
            r#"{"timestamp": "2024-01-01T00:00:00", "kpi_value": 42.5, "job_count": 3}"#,
        )
        .unwrap();
        let point = record.into_point("cpu_usage");
        assert_eq!(point.category, "cpu_usage");
        assert_eq!(point.date, "2024-01-01T00:00:00");
        assert_eq!(point.value, 42.5);
    }

    #[test]
    fn record_value_falls_back() {
        let jobs: KpiRecord =
            serde_json::from_str(r#"{"timestamp": "t", "job_count": 7}"#).unwrap();
        assert_eq!(jobs.into_point("running_jobs").value, 7.0);

        let empty: KpiRecord = serde_json::from_str(r#"{"timestamp": "t"}"#).unwrap();
        assert_eq!(empty.into_point("x").value, 0.0);
    }

    #[test]
    fn group_parsing() {
        assert_eq!("OS".parse::<KpiGroup>().unwrap(), KpiGroup::Os);
        assert_eq!("jobs".parse::<KpiGroup>().unwrap(), KpiGroup::Jobs);
        assert!("network".parse::<KpiGroup>().is_err());

        let info: KpiInfo =
            serde_json::from_str(r#"{"kpi_name": "running_jobs", "kpi_group": "JOBS"}"#).unwrap();
        assert_eq!(info.kpi_group, KpiGroup::Jobs);
        assert_eq!(
            serde_json::to_string(&KpiGroup::Os).unwrap(),
            r#""os""#
        );
    }

    #[test]
    fn aggregation_defaults() {
        assert_eq!(KpiGroup::Os.default_aggregation(), "60s");
        assert_eq!(KpiGroup::Jobs.default_aggregation(), "10m");
    }

    #[test]
    fn known_group_lookup() {
        let known = vec![
            KpiInfo::new("cpu_usage", KpiGroup::Os),
            KpiInfo::new("running_jobs", KpiGroup::Jobs),
        ];
        assert_eq!(known_group("running_jobs", &known), Some(KpiGroup::Jobs));
        assert_eq!(known_group("mem_usage", &known), None);
    }
}
