use std::time::Duration;

use thiserror::Error;

/// Errors from talking to the remote data source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to fetch {endpoint}: {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid source url: {0}")]
    Url(String),
}

/// Errors that abort a single chart fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("timed out after {}s fetching {kpi}", .timeout.as_secs())]
    Timeout { kpi: String, timeout: Duration },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("unable to access preferences: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed preferences: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("no template detail found for {0}")]
    NotFound(String),
    #[error("no templates available")]
    Empty,
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Settings(#[from] SettingsError),
    #[error("{0}")]
    Template(#[from] TemplateError),
}
