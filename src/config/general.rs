use super::*;

use std::path::PathBuf;
use std::time::Duration;

fn source() -> String {
    "http://127.0.0.1:8080".into()
}

fn user() -> String {
    "USER_TEST_1".into()
}

fn timeout() -> String {
    "30s".into()
}

#[derive(Deserialize, Debug, Clone)]
pub struct General {
    // base url of the remote dashboard api
    #[serde(default = "source")]
    source: String,

    #[serde(default = "user")]
    user: String,

    // bound on each remote call
    #[serde(default = "timeout")]
    timeout: String,

    // where ui preferences are persisted (optional)
    #[serde(default)]
    preferences: Option<PathBuf>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            source: source(),
            user: user(),
            timeout: timeout(),
            preferences: None,
        }
    }
}

impl General {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.source.is_empty() {
            return Err(ConfigError::Invalid("source must not be empty".into()));
        }

        if duration(&self.timeout, "timeout")?.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".into()));
        }

        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn timeout(&self) -> Duration {
        duration(&self.timeout, "timeout").unwrap_or(Duration::from_secs(30))
    }

    pub fn preferences(&self) -> Option<&Path> {
        self.preferences.as_deref()
    }
}
