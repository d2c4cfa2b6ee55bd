use serde::Deserialize;

use std::path::Path;

use crate::error::ConfigError;

mod cache;
mod general;
mod log;
mod refresh;

pub use cache::Cache;
pub use general::General;
pub use log::{Log, LogLevel};
pub use refresh::Refresh;

fn duration(value: &str, name: &str) -> Result<std::time::Duration, ConfigError> {
    value
        .parse::<humantime::Duration>()
        .map(Into::into)
        .map_err(|e| ConfigError::Invalid(format!("{name} couldn't be parsed: {e}")))
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    cache: Cache,
    #[serde(default)]
    refresh: Refresh,
    #[serde(default)]
    log: Log,
}

impl Config {
    pub fn load(path: &dyn AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.general.check()?;
        self.cache.check()?;
        self.refresh.check()?;
        Ok(())
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn refresh(&self) -> &Refresh {
        &self.refresh
    }

    pub fn log(&self) -> &Log {
        &self.log
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }
}
