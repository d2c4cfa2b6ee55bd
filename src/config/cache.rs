use super::*;

use std::time::Duration;

fn ttl() -> String {
    "5m".into()
}

#[derive(Deserialize, Debug, Clone)]
pub struct Cache {
    // how long a fetched series is served from memory
    #[serde(default = "ttl")]
    ttl: String,
}

impl Default for Cache {
    fn default() -> Self {
        Self { ttl: ttl() }
    }
}

impl Cache {
    pub fn check(&self) -> Result<(), ConfigError> {
        duration(&self.ttl, "cache ttl").map(|_| ())
    }

    pub fn ttl(&self) -> Duration {
        duration(&self.ttl, "cache ttl").unwrap_or(crate::cache::DEFAULT_TTL)
    }
}
