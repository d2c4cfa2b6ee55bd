use super::*;

use std::time::Duration;

fn interval() -> String {
    "30s".into()
}

#[derive(Deserialize, Debug, Clone)]
pub struct Refresh {
    #[serde(default)]
    enabled: bool,

    #[serde(default = "interval")]
    interval: String,
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: interval(),
        }
    }
}

impl Refresh {
    pub fn check(&self) -> Result<(), ConfigError> {
        if duration(&self.interval, "refresh interval")?.is_zero() {
            return Err(ConfigError::Invalid(
                "refresh interval is too short. Minimum interval is: 1ms".into(),
            ));
        }
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        duration(&self.interval, "refresh interval").unwrap_or(Duration::from_secs(30))
    }
}
