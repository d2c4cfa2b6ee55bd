use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Width of the window used when a caller supplies no usable range.
const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Format of range bounds in cache keys and remote queries.
const BOUND_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A validated, inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        if from > to {
            return None;
        }
        Some(Self { from, to })
    }

    /// The last seven days through `now`.
    pub fn default_window(now: DateTime<Utc>) -> Self {
        Self {
            from: now - TimeDelta::days(DEFAULT_WINDOW_DAYS),
            to: now,
        }
    }

    /// Validate a requested range, falling back to the default window when
    /// it is missing, has an unparseable bound, or is reversed.
    pub fn resolve(requested: Option<&RequestedRange>, now: DateTime<Utc>) -> Self {
        let Some(requested) = requested else {
            return Self::default_window(now);
        };

        match requested.validate() {
            Ok(range) => range,
            Err(reason) => {
                warn!("invalid date range ({reason}), using the last {DEFAULT_WINDOW_DAYS} days");
                Self::default_window(now)
            }
        }
    }

    /// Start bound as used in cache keys and remote queries.
    pub fn from_key(&self) -> String {
        self.from.format(BOUND_FORMAT).to_string()
    }

    /// End bound as used in cache keys and remote queries.
    pub fn to_key(&self) -> String {
        self.to.format(BOUND_FORMAT).to_string()
    }
}

/// An unvalidated range as supplied by a caller or loaded from preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedRange {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl RequestedRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    pub fn validate(&self) -> Result<DateRange, String> {
        let from = parse_bound(self.from.as_deref(), "start")?;
        let to = parse_bound(self.to.as_deref(), "end")?;
        DateRange::new(from, to).ok_or_else(|| "start is after end".to_string())
    }
}

impl From<DateRange> for RequestedRange {
    fn from(range: DateRange) -> Self {
        Self {
            from: Some(range.from.to_rfc3339_opts(SecondsFormat::Secs, true)),
            to: Some(range.to.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC),
/// and bare dates (midnight UTC).
fn parse_bound(bound: Option<&str>, name: &str) -> Result<DateTime<Utc>, String> {
    let bound = bound
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| format!("missing {name}"))?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(bound) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in [BOUND_FORMAT, "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(bound, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(bound, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("unparseable {name}: {bound}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 0).unwrap()
    }

    #[test]
    fn parses_supported_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for input in [
            "2024-01-01",
            "2024-01-01T00:00:00",
            "2024-01-01 00:00:00",
            "2024-01-01T00:00:00Z",
            "2024-01-01T01:00:00+01:00",
        ] {
            assert_eq!(parse_bound(Some(input), "start").unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn missing_range_uses_default_window() {
        let range = DateRange::resolve(None, now());
        assert_eq!(range.to, now());
        assert_eq!(range.from, now() - TimeDelta::days(7));
    }

    #[test]
    fn invalid_bounds_use_default_window() {
        let cases = [
            RequestedRange::new("not a date", "2024-01-02"),
            RequestedRange {
                from: Some("2024-01-01".into()),
                to: None,
            },
            RequestedRange::new("2024-01-05", "2024-01-01"),
        ];

        for requested in cases {
            assert_eq!(
                DateRange::resolve(Some(&requested), now()),
                DateRange::default_window(now()),
                "{requested:?}"
            );
        }
    }

    #[test]
    fn key_format() {
        let range = RequestedRange::new("2024-01-01", "2024-01-02T06:15:00Z")
            .validate()
            .unwrap();
        assert_eq!(range.from_key(), "2024-01-01T00:00:00");
        assert_eq!(range.to_key(), "2024-01-02T06:15:00");
    }

    #[test]
    fn requested_from_range_validates_back() {
        let range = DateRange::default_window(now());
        let requested = RequestedRange::from(range);
        assert_eq!(requested.validate().unwrap(), range);
    }
}
