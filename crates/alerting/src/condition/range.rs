use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::datasource::TimeRange;
use crate::error::ValidationError;

/// Query window relative to the evaluation start, e.g. `from: 5m, to: now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeRange {
    from: Duration,
    to: Duration,
}

impl RelativeRange {
    pub fn parse(from: &str, to: &str) -> Result<Self, ValidationError> {
        let from = parse_offset("from", from)?;
        let to = parse_offset("to", to)?;
        if from <= to {
            return Err(ValidationError::invalid(
                "from",
                "range start must be before range end",
            ));
        }
        Ok(Self { from, to })
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> TimeRange {
        TimeRange {
            from: now - chrono::Duration::from_std(self.from).unwrap_or(chrono::Duration::zero()),
            to: now - chrono::Duration::from_std(self.to).unwrap_or(chrono::Duration::zero()),
        }
    }
}

/// Accepts `now`, `now-<duration>` and bare `<duration>` offsets.
fn parse_offset(field: &str, raw: &str) -> Result<Duration, ValidationError> {
    let raw = raw.trim();
    if raw == "now" {
        return Ok(Duration::ZERO);
    }
    let offset = raw.strip_prefix("now-").unwrap_or(raw);
    humantime::parse_duration(offset).map_err(|e| ValidationError::invalid(field, format!("{raw}: {e}")))
}
