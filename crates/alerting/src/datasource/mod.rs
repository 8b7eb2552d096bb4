mod memory;
mod rolling;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

pub use memory::MemoryDataSource;
pub use rolling::RollingSeries;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp_ms: i64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub points: Vec<DataPoint>,
}

/// Selects series by metric name and a tag subset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesQuery {
    pub metric: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl SeriesQuery {
    pub fn matches(&self, metric: &str, tags: &BTreeMap<String, String>) -> bool {
        self.metric == metric && self.tags.iter().all(|(k, v)| tags.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains_ms(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.from.timestamp_millis() && timestamp_ms <= self.to.timestamp_millis()
    }
}

#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;
    async fn query(&self, query: &SeriesQuery, range: &TimeRange) -> Result<Vec<TimeSeries>, EvalError>;
}

/// Named data sources available to conditions, with an optional default.
#[derive(Clone, Default)]
pub struct DataSources {
    sources: HashMap<String, Arc<dyn DataSource>>,
    default: Option<String>,
}

impl DataSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Arc<dyn DataSource>, is_default: bool) {
        let name = source.name().to_string();
        if is_default || self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.sources.insert(name, source);
    }

    /// Looks up `name`, falling back to the default source when absent.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn DataSource>, EvalError> {
        let key = match name {
            Some(n) => n,
            None => self
                .default
                .as_deref()
                .ok_or_else(|| EvalError::DataSourceNotFound("<default>".into()))?,
        };
        self.sources
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::DataSourceNotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
