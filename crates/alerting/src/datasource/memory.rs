use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::rolling::RollingSeries;
use super::{DataSource, SeriesQuery, TimeRange, TimeSeries};
use crate::error::EvalError;

#[derive(Clone, Hash, Eq, PartialEq)]
struct SeriesKey {
    metric: String,
    tags: BTreeMap<String, String>,
}

/// Data source backed by rolling in-memory windows, fed through `ingest`.
pub struct MemoryDataSource {
    name: String,
    series: Arc<DashMap<SeriesKey, RollingSeries>>,
    retention_ms: i64,
}

impl MemoryDataSource {
    pub fn new(name: impl Into<String>, retention: Duration) -> Self {
        Self {
            name: name.into(),
            series: Arc::new(DashMap::new()),
            retention_ms: retention.as_millis() as i64,
        }
    }

    pub fn ingest(
        &self,
        metric: &str,
        tags: BTreeMap<String, String>,
        timestamp_ms: i64,
        value: Option<f64>,
    ) {
        let key = SeriesKey {
            metric: metric.to_string(),
            tags,
        };
        self.series
            .entry(key)
            .or_insert_with(|| RollingSeries::new(self.retention_ms))
            .push(timestamp_ms, value);
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }
}

#[async_trait::async_trait]
impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &SeriesQuery, range: &TimeRange) -> Result<Vec<TimeSeries>, EvalError> {
        let from_ms = range.from.timestamp_millis();
        let to_ms = range.to.timestamp_millis();

        let mut out: Vec<TimeSeries> = self
            .series
            .iter()
            .filter(|e| query.matches(&e.key().metric, &e.key().tags))
            .map(|e| TimeSeries {
                name: series_name(&e.key().metric, &e.key().tags),
                tags: e.key().tags.clone(),
                points: e.value().range(from_ms, to_ms),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

fn series_name(metric: &str, tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return metric.to_string();
    }
    let labels: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{metric}{{{}}}", labels.join(", "))
}
