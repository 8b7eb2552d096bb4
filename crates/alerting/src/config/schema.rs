use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::alert::RuleDefinition;
use crate::datasource::{DataSources, MemoryDataSource};
use crate::notify::SmtpConfig;
use crate::store::NotificationConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default = "default_api_addr")]
    pub api_addr: String,
    #[serde(default)]
    pub alerting: AlertingSettings,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub datasources: Vec<DataSourceConfig>,
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// Engine tuning knobs, loaded once at start-up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertingSettings {
    /// Wall-time cap for a single evaluation attempt.
    #[serde(with = "humantime_serde")]
    pub evaluation_timeout: Duration,
    /// Wall-time cap for one notification fan-out.
    #[serde(with = "humantime_serde")]
    pub notification_timeout: Duration,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    pub rule_reload_ticks: u32,
    pub exec_queue_capacity: usize,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            evaluation_timeout: Duration::from_secs(30),
            notification_timeout: Duration::from_secs(30),
            max_attempts: 3,
            tick_interval: Duration::from_secs(1),
            rule_reload_ticks: 10,
            exec_queue_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_datasource_type")]
    pub kind: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,
}

impl AlertingConfig {
    /// Builds the configured data sources. The in-memory ones are also
    /// returned by name so samples can be pushed into them.
    pub fn data_sources(&self) -> (DataSources, BTreeMap<String, Arc<MemoryDataSource>>) {
        let mut sources = DataSources::new();
        let mut memory = BTreeMap::new();
        for ds in &self.datasources {
            let source = Arc::new(MemoryDataSource::new(ds.name.clone(), ds.retention));
            sources.insert(source.clone(), ds.is_default);
            memory.insert(ds.name.clone(), source);
        }
        (sources, memory)
    }
}

fn default_app_url() -> String {
    "http://localhost:3000/".to_string()
}

fn default_api_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_datasource_type() -> String {
    "memory".to_string()
}

fn default_retention() -> Duration {
    Duration::from_secs(3600)
}
