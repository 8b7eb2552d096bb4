pub mod alerting_metrics;
pub mod exposition;

pub use alerting_metrics::AlertingMetrics;
