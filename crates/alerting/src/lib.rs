pub mod alert;
pub mod api;
pub mod condition;
pub mod config;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod notify;
pub mod shutdown;
pub mod store;
