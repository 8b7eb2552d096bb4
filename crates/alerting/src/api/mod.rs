mod health;
mod ingest;
mod metrics;
mod notifications;
mod server;
mod state;

pub use server::{router, serve};
pub use state::ApiState;
