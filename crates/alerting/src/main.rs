use std::sync::Arc;

use sentinel_alerting::alert::ConditionEvalHandler;
use sentinel_alerting::api::{self, ApiState};
use sentinel_alerting::condition::registry as conditions;
use sentinel_alerting::config;
use sentinel_alerting::engine::{AlertEngine, JobDispatcher, RuleReader, Scheduler, StateResultHandler};
use sentinel_alerting::metrics::AlertingMetrics;
use sentinel_alerting::notifier::registry as notifiers;
use sentinel_alerting::notify::{HttpTransport, NotificationService};
use sentinel_alerting::shutdown;
use sentinel_alerting::store::{AlertStore, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    tracing::info!(
        config = %path.display(),
        rules = cfg.rules.len(),
        notifications = cfg.notifications.len(),
        "configuration loaded"
    );

    let metrics = AlertingMetrics::new();
    let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::seeded(
        cfg.rules.clone(),
        cfg.notifications.clone(),
    ));
    let (sources, memory_sources) = cfg.data_sources();

    let transport = Arc::new(HttpTransport::new(
        cfg.alerting.notification_timeout,
        cfg.smtp.as_ref(),
    )?);
    let notifications = Arc::new(NotificationService::new(
        store.clone(),
        notifiers::global(),
        transport,
        metrics.clone(),
        cfg.alerting.notification_timeout,
        cfg.app_url.clone(),
    ));

    let result_handler = Arc::new(StateResultHandler::new(
        store.clone(),
        notifications.clone(),
        metrics.clone(),
    ));
    let dispatcher = Arc::new(JobDispatcher::new(
        Arc::new(ConditionEvalHandler::new(metrics.clone())),
        result_handler,
        metrics.clone(),
        &cfg.alerting,
        cfg.app_url.clone(),
    ));
    let engine = AlertEngine::new(
        Scheduler::new(metrics.clone()),
        RuleReader::new(store, conditions::global(), sources),
        dispatcher,
        cfg.alerting.clone(),
    );

    let shutdown_token = CancellationToken::new();
    shutdown::cancel_on_signal(shutdown_token.clone());

    let api_state = ApiState::new(metrics, memory_sources, notifications, engine.ready_flag());
    let listener = tokio::net::TcpListener::bind(&cfg.api_addr).await?;
    tracing::info!(api_addr = %cfg.api_addr, "alerting API server starting");
    let api_token = shutdown_token.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(listener, api_state, api_token).await {
            tracing::error!(error = %e, "API server failed");
        }
    });

    engine.run(shutdown_token.clone()).await;
    shutdown_token.cancel();
    if let Err(e) = api_handle.await {
        tracing::error!(error = %e, "API task join failed");
    }

    Ok(())
}
