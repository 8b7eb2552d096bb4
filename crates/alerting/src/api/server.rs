use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::state::ApiState;
use super::{health, ingest, metrics, notifications};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::metrics))
        .route("/datasources/{name}/samples", post(ingest::push_samples))
        .route("/notifications/test", post(notifications::test_notification))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::datasource::MemoryDataSource;
    use crate::metrics::AlertingMetrics;
    use crate::notifier::registry;
    use crate::notifier::testing::RecordingTransport;
    use crate::notify::{DisabledTransport, NotificationService, Transport};
    use crate::store::MemoryStore;

    struct Fixture {
        app: Router,
        source: Arc<MemoryDataSource>,
        ready: Arc<AtomicBool>,
    }

    fn fixture(transport: Arc<dyn Transport>) -> Fixture {
        let metrics = AlertingMetrics::new();
        let source = Arc::new(MemoryDataSource::new("mem", Duration::from_secs(3600)));
        let mut sources = BTreeMap::new();
        sources.insert("mem".to_string(), source.clone());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(MemoryStore::new()),
            registry::global(),
            transport,
            metrics.clone(),
            Duration::from_secs(5),
            "http://sentinel.local/",
        ));
        let ready = Arc::new(AtomicBool::new(false));
        let state = ApiState::new(metrics, sources, notifications, ready.clone());
        Fixture {
            app: router(state),
            source,
            ready,
        }
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn ops_routes_respond() {
        let f = fixture(Arc::new(DisabledTransport));

        let (status, _) = send(f.app.clone(), get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(f.app.clone(), get("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        f.ready.store(true, std::sync::atomic::Ordering::Release);
        let (status, _) = send(f.app.clone(), get("/ready")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(f.app, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("sentinel_alerting_eval_attempts_total 0"));
    }

    #[tokio::test]
    async fn samples_are_ingested() {
        let f = fixture(Arc::new(DisabledTransport));
        let body = serde_json::json!({
            "samples": [
                { "metric": "cpu", "tags": { "host": "web-1" }, "value": 97.5 },
                { "metric": "cpu", "tags": { "host": "web-2" }, "timestamp_ms": 1_700_000_000_000i64, "value": null }
            ]
        });

        let (status, resp) = send(f.app, post_json("/datasources/mem/samples", body)).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(resp.contains("\"accepted\":2"));
        assert_eq!(f.source.series_count(), 2);
    }

    #[tokio::test]
    async fn unknown_datasource_is_404() {
        let f = fixture(Arc::new(DisabledTransport));
        let body = serde_json::json!({ "samples": [] });
        let (status, _) = send(f.app, post_json("/datasources/nope/samples", body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_metric_is_rejected() {
        let f = fixture(Arc::new(DisabledTransport));
        let body = serde_json::json!({ "samples": [{ "metric": " ", "value": 1.0 }] });
        let (status, _) = send(f.app, post_json("/datasources/mem/samples", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_is_delivered() {
        let transport = RecordingTransport::new();
        let f = fixture(transport.clone());
        let body = serde_json::json!({
            "id": 1,
            "uid": "hook",
            "name": "Hook",
            "type": "webhook",
            "settings": { "url": "https://hooks.example.com/alert" }
        });

        let (status, resp) = send(f.app, post_json("/notifications/test", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(resp.contains("\"success\":true"));
        assert_eq!(transport.webhooks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_test_notification_reports_failure() {
        let f = fixture(RecordingTransport::new());
        let body = serde_json::json!({
            "id": 1,
            "uid": "mail",
            "name": "Mail",
            "type": "email",
            "settings": {}
        });

        let (status, resp) = send(f.app, post_json("/notifications/test", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(resp.contains("\"success\":false"));
        assert!(resp.contains("addresses"));
    }
}
