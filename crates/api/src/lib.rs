//! `api` crate: operator HTTP surface of the escalation engine.
//!
//! Exposes:
//!   POST   /api/v1/escalations/run
//!   POST   /api/v1/instances/{id}/reminders
//!   GET    /api/v1/metrics
//!   GET    /api/v1/metrics/prometheus
//!   POST   /api/v1/metrics/reset

pub mod error;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use prometheus::Registry;
use tower_http::trace::TraceLayer;
use tracing::info;

use scheduler::EscalationScheduler;

pub use error::{ApiError, ApiResult, ErrorResponse};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<EscalationScheduler>,
    /// Registry the engine's counters are registered in.
    pub registry: Registry,
}

impl AppState {
    pub fn new(scheduler: Arc<EscalationScheduler>, registry: Registry) -> Self {
        Self { scheduler, registry }
    }
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/escalations/run", post(handlers::escalations::run))
        .route("/instances/:id/reminders", post(handlers::escalations::remind))
        .route("/metrics", get(handlers::metrics::get))
        .route("/metrics/prometheus", get(handlers::metrics::export))
        .route("/metrics/reset", post(handlers::metrics::reset));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.  In-flight requests are allowed to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("operator API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use engine::{
        ApprovalService, Clock, DefinitionStore, EngineConfig, EngineContext, EscalationDefaults,
        EscalationEngine, FixedClock, InMemoryDefinitionStore, InMemoryInstanceRepository, Stage,
        WorkflowDefinition, WorkflowInstance, WorkflowInstanceRepository, WorkflowType,
    };
    use ports::mock::{MockAuditLog, MockEventBus, MockNotifier};
    use ports::PrometheusMetrics;
    use scheduler::SchedulerConfig;

    struct TestApp {
        router: Router,
        engine: Arc<EscalationEngine>,
        breached: Uuid,
    }

    async fn app_with(notifier: MockNotifier) -> TestApp {
        let repo = Arc::new(InMemoryInstanceRepository::new());
        let definitions = Arc::new(InMemoryDefinitionStore::new(EscalationDefaults::default()));
        let def = definitions
            .publish(WorkflowDefinition::new(
                "ticket",
                WorkflowType::Ticket,
                vec![Stage::new(0, "agent").with_sla_hours(8.0)],
            ))
            .await
            .unwrap();

        let clock = Arc::new(FixedClock::new(Utc::now()));
        let instance = WorkflowInstance::start(&def, "TCK-1", clock.now() - Duration::hours(10));
        repo.insert(&instance).await.unwrap();

        let metrics = PrometheusMetrics::new().unwrap();
        let registry = metrics.registry().clone();
        let ctx = EngineContext {
            instances: repo,
            definitions,
            notifier: Arc::new(notifier),
            audit: Arc::new(MockAuditLog::succeeding()),
            events: Arc::new(MockEventBus::succeeding()),
            metrics: Arc::new(metrics),
            clock,
        };
        let engine = Arc::new(EscalationEngine::new(ctx, EngineConfig::default()).unwrap());
        let (scheduler, _trigger_rx) = EscalationScheduler::new(engine.clone(), SchedulerConfig::default());

        TestApp { router: router(AppState::new(scheduler, registry)), engine, breached: instance.id }
    }

    async fn app() -> TestApp {
        app_with(MockNotifier::succeeding()).await
    }

    async fn call_text(router: &Router, uri: &str) -> (StatusCode, String, String) {
        let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn run_returns_the_scan_summary() {
        let app = app().await;
        let (status, body) = call(&app.router, "POST", "/api/v1/escalations/run", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "total_checked": 1, "escalated": 1, "reminded": 0, "failed": 0 }));
    }

    #[tokio::test]
    async fn reminder_returns_a_receipt() {
        let app = app().await;
        let uri = format!("/api/v1/instances/{}/reminders", app.breached);
        let (status, body) = call(&app.router, "POST", &uri, Some(json!({ "reminder_type": "nudge" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["instance_id"], app.breached.to_string());
        assert_eq!(body["reminder_type"], "nudge");
    }

    #[tokio::test]
    async fn reminder_type_defaults_when_omitted() {
        let app = app().await;
        let uri = format!("/api/v1/instances/{}/reminders", app.breached);
        let (status, body) = call(&app.router, "POST", &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reminder_type"], "manual_reminder");
    }

    #[tokio::test]
    async fn blank_reminder_type_is_a_bad_request() {
        let app = app().await;
        let uri = format!("/api/v1/instances/{}/reminders", app.breached);
        let (status, body) = call(&app.router, "POST", &uri, Some(json!({ "reminder_type": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn reminder_for_unknown_instance_is_404() {
        let app = app().await;
        let uri = format!("/api/v1/instances/{}/reminders", Uuid::new_v4());
        let (status, body) = call(&app.router, "POST", &uri, Some(json!({ "reminder_type": "nudge" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn reminder_for_closed_instance_is_409() {
        let app = app().await;
        ApprovalService::new(app.engine.context().clone())
            .reject(app.breached, "agent", None)
            .await
            .unwrap();

        let uri = format!("/api/v1/instances/{}/reminders", app.breached);
        let (status, body) = call(&app.router, "POST", &uri, Some(json!({ "reminder_type": "nudge" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INSTANCE_CLOSED");
    }

    #[tokio::test]
    async fn reminder_delivery_failure_is_502() {
        let app = app_with(MockNotifier::failing("mail relay down")).await;
        let uri = format!("/api/v1/instances/{}/reminders", app.breached);
        let (status, body) = call(&app.router, "POST", &uri, Some(json!({ "reminder_type": "nudge" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "DELIVERY_FAILED");
    }

    #[tokio::test]
    async fn metrics_can_be_read_and_reset() {
        let app = app().await;
        call(&app.router, "POST", "/api/v1/escalations/run", None).await;

        let (status, body) = call(&app.router, "GET", "/api/v1/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workflows_checked"], 1);
        assert_eq!(body["workflows_escalated"], 1);
        assert_eq!(body["sla_breaches"], 1);

        let (status, _) = call(&app.router, "POST", "/api/v1/metrics/reset", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&app.router, "GET", "/api/v1/metrics", None).await;
        assert_eq!(
            body,
            json!({
                "workflows_checked": 0,
                "workflows_escalated": 0,
                "reminders_sent": 0,
                "sla_breaches": 0,
                "escalation_failures": 0,
            })
        );
    }

    #[tokio::test]
    async fn prometheus_export_reflects_the_scan() {
        let app = app().await;
        call(&app.router, "POST", "/api/v1/escalations/run", None).await;

        let (status, content_type, body) = call_text(&app.router, "/api/v1/metrics/prometheus").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("approval_engine_workflows_checked_total 1"));
        assert!(body.contains("approval_engine_workflows_escalated_total 1"));
        assert!(body.contains("approval_engine_sla_breaches_total 1"));
    }
}
