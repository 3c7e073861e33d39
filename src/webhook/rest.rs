//! HTTP front end for the webhook archiver.
//!
//! - `POST /webhook`: GitHub delivery, event type in `X-GitHub-Event`
//! - `GET /health`: health check

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{WebhookArchiver, WebhookError, EVENT_HEADER};

/// Shared state for axum handlers.
type AppState = Arc<WebhookArchiver>;

/// Start the HTTP server on the given port.
///
/// When `port` is 0, the OS assigns an ephemeral port. The actual bound
/// port is always logged so it can be discovered.
pub async fn serve(
    archiver: Arc<WebhookArchiver>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(archiver);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!(port = actual_port, "webhook receiver listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(archiver: Arc<WebhookArchiver>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(archiver)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn webhook(
    State(archiver): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    match receive(&archiver, &headers, &body).await {
        Ok(event) => (StatusCode::OK, format!("{} processed", event)),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!(error = %e, "failed to archive webhook");
            } else {
                warn!(error = %e, "rejected webhook");
            }
            (status, e.to_string())
        }
    }
}

async fn receive(
    archiver: &WebhookArchiver,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<String, WebhookError> {
    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(WebhookError::MissingEvent)?;
    let payload: Value = serde_json::from_slice(body)?;

    let receipt = archiver.handle(event, &payload).await?;
    Ok(receipt.event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MockObjectStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Arc<MockObjectStore>, Router) {
        let store = Arc::new(MockObjectStore::new());
        let archiver = WebhookArchiver::new(store.clone(), None, "pytorch/pytorch");
        (store, router(Arc::new(archiver)))
    }

    fn delivery(event: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/webhook");
        if let Some(event) = event {
            builder = builder.header(EVENT_HEADER, event);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_archives_delivery() {
        let (store, app) = app();
        let body = r#"{"action":"queued","workflow_job":{"id":5},"repository":{"full_name":"pytorch/pytorch"}}"#;

        let response = app.oneshot(delivery(Some("workflow_job"), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "workflow_job processed");
        assert!(store.object("workflow_job/5").await.is_some());
    }

    #[tokio::test]
    async fn test_webhook_missing_header_is_bad_request() {
        let (store, app) = app();

        let response = app.oneshot(delivery(None, "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.puts().await.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_malformed_body_is_bad_request() {
        let (_, app) = app();

        let response = app.oneshot(delivery(Some("push"), "{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_store_failure_is_server_error() {
        let (store, app) = app();
        store.fail_on_prefix("push/").await;

        let response = app.oneshot(delivery(Some("push"), "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
