//! Africa's Talking USSD endpoint
//!
//! The gateway posts a form with `sessionId`, `phoneNumber`, `serviceCode`
//! and `text`. `text` accumulates every reply of the dial joined with `*`,
//! so only its last segment is new input. The reply is `text/plain`,
//! starting with `CON ` when the session continues and `END ` when it is over.

use axum::body::Body;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use ussd_core::{SessionPipeline, ShutdownController};
use ussd_handlers::identifiers::normalize_phone;

/// Screen prefix for a continuing session
pub const MARKER_CONTINUE: &str = "CON ";
/// Screen prefix for the final screen
pub const MARKER_END: &str = "END ";

/// Shared handler state
#[derive(Clone)]
pub struct AtState {
    pub pipeline: Arc<SessionPipeline>,
    pub shutdown: Arc<ShutdownController>,
}

/// Gateway request form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRequest {
    #[serde(default)]
    pub session_id: String,
    pub phone_number: String,
    #[serde(default)]
    pub service_code: String,
    #[serde(default)]
    pub text: String,
}

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Router with the USSD endpoint at `endpoint` and `GET /health`
pub fn router(state: AtState, endpoint: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(endpoint, post(handle_ussd))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_ussd(State(state): State<AtState>, form: Result<Form<AtRequest>, FormRejection>) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed USSD request");
            return plain(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    let phone = request.phone_number.trim();
    if phone.is_empty() {
        warn!(at_session = %request.session_id, "USSD request without phone number");
        return plain(StatusCode::BAD_REQUEST, "Bad Request");
    }

    let Some(guard) = state.shutdown.try_begin_request() else {
        return plain(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
    };

    let session_id = session_id_for(phone);
    let input = last_input(&request.text).to_string();
    debug!(
        session_id = %session_id,
        at_session = %request.session_id,
        service_code = %request.service_code,
        "USSD request"
    );

    // Detached so a dropped connection cannot cancel the turn before its put
    let pipeline = state.pipeline.clone();
    let turn_session = session_id.clone();
    let turn = tokio::spawn(async move {
        let _guard = guard;
        let mut screen = Vec::new();
        pipeline
            .run(&turn_session, input.as_bytes(), &mut screen)
            .await
            .map(|_| screen)
    });

    match turn.await {
        Ok(Ok(screen)) => plain(StatusCode::OK, screen),
        Ok(Err(e)) => {
            error!(session_id = %session_id, error = %e, "USSD request failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "USSD turn task failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Session ids are phone numbers in `254…` form when the number parses
fn session_id_for(phone: &str) -> String {
    normalize_phone(phone).unwrap_or_else(|| phone.to_string())
}

/// New input is whatever follows the last `*`
fn last_input(text: &str) -> &str {
    text.rsplit('*').next().unwrap_or_default()
}

fn plain(status: StatusCode, body: impl Into<Body>) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body.into()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request;
    use std::time::Duration;
    use tokio::io::{AsyncWrite, AsyncWriteExt};
    use tower::ServiceExt;
    use ussd_core::{Error, Interpreter, MemoryBackend, SessionBundle, SimpleStorageProvider, StepOutcome};

    /// Counts turns; `9` ends the session, `boom` fails, `slow` takes a while
    struct TurnInterpreter;

    #[async_trait]
    impl Interpreter for TurnInterpreter {
        async fn step(
            &self,
            session_id: &str,
            bundle: &mut SessionBundle,
            input: &[u8],
        ) -> ussd_core::Result<StepOutcome> {
            let input = String::from_utf8_lossy(input);
            if input == "boom" {
                return Err(Error::Interpreter("step exploded".to_string()));
            }
            if input == "slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            bundle.state.turns += 1;
            bundle.cache.output = format!("{} turn {} [{}]", session_id, bundle.state.turns, input);
            Ok(StepOutcome::screen(input != "9"))
        }

        async fn flush(
            &self,
            bundle: &SessionBundle,
            sink: &mut (dyn AsyncWrite + Unpin + Send),
        ) -> ussd_core::Result<usize> {
            sink.write_all(bundle.cache.output.as_bytes()).await?;
            Ok(bundle.cache.output.len())
        }
    }

    fn state() -> AtState {
        let provider = Arc::new(SimpleStorageProvider::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            None,
        ));
        let pipeline = SessionPipeline::new(provider, Arc::new(TurnInterpreter)).with_markers(MARKER_CONTINUE, MARKER_END);
        AtState {
            pipeline: Arc::new(pipeline),
            shutdown: ShutdownController::new(),
        }
    }

    async fn post_form(app: Router, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_last_input() {
        assert_eq!(last_input(""), "");
        assert_eq!(last_input("1"), "1");
        assert_eq!(last_input("1*2*1234"), "1234");
        assert_eq!(last_input("1*"), "");
    }

    #[test]
    fn test_session_id_for() {
        assert_eq!(session_id_for("+254711000000"), "254711000000");
        assert_eq!(session_id_for("0711000000"), "254711000000");
        assert_eq!(session_id_for("test-phone"), "test-phone");
    }

    #[tokio::test]
    async fn test_continue_and_end_markers() {
        let state = state();

        let (status, body) = post_form(
            router(state.clone(), "/"),
            "sessionId=ATUid_1&phoneNumber=%2B254711000000&serviceCode=%2A384%23&text=",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "CON 254711000000 turn 1 []");

        let (_, body) = post_form(
            router(state.clone(), "/"),
            "sessionId=ATUid_1&phoneNumber=%2B254711000000&text=1%2A2",
        )
        .await;
        assert_eq!(body, "CON 254711000000 turn 2 [2]");

        let (status, body) = post_form(router(state, "/"), "sessionId=ATUid_1&phoneNumber=%2B254711000000&text=1%2A2%2A9").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "END 254711000000 turn 3 [9]");
    }

    #[tokio::test]
    async fn test_turn_survives_dropped_connection() {
        let state = state();

        // The caller gives up while the step is still running
        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            post_form(router(state.clone(), "/"), "phoneNumber=0711000000&text=slow"),
        )
        .await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (status, body) = post_form(router(state, "/"), "phoneNumber=0711000000&text=slow%2A2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "CON 254711000000 turn 2 [2]");
    }

    #[tokio::test]
    async fn test_missing_phone_is_bad_request() {
        let (status, _) = post_form(router(state(), "/"), "sessionId=ATUid_1&text=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_form(router(state(), "/"), "sessionId=ATUid_1&phoneNumber=&text=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_interpreter_failure_is_server_error() {
        let (status, body) = post_form(router(state(), "/"), "phoneNumber=0711000000&text=boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let state = state();
        state.shutdown.shutdown().await;
        let (status, _) = post_form(router(state, "/"), "phoneNumber=0711000000&text=").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router(state(), "/").oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
