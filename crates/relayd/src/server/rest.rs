//! HTTP routes for collaborators outside the WebSocket channel.
//!
//! | Route           | Answer                                   |
//! |-----------------|------------------------------------------|
//! | `GET /health`   | `{status, uptime, clients}`              |
//! | `GET /clients`  | `{clients: [ids]}`                       |
//! | `GET /messages` | `{history: [envelopes]}`                 |
//! | `POST /message` | `{delivered: true}` or `400` on no input |

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use relay_protocol::{Envelope, PeerId};

use super::AppState;

/// Paths served over plain HTTP; the WebSocket path must avoid these.
pub const HTTP_ROUTES: [&str; 4] = ["/health", "/clients", "/messages", "/message"];

/// Body of the `400` answer for an empty submission.
pub const MESSAGE_REQUIRED: &str = "message is required";

#[derive(Debug, Serialize)]
struct ClientsResponse {
    clients: Vec<PeerId>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    history: Vec<Envelope>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    delivered: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Builds the HTTP routes. State is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/clients", get(clients))
        .route("/messages", get(messages))
        .route("/message", post(submit))
}

async fn health(State(state): State<AppState>) -> Response {
    match state.coordinator.health_info().await {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn clients(State(state): State<AppState>) -> Json<ClientsResponse> {
    Json(ClientsResponse {
        clients: state.coordinator.list_client_ids().await,
    })
}

async fn messages(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: state.coordinator.history_snapshot().await,
    })
}

/// Broadcasts `body.message` to every peer.
///
/// The body is parsed by hand so that any unusable input, including a
/// missing content type or invalid JSON, gets the same `400` answer.
async fn submit(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(message) = required_message(&body) else {
        debug!("Rejecting submission without a message");
        return error_response(StatusCode::BAD_REQUEST, MESSAGE_REQUIRED);
    };

    match state.coordinator.submit(message).await {
        Ok(delivered) => Json(SubmitResponse { delivered }).into_response(),
        Err(e) => {
            error!(error = %e, "Submission failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Extracts a truthy `message` field from a JSON body.
fn required_message(body: &[u8]) -> Option<Value> {
    let mut value: Value = serde_json::from_slice(body).ok()?;
    let message = value.get_mut("message").map(Value::take)?;
    is_truthy(&message).then_some(message)
}

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_falsy_values() {
        for value in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&value), "{value} should be falsy");
        }
    }

    #[test]
    fn test_truthy_values() {
        for value in [json!(true), json!(1), json!(-0.5), json!("0"), json!([]), json!({})] {
            assert!(is_truthy(&value), "{value} should be truthy");
        }
    }

    #[test]
    fn test_required_message() {
        assert_eq!(
            required_message(br#"{"message":{"text":"hi"}}"#),
            Some(json!({"text": "hi"}))
        );
        assert_eq!(required_message(br#"{"message":"hi","x":1}"#), Some(json!("hi")));
        assert_eq!(required_message(br#"{"message":""}"#), None);
        assert_eq!(required_message(br#"{"other":"hi"}"#), None);
        assert_eq!(required_message(b"not json"), None);
        assert_eq!(required_message(b""), None);
        assert_eq!(required_message(br#"["message"]"#), None);
    }
}
