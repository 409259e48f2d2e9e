//! The HTTP/JSON edge: `POST /send` for everyone, plus `GET /type/list`
//! and `PUT /type/` for operators when the process was constructed with
//! a config-capable store.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use config_store::ConfigStore;
use notification_model::{Notification, NotificationTypeConfig, Status};
use quota_engine::QuotaEngine;
use serde_json::json;
use tower_http::trace::TraceLayer;
use validator::{Validate, ValidationErrors};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QuotaEngine>,
    pub config_store: Option<Arc<dyn ConfigStore>>,
}

impl AppState {
    pub fn new(engine: Arc<QuotaEngine>, config_store: Option<Arc<dyn ConfigStore>>) -> Self {
        Self {
            engine,
            config_store,
        }
    }
}

/// Builds the router. The config-management routes are only mounted
/// when `state.config_store` is `Some` — a pure-delivery deployment
/// never exposes them.
pub fn make_router(state: AppState) -> Router {
    let mut router = Router::new().route("/send", post(send));

    if state.config_store.is_some() {
        router = router
            .route("/type/list", get(type_list))
            .route("/type/", put(type_put));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn validation_error_response(type_name: &str, errors: ValidationErrors) -> Response {
    let mut field_errors = serde_json::Map::new();
    for (field, field_errs) in errors.field_errors() {
        if let Some(err) = field_errs.first() {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{field} is invalid"));
            field_errors.insert(format!("{type_name}.{field}"), json!(message));
        }
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "message": "error processing input",
            "errors": field_errors,
        })),
    )
        .into_response()
}

async fn send(State(state): State<AppState>, body: axum::body::Bytes) -> Response {
    let notification: Notification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(_) => Notification::default(),
    };

    if let Err(errors) = notification.validate() {
        return validation_error_response("Notification", errors);
    }

    let result = state.engine.admit(notification).await;
    result_to_response(result)
}

/// Maps the engine's outcome to the authoritative status/message table.
/// `INTERNAL_ERROR` is the one case where the engine's own message is
/// forwarded verbatim rather than replaced: the engine distinguishes a
/// plain failure from one a dependency error accompanied, and that
/// distinction lives entirely in which message text it chose.
fn result_to_response(result: notification_model::NotifResult) -> Response {
    let (code, message) = match result.status {
        Status::Sent => (StatusCode::OK, "notification sent to recipient".to_string()),
        Status::Rejected => (
            StatusCode::TOO_MANY_REQUESTS,
            "notification was rejected by rate limiter".to_string(),
        ),
        Status::InvalidNotification => (StatusCode::BAD_REQUEST, "unrecognized input".to_string()),
        Status::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, result.response_message),
    };

    (code, Json(json!({ "message": message }))).into_response()
}

async fn type_list(State(state): State<AppState>) -> Response {
    let store = state
        .config_store
        .as_ref()
        .expect("type_list is only routed when a config store is present");

    match store.list().await {
        Ok(configs) if configs.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(configs) => (StatusCode::OK, Json(configs)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "error retrieving notification config list");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "internal server error" })),
            )
                .into_response()
        }
    }
}

async fn type_put(State(state): State<AppState>, body: axum::body::Bytes) -> Response {
    let store = state
        .config_store
        .as_ref()
        .expect("type_put is only routed when a config store is present");

    let config: NotificationTypeConfig = match serde_json::from_slice(&body) {
        Ok(config) => config,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "error processing input" })),
            )
                .into_response()
        }
    };

    if let Err(errors) = config.validate() {
        return validation_error_response("NotificationTypeConfig", errors);
    }

    match store.upsert(config).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "error persisting notification config");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "error processing input" })),
            )
                .into_response()
        }
    }
}
