// HTTP route handlers for the coderun API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use coderun_common::{language, ExecutionRequest, Language};
use coderun_engine::ExecError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::{metrics, AppState};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub language: Language,
    pub extension: &'static str,
    pub compiled: bool,
    pub image: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn rejection_reason(err: &ExecError) -> &'static str {
    match err {
        ExecError::UnsupportedLanguage(_) => "unsupported_language",
        ExecError::InvalidRequest(_) => "invalid_request",
        _ => "internal",
    }
}

/// POST /execute - Run one program and return its result
pub async fn execute(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            metrics::record_rejected("malformed_request");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.executor.execute(&request).await {
        Ok(result) => {
            // Aliases ("c++", "JS") share one series per language
            if let Ok(profile) = language::resolve(&request.language) {
                metrics::record_execution(
                    profile.language,
                    result.outcome(),
                    result.execution_time_ms as f64,
                );
            }

            match &result.system_error {
                Some(message) => {
                    error!(language = %request.language, error = %message, "execution failed");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, message.clone())
                }
                None => (StatusCode::OK, Json(result)).into_response(),
            }
        }
        Err(e) if e.is_validation() => {
            metrics::record_rejected(rejection_reason(&e));
            warn!(language = %request.language, error = %e, "request rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(language = %request.language, error = %e, "execution failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /languages - Supported languages and their sandbox images
pub async fn list_languages() -> impl IntoResponse {
    let languages: Vec<LanguageInfo> = Language::all_variants()
        .iter()
        .map(|l| {
            let profile = language::profile(*l);
            LanguageInfo {
                language: *l,
                extension: profile.file_extension,
                compiled: profile.is_compiled(),
                image: profile.image_tag(),
            }
        })
        .collect();

    Json(languages)
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler() -> Response {
    match metrics::render_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
