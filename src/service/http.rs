//! HTTP surface: `POST /analyze-inventory` and `GET /health`.
use super::{AnalysisContext, AnalyzeRequest, RequestError};
use crate::config::ServiceConfig;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub const SERVICE_NAME: &str = "inventory-enrich";

#[derive(Clone)]
pub struct AppState {
    context: Arc<AnalysisContext>,
}

impl AppState {
    pub fn new(context: AnalysisContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }
}

#[derive(Serialize)]
struct HealthResp {
    ok: bool,
    service: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze-inventory", post(analyze_inventory))
        .with_state(state)
}

/// Bind `config.bind` and serve until the process is stopped.
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let bind = config.bind;
    let context = AnalysisContext::from_config(config)?;
    let app = router(AppState::new(context));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, app).await.context("serve http")?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResp {
            ok: true,
            service: SERVICE_NAME,
        }),
    )
}

async fn analyze_inventory(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &RequestError::InvalidRequest(rejection.body_text()),
            );
        }
    };

    let context = Arc::clone(&state.context);
    let outcome = tokio::task::spawn_blocking(move || context.run_analysis(&request)).await;
    match outcome {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        // Anything raised past body decoding is a caught failure: always 500.
        Ok(Err(err)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
        Err(join) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &RequestError::Internal(join.to_string()),
        ),
    }
}

fn error_response(status: StatusCode, err: &RequestError) -> Response {
    let body = err.body();
    if status.is_server_error() {
        tracing::error!(error = %body.error, details = %body.details, "request failed");
    } else {
        tracing::warn!(error = %body.error, details = %body.details, "request rejected");
    }
    (status, Json(body)).into_response()
}
