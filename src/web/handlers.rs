use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::{
    input::{parse_multipart, ScoreApiRequest, ScoreInput},
    page::{render, PageView},
    AppState,
};
use crate::{
    error::{ScoreError, ScoreResult},
    scoring::{score_lines, LineScore},
};

#[derive(Debug, Serialize)]
pub struct ScoreApiResponse {
    pub request_id: String,
    pub label: String,
    pub lines: Vec<LineScore>,
}

pub async fn index(State(state): State<AppState>) -> Response {
    page_response(
        StatusCode::OK,
        PageView {
            labels: state.labels.all_labels(),
            ..Default::default()
        },
    )
}

pub async fn score_form(State(state): State<AppState>, multipart: Multipart) -> Response {
    let input = match parse_multipart(multipart).await {
        Ok(input) => input,
        Err(err) => {
            return page_response(
                err.status(),
                PageView {
                    labels: state.labels.all_labels(),
                    error: Some(&err),
                    ..Default::default()
                },
            )
        }
    };

    // The radio group always has a selection; mirror that when the field is missing.
    let label = input
        .label
        .clone()
        .or_else(|| state.labels.all_labels().first().cloned())
        .unwrap_or_default();
    let pasted = input.text.clone().unwrap_or_default();
    let request_id = Uuid::new_v4().to_string();

    let outcome = run_scoring(&state, input, &label, &request_id).await;
    let (status, results, error) = match &outcome {
        Ok(rows) => (StatusCode::OK, Some(rows.as_slice()), None),
        Err(err) => (err.status(), None, Some(err)),
    };

    page_response(
        status,
        PageView {
            labels: state.labels.all_labels(),
            selected: Some(label.as_str()),
            text: &pasted,
            results,
            error,
        },
    )
}

pub async fn score_json(
    State(state): State<AppState>,
    payload: Result<Json<ScoreApiRequest>, JsonRejection>,
) -> Result<Json<ScoreApiResponse>, ScoreError> {
    let Json(req) = payload.map_err(|rejection| ScoreError::InvalidUpload(rejection.body_text()))?;
    let label = req.label.clone();
    let input = req.into_input()?;
    let request_id = Uuid::new_v4().to_string();

    let lines = run_scoring(&state, input, &label, &request_id).await?;

    Ok(Json(ScoreApiResponse {
        request_id,
        label,
        lines,
    }))
}

pub async fn labels(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "labels": state.labels.all_labels() }))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "device": state.device,
        "labels": state.labels.len(),
    }))
}

/// Extraction and per-line inference are CPU bound, so the whole pass runs on
/// the blocking pool.
async fn run_scoring(
    state: &AppState,
    input: ScoreInput,
    label: &str,
    request_id: &str,
) -> ScoreResult<Vec<LineScore>> {
    let predictor = state.predictor.clone();
    let labels = state.labels.clone();
    let target = label.to_string();
    let span = info_span!("score", request_id, label);

    let outcome = tokio::task::spawn_blocking(move || -> ScoreResult<Vec<LineScore>> {
        let _guard = span.enter();
        let raw = input.into_raw_text()?;
        let scored = score_lines(predictor.as_ref(), &labels, &raw, &target)?;
        info!(lines = scored.len(), "scored request");
        Ok(scored)
    })
    .await
    .map_err(|e| ScoreError::Inference(format!("scoring task failed: {e}")))?;

    if let Err(err) = &outcome {
        warn!(request_id, code = err.code(), "scoring rejected: {err}");
    }
    outcome
}

fn page_response(status: StatusCode, view: PageView<'_>) -> Response {
    match render(view) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("template error: {e}"),
        )
            .into_response(),
    }
}
