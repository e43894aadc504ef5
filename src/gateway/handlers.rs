use crate::auth::Actor;
use crate::conversation::Purpose;
use crate::error::GenerationError;
use crate::generation::GeneratorKind;
use crate::generation::orchestrator::error_body;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use futures_util::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;

use super::{AppState, SummarizeBody};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Actor behind `Authorization: Bearer <token>`, if any.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<Actor> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");
    if token.is_empty() {
        return None;
    }
    state.directory.authenticate(token)
}

fn error_response(error: &GenerationError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error_body(error))).into_response()
}

fn parse_purpose(raw: &str) -> Result<Purpose, Response> {
    Purpose::from_str(raw).map_err(|_| {
        error_response(&GenerationError::Validation(format!(
            "unknown conversation purpose '{raw}'"
        )))
    })
}

/// GET /health (public)
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// GET /api/generate/{kind}: NDJSON stream of generated records
pub(super) async fn handle_generate(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let Ok(kind) = GeneratorKind::from_str(&kind) else {
        return error_response(&GenerationError::NotFound(format!(
            "unknown generator '{kind}'"
        )));
    };
    let actor = authenticate(&state, &headers);

    match state.orchestrator.generate(kind, &params, actor.as_ref()).await {
        Ok(lines) => {
            let body = Body::from_stream(lines.map(Ok::<_, Infallible>));
            let mut response = Response::new(body);
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(NDJSON_CONTENT_TYPE),
            );
            response
        }
        Err(error) => error_response(&error),
    }
}

/// POST /api/summarize: force-summarize one conversation
pub(super) async fn handle_summarize(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SummarizeBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Some(actor) = authenticate(&state, &headers) else {
        return error_response(&GenerationError::Unauthorized);
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            return error_response(&GenerationError::Validation(format!("invalid JSON: {e}")));
        }
    };
    let purpose = match parse_purpose(&request.purpose) {
        Ok(purpose) => purpose,
        Err(response) => return response,
    };
    if !Purpose::SUMMARIZABLE.contains(&purpose) {
        return error_response(&GenerationError::Validation(format!(
            "{purpose} conversations are not summarized"
        )));
    }

    let report = state.summarizer.force(request.song_id, purpose, &actor).await;
    (StatusCode::OK, Json(json!({"success": report.summarized, "report": report}))).into_response()
}

/// GET /api/songs/{song_id}/conversations/{purpose}/stats
pub(super) async fn handle_stats(
    State(state): State<AppState>,
    Path((song_id, purpose)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Response {
    let Some(actor) = authenticate(&state, &headers) else {
        return error_response(&GenerationError::Unauthorized);
    };
    let purpose = match parse_purpose(&purpose) {
        Ok(purpose) => purpose,
        Err(response) => return response,
    };
    let stats = state.conversations.get_stats(song_id, purpose, &actor.id).await;
    Json(json!({"song_id": song_id, "purpose": purpose, "stats": stats})).into_response()
}

/// POST /api/songs/{song_id}/conversations/{purpose}/cleanup
pub(super) async fn handle_cleanup(
    State(state): State<AppState>,
    Path((song_id, purpose)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Response {
    let Some(actor) = authenticate(&state, &headers) else {
        return error_response(&GenerationError::Unauthorized);
    };
    let purpose = match parse_purpose(&purpose) {
        Ok(purpose) => purpose,
        Err(response) => return response,
    };
    let removed = state
        .conversations
        .cleanup_incomplete(song_id, purpose, &actor.id)
        .await;
    tracing::info!(song_id, purpose = %purpose, removed, user = %actor.id, "cleaned up conversation");
    Json(json!({"success": true, "removed": removed})).into_response()
}
