//! `POST /api/process`: answer generation.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use tracing::{error, info, warn};

use super::{ServerServices, error_response};
use crate::api::{ErrorResponse, ProcessRequest, ProcessResponse};
use crate::resolver::build_prompt;

pub(super) fn routes() -> Router<ServerServices> {
    Router::new().route("/api/process", post(handle_process))
}

/// The credential check comes first: without a key nothing else matters and
/// no upstream call is made. The body is parsed by hand so malformed JSON
/// gets the same 400 as missing fields.
async fn handle_process(State(services): State<ServerServices>, body: Bytes) -> Response {
    let Some(api_key) = services.credential.resolve() else {
        error!(var = services.credential.name(), "upstream credential is not set");
        return error_response(
            500,
            ErrorResponse::new(format!(
                "Server misconfiguration: {} is not set",
                services.credential.name()
            )),
        );
    };

    let request: ProcessRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "unparseable process request");
            return missing_fields();
        }
    };
    let (Some(details), Some(transcript)) = (
        request.details.filter(|d| !d.is_empty()),
        request.transcript.filter(|t| !t.is_empty()),
    ) else {
        return missing_fields();
    };

    let prompt = build_prompt(&details, &transcript);
    match services.resolver.resolve(&api_key, &prompt).await {
        Ok(resolution) => {
            info!(
                model = resolution.model.as_str(),
                skipped = resolution.skipped.len(),
                "answer generated"
            );
            Json(ProcessResponse {
                answer: resolution.answer,
            })
            .into_response()
        }
        Err(e) => {
            warn!(code = e.code(), status = e.http_status(), "answer generation failed");
            error_response(e.http_status(), ErrorResponse::new(e.to_string()))
        }
    }
}

fn missing_fields() -> Response {
    error_response(400, ErrorResponse::new("Missing details or transcript"))
}
