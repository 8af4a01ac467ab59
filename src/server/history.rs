//! `/api/interviews`: the shared exchange history.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tracing::warn;

use super::{ServerServices, error_response};
use crate::api::{AppendResponse, ErrorResponse, ListQuery, ListResponse};
use crate::history::{Exchange, StoreError, newest_first};

pub(super) fn routes() -> Router<ServerServices> {
    Router::new().route("/api/interviews", get(list).post(append))
}

/// Ordered listings go through the indexed query and may fail with
/// `MISSING_INDEX`; unordered ones return the whole collection.
async fn list(State(services): State<ServerServices>, Query(query): Query<ListQuery>) -> Response {
    let result = if query.ordered {
        let limit = query.limit.unwrap_or(services.list_limit);
        services
            .history
            .query_recent(limit)
            .await
            .map(|exchanges| newest_first(exchanges, limit))
    } else {
        services.history.fetch_all().await
    };

    match result {
        Ok(exchanges) => Json(ListResponse { exchanges }).into_response(),
        Err(e) => store_error(&e),
    }
}

async fn append(State(services): State<ServerServices>, Json(exchange): Json<Exchange>) -> Response {
    match services.history.append(exchange).await {
        Ok(id) => (StatusCode::CREATED, Json(AppendResponse { id })).into_response(),
        Err(e) => store_error(&e),
    }
}

fn store_error(e: &StoreError) -> Response {
    let status = match e {
        StoreError::PermissionDenied(_) => 403,
        StoreError::MissingIndex(_) => 409,
        StoreError::Backend(_) => 500,
    };
    warn!(code = e.code(), error = %e, "history store error");
    error_response(status, ErrorResponse::with_code(e.to_string(), e.code()))
}
