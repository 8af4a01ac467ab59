//! `/api/sessions/{id}/...`: the command and answer mailboxes.

use std::convert::Infallible;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::get;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use tracing::debug;

use super::ServerServices;
use crate::remote::{BroadcastAnswer, RemoteCommand};

pub(super) fn routes() -> Router<ServerServices> {
    Router::new()
        .route("/api/sessions/{id}/control", get(get_control).put(put_control))
        .route("/api/sessions/{id}/answer", get(get_answer).put(put_answer))
        .route("/api/sessions/{id}/control/events", get(control_events))
        .route("/api/sessions/{id}/answer/events", get(answer_events))
}

async fn get_control(
    State(services): State<ServerServices>,
    Path(id): Path<String>,
) -> Json<Option<RemoteCommand>> {
    Json(services.sessions.slots(&id).control.latest())
}

async fn put_control(
    State(services): State<ServerServices>,
    Path(id): Path<String>,
    Json(command): Json<RemoteCommand>,
) -> StatusCode {
    debug!(session = id.as_str(), action = %command.action, "control written");
    services.sessions.slots(&id).control.publish(command);
    StatusCode::NO_CONTENT
}

async fn get_answer(
    State(services): State<ServerServices>,
    Path(id): Path<String>,
) -> Json<Option<BroadcastAnswer>> {
    Json(services.sessions.slots(&id).answer.latest())
}

async fn put_answer(
    State(services): State<ServerServices>,
    Path(id): Path<String>,
    Json(answer): Json<BroadcastAnswer>,
) -> StatusCode {
    debug!(session = id.as_str(), "answer written");
    services.sessions.slots(&id).answer.publish(answer);
    StatusCode::NO_CONTENT
}

async fn control_events(
    State(services): State<ServerServices>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(session = id.as_str(), "control subscriber attached");
    event_stream("control", services.sessions.slots(&id).control.updates())
}

async fn answer_events(
    State(services): State<ServerServices>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(session = id.as_str(), "answer subscriber attached");
    event_stream("answer", services.sessions.slots(&id).answer.updates())
}

/// One SSE event per observed slot value, named after the slot.
fn event_stream<T>(
    name: &'static str,
    mut updates: BoxStream<'static, T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Send + 'static,
{
    let stream = async_stream::stream! {
        while let Some(value) = updates.next().await {
            if let Ok(json) = serde_json::to_string(&value) {
                yield Ok(Event::default().event(name).data(json));
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
