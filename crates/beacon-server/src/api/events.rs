//! Recent trigger events.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::events::EventEntry;
use crate::state::SharedState;

const DEFAULT_LIMIT: usize = 50;

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/api/events", get(list_events))
}

/// Query parameters for the events endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Maximum number of events to return. Defaults to 50.
    #[param(example = 20, minimum = 1)]
    pub limit: Option<usize>,
}

/// Recent trigger events, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventsResponse {
    /// Events, newest first.
    pub events: Vec<EventEntry>,
}

/// List recent trigger events.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    operation_id = "listEvents",
    summary = "List recent trigger events",
    description = "Returns the trigger cards fired on confirmed presence changes, \
        newest first. Only a bounded number of events is kept in memory.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Events listed", body = EventsResponse)
    )
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let events = state.read().await.events.clone();
    Json(EventsResponse {
        events: events.recent(query.limit.unwrap_or(DEFAULT_LIMIT)),
    })
}
