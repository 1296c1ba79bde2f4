//! HTTP server for the signage views
//!
//! Handlers share one `ApiClient` (and through it one cache and token manager)
//! via axum state. Each request works under a child of the server's shutdown token.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::data::mapping::room_in_group;
use crate::data::{ApiClient, ApiError, EventSearch};
use crate::views;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub api: ApiClient,
    /// Timezone the venue's wall clock runs in
    pub timezone: Tz,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(api: ApiClient, timezone: Tz, shutdown: CancellationToken) -> Self {
        Self {
            api,
            timezone,
            shutdown,
        }
    }

    /// Today and tomorrow in the venue timezone, as `YYYY-MM-DD`
    fn date_range(&self) -> (String, String) {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);
        (
            today.format(DATE_FORMAT).to_string(),
            tomorrow.format(DATE_FORMAT).to_string(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct CoverQuery {
    #[serde(rename = "location-id")]
    location_id: Option<String>,
    #[serde(rename = "room-id")]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScheduleQuery {
    #[serde(rename = "location-id")]
    location_id: Option<String>,
    #[serde(rename = "group-id")]
    group_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    cached_entries: usize,
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn upstream_error(err: &ApiError) -> Response {
    let status = match err {
        ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ApiError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::error!(status = status.as_u16(), "view request failed: {}", err);
    (status, Html(views::render_error(&err.to_string()))).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cached_entries: state.api.cache().len(),
    })
}

async fn cover(State(state): State<AppState>, Query(query): Query<CoverQuery>) -> Response {
    let (Some(location_id), Some(room_id)) = (non_empty(query.location_id), non_empty(query.room_id))
    else {
        return bad_request("location-id and room-id must be provided");
    };

    let cancel = state.shutdown.child_token();
    let (begin, end) = state.date_range();
    let search = EventSearch::new(location_id, begin, end);

    match state.api.booking_events(&search, &cancel).await {
        Ok(events) => {
            let now = Utc::now().with_timezone(&state.timezone).time();
            let cache = state.api.cache();
            let screen = views::current_event(&events, &room_id, now, |room, group| {
                room_in_group(cache, room, group)
            });
            Html(views::render_cover(&room_id, screen.as_ref())).into_response()
        }
        Err(err) => upstream_error(&err),
    }
}

async fn schedule(State(state): State<AppState>, Query(query): Query<ScheduleQuery>) -> Response {
    let Some(location_id) = non_empty(query.location_id) else {
        return bad_request("location-id must be provided");
    };
    let group_id = non_empty(query.group_id);

    let cancel = state.shutdown.child_token();
    let (begin, end) = state.date_range();
    let mut search = EventSearch::new(location_id, begin, end);
    if let Some(group_id) = &group_id {
        search = search.in_room_group(group_id.clone());
    }

    let heading = async {
        let group_id = group_id.as_ref()?;
        match state
            .api
            .function_room_groups(std::slice::from_ref(group_id), &cancel)
            .await
        {
            Ok(groups) => groups
                .into_iter()
                .find(|g| &g.id == group_id)
                .map(|g| g.name),
            Err(err) => {
                tracing::warn!(group_id = %group_id, "failed to look up room group: {}", err);
                None
            }
        }
    };
    let (events, heading) = tokio::join!(state.api.booking_events(&search, &cancel), heading);

    match events {
        Ok(events) => Html(views::render_schedule(heading.as_deref(), &events)).into_response(),
        Err(err) => upstream_error(&err),
    }
}

async fn locations(State(state): State<AppState>) -> Response {
    let cancel = state.shutdown.child_token();
    match state.api.locations_by_id(&cancel).await {
        Ok(locations) => Html(views::render_locations(&locations)).into_response(),
        Err(err) => upstream_error(&err),
    }
}

/// Builds the view router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/view/cover", get(cover))
        .route("/view/schedule", get(schedule))
        .route("/view/locations", get(locations))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled, then drains in-flight requests
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "serving views");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
