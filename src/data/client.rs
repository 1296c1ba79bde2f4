//! Booking API client
//!
//! Every operation composes its cache key, consults the response cache, and on a
//! miss sends the request (with a bearer token for `/api` paths), decodes the JSON
//! body and stores the result.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::payload::{Cacheable, PayloadCache};
use super::{BookingEvent, FunctionRoomGroup, HttpRequest, Location, Payload, Transport, TransportError};
use crate::auth::{AuthError, TokenManager, TokenOutcome};
use crate::cache::{Cache, CacheKey, Ttl, KEY_DELIMITER};

/// Header carrying the API management subscription key
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Default base URL of the booking API
pub const DEFAULT_BASE_URL: &str = "https://api.newmarketinc.com";

/// Paths under this prefix require a bearer token
const API_PATH: &str = "/api";
const LOCATIONS_BY_ID_PATH: &str = "/api/location/LocationId";
const LOCATIONS_BY_EXTERNAL_ID_PATH: &str = "/api/location/ExternalLocationId";
const FUNCTION_ROOM_GROUP_SEARCH_PATH: &str = "/api/functionroomgroup/Search";
const DEFINITE_EVENT_SEARCH_PATH: &str = "/api/bookingEvent/DefiniteEventSearch";

const LOCATIONS_BY_ID_KEY: &str = "LocationsByID";
const LOCATIONS_BY_EXTERNAL_ID_KEY: &str = "LocationsByExternalID";
const FUNCTION_ROOM_GROUP_PREFIX: &str = "FunctionRoomGroup";
const BOOKING_EVENTS_PREFIX: &str = "BookingEventsDetailsWithInDateRange";

/// Where the booking API lives and how to identify to it
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub subscription_key: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, subscription_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            subscription_key: subscription_key.into(),
        }
    }

    /// Absolute URL for `path`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// How much of the traffic goes through the response cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CacheLevel {
    /// Nothing is cached; every token request logs in again
    None,
    /// Only tokens are cached
    Auth,
    /// Tokens and API responses are cached
    #[default]
    All,
}

impl CacheLevel {
    pub fn caches_tokens(self) -> bool {
        !matches!(self, CacheLevel::None)
    }

    pub fn caches_responses(self) -> bool {
        matches!(self, CacheLevel::All)
    }
}

/// Errors returned by API operations
#[derive(Debug, Error)]
pub enum ApiError {
    /// No bearer token could be obtained; the request was not sent
    #[error("Not authenticated: {0}")]
    Unauthenticated(#[source] AuthError),

    /// The request could not be sent
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The API answered with a non-success status
    #[error("{path} returned status {status}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    /// The response body did not match the expected shape
    #[error("Failed to parse API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller's cancellation fired before the call completed
    #[error("Request cancelled")]
    Cancelled,

    /// The caller passed unusable arguments
    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

/// Parameters of a definite event search
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventSearch {
    #[serde(rename = "BookingEventDateTimeBegin")]
    pub begin: String,
    #[serde(rename = "BookingEventDateTimeEnd")]
    pub end: String,
    #[serde(rename = "FunctionRoomGroupId", skip_serializing_if = "String::is_empty")]
    pub room_group_id: String,
    #[serde(rename = "LocationId")]
    pub location_id: String,
    #[serde(rename = "MaxResultCount")]
    pub max_result_count: u32,
}

impl EventSearch {
    /// Events at `location_id` between the `begin` and `end` dates (`YYYY-MM-DD`)
    pub fn new(location_id: impl Into<String>, begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
            location_id: location_id.into(),
            ..Default::default()
        }
    }

    /// Restricts the search to one function room group
    pub fn in_room_group(mut self, room_group_id: impl Into<String>) -> Self {
        self.room_group_id = room_group_id.into();
        self
    }

    /// `BookingEventsDetailsWithInDateRange:<begin>:to:<end>:AtLocation:<loc>[:InGroup:<group>]`
    ///
    /// The group segment only appears for group-filtered searches, so unfiltered
    /// keys are unchanged and filtered results never share an entry with them.
    /// Keys are only distinct while no field contains `:`; `ApiClient` rejects
    /// such searches before building the key.
    pub fn cache_key(&self) -> CacheKey {
        let key = CacheKey::new(BOOKING_EVENTS_PREFIX)
            .segment(&self.begin)
            .param("to", &self.end)
            .param("AtLocation", &self.location_id);
        if self.room_group_id.is_empty() {
            key
        } else {
            key.param("InGroup", &self.room_group_id)
        }
    }
}

/// Rejects values containing the key delimiter
///
/// Ids are joined into cache keys verbatim; a `:` inside one could make two
/// different requests share a key.
fn ensure_key_safe(field: &str, value: &str) -> Result<(), ApiError> {
    if value.contains(KEY_DELIMITER) {
        return Err(ApiError::InvalidInput(format!(
            "{} must not contain '{}': {}",
            field, KEY_DELIMITER, value
        )));
    }
    Ok(())
}

/// Request body for a function room group search
#[derive(Debug, Serialize)]
struct RoomGroupSearch<'a> {
    // The upstream search takes group ids under this field name.
    #[serde(rename = "LocationIds")]
    ids: &'a [String],
}

/// Cache key for one function room group
pub fn room_group_id_key(id: &str) -> CacheKey {
    CacheKey::new(FUNCTION_ROOM_GROUP_PREFIX).segment(id)
}

/// Client for the booking API, shared by all request handlers
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cache: Arc<Cache<Payload>>,
    tokens: Arc<TokenManager>,
    config: ApiConfig,
    level: CacheLevel,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<Cache<Payload>>,
        tokens: Arc<TokenManager>,
        config: ApiConfig,
        level: CacheLevel,
    ) -> Self {
        Self {
            transport,
            cache,
            tokens,
            config,
            level,
        }
    }

    pub fn cache(&self) -> &Arc<Cache<Payload>> {
        &self.cache
    }

    /// All locations keyed by internal id
    pub async fn locations_by_id(&self, cancel: &CancellationToken) -> Result<Vec<Location>, ApiError> {
        self.cached_list(LOCATIONS_BY_ID_KEY, LOCATIONS_BY_ID_PATH, cancel).await
    }

    /// All locations keyed by external id
    pub async fn locations_by_external_id(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Location>, ApiError> {
        self.cached_list(LOCATIONS_BY_EXTERNAL_ID_KEY, LOCATIONS_BY_EXTERNAL_ID_PATH, cancel)
            .await
    }

    /// Function room groups for `ids`
    ///
    /// Ids already cached are served from the cache and only the rest are
    /// requested. Fetched groups are merged with `add` so entries another caller
    /// already stored are left alone. Fetched groups come first in the result.
    pub async fn function_room_groups(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<FunctionRoomGroup>, ApiError> {
        if ids.is_empty() {
            return Err(ApiError::InvalidInput("no function room group ids".to_string()));
        }

        for id in ids {
            ensure_key_safe("function room group id", id)?;
        }

        let mut cached = Vec::new();
        let mut to_query = Vec::new();
        for id in ids {
            let key = room_group_id_key(id);
            match self.lookup::<FunctionRoomGroup>(key.as_str()) {
                Some(group) => cached.push(group),
                None => to_query.push(id.clone()),
            }
        }
        if to_query.is_empty() {
            return Ok(cached);
        }

        let body = serde_json::to_vec(&RoomGroupSearch { ids: &to_query })?;
        let mut fetched: Vec<FunctionRoomGroup> = self
            .fetch(Method::POST, FUNCTION_ROOM_GROUP_SEARCH_PATH, Some(body), cancel)
            .await?;

        if self.level.caches_responses() {
            for group in &fetched {
                self.cache
                    .add_typed(room_group_id_key(&group.id), group.clone(), Ttl::Default);
            }
        }
        fetched.extend(cached);
        Ok(fetched)
    }

    /// Definite booking events matching `search`
    pub async fn booking_events(
        &self,
        search: &EventSearch,
        cancel: &CancellationToken,
    ) -> Result<Vec<BookingEvent>, ApiError> {
        if search.location_id.is_empty() {
            return Err(ApiError::InvalidInput("location id is required".to_string()));
        }
        ensure_key_safe("begin date", &search.begin)?;
        ensure_key_safe("end date", &search.end)?;
        ensure_key_safe("location id", &search.location_id)?;
        ensure_key_safe("room group id", &search.room_group_id)?;

        let key = search.cache_key();
        if let Some(events) = self.lookup::<Vec<BookingEvent>>(key.as_str()) {
            return Ok(events);
        }

        let body = serde_json::to_vec(search)?;
        let events: Vec<BookingEvent> = self
            .fetch(Method::POST, DEFINITE_EVENT_SEARCH_PATH, Some(body), cancel)
            .await?;
        self.store(key.as_str(), &events);
        Ok(events)
    }

    async fn cached_list(
        &self,
        key: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Location>, ApiError> {
        if let Some(locations) = self.lookup::<Vec<Location>>(key) {
            return Ok(locations);
        }
        let locations: Vec<Location> = self.fetch(Method::GET, path, None, cancel).await?;
        self.store(key, &locations);
        Ok(locations)
    }

    /// Reads `key` from the cache when responses are cached
    fn lookup<T: Cacheable>(&self, key: &str) -> Option<T> {
        if !self.level.caches_responses() {
            return None;
        }
        match self.cache.get_typed_with_expiration::<T>(key) {
            Some((value, expires_at)) => {
                tracing::debug!(key, expires_at = ?expires_at, "cache hit");
                Some(value)
            }
            None => {
                tracing::debug!(key, "cache miss");
                None
            }
        }
    }

    /// Caches a non-empty list result under `key`
    fn store<T: Clone>(&self, key: &str, values: &[T])
    where
        Vec<T>: Cacheable,
    {
        if self.level.caches_responses() && !values.is_empty() {
            self.cache.set_typed(key, values.to_vec(), Ttl::Default);
        }
    }

    /// Sends one request and decodes the JSON response
    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let mut request = HttpRequest::new(method, self.config.url(path))
            .header(SUBSCRIPTION_KEY_HEADER, self.config.subscription_key.as_str());
        if let Some(body) = body {
            request = request.json_body(body);
        }

        if path.starts_with(API_PATH) {
            let token = match self.tokens.acquire(cancel).await {
                TokenOutcome::Failed(AuthError::Cancelled) => return Err(ApiError::Cancelled),
                TokenOutcome::Failed(err) => return Err(ApiError::Unauthenticated(err)),
                outcome => outcome.into_token(),
            };
            request = request.header("Authorization", format!("OAuth {}", token));
        }

        let response = cancellable(cancel, self.transport.send(request)).await??;
        if !response.is_success() {
            let err = ApiError::Status {
                path: path.to_string(),
                status: response.status,
                message: response.body_snippet(),
            };
            tracing::error!("{}", err);
            return Err(err);
        }

        serde_json::from_slice(&response.body).map_err(|err| {
            tracing::error!(path, "failed to decode response: {}", err);
            ApiError::Decode(err)
        })
    }
}

/// Races `future` against `cancel`
async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        output = future => Ok(output),
    }
}
