//! Resource models for the booking API
//!
//! This module contains the data types decoded from the external API (locations,
//! function room groups, booking events), the static room-group mapping, and the
//! client that fetches them through the response cache.

pub mod client;
pub mod mapping;
pub mod payload;
pub mod transport;

pub use client::{ApiClient, ApiConfig, ApiError, CacheLevel, EventSearch};
pub use mapping::{load_room_group_mapping, MappingError};
pub use payload::{Cacheable, Payload, PayloadCache};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

use serde::{Deserialize, Serialize};

/// A venue known to the booking system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub status: String,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub country_code: String,
    pub phone: String,
    pub fax: String,
    pub time_zone: String,
    pub web_site_url: String,
    pub nearest_airport_code: String,
    #[serde(rename = "DistanceTonearestAirport", deserialize_with = "lenient::number")]
    pub distance_to_nearest_airport: Option<f64>,
    pub distance_unit_of_measure: String,
    #[serde(deserialize_with = "lenient::number")]
    pub drivetime_to_nearest_airport_in_minutes: Option<f64>,
}

/// A named group of function rooms at a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct FunctionRoomGroup {
    pub id: String,
    pub external_id: String,
    pub record_status: String,
    pub function_room_ids: Vec<String>,
    pub external_function_room_ids: Vec<String>,
    pub location_id: String,
    pub external_location_id: String,
    pub alternate_description: String,
    pub alternate_name: String,
    pub description: String,
    pub name: String,
}

/// One definite booking event
///
/// Date-times are kept as the API's local ISO strings (`2024-01-01T09:30:00`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct BookingEvent {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub alternate_name: String,
    pub description: String,
    pub account_name: String,
    pub alternate_account_name: String,
    pub booking_post_as: String,
    pub booking_type_name: String,
    pub event_classification_name: String,
    pub alternate_event_classification_name: String,
    pub function_room_name: String,
    pub alternate_function_room_name: String,
    pub location_name: String,
    pub start_date_time: String,
    pub end_date_time: String,
    pub is_posted: bool,
    pub external_account_id: String,
    pub external_function_room_id: String,
    pub external_booking_id: String,
    pub external_location_id: String,
    #[serde(deserialize_with = "lenient::number")]
    pub agreed_attendance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub estimated_attendance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub forecasted_attendance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub guaranteed_attendance: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub set_attendance: Option<f64>,
}

/// Static mapping of a combined room group to its member rooms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomGroup {
    #[serde(rename = "RoomGroup")]
    pub room_group: String,
    #[serde(rename = "Rooms", default)]
    pub rooms: Vec<String>,
}

/// Deserializers for numbers the API sometimes sends as strings
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    /// Accepts a JSON number, a numeric string, `null`, or an empty string
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Number(n)) => Ok(Some(n)),
            Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(NumberOrString::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }

    /// Integer variant of `number`; fractional values are truncated
    pub fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(number(deserializer)?.map(|n| n as i64).unwrap_or(0))
    }
}
