//! Tagged union of everything the response cache holds
//!
//! The cache is generic over its value type; the application instantiates it
//! with `Payload`. Call sites read and write through `Cacheable`, so a value of
//! the wrong shape under a key reads as a miss rather than a runtime cast failure.

use serde::{Deserialize, Serialize};

use super::{BookingEvent, FunctionRoomGroup, Location, RoomGroup};
use crate::auth::Credential;
use crate::cache::{Cache, Ttl};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Payload {
    Token(String),
    Credential(Credential),
    Locations(Vec<Location>),
    RoomGroup(FunctionRoomGroup),
    BookingEvents(Vec<BookingEvent>),
    RoomMapping(RoomGroup),
}

/// A type that can be stored in the application cache
pub trait Cacheable: Sized {
    fn into_payload(self) -> Payload;
    fn from_payload(payload: Payload) -> Option<Self>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn into_payload(self) -> Payload {
                Payload::$variant(self)
            }

            fn from_payload(payload: Payload) -> Option<Self> {
                match payload {
                    Payload::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(String, Token);
cacheable!(Credential, Credential);
cacheable!(Vec<Location>, Locations);
cacheable!(FunctionRoomGroup, RoomGroup);
cacheable!(Vec<BookingEvent>, BookingEvents);
cacheable!(RoomGroup, RoomMapping);

/// Typed access to a `Cache<Payload>`
pub trait PayloadCache {
    fn get_typed<T: Cacheable>(&self, key: &str) -> Option<T>;
    fn get_typed_with_expiration<T: Cacheable>(
        &self,
        key: &str,
    ) -> Option<(T, Option<chrono::DateTime<chrono::Utc>>)>;
    fn set_typed<T: Cacheable>(&self, key: impl Into<String>, value: T, ttl: Ttl);
    fn add_typed<T: Cacheable>(&self, key: impl Into<String>, value: T, ttl: Ttl) -> bool;
}

impl PayloadCache for Cache<Payload> {
    fn get_typed<T: Cacheable>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_payload)
    }

    fn get_typed_with_expiration<T: Cacheable>(
        &self,
        key: &str,
    ) -> Option<(T, Option<chrono::DateTime<chrono::Utc>>)> {
        let (payload, expires_at) = self.get_with_expiration(key)?;
        T::from_payload(payload).map(|value| (value, expires_at))
    }

    fn set_typed<T: Cacheable>(&self, key: impl Into<String>, value: T, ttl: Ttl) {
        self.set(key, value.into_payload(), ttl);
    }

    fn add_typed<T: Cacheable>(&self, key: impl Into<String>, value: T, ttl: Ttl) -> bool {
        self.add(key, value.into_payload(), ttl)
    }
}
