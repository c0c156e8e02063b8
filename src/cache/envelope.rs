//! TTL Envelope Module
//!
//! JSON wrapper written to the persistent tier:
//! `{"value": <string>, "expiresAt": <epoch-millis, optional>}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::entry::current_timestamp_ms;
use crate::error::Result;

/// Turns a value into the string stored inside an envelope.
pub type SerializeFn<T> = fn(&T) -> Result<String>;
/// Rebuilds a value from the string stored inside an envelope.
pub type DeserializeFn<T> = fn(&str) -> Result<T>;

// == Codec ==
/// Value encoding injected into the persistent-tier caches.
pub struct Codec<T> {
    pub serialize: SerializeFn<T>,
    pub deserialize: DeserializeFn<T>,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Codec<T> {}

impl<T> Codec<T> {
    pub fn new(serialize: SerializeFn<T>, deserialize: DeserializeFn<T>) -> Self {
        Self {
            serialize,
            deserialize,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> {
    /// JSON encoding through serde_json.
    pub fn json() -> Self {
        Self::new(json_serialize::<T>, json_deserialize::<T>)
    }
}

fn json_serialize<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn json_deserialize<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

// == Envelope ==
/// A serialized value plus its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub value: String,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Envelope {
    pub fn new(value: String, expires_at: Option<u64>) -> Self {
        Self { value, expires_at }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires| current_timestamp_ms() >= expires)
    }

    /// Milliseconds left before expiry; negative once past it.
    pub fn remaining_ms(&self) -> Option<i64> {
        self.expires_at
            .map(|expires| {
                let expires = i64::try_from(expires).unwrap_or(i64::MAX);
                let now = i64::try_from(current_timestamp_ms()).unwrap_or(i64::MAX);
                expires.saturating_sub(now)
            })
    }
}
