//! Payload type registry.
//!
//! Maps an event-name tag to a decode function producing a value of the
//! caller's event type. Lookups by unknown tags and malformed payloads are
//! explicit [`StoreError::DecodeFailed`] results, never silent skips.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::StoreError;

type Decoder<E> = Box<dyn Fn(serde_json::Value) -> Result<E, serde_json::Error> + Send + Sync>;

/// Registry of payload decoders keyed by event name.
pub struct TypeRegistry<E> {
    decoders: HashMap<String, Decoder<E>>,
}

impl<E> TypeRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers a decoder for `event_name`: the payload deserializes into
    /// `P`, then `into_event` lifts it into the caller's event type.
    pub fn register<P, F>(&mut self, event_name: impl Into<String>, into_event: F)
    where
        P: DeserializeOwned,
        F: Fn(P) -> E + Send + Sync + 'static,
    {
        self.decoders.insert(
            event_name.into(),
            Box::new(move |payload| serde_json::from_value(payload).map(&into_event)),
        );
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<P, F>(mut self, event_name: impl Into<String>, into_event: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(P) -> E + Send + Sync + 'static,
    {
        self.register(event_name, into_event);
        self
    }

    /// Returns `true` if a decoder is registered for `event_name`.
    #[must_use]
    pub fn knows(&self, event_name: &str) -> bool {
        self.decoders.contains_key(event_name)
    }

    /// Decodes a payload by its event-name tag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DecodeFailed`] if no decoder is registered for
    /// `event_name` or the payload does not deserialize.
    pub fn decode(&self, event_name: &str, payload: serde_json::Value) -> Result<E, StoreError> {
        let decoder = self
            .decoders
            .get(event_name)
            .ok_or_else(|| StoreError::DecodeFailed {
                event_name: event_name.to_owned(),
                reason: "no decoder registered".to_owned(),
            })?;

        decoder(payload).map_err(|err| StoreError::DecodeFailed {
            event_name: event_name.to_owned(),
            reason: err.to_string(),
        })
    }
}

impl<E> Default for TypeRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
