//! Inbound CloudEvent envelope and the decoded working payload.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// A pub/sub message as delivered by the hosting runtime.
///
/// The transport guarantees the field shape; only optionality is checked
/// here. `publish_time` is carried as an opaque ISO-8601 string since
/// nothing downstream parses it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudEventMessage {
    /// Unique per delivered message, assigned by the transport.
    pub message_id: String,
    /// ISO-8601 timestamp set by the transport at publish time.
    pub publish_time: String,
    /// Base64-encoded payload. Absence is a valid, non-error case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Transport-level metadata used for routing (`type`, `priority`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, String>>,
}

impl CloudEventMessage {
    /// Look up a routing attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .as_ref()
            .and_then(|attrs| attrs.get(key))
            .map(String::as_str)
    }

    /// Decode `data` into the working payload.
    ///
    /// Malformed base64 is fatal. Malformed JSON is not: the payload
    /// degrades to the raw decoded text (plain-text messages are a
    /// supported case, not an error).
    pub fn decode_payload(&self) -> Result<Payload, DispatchError> {
        let Some(data) = &self.data else {
            return Ok(Payload::Absent);
        };
        let bytes = BASE64_STANDARD.decode(data)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => Ok(Payload::Structured(value)),
            Err(_) => Ok(Payload::Text(text)),
        }
    }
}

/// The decoded form of an envelope's `data` field.
///
/// Routing never inspects the payload shape, only the envelope attributes.
/// Handlers receive this variant and pattern-match, treating unexpected
/// shapes as "no match" rather than failing.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The envelope carried no `data` field.
    Absent,
    /// Decoded text that did not parse as JSON.
    Text(String),
    /// Decoded text that parsed as JSON.
    Structured(serde_json::Value),
}
