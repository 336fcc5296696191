//! Wire envelope codec
//!
//! Every frame on the wire is a JSON object `{"type": ..., "data": ...}`.
//! `type` is required and must be a non-empty string; `data` is free-form
//! and omitted when null.

use crate::traits::{KnotError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One protocol message unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Serialize to the wire representation
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| KnotError::Encode(e.to_string()))
    }

    /// Parse the wire representation
    ///
    /// Anything that is not a JSON object with a non-empty string `type`
    /// fails with [`KnotError::Decode`] carrying the raw payload.
    pub fn decode(raw: &str) -> Result<Self> {
        let decode_error = |reason: String| KnotError::Decode {
            reason,
            frame: raw.to_string(),
        };

        let value: Value = serde_json::from_str(raw).map_err(|e| decode_error(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(decode_error("frame is not a JSON object".into()));
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            Some(Value::String(_)) => return Err(decode_error("frame type is empty".into())),
            Some(_) => return Err(decode_error("frame type is not a string".into())),
            None => return Err(decode_error("frame has no type".into())),
        };
        let data = object.remove("data").unwrap_or(Value::Null);

        Ok(Self { kind, data })
    }
}
