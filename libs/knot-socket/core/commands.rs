//! Outbound requests
//!
//! Each request is a one-to-one encoding of a frame type plus a data
//! payload built from its arguments.

use super::codec::Frame;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Identity id and session token, snapshotted when the identity frame is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
        }
    }
}

/// A request the client can send
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Identity(Credentials),
    Register(Value),
    UpdateMetadata { id: String, metadata: Value },
    GetDevices { query: Value },
    Unregister { id: String },
    CreateSessionToken { id: String },
    RevokeSessionToken { id: String, token: String },
    UpdateSchema { schema: Value },
    Activate { id: String },
    PublishData { id: String, data: Value },
    GetData { id: String, sensor_ids: Vec<u32> },
    SetData { id: String, data: Value },
}

impl Request {
    /// Wire frame type of this request
    pub fn frame_type(&self) -> &'static str {
        match self {
            Request::Identity(_) => "identity",
            Request::Register(_) => "register",
            Request::UpdateMetadata { .. } => "metadata",
            Request::GetDevices { .. } => "devices",
            Request::Unregister { .. } => "unregister",
            Request::CreateSessionToken { .. } => "token",
            Request::RevokeSessionToken { .. } => "revoke",
            Request::UpdateSchema { .. } => "schema",
            Request::Activate { .. } => "activate",
            Request::PublishData { .. } => "data",
            Request::GetData { .. } => "get-data",
            Request::SetData { .. } => "set-data",
        }
    }

    pub fn into_frame(self) -> Frame {
        let kind = self.frame_type();
        let data = match self {
            Request::Identity(credentials) => json!({
                "id": credentials.id,
                "token": credentials.token,
            }),
            Request::Register(properties) => properties,
            Request::UpdateMetadata { id, metadata } => json!({ "id": id, "metadata": metadata }),
            Request::GetDevices { query } => json!({ "query": query }),
            Request::Unregister { id }
            | Request::CreateSessionToken { id }
            | Request::Activate { id } => json!({ "id": id }),
            Request::RevokeSessionToken { id, token } => json!({ "id": id, "token": token }),
            Request::UpdateSchema { schema } => json!({ "schema": schema }),
            Request::PublishData { id, data } | Request::SetData { id, data } => {
                json!({ "id": id, "data": data })
            }
            Request::GetData { id, sensor_ids } => json!({ "id": id, "sensorIds": sensor_ids }),
        };
        Frame::new(kind, data)
    }
}
