use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{ProtoError, ProtoResult, SubscriptionId};

/// Discriminant carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    ConnectionInit,
    ConnectionAck,
    ConnectionError,
    ConnectionTerminate,
    KeepAlive,
    Start,
    Stop,
    Data,
    Error,
    Complete,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::ConnectionInit => "connection_init",
            EnvelopeKind::ConnectionAck => "connection_ack",
            EnvelopeKind::ConnectionError => "connection_error",
            EnvelopeKind::ConnectionTerminate => "connection_terminate",
            EnvelopeKind::KeepAlive => "ka",
            EnvelopeKind::Start => "start",
            EnvelopeKind::Stop => "stop",
            EnvelopeKind::Data => "data",
            EnvelopeKind::Error => "error",
            EnvelopeKind::Complete => "complete",
        }
    }
}

/// Payload of a `start` frame. Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub extensions: Map<String, Value>,
    #[serde(rename = "operationName")]
    pub operation_name: String,
    pub query: String,
}

/// Frames the client sends over the shared connection.
///
/// Serialization is hand-written so the keys come out as `id`, `type`,
/// `payload`, matching what the existing dashboard server already accepts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    ConnectionInit {
        #[serde(default)]
        payload: Option<Value>,
    },
    Start {
        id: SubscriptionId,
        payload: StartPayload,
    },
    Stop {
        id: SubscriptionId,
    },
    ConnectionTerminate,
}

impl ClientEnvelope {
    pub fn start(id: impl Into<SubscriptionId>, payload: StartPayload) -> Self {
        ClientEnvelope::Start {
            id: id.into(),
            payload,
        }
    }

    pub fn stop(id: impl Into<SubscriptionId>) -> Self {
        ClientEnvelope::Stop { id: id.into() }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            ClientEnvelope::ConnectionInit { .. } => EnvelopeKind::ConnectionInit,
            ClientEnvelope::Start { .. } => EnvelopeKind::Start,
            ClientEnvelope::Stop { .. } => EnvelopeKind::Stop,
            ClientEnvelope::ConnectionTerminate => EnvelopeKind::ConnectionTerminate,
        }
    }

    pub fn id(&self) -> Option<&SubscriptionId> {
        match self {
            ClientEnvelope::Start { id, .. } | ClientEnvelope::Stop { id } => Some(id),
            ClientEnvelope::ConnectionInit { .. } | ClientEnvelope::ConnectionTerminate => None,
        }
    }

    pub fn to_wire(&self) -> ProtoResult<String> {
        serde_json::to_string(self).map_err(ProtoError::Encode)
    }
}

#[derive(Serialize)]
struct WireFrame<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<WirePayload<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePayload<'a> {
    Start(&'a StartPayload),
    Raw(&'a Value),
}

impl Serialize for ClientEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let frame = match self {
            ClientEnvelope::ConnectionInit { payload } => WireFrame {
                id: None,
                kind: EnvelopeKind::ConnectionInit.as_str(),
                payload: payload.as_ref().map(WirePayload::Raw),
            },
            ClientEnvelope::Start { id, payload } => WireFrame {
                id: Some(id.as_str()),
                kind: EnvelopeKind::Start.as_str(),
                payload: Some(WirePayload::Start(payload)),
            },
            ClientEnvelope::Stop { id } => WireFrame {
                id: Some(id.as_str()),
                kind: EnvelopeKind::Stop.as_str(),
                payload: None,
            },
            ClientEnvelope::ConnectionTerminate => WireFrame {
                id: None,
                kind: EnvelopeKind::ConnectionTerminate.as_str(),
                payload: None,
            },
        };
        frame.serialize(serializer)
    }
}

/// Body of a `data` frame. `data` is whatever shape the query document asked
/// for; an errors-only payload leaves it at its default (`null`), so typed
/// payloads must implement `Default` to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de> + Default"))]
pub struct DataPayload<P = Value> {
    #[serde(default)]
    pub data: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

/// Frames pushed by the server, generic over the decoded `data` type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    bound(deserialize = "P: Deserialize<'de> + Default")
)]
pub enum ServerEnvelope<P = Value> {
    ConnectionAck,
    ConnectionError {
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename = "ka")]
    KeepAlive,
    Data {
        id: SubscriptionId,
        payload: DataPayload<P>,
    },
    Error {
        id: SubscriptionId,
        #[serde(default)]
        payload: Value,
    },
    Complete {
        id: SubscriptionId,
    },
}

impl<P> ServerEnvelope<P> {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            ServerEnvelope::ConnectionAck => EnvelopeKind::ConnectionAck,
            ServerEnvelope::ConnectionError { .. } => EnvelopeKind::ConnectionError,
            ServerEnvelope::KeepAlive => EnvelopeKind::KeepAlive,
            ServerEnvelope::Data { .. } => EnvelopeKind::Data,
            ServerEnvelope::Error { .. } => EnvelopeKind::Error,
            ServerEnvelope::Complete { .. } => EnvelopeKind::Complete,
        }
    }

    pub fn id(&self) -> Option<&SubscriptionId> {
        match self {
            ServerEnvelope::Data { id, .. }
            | ServerEnvelope::Error { id, .. }
            | ServerEnvelope::Complete { id } => Some(id),
            ServerEnvelope::ConnectionAck
            | ServerEnvelope::ConnectionError { .. }
            | ServerEnvelope::KeepAlive => None,
        }
    }
}

impl ServerEnvelope<Value> {
    pub fn decode(text: &str) -> ProtoResult<Self> {
        serde_json::from_str(text).map_err(ProtoError::Decode)
    }

    pub fn data(id: impl Into<SubscriptionId>, data: Value) -> Self {
        ServerEnvelope::Data {
            id: id.into(),
            payload: DataPayload { data, errors: None },
        }
    }

    pub fn to_wire(&self) -> ProtoResult<String> {
        serde_json::to_string(self).map_err(ProtoError::Encode)
    }
}
