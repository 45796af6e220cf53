//! Shared protocol definitions for the dashboard's live query connection.
//! Kept in a dedicated crate so tooling (fake servers, recorders) can speak
//! the same envelopes without pulling in the tokio client runtime.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod envelope;
pub mod query;

pub use envelope::{ClientEnvelope, DataPayload, EnvelopeKind, ServerEnvelope, StartPayload};
pub use query::{LiveQuery, QueryBody};

/// Sub-protocol announced during the WebSocket handshake.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Caller-chosen identifier of one logical subscription on a shared connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&SubscriptionId> for SubscriptionId {
    fn from(value: &SubscriptionId) -> Self {
        value.clone()
    }
}

impl Borrow<str> for SubscriptionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type ProtoResult<T> = Result<T, ProtoError>;
