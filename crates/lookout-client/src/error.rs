use lookout_proto::{ProtoError, SubscriptionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Protocol(#[from] ProtoError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("auth endpoint rejected request: {status} body={body}")]
    Auth {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("auth response did not contain an access token")]
    MissingToken,
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("query returned errors: {0}")]
    Graphql(serde_json::Value),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(
        "subscription id {id} is already bound to operation {existing}; refusing to start {requested}"
    )]
    IdCollision {
        id: SubscriptionId,
        existing: String,
        requested: String,
    },
}

impl ClientError {
    /// Errors raised before any request reached the query endpoint.
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth { .. } | ClientError::MissingToken)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
