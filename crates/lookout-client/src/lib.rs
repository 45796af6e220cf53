//! Client side of the hijack dashboard's query gateway.
//!
//! Live panels share one `graphql-ws` connection through a
//! [`SubscriptionManager`]; each logical subscription is identified by a
//! caller-chosen [`SubscriptionId`] and receives only its own `data` frames.
//! One-shot reads go through [`QueryClient`] over HTTP with a fresh bearer
//! token per call.

pub mod auth;
pub mod connection;
pub mod error;
pub mod feeds;
pub mod gate;
pub mod manager;
pub mod memory;
pub mod oneshot;
pub mod registry;
pub mod router;
pub mod websocket;

pub use auth::{HttpTokenSource, StaticTokenSource, TokenSource, DEFAULT_AUTH_PATH};
pub use connection::{Connection, ConnectionState, InboundFanout, InboundReceiver};
pub use error::{ClientError, ClientResult};
pub use feeds::{
    ConfigFeed, HijackByKeyFeed, ProcessStatesFeed, StatsFeed, TableFeed, TableSnapshot,
};
pub use lookout_proto::{LiveQuery, SubscriptionId};
pub use manager::{LiveFeed, ManagerOptions, SubscriptionManager};
pub use memory::MemoryConnection;
pub use oneshot::QueryClient;
pub use websocket::{WebSocketConfig, WebSocketConnection};
