//! Single inbound dispatcher for a multiplexed connection.
//!
//! Every frame is decoded once and routed by id through a map, so the cost per
//! frame does not grow with the number of live subscriptions. Only `data`
//! frames reach callbacks; everything else is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use lookout_proto::{EnvelopeKind, ServerEnvelope, SubscriptionId};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::connection::Connection;

pub type DataCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// A `data` frame for an id nobody is listening to.
    NoRoute,
    Ignored(EnvelopeKind),
    Malformed,
}

#[derive(Default)]
pub struct MessageRouter {
    routes: RwLock<HashMap<SubscriptionId, DataCallback>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the callback for `id`. Returns true when the id had
    /// no callback before.
    pub fn register(&self, id: SubscriptionId, callback: DataCallback) -> bool {
        self.routes.write().insert(id, callback).is_none()
    }

    pub fn unregister(&self, id: &SubscriptionId) -> bool {
        self.routes.write().remove(id).is_some()
    }

    pub fn is_registered(&self, id: &SubscriptionId) -> bool {
        self.routes.read().contains_key(id)
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    pub fn dispatch(&self, frame: &str) -> RouteOutcome {
        let envelope = match ServerEnvelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(target: "lookout::router", error = %err, "dropping undecodable frame");
                return RouteOutcome::Malformed;
            }
        };

        match envelope {
            ServerEnvelope::Data { id, payload } => {
                // Clone the callback out so it runs without the lock held.
                let callback = self.routes.read().get(&id).cloned();
                match callback {
                    Some(callback) => {
                        if let Some(errors) = &payload.errors {
                            debug!(target: "lookout::router", id = %id, errors = %errors, "data frame carried errors");
                        }
                        callback(payload.data);
                        RouteOutcome::Delivered
                    }
                    None => {
                        trace!(target: "lookout::router", id = %id, "no listener for data frame");
                        RouteOutcome::NoRoute
                    }
                }
            }
            ServerEnvelope::Error { id, payload } => {
                warn!(target: "lookout::router", id = %id, payload = %payload, "subscription error from server");
                RouteOutcome::Ignored(EnvelopeKind::Error)
            }
            ServerEnvelope::Complete { id } => {
                debug!(target: "lookout::router", id = %id, "subscription completed upstream");
                RouteOutcome::Ignored(EnvelopeKind::Complete)
            }
            ServerEnvelope::ConnectionError { payload } => {
                warn!(target: "lookout::router", payload = %payload, "connection error from server");
                RouteOutcome::Ignored(EnvelopeKind::ConnectionError)
            }
            other => {
                trace!(target: "lookout::router", kind = other.kind().as_str(), "control frame");
                RouteOutcome::Ignored(other.kind())
            }
        }
    }

    /// Runs the dispatcher on the connection's inbound feed until it closes.
    pub fn spawn<C: Connection>(self: &Arc<Self>, connection: &C) -> JoinHandle<()> {
        let router = Arc::clone(self);
        let mut inbound = connection.inbound();
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                router.dispatch(&frame);
            }
            debug!(target: "lookout::router", "inbound feed closed; dispatcher exiting");
        })
    }
}
