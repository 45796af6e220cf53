//! Public surface for live subscriptions.
//!
//! One manager owns the bookkeeping for one connection. `start_live` may be
//! called any number of times for the same id: the first call registers a
//! single route, later calls re-arm the upstream subscription (stop, then
//! start) and swap the callback in place, so a callback never fires more than
//! once per inbound `data` frame.
//!
//! The registry lock is held from the registry update until the last frame of
//! the operation is handed to the gate, so concurrent calls for one id cannot
//! interleave their stop and start frames.

use std::sync::Arc;
use std::time::Duration;

use lookout_proto::{ClientEnvelope, LiveQuery, SubscriptionId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::ClientResult;
use crate::gate::{ConnectionGate, DEFAULT_RETRY_INTERVAL};
use crate::registry::{SubscriptionRecord, SubscriptionRegistry};
use crate::router::{DataCallback, MessageRouter};

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub retry_interval: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// A subscription whose id, query and decoded `data` type belong together.
pub trait LiveFeed {
    type Data: DeserializeOwned + Send + 'static;

    fn id(&self) -> SubscriptionId;
    fn query(&self) -> LiveQuery;
}

pub struct SubscriptionManager<C: Connection> {
    connection: Arc<C>,
    gate: ConnectionGate<C>,
    registry: Mutex<SubscriptionRegistry>,
    router: Arc<MessageRouter>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connection> SubscriptionManager<C> {
    /// Must be called from within a tokio runtime; the inbound dispatcher is
    /// spawned immediately.
    pub fn new(connection: Arc<C>, options: ManagerOptions) -> Self {
        let router = Arc::new(MessageRouter::new());
        let dispatcher = router.spawn(connection.as_ref());
        Self {
            gate: ConnectionGate::new(Arc::clone(&connection), options.retry_interval),
            connection,
            registry: Mutex::new(SubscriptionRegistry::new()),
            router,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Ensures `id` is live upstream with `query`, delivering each `data`
    /// payload to `on_data` verbatim.
    pub fn start_live<F>(
        &self,
        id: impl Into<SubscriptionId>,
        query: &LiveQuery,
        on_data: F,
    ) -> ClientResult<()>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.start_with_callback(id.into(), query, Arc::new(on_data))
    }

    /// Typed variant of [`start_live`](Self::start_live). Frames whose data
    /// does not fit `F::Data` are logged and skipped.
    pub fn start_feed<F, G>(&self, feed: &F, on_data: G) -> ClientResult<()>
    where
        F: LiveFeed,
        G: Fn(F::Data) + Send + Sync + 'static,
    {
        let id = feed.id();
        let route_id = id.clone();
        let callback: DataCallback = Arc::new(move |value: Value| {
            match serde_json::from_value::<F::Data>(value) {
                Ok(data) => on_data(data),
                Err(err) => {
                    warn!(target: "lookout::manager", id = %route_id, error = %err, "feed data did not match expected shape");
                }
            }
        });
        self.start_with_callback(id, &feed.query(), callback)
    }

    fn start_with_callback(
        &self,
        id: SubscriptionId,
        query: &LiveQuery,
        callback: DataCallback,
    ) -> ClientResult<()> {
        let mut registry = self.registry.lock();
        let activation = registry.activate(&id, query.operation_name())?;

        if activation.rearm {
            self.gate.send(&ClientEnvelope::stop(&id))?;
        }
        // Route first so a fast reply to the start frame cannot slip past.
        self.router.register(id.clone(), callback);
        self.gate
            .send(&ClientEnvelope::start(&id, query.to_payload()))?;
        drop(registry);

        info!(
            target: "lookout::manager",
            id = %id,
            operation = query.operation_name(),
            rearm = activation.rearm,
            "live subscription started"
        );
        Ok(())
    }

    /// Asks the server to stop `id` and detaches its callback. The record is
    /// kept, so the next start re-arms with stop-then-start.
    pub fn stop_live(&self, id: impl Into<SubscriptionId>) -> ClientResult<()> {
        let id = id.into();
        let mut registry = self.registry.lock();
        let was_started = registry.deactivate(&id);
        self.router.unregister(&id);
        self.gate.send(&ClientEnvelope::stop(&id))?;
        drop(registry);
        debug!(target: "lookout::manager", id = %id, was_started, "live subscription stopped");
        Ok(())
    }

    pub fn stop_feed<F: LiveFeed>(&self, feed: &F) -> ClientResult<()> {
        self.stop_live(feed.id())
    }

    /// Forgets `id` entirely: pending retries for it are dropped, a started
    /// subscription is stopped, and the id becomes free for another operation.
    pub fn release(&self, id: impl Into<SubscriptionId>) -> ClientResult<Option<SubscriptionRecord>> {
        let id = id.into();
        let mut registry = self.registry.lock();
        let record = registry.release(&id);
        self.router.unregister(&id);
        let dropped = self.gate.cancel(&id);
        // A closed or never-opened connection holds no upstream state to stop.
        let started = record.as_ref().is_some_and(|record| record.started);
        if started && self.connection.state().is_open() {
            self.gate.send(&ClientEnvelope::stop(&id))?;
        }
        drop(registry);
        debug!(target: "lookout::manager", id = %id, dropped, "subscription released");
        Ok(record)
    }

    pub fn is_live(&self, id: &SubscriptionId) -> bool {
        self.registry
            .lock()
            .get(id)
            .is_some_and(|record| record.has_listener)
    }

    pub fn record(&self, id: &SubscriptionId) -> Option<SubscriptionRecord> {
        self.registry.lock().get(id).cloned()
    }

    pub fn live_ids(&self) -> Vec<SubscriptionId> {
        live_ids_in(&self.registry.lock())
    }

    pub fn pending_frames(&self) -> usize {
        self.gate.pending_total()
    }

    /// Stops every live subscription, cancels outstanding retries and halts
    /// the dispatcher. Stop frames only go out if the connection is open.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock();
        let ids = live_ids_in(&registry);
        self.gate.cancel_all();
        let open = self.connection.state().is_open();
        for id in &ids {
            registry.deactivate(id);
            self.router.unregister(id);
            if open {
                if let Err(err) = self.gate.send(&ClientEnvelope::stop(id)) {
                    warn!(target: "lookout::manager", id = %id, error = %err, "failed to send stop during shutdown");
                }
            }
        }
        // Whatever could not go out right away is abandoned.
        self.gate.cancel_all();
        drop(registry);
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        info!(target: "lookout::manager", stopped = ids.len(), "subscription manager shut down");
    }
}

fn live_ids_in(registry: &SubscriptionRegistry) -> Vec<SubscriptionId> {
    registry
        .ids()
        .into_iter()
        .filter(|id| registry.get(id).is_some_and(|record| record.has_listener))
        .collect()
}

impl<C: Connection> Drop for SubscriptionManager<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
    }
}
