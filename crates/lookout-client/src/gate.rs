//! Readiness gate in front of the shared connection.
//!
//! Frames go out immediately while the connection is open. Otherwise they wait
//! in a per-subscription lane that a retry task flushes, in order, on the first
//! tick that finds the connection open. There is no attempt limit and no
//! backoff; a lane only stops retrying when it drains or is cancelled.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use lookout_proto::{ClientEnvelope, SubscriptionId};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::ClientResult;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// `None` is the control lane for frames without a subscription id.
type LaneKey = Option<SubscriptionId>;

#[derive(Default)]
struct Lane {
    pending: VecDeque<String>,
    retry: Option<JoinHandle<()>>,
}

struct GateInner<C> {
    connection: Arc<C>,
    retry_interval: Duration,
    lanes: Mutex<HashMap<LaneKey, Lane>>,
}

pub struct ConnectionGate<C: Connection> {
    inner: Arc<GateInner<C>>,
}

impl<C: Connection> ConnectionGate<C> {
    pub fn new(connection: Arc<C>, retry_interval: Duration) -> Self {
        Self {
            inner: Arc::new(GateInner {
                connection,
                retry_interval,
                lanes: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn retry_interval(&self) -> Duration {
        self.inner.retry_interval
    }

    /// Fire-and-forget send. Only an encoding failure is reported; a connection
    /// that is not open just defers the frame.
    ///
    /// Must be called from within a tokio runtime.
    pub fn send(&self, envelope: &ClientEnvelope) -> ClientResult<()> {
        let frame = envelope.to_wire()?;
        let key = envelope.id().cloned();
        let inner = &self.inner;

        let mut lanes = inner.lanes.lock();
        let lane_idle = lanes.get(&key).map_or(true, |lane| lane.pending.is_empty());
        if lane_idle && inner.connection.state().is_open() {
            match inner.connection.send_text(&frame) {
                Ok(()) => {
                    trace!(
                        target: "lookout::gate",
                        id = ?key,
                        kind = envelope.kind().as_str(),
                        "frame sent"
                    );
                    return Ok(());
                }
                Err(err) => {
                    debug!(
                        target: "lookout::gate",
                        id = ?key,
                        error = %err,
                        "send failed on open connection; deferring"
                    );
                }
            }
        }

        let lane = lanes.entry(key.clone()).or_default();
        lane.pending.push_back(frame);
        let needs_task = lane
            .retry
            .as_ref()
            .map_or(true, |handle| handle.is_finished());
        if needs_task {
            debug!(
                target: "lookout::gate",
                id = ?key,
                state = %inner.connection.state(),
                retry_ms = inner.retry_interval.as_millis() as u64,
                "connection not ready; scheduling retry"
            );
            lane.retry = Some(spawn_retry(Arc::clone(inner), key));
        }
        Ok(())
    }

    /// Drops the frames waiting in one lane and halts its retry task.
    pub fn cancel(&self, id: &SubscriptionId) -> usize {
        let key = Some(id.clone());
        let removed = self.inner.lanes.lock().remove(&key);
        removed.map_or(0, |lane| abort_lane(&key, lane))
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(LaneKey, Lane)> = self.inner.lanes.lock().drain().collect();
        drained
            .into_iter()
            .map(|(key, lane)| abort_lane(&key, lane))
            .sum()
    }

    pub fn pending_for(&self, id: &SubscriptionId) -> usize {
        self.inner
            .lanes
            .lock()
            .get(&Some(id.clone()))
            .map_or(0, |lane| lane.pending.len())
    }

    pub fn pending_total(&self) -> usize {
        self.inner
            .lanes
            .lock()
            .values()
            .map(|lane| lane.pending.len())
            .sum()
    }
}

impl<C: Connection> Drop for ConnectionGate<C> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn abort_lane(key: &LaneKey, lane: Lane) -> usize {
    if let Some(handle) = lane.retry {
        handle.abort();
    }
    let dropped = lane.pending.len();
    if dropped > 0 {
        debug!(target: "lookout::gate", id = ?key, dropped, "pending frames cancelled");
    }
    dropped
}

fn spawn_retry<C: Connection>(inner: Arc<GateInner<C>>, key: LaneKey) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = inner.retry_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u64 = 0;
        loop {
            ticker.tick().await;
            attempts += 1;
            if flush_lane(&inner, &key) {
                trace!(target: "lookout::gate", id = ?key, attempts, "lane flushed");
                break;
            }
            trace!(
                target: "lookout::gate",
                id = ?key,
                attempts,
                state = %inner.connection.state(),
                "connection still not open"
            );
        }
    })
}

/// Returns true once the lane is empty (or gone) and the task may exit.
fn flush_lane<C: Connection>(inner: &GateInner<C>, key: &LaneKey) -> bool {
    let mut lanes = inner.lanes.lock();
    let Some(lane) = lanes.get_mut(key) else {
        return true;
    };
    if !inner.connection.state().is_open() {
        return false;
    }
    while let Some(frame) = lane.pending.pop_front() {
        if let Err(err) = inner.connection.send_text(&frame) {
            warn!(
                target: "lookout::gate",
                id = ?key,
                error = %err,
                "send failed during flush; will retry"
            );
            lane.pending.push_front(frame);
            return false;
        }
    }
    lanes.remove(key);
    true
}
