//! The shared bidirectional channel that every live subscription rides on.
//!
//! The multiplexer never opens or closes a connection itself; it only looks at
//! [`Connection::state`], pushes text frames, and listens on the inbound feed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ClientResult;

/// Receiving half handed to each inbound subscriber.
pub type InboundReceiver = mpsc::UnboundedReceiver<Arc<str>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

pub trait Connection: Send + Sync + 'static {
    fn state(&self) -> ConnectionState;

    /// Queue one text frame for transmission. Only meaningful while open.
    fn send_text(&self, frame: &str) -> ClientResult<()>;

    /// Every inbound text frame, in arrival order, for each subscriber. No
    /// frame is dropped for a slow subscriber; the feed ends when the
    /// connection is gone.
    fn inbound(&self) -> InboundReceiver;
}

/// Lossless fan-out of inbound frames: one unbounded queue per subscriber.
#[derive(Debug, Default)]
pub struct InboundFanout {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Arc<str>>>>,
}

impl InboundFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> InboundReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Queues `frame` for every live subscriber and returns how many took it.
    pub fn publish(&self, frame: Arc<str>) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(Arc::clone(&frame)).is_ok());
        subscribers.len()
    }

    /// Ends every subscriber's feed.
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_kept_in_order_for_every_subscriber() {
        let fanout = InboundFanout::new();
        let mut first = fanout.subscribe();
        let mut second = fanout.subscribe();
        for n in 0..1_000 {
            assert_eq!(fanout.publish(Arc::from(n.to_string())), 2);
        }
        for n in 0..1_000 {
            assert_eq!(&*first.try_recv().unwrap(), n.to_string());
            assert_eq!(&*second.try_recv().unwrap(), n.to_string());
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned_and_close_ends_feeds() {
        let fanout = InboundFanout::new();
        let dropped = fanout.subscribe();
        let mut kept = fanout.subscribe();
        drop(dropped);
        assert_eq!(fanout.publish(Arc::from("a")), 1);

        fanout.close();
        assert_eq!(&*kept.try_recv().unwrap(), "a");
        assert!(matches!(
            kept.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
