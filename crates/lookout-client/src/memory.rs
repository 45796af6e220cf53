use std::sync::Arc;

use parking_lot::Mutex;
use crate::connection::{Connection, ConnectionState, InboundFanout, InboundReceiver};
use crate::error::{ClientError, ClientResult};

/// In-process connection for tests and for embedding the multiplexer behind a
/// transport that is driven elsewhere. Outbound frames are recorded; inbound
/// frames are injected with [`MemoryConnection::deliver`].
#[derive(Debug)]
pub struct MemoryConnection {
    state: Mutex<ConnectionState>,
    sent: Mutex<Vec<String>>,
    inbound: InboundFanout,
}

impl MemoryConnection {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: Mutex::new(state),
            sent: Mutex::new(Vec::new()),
            inbound: InboundFanout::new(),
        }
    }

    pub fn open() -> Self {
        Self::new(ConnectionState::Open)
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Pushes a frame to every inbound subscriber; returns how many saw it.
    pub fn deliver(&self, frame: impl Into<Arc<str>>) -> usize {
        self.inbound.publish(frame.into())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Connection for MemoryConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn send_text(&self, frame: &str) -> ClientResult<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(ClientError::Transport(format!(
                "memory connection is {state}"
            )));
        }
        self.sent.lock().push(frame.to_string());
        Ok(())
    }

    fn inbound(&self) -> InboundReceiver {
        self.inbound.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_frames_only_while_open() {
        let conn = MemoryConnection::new(ConnectionState::Connecting);
        assert!(conn.send_text("early").is_err());
        conn.set_state(ConnectionState::Open);
        conn.send_text("late").expect("send while open");
        assert_eq!(conn.take_sent(), vec!["late".to_string()]);
        assert!(conn.sent().is_empty());
    }

    #[tokio::test]
    async fn deliver_fans_out_to_subscribers() {
        let conn = MemoryConnection::open();
        let mut first = conn.inbound();
        let mut second = conn.inbound();
        assert_eq!(conn.deliver("frame"), 2);
        assert_eq!(&*first.recv().await.unwrap(), "frame");
        assert_eq!(&*second.recv().await.unwrap(), "frame");
    }
}
