//! `graphql-ws` connection over tokio-tungstenite.
//!
//! [`WebSocketConnection::open`] returns immediately in the `Connecting` state
//! and dials in the background, so subscriptions can be started before the
//! handshake completes; the gate holds their frames until the state flips to
//! `Open`. `connection_init` is always the first frame on the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use lookout_proto::{ClientEnvelope, GRAPHQL_WS_PROTOCOL};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionState, InboundFanout, InboundReceiver};
use crate::error::{ClientError, ClientResult};

pub mod config;
pub use config::{WebSocketConfig, DEFAULT_GRAPHQL_PATH};

enum Outbound {
    Frame(String),
    Close,
}

pub struct WebSocketConnection {
    url: String,
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: Arc<InboundFanout>,
    has_opened: Arc<AtomicBool>,
    ws_task: Option<JoinHandle<()>>,
}

impl WebSocketConnection {
    /// Starts dialing `config`'s URL. Must be called from within a tokio
    /// runtime.
    pub fn open(config: WebSocketConfig) -> ClientResult<Self> {
        let url = config.build_url();
        url::Url::parse(&url)?;
        let init = ClientEnvelope::ConnectionInit {
            payload: config.init_payload.clone(),
        }
        .to_wire()?;

        let state = Arc::new(watch::Sender::new(ConnectionState::Connecting));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let inbound = Arc::new(InboundFanout::new());
        let has_opened = Arc::new(AtomicBool::new(false));

        let ws_task = tokio::spawn(run_socket(
            url.clone(),
            init,
            Arc::clone(&state),
            outbound_rx,
            Arc::clone(&inbound),
            Arc::clone(&has_opened),
        ));

        Ok(Self {
            url,
            state,
            outbound: outbound_tx,
            inbound,
            has_opened,
            ws_task: Some(ws_task),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the handshake ever completed. Stays true after a later close.
    pub fn has_opened(&self) -> bool {
        self.has_opened.load(Ordering::Acquire)
    }

    /// Sends a close frame and lets the socket task wind down.
    pub fn close(&self) {
        if self.outbound.send(Outbound::Close).is_err() {
            self.state.send_replace(ConnectionState::Closed);
        }
    }

    /// Resolves once the connection reaches `Open`, or returns
    /// [`ClientError::ConnectionClosed`] if it closes first.
    pub async fn opened(&self) -> ClientResult<()> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| matches!(state, ConnectionState::Open | ConnectionState::Closed))
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;
        if state.is_open() {
            Ok(())
        } else {
            Err(ClientError::ConnectionClosed)
        }
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| matches!(state, ConnectionState::Closed))
            .await;
    }
}

impl Connection for WebSocketConnection {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn send_text(&self, frame: &str) -> ClientResult<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(ClientError::Transport(format!("websocket is {state}")));
        }
        self.outbound
            .send(Outbound::Frame(frame.to_string()))
            .map_err(|_| ClientError::ConnectionClosed)
    }

    fn inbound(&self) -> InboundReceiver {
        self.inbound.subscribe()
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        if let Some(task) = self.ws_task.take() {
            task.abort();
        }
    }
}

async fn run_socket(
    url: String,
    init: String,
    state: Arc<watch::Sender<ConnectionState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: Arc<InboundFanout>,
    has_opened: Arc<AtomicBool>,
) {
    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(err) => {
            warn!(target: "lookout::websocket", url = %url, error = %err, "invalid websocket request");
            inbound.close();
            state.send_replace(ConnectionState::Closed);
            return;
        }
    };
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(GRAPHQL_WS_PROTOCOL),
    );

    let ws_stream = match connect_async(request).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(err) => {
            warn!(target: "lookout::websocket", url = %url, error = %err, "websocket connect failed");
            inbound.close();
            state.send_replace(ConnectionState::Closed);
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if let Err(err) = ws_sender.send(Message::Text(init)).await {
        warn!(target: "lookout::websocket", url = %url, error = %err, "failed to send connection_init");
        inbound.close();
        state.send_replace(ConnectionState::Closed);
        return;
    }
    has_opened.store(true, Ordering::Release);
    state.send_replace(ConnectionState::Open);
    info!(target: "lookout::websocket", url = %url, "websocket open");

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Frame(text)) => {
                    if let Err(err) = ws_sender.send(Message::Text(text)).await {
                        warn!(target: "lookout::websocket", error = %err, "websocket send failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    state.send_replace(ConnectionState::Closing);
                    let terminate = ClientEnvelope::ConnectionTerminate.to_wire();
                    if let Ok(frame) = terminate {
                        let _ = ws_sender.send(Message::Text(frame)).await;
                    }
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    inbound.publish(Arc::from(text.as_str()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target: "lookout::websocket", frame = ?frame, "server closed websocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(target: "lookout::websocket", error = %err, "websocket receive failed");
                    break;
                }
                None => break,
            },
        }
    }

    inbound.close();
    state.send_replace(ConnectionState::Closed);
    info!(target: "lookout::websocket", url = %url, "websocket closed");
}
