//! In-process stand-in for the dashboard gateway: a `graphql-ws` socket plus
//! the auth and query HTTP routes.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Default)]
pub struct GatewayState {
    pub frames: Mutex<Vec<Value>>,
    pub queries: Mutex<Vec<RecordedQuery>>,
    pub tokens_issued: AtomicUsize,
}

pub struct FakeGateway {
    pub addr: SocketAddr,
    pub state: Arc<GatewayState>,
}

impl FakeGateway {
    pub async fn spawn() -> Self {
        let state = Arc::new(GatewayState::default());
        let router = Router::new()
            .route("/api/graphql", get(upgrade).post(graphql))
            .route("/jwt/auth", get(issue_token).post(issue_token))
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind gateway listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        Self { addr, state }
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn graphql_url(&self) -> String {
        format!("http://{}/api/graphql", self.addr)
    }

    pub fn auth_url(&self) -> String {
        format!("http://{}/jwt/auth", self.addr)
    }

    pub fn frames(&self) -> Vec<Value> {
        self.state.frames.lock().clone()
    }

    pub fn frame_types(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.state.queries.lock().clone()
    }

    /// Polls until the socket has seen at least `count` client frames.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Value> {
        loop {
            let frames = self.frames();
            if frames.len() >= count {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn upgrade(State(state): State<Arc<GatewayState>>, ws: WebSocketUpgrade) -> Response {
    ws.protocols(["graphql-ws"])
        .on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<GatewayState>) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        state.frames.lock().push(frame.clone());

        let reply = match frame["type"].as_str() {
            Some("connection_init") => Some(json!({"type": "connection_ack"})),
            Some("start") => Some(json!({
                "id": frame["id"],
                "type": "data",
                "payload": {"data": {"echo": frame["payload"]["operationName"]}}
            })),
            Some("stop") => Some(json!({"id": frame["id"], "type": "complete"})),
            Some("connection_terminate") => break,
            _ => None,
        };
        if let Some(reply) = reply {
            if socket.send(Message::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    }
}

async fn issue_token(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    body: String,
) -> Response {
    if method == Method::POST {
        let credentials: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        if credentials["username"] != "admin" || credentials["password"] != "secret" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "wrong credentials"})),
            )
                .into_response();
        }
    }
    let issued = state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({"access_token": format!("tok-{issued}")})).into_response()
}

async fn graphql(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    state.queries.lock().push(RecordedQuery {
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body: body.clone(),
    });

    let query = body["query"].as_str().unwrap_or_default();
    let response = if query.contains("getLatestConfig") {
        json!({"data": {"view_data": [{
            "raw_config": "prefixes:\n  test: 10.0.0.0/8\n",
            "comment": "initial",
            "time_modified": "2020-02-01T10:00:00"
        }]}})
    } else if query.contains("broken") {
        json!({"data": null, "errors": [{"message": "field 'broken' not found"}]})
    } else {
        json!({"data": {"query": query}})
    };
    Json(response).into_response()
}
