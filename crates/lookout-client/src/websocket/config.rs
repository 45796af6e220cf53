use serde_json::{json, Map, Value};
use url::Url;

pub const DEFAULT_GRAPHQL_PATH: &str = "/api/graphql";

/// Where and how to open the live query socket.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Host, `ws://`/`wss://` URL, or an `http://`/`https://` origin.
    pub url: String,
    /// Optional path suffix (e.g. "/api/graphql")
    pub path: Option<String>,
    /// Whether to use TLS (wss:// vs ws://) when the url carries no scheme
    pub use_tls: bool,
    /// Payload of the `connection_init` frame sent right after the handshake.
    pub init_payload: Option<Value>,
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let use_tls = url.starts_with("wss://")
            || url.starts_with("https://")
            || (!url.starts_with("ws://")
                && !url.starts_with("http://")
                && !is_loopback(bare_host(&url)));

        Self {
            url,
            path: None,
            use_tls,
            init_payload: None,
        }
    }

    /// The socket for a dashboard served at `origin`, at the default GraphQL
    /// path.
    pub fn from_origin(origin: impl Into<String>) -> Self {
        Self::new(origin).with_path(DEFAULT_GRAPHQL_PATH)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// Sends `token` in the `connection_init` payload the way the query
    /// gateway reads it.
    pub fn with_bearer_token(self, token: &str) -> Self {
        let mut headers = Map::new();
        headers.insert("Authorization".into(), Value::String(format!("Bearer {token}")));
        self.with_init_payload(json!({ "headers": headers }))
    }

    pub fn build_url(&self) -> String {
        let mut url = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            self.url.clone()
        } else if self.use_tls {
            format!("wss://{}", self.url)
        } else {
            format!("ws://{}", self.url)
        };

        // Normalize a localhost host to avoid IPv6 issues
        if let Ok(mut parsed) = Url::parse(&url) {
            if parsed.host_str() == Some("localhost") && parsed.set_host(Some("127.0.0.1")).is_ok() {
                url = parsed.to_string();
            }
        }

        if let Some(ref path) = self.path {
            if url.ends_with('/') && path.starts_with('/') {
                url.pop();
            } else if !url.ends_with('/') && !path.starts_with('/') {
                url.push('/');
            }
            url.push_str(path);
        }

        url
    }
}

/// Host part of a scheme-less `host[:port][/path]` string.
fn bare_host(url: &str) -> &str {
    let authority = url.split('/').next().unwrap_or_default();
    authority
        .rsplit_once(':')
        .map_or(authority, |(host, _port)| host)
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1")
}
