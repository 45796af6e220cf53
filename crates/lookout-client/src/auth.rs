//! Bearer tokens for the query gateway.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_AUTH_PATH: &str = "/jwt/auth";

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Produces a token for one request. Implementations may hit the network
    /// on every call.
    async fn fetch_token(&self) -> ClientResult<String>;
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn fetch_token(&self) -> ClientResult<String> {
        (**self).fetch_token().await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Fetches a token from the dashboard's auth endpoint. Without credentials
/// the request is a plain GET that relies on an existing session.
#[derive(Clone)]
pub struct HttpTokenSource {
    http: Client,
    url: String,
    credentials: Option<Credentials>,
}

impl HttpTokenSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> ClientResult<String> {
        let request = match &self.credentials {
            Some(credentials) => self.http.post(&self.url).json(credentials),
            None => self.http.get(&self.url),
        };
        let res = request.send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(target: "lookout::auth", url = %self.url, status = %status, "token request rejected");
            return Err(ClientError::Auth { status, body });
        }

        let token = res
            .json::<TokenResponse>()
            .await?
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(ClientError::MissingToken)?;
        debug!(target: "lookout::auth", url = %self.url, "token issued");
        Ok(token)
    }
}

/// A token issued out of band.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> ClientResult<String> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::tokio_timeout_test(5)]
    async fn static_source_returns_same_token() {
        let source = StaticTokenSource::new("abc");
        assert_eq!(source.fetch_token().await.unwrap(), "abc");
        let shared: Arc<dyn TokenSource> = Arc::new(source);
        assert_eq!(shared.fetch_token().await.unwrap(), "abc");
    }

    #[test]
    fn credentials_serialize_as_login_form() {
        let credentials = Credentials {
            username: "admin".into(),
            password: "secret".into(),
        };
        assert_eq!(
            serde_json::to_string(&credentials).unwrap(),
            r#"{"username":"admin","password":"secret"}"#
        );
    }
}
