//! Authenticated request/response queries over plain HTTP.
//!
//! Every call fetches a fresh token first; no token is cached between calls
//! and nothing is retried.

use lookout_proto::QueryBody;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::error::{ClientError, ClientResult};
use crate::feeds::ConfigRecord;

const JSON_UTF8: &str = "application/json; charset=utf-8";

const LATEST_CONFIG_QUERY: &str = "getLatestConfig { view_data: view_configs(order_by: {time_modified: desc}, limit: 1) { raw_config, comment, time_modified } }";
const DB_STATS_QUERY: &str = "getDBstats { view_data: view_db_details { version, upgraded_on } }";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbDetails {
    pub version: Value,
    #[serde(default)]
    pub upgraded_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewData<T> {
    view_data: Vec<T>,
}

pub struct QueryClient<T> {
    http: Client,
    url: String,
    tokens: T,
}

impl<T: TokenSource> QueryClient<T> {
    pub fn new(url: impl Into<String>, tokens: T) -> Self {
        Self::with_client(Client::new(), url, tokens)
    }

    pub fn with_client(http: Client, url: impl Into<String>, tokens: T) -> Self {
        Self {
            http,
            url: url.into(),
            tokens,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs `query <document>` and returns the decoded response body as is.
    pub async fn query_once(&self, document: &str) -> ClientResult<Value> {
        self.post(&QueryBody::query(document)).await
    }

    /// Sends `document` without the `query` prefix (mutations and other
    /// complete operations).
    pub async fn execute(&self, document: &str) -> ClientResult<Value> {
        self.post(&QueryBody::verbatim(document)).await
    }

    /// Like [`query_once`](Self::query_once) but returns `data` decoded as
    /// `D`, failing on a non-empty `errors` array.
    pub async fn query_data<D: DeserializeOwned>(&self, document: &str) -> ClientResult<D> {
        extract_data(self.query_once(document).await?)
    }

    pub async fn latest_config(&self) -> ClientResult<Option<ConfigRecord>> {
        let view: ViewData<ConfigRecord> = self.query_data(LATEST_CONFIG_QUERY).await?;
        Ok(view.view_data.into_iter().next())
    }

    pub async fn db_version(&self) -> ClientResult<Option<DbDetails>> {
        let view: ViewData<DbDetails> = self.query_data(DB_STATS_QUERY).await?;
        Ok(view.view_data.into_iter().next())
    }

    async fn post(&self, body: &QueryBody) -> ClientResult<Value> {
        let token = self.tokens.fetch_token().await?;
        let res = self
            .http
            .post(&self.url)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, JSON_UTF8)
            .body(serde_json::to_string(body)?)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            debug!(target: "lookout::oneshot", url = %self.url, status = %status, "query answered");
            Ok(res.json::<Value>().await?)
        } else {
            let body = res.text().await.unwrap_or_default();
            warn!(target: "lookout::oneshot", url = %self.url, status = %status, "query rejected");
            Err(ClientError::UnexpectedStatus { status, body })
        }
    }
}

fn extract_data<D: DeserializeOwned>(mut body: Value) -> ClientResult<D> {
    match body.get_mut("errors").map(Value::take) {
        Some(Value::Null) | None => {}
        Some(Value::Array(errors)) if errors.is_empty() => {}
        Some(errors) => return Err(ClientError::Graphql(errors)),
    }
    let data = body.get_mut("data").map(Value::take).unwrap_or(Value::Null);
    Ok(serde_json::from_value(data)?)
}
