use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use lookout_client::{
    HttpTokenSource, ManagerOptions, StaticTokenSource, TokenSource, WebSocketConfig,
};

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub graphql_path: String,
    pub auth_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub retry_interval: Duration,
    pub log_filter: String,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let base_url = cli.base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("base url must start with http:// or https://, got {base_url}");
        }
        if cli.auth.username.is_some() != cli.auth.password.is_some() {
            bail!("--username and --password must be given together");
        }
        if cli.retry_interval_ms == 0 {
            bail!("retry interval must be greater than zero");
        }
        Ok(Self {
            base_url,
            graphql_path: normalize_path(&cli.graphql_path),
            auth_path: normalize_path(&cli.auth_path),
            username: cli.auth.username.clone(),
            password: cli.auth.password.clone(),
            token: cli.auth.token.clone(),
            retry_interval: Duration::from_millis(cli.retry_interval_ms),
            log_filter: cli.log_filter.clone(),
        })
    }

    pub fn graphql_url(&self) -> String {
        format!("{}{}", self.base_url, self.graphql_path)
    }

    pub fn auth_url(&self) -> String {
        format!("{}{}", self.base_url, self.auth_path)
    }

    pub fn websocket_config(&self, token: Option<&str>) -> WebSocketConfig {
        let config = WebSocketConfig::new(self.base_url.clone()).with_path(self.graphql_path.clone());
        match token {
            Some(token) => config.with_bearer_token(token),
            None => config,
        }
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            retry_interval: self.retry_interval,
        }
    }

    /// A pre-issued token wins over the token endpoint.
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        if let Some(token) = &self.token {
            return Arc::new(StaticTokenSource::new(token.clone()));
        }
        let source = HttpTokenSource::new(self.auth_url());
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                Arc::new(source.with_credentials(username.clone(), password.clone()))
            }
            _ => Arc::new(source),
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
