use anyhow::{Context, Result};
use lookout_client::QueryClient;
use serde_json::Value;

use crate::config::AppConfig;

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn query(config: &AppConfig, document: &str) -> Result<()> {
    let client = QueryClient::new(config.graphql_url(), config.token_source());
    let body = client.query_once(document).await.context("query failed")?;
    print_json(&body)
}

pub async fn exec(config: &AppConfig, document: &str) -> Result<()> {
    let client = QueryClient::new(config.graphql_url(), config.token_source());
    let body = client.execute(document).await.context("request failed")?;
    print_json(&body)
}

pub async fn latest_config(config: &AppConfig) -> Result<()> {
    let client = QueryClient::new(config.graphql_url(), config.token_source());
    match client
        .latest_config()
        .await
        .context("fetching latest configuration")?
    {
        Some(record) => {
            if let Some(modified) = &record.time_modified {
                eprintln!("# modified {modified}");
            }
            if let Some(comment) = record.comment.as_deref().filter(|c| !c.is_empty()) {
                eprintln!("# {comment}");
            }
            print!("{}", record.raw_config);
            if !record.raw_config.ends_with('\n') {
                println!();
            }
        }
        None => eprintln!("no configuration stored"),
    }
    Ok(())
}
