use anyhow::Result;
use clap::Parser;
use lookout::cli::{Cli, Command};
use lookout::config::AppConfig;
use lookout::telemetry::init_tracing;
use lookout::{query, watch};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; clap still reads the real environment.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli)?;
    init_tracing(&config.log_filter);

    debug!(
        target: "lookout",
        base = %config.base_url,
        graphql = %config.graphql_path,
        auth = %config.auth_path,
        retry_ms = config.retry_interval.as_millis() as u64,
        static_token = config.token.is_some(),
        "configuration loaded"
    );

    match cli.command {
        Command::Watch(args) => watch::run(&config, args).await,
        Command::Query(args) => query::query(&config, &args.document).await,
        Command::Exec(args) => query::exec(&config, &args.document).await,
        Command::Config => query::latest_config(&config).await,
    }
}
