use clap::{Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_TABLE_ROWS: &str = "{ view_data: view_hijacks(limit: 10, order_by: {time_last: desc}) { key type prefix hijack_as time_last active } }";
pub const DEFAULT_TABLE_COUNT: &str = "{ count_data: view_hijacks_aggregate { aggregate { count } } }";

#[derive(Parser, Debug)]
#[command(
    name = "lookout",
    about = "Follow the hijack dashboard's live feeds and run one-shot queries",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "LOOKOUT_BASE_URL",
        default_value = "http://localhost:8080",
        help = "Origin the dashboard is served from"
    )]
    pub base_url: String,

    #[arg(
        long,
        global = true,
        env = "LOOKOUT_GRAPHQL_PATH",
        default_value = "/api/graphql",
        help = "Path of the query gateway (WebSocket and HTTP)"
    )]
    pub graphql_path: String,

    #[arg(
        long,
        global = true,
        env = "LOOKOUT_AUTH_PATH",
        default_value = "/jwt/auth",
        help = "Path of the token endpoint"
    )]
    pub auth_path: String,

    #[command(flatten)]
    pub auth: AuthArgs,

    #[arg(
        long = "retry-interval-ms",
        global = true,
        env = "LOOKOUT_RETRY_INTERVAL_MS",
        default_value_t = 1000,
        help = "How often frames waiting for the connection are retried"
    )]
    pub retry_interval_ms: u64,

    #[arg(
        long = "log-filter",
        global = true,
        env = "LOOKOUT_LOG",
        default_value = "info",
        help = "tracing filter directive, e.g. info,lookout::gate=trace"
    )]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    #[arg(long, global = true, env = "LOOKOUT_USERNAME", value_name = "USER")]
    pub username: Option<String>,

    #[arg(
        long,
        global = true,
        env = "LOOKOUT_PASSWORD",
        value_name = "PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    #[arg(
        long,
        global = true,
        env = "LOOKOUT_TOKEN",
        value_name = "TOKEN",
        help = "Pre-issued access token; skips the token endpoint",
        hide_env_values = true
    )]
    pub token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream live feeds as JSON lines until interrupted
    Watch(WatchArgs),
    /// Run a one-shot query (the `query` keyword is prepended)
    Query(DocumentArgs),
    /// Send a document verbatim, e.g. a mutation
    Exec(DocumentArgs),
    /// Print the most recently stored configuration
    Config,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Stats,
    Processes,
    Config,
    Hijack,
    Table,
}

impl FeedKind {
    pub fn label(self) -> &'static str {
        match self {
            FeedKind::Stats => "stats",
            FeedKind::Processes => "processes",
            FeedKind::Config => "config",
            FeedKind::Hijack => "hijack",
            FeedKind::Table => "table",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[arg(value_enum, required = true, num_args = 1..)]
    pub feeds: Vec<FeedKind>,

    #[arg(long, value_name = "KEY", help = "Hijack key followed by the `hijack` feed")]
    pub hijack_key: Option<String>,

    #[arg(long, value_name = "DOCUMENT", default_value = DEFAULT_TABLE_ROWS)]
    pub table_rows: String,

    #[arg(long, value_name = "DOCUMENT", default_value = DEFAULT_TABLE_COUNT)]
    pub table_count: String,
}

#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    pub document: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_accepts_several_feeds() {
        let cli = Cli::try_parse_from([
            "lookout",
            "--base-url",
            "https://dash.example.org",
            "watch",
            "stats",
            "hijack",
            "--hijack-key",
            "abc123",
        ])
        .unwrap();
        assert_eq!(cli.base_url, "https://dash.example.org");
        match cli.command {
            Command::Watch(args) => {
                assert_eq!(args.feeds, vec![FeedKind::Stats, FeedKind::Hijack]);
                assert_eq!(args.hijack_key.as_deref(), Some("abc123"));
                assert_eq!(args.table_rows, DEFAULT_TABLE_ROWS);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn watch_requires_a_feed() {
        assert!(Cli::try_parse_from(["lookout", "watch"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["lookout", "query", "{ x }", "--retry-interval-ms", "250"]).unwrap();
        assert_eq!(cli.retry_interval_ms, 250);
        assert!(matches!(cli.command, Command::Query(ref args) if args.document == "{ x }"));
    }
}
