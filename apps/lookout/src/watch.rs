use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use lookout_client::{
    ConfigFeed, Connection, HijackByKeyFeed, ProcessStatesFeed, StatsFeed, SubscriptionManager,
    TableFeed, WebSocketConnection,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{FeedKind, WatchArgs};
use crate::config::AppConfig;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct FeedLine<'a, T> {
    feed: &'a str,
    data: T,
}

fn emit<T: Serialize>(feed: FeedKind, data: T) {
    let line = FeedLine {
        feed: feed.label(),
        data,
    };
    match serde_json::to_string(&line) {
        Ok(text) => println!("{text}"),
        Err(err) => warn!(target: "lookout::watch", feed = feed.label(), error = %err, "failed to encode update"),
    }
}

pub async fn run(config: &AppConfig, args: WatchArgs) -> Result<()> {
    if args.feeds.contains(&FeedKind::Hijack) && args.hijack_key.is_none() {
        bail!("the hijack feed needs --hijack-key");
    }

    let token = config
        .token_source()
        .fetch_token()
        .await
        .context("fetching token for the live connection")?;
    let conn = Arc::new(
        WebSocketConnection::open(config.websocket_config(Some(&token)))
            .context("opening live connection")?,
    );
    let manager = SubscriptionManager::new(Arc::clone(&conn), config.manager_options());

    let feeds = unique_feeds(&args.feeds);
    for feed in &feeds {
        start_feed(&manager, *feed, &args).with_context(|| format!("starting {} feed", feed.label()))?;
    }
    info!(
        target: "lookout::watch",
        url = conn.url(),
        feeds = ?feeds,
        "watching live feeds"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!(target: "lookout::watch", "interrupted; stopping feeds");
        }
        _ = conn.closed() => {
            warn!(target: "lookout::watch", state = %conn.state(), "live connection closed");
        }
    }

    manager.shutdown();
    conn.close();
    if tokio::time::timeout(CLOSE_GRACE, conn.closed()).await.is_err() {
        warn!(target: "lookout::watch", "connection did not close in time");
    }
    ensure_opened(conn.has_opened(), conn.url())
}

/// Drops repeated feeds, keeping the order of first appearance.
fn unique_feeds(feeds: &[FeedKind]) -> Vec<FeedKind> {
    let mut seen = HashSet::new();
    let mut unique = feeds.to_vec();
    unique.retain(|feed| seen.insert(*feed));
    unique
}

fn ensure_opened(opened: bool, url: &str) -> Result<()> {
    if !opened {
        bail!("could not connect to {url}");
    }
    Ok(())
}

fn start_feed(
    manager: &SubscriptionManager<WebSocketConnection>,
    feed: FeedKind,
    args: &WatchArgs,
) -> lookout_client::ClientResult<()> {
    match feed {
        FeedKind::Stats => manager.start_feed(&StatsFeed, move |stats| emit(feed, stats)),
        FeedKind::Processes => {
            manager.start_feed(&ProcessStatesFeed, move |states| emit(feed, states))
        }
        FeedKind::Config => manager.start_feed(&ConfigFeed, move |snapshot| emit(feed, snapshot)),
        FeedKind::Hijack => {
            let key = args.hijack_key.clone().unwrap_or_default();
            manager.start_feed(&HijackByKeyFeed::new(key), move |lookup| {
                emit(feed, lookup.first().cloned())
            })
        }
        FeedKind::Table => TableFeed::new(args.table_rows.clone(), args.table_count.clone())
            .start(manager, move |snapshot| emit(feed, snapshot)),
    }
}
