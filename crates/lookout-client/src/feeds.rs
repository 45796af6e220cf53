//! Live feeds behind the dashboard panels.
//!
//! Ids default to the ones the dashboard has always used on the wire so a
//! recorded session or an existing server sees identical frames.

use std::collections::BTreeMap;
use std::sync::Arc;

use lookout_proto::{LiveQuery, SubscriptionId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::connection::Connection;
use crate::error::ClientResult;
use crate::manager::{LiveFeed, SubscriptionManager};

pub const STATS_ID: &str = "1";
pub const TABLE_ROWS_ID: &str = "2";
pub const TABLE_COUNT_ID: &str = "3";
pub const PROCESS_STATES_ID: &str = "4";
pub const CONFIG_ID: &str = "5";
pub const HIJACK_BY_KEY_ID: &str = "6";

pub const DB_STATS_QUERY: &str = "{ Total_BGP_Updates: view_bgpupdates_aggregate { aggregate { count } } Total_Unhandled_Updates: view_bgpupdates_aggregate(where: {handled: {_eq: false}}) { aggregate { count } } Total_Hijacks: view_hijacks_aggregate { aggregate { count } } Resolved_Hijacks: view_hijacks_aggregate(where: {resolved: {_eq: true}}) { aggregate { count } } Mitigation_Hijacks: view_hijacks_aggregate(where: {under_mitigation: {_eq: true}}) { aggregate { count } } Ongoing_Hijacks: view_hijacks_aggregate(where: {active: {_eq: true}}) { aggregate { count } } Ignored_Hijacks: view_hijacks_aggregate(where: {ignored: {_eq: true}}) { aggregate { count } } Withdrawn_Hijacks: view_hijacks_aggregate(where: {withdrawn: {_eq: true}}) { aggregate { count } } Acknowledged_Hijacks: view_hijacks_aggregate(where: {seen: {_eq: true}}) { aggregate { count } } Outdated_Hijacks: view_hijacks_aggregate(where: {outdated: {_eq: true}}) { aggregate { count } } }";
pub const PROCESS_STATES_QUERY: &str = "{ view_processes { name running timestamp } }";
pub const CONFIG_QUERY: &str =
    "{ view_configs(limit: 1, order_by: {time_modified: desc}) { raw_config comment time_modified } }";
pub const HIJACK_FIELDS: &str = "key, type, prefix, hijack_as, num_peers_seen, num_asns_inf, time_started, time_ended, time_last, mitigation_started, time_detected, timestamp_of_config, under_mitigation, resolved, active, dormant, ignored, configured_prefix, comment, seen, withdrawn, peers_withdrawn, peers_seen, outdated, community_annotation, rpki_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AggregateCount {
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Aggregate {
    pub aggregate: AggregateCount,
}

/// Named aggregate counters, e.g. `Total_Hijacks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DashboardStats(pub BTreeMap<String, Aggregate>);

impl DashboardStats {
    pub fn count(&self, name: &str) -> Option<u64> {
        self.0.get(name).map(|entry| entry.aggregate.count)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsFeed;

impl LiveFeed for StatsFeed {
    type Data = DashboardStats;

    fn id(&self) -> SubscriptionId {
        STATS_ID.into()
    }

    fn query(&self) -> LiveQuery {
        LiveQuery::new("getLiveStats", DB_STATS_QUERY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessState {
    pub name: String,
    pub running: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessStates {
    pub view_processes: Vec<ProcessState>,
}

impl ProcessStates {
    pub fn is_running(&self, name: &str) -> bool {
        self.view_processes
            .iter()
            .any(|process| process.name == name && process.running)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessStatesFeed;

impl LiveFeed for ProcessStatesFeed {
    type Data = ProcessStates;

    fn id(&self) -> SubscriptionId {
        PROCESS_STATES_ID.into()
    }

    fn query(&self) -> LiveQuery {
        LiveQuery::new("getStates", PROCESS_STATES_QUERY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigRecord {
    pub raw_config: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub time_modified: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigSnapshot {
    pub view_configs: Vec<ConfigRecord>,
}

impl ConfigSnapshot {
    pub fn latest(&self) -> Option<&ConfigRecord> {
        self.view_configs.first()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigFeed;

impl LiveFeed for ConfigFeed {
    type Data = ConfigSnapshot;

    fn id(&self) -> SubscriptionId {
        CONFIG_ID.into()
    }

    fn query(&self) -> LiveQuery {
        LiveQuery::new("getConfig", CONFIG_QUERY)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HijackLookup {
    pub view_hijacks: Vec<Value>,
}

impl HijackLookup {
    pub fn first(&self) -> Option<&Value> {
        self.view_hijacks.first()
    }
}

/// Follows a single hijack record by its key.
#[derive(Debug, Clone)]
pub struct HijackByKeyFeed {
    key: String,
}

impl HijackByKeyFeed {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl LiveFeed for HijackByKeyFeed {
    type Data = HijackLookup;

    fn id(&self) -> SubscriptionId {
        HIJACK_BY_KEY_ID.into()
    }

    fn query(&self) -> LiveQuery {
        // A JSON string literal is also a valid GraphQL string literal.
        let key = Value::String(self.key.clone()).to_string();
        LiveQuery::new(
            "getHijackByKey",
            format!("{{ view_hijacks(where: {{key: {{_eq: {key}}}}}, limit: 1) {{ {HIJACK_FIELDS} }} }}"),
        )
    }
}

/// Merged view of the results table: rows from one subscription, the total
/// from another.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub records_total: u64,
    pub records_filtered: u64,
    pub data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TableRows {
    view_data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TableCount {
    count_data: Aggregate,
}

struct TableRowsFeed {
    id: SubscriptionId,
    document: String,
}

struct TableCountFeed {
    id: SubscriptionId,
    document: String,
}

impl LiveFeed for TableRowsFeed {
    type Data = TableRows;

    fn id(&self) -> SubscriptionId {
        self.id.clone()
    }

    fn query(&self) -> LiveQuery {
        LiveQuery::new("getLiveTableData", self.document.clone())
    }
}

impl LiveFeed for TableCountFeed {
    type Data = TableCount;

    fn id(&self) -> SubscriptionId {
        self.id.clone()
    }

    fn query(&self) -> LiveQuery {
        LiveQuery::new("getLiveTableCount", self.document.clone())
    }
}

/// The filterable results table. Both documents usually embed the same
/// filter; starting again with new documents replaces both upstream streams.
#[derive(Debug, Clone)]
pub struct TableFeed {
    rows_id: SubscriptionId,
    count_id: SubscriptionId,
    rows_document: String,
    count_document: String,
}

impl TableFeed {
    pub fn new(rows_document: impl Into<String>, count_document: impl Into<String>) -> Self {
        Self {
            rows_id: TABLE_ROWS_ID.into(),
            count_id: TABLE_COUNT_ID.into(),
            rows_document: rows_document.into(),
            count_document: count_document.into(),
        }
    }

    pub fn with_ids(mut self, rows: impl Into<SubscriptionId>, count: impl Into<SubscriptionId>) -> Self {
        self.rows_id = rows.into();
        self.count_id = count.into();
        self
    }

    pub fn ids(&self) -> (&SubscriptionId, &SubscriptionId) {
        (&self.rows_id, &self.count_id)
    }

    /// Starts (or re-arms) both halves. `on_update` receives the merged
    /// snapshot after every rows or count update. If the count half cannot
    /// start, the rows half is stopped again and the count error returned.
    pub fn start<C, F>(&self, manager: &SubscriptionManager<C>, on_update: F) -> ClientResult<()>
    where
        C: Connection,
        F: Fn(TableSnapshot) + Send + Sync + 'static,
    {
        let snapshot = Arc::new(Mutex::new(TableSnapshot::default()));
        let on_update = Arc::new(on_update);

        let rows_state = Arc::clone(&snapshot);
        let rows_update = Arc::clone(&on_update);
        let rows = TableRowsFeed {
            id: self.rows_id.clone(),
            document: self.rows_document.clone(),
        };
        manager.start_feed(&rows, move |rows: TableRows| {
            let merged = {
                let mut state = rows_state.lock();
                state.data = rows.view_data;
                state.clone()
            };
            rows_update(merged);
        })?;

        let count_feed = TableCountFeed {
            id: self.count_id.clone(),
            document: self.count_document.clone(),
        };
        let started = manager.start_feed(&count_feed, move |count: TableCount| {
            let merged = {
                let mut state = snapshot.lock();
                state.records_total = count.count_data.aggregate.count;
                state.records_filtered = count.count_data.aggregate.count;
                state.clone()
            };
            on_update(merged);
        });
        if let Err(err) = &started {
            warn!(target: "lookout::feeds", rows = %self.rows_id, count = %self.count_id, error = %err, "table count failed to start; stopping rows");
            if let Err(stop_err) = manager.stop_live(&self.rows_id) {
                warn!(target: "lookout::feeds", id = %self.rows_id, error = %stop_err, "failed to stop table rows");
            }
        }
        started
    }

    pub fn stop<C: Connection>(&self, manager: &SubscriptionManager<C>) -> ClientResult<()> {
        manager.stop_live(&self.rows_id)?;
        manager.stop_live(&self.count_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerOptions;
    use crate::memory::MemoryConnection;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn hijack_query_quotes_key() {
        let query = HijackByKeyFeed::new("ab\"c").query();
        assert_eq!(query.operation_name(), "getHijackByKey");
        assert!(query
            .document()
            .starts_with(r#"{ view_hijacks(where: {key: {_eq: "ab\"c"}}, limit: 1) { key, type,"#));
        assert!(query.document().ends_with("rpki_status } }"));
    }

    #[test]
    fn stats_decode_into_named_counters() {
        let stats: DashboardStats = serde_json::from_value(serde_json::json!({
            "Total_Hijacks": {"aggregate": {"count": 12}},
            "Resolved_Hijacks": {"aggregate": {"count": 3}}
        }))
        .unwrap();
        assert_eq!(stats.count("Total_Hijacks"), Some(12));
        assert_eq!(stats.count("Ignored_Hijacks"), None);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn process_states_feed_delivers_typed_data() {
        let conn = Arc::new(MemoryConnection::open());
        let manager = SubscriptionManager::new(conn.clone(), ManagerOptions::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        manager
            .start_feed(&ProcessStatesFeed, move |states: ProcessStates| {
                let _ = tx.send(states);
            })
            .unwrap();

        conn.deliver(
            r#"{"id":"4","type":"data","payload":{"data":{"view_processes":[{"name":"monitor","running":true},{"name":"detection","running":false}]}}}"#,
        );
        let states = rx.recv().await.unwrap();
        assert!(states.is_running("monitor"));
        assert!(!states.is_running("detection"));
        assert_eq!(states.view_processes[0].timestamp, None);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn mismatched_feed_data_is_skipped() {
        let conn = Arc::new(MemoryConnection::open());
        let manager = SubscriptionManager::new(conn.clone(), ManagerOptions::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        manager
            .start_feed(&ConfigFeed, move |snapshot: ConfigSnapshot| {
                let _ = tx.send(snapshot);
            })
            .unwrap();

        conn.deliver(r#"{"id":"5","type":"data","payload":{"data":{"unexpected":true}}}"#);
        conn.deliver(
            r#"{"id":"5","type":"data","payload":{"data":{"view_configs":[{"raw_config":"prefixes: {}","comment":"init","time_modified":"2019-11-16T00:00:15"}]}}}"#,
        );
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.latest().unwrap().comment.as_deref(), Some("init"));
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn table_feed_merges_rows_and_count() {
        let conn = Arc::new(MemoryConnection::open());
        let manager = SubscriptionManager::new(conn.clone(), ManagerOptions::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let table = TableFeed::new(
            "{ view_data: view_hijacks(limit: 10) { key } }",
            "{ count_data: view_hijacks_aggregate { aggregate { count } } }",
        );
        table
            .start(&manager, move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .unwrap();
        assert_eq!(conn.sent().len(), 2);

        conn.deliver(r#"{"id":"3","type":"data","payload":{"data":{"count_data":{"aggregate":{"count":42}}}}}"#);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.records_total, 42);
        assert!(first.data.is_empty());

        conn.deliver(r#"{"id":"2","type":"data","payload":{"data":{"view_data":[{"key":"a"},{"key":"b"}]}}}"#);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.records_filtered, 42);
        assert_eq!(second.data.len(), 2);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn restarting_table_with_new_filter_rearms_both_halves() {
        let conn = Arc::new(MemoryConnection::open());
        let manager = SubscriptionManager::new(
            conn.clone(),
            ManagerOptions {
                retry_interval: Duration::from_millis(50),
            },
        );
        let table_a = TableFeed::new("{ view_data: a }", "{ count_data: a }");
        let table_b = TableFeed::new("{ view_data: b }", "{ count_data: b }");
        table_a.start(&manager, |_| {}).unwrap();
        conn.take_sent();

        table_b.start(&manager, |_| {}).unwrap();
        let frames: Vec<serde_json::Value> = conn
            .take_sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect();
        let summary: Vec<(&str, &str)> = frames
            .iter()
            .map(|frame| (frame["id"].as_str().unwrap(), frame["type"].as_str().unwrap()))
            .collect();
        assert_eq!(
            summary,
            vec![("2", "stop"), ("2", "start"), ("3", "stop"), ("3", "start")]
        );
        assert_eq!(
            frames[1]["payload"]["query"],
            "subscription getLiveTableData { view_data: b }"
        );

        table_b.stop(&manager).unwrap();
        assert!(!manager.is_live(&"2".into()));
        assert!(!manager.is_live(&"3".into()));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn table_feed_is_all_or_nothing() {
        let conn = Arc::new(MemoryConnection::open());
        let manager = SubscriptionManager::new(conn.clone(), ManagerOptions::default());
        // Id "3" already belongs to another operation, so the count half collides.
        manager
            .start_live("3", &LiveQuery::new("getOtherCount", "{ n }"), |_| {})
            .unwrap();
        conn.take_sent();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let table = TableFeed::new("{ view_data: a }", "{ count_data: a }");
        let err = table
            .start(&manager, move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .unwrap_err();
        assert!(matches!(err, crate::error::ClientError::IdCollision { .. }));
        assert!(!manager.is_live(&"2".into()));
        assert_eq!(manager.live_ids(), vec![SubscriptionId::from("3")]);

        let summary: Vec<(String, String)> = conn
            .take_sent()
            .iter()
            .map(|frame| {
                let frame: serde_json::Value = serde_json::from_str(frame).unwrap();
                (
                    frame["id"].as_str().unwrap().to_string(),
                    frame["type"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("2".to_string(), "start".to_string()),
                ("2".to_string(), "stop".to_string())
            ]
        );

        conn.deliver(r#"{"id":"2","type":"data","payload":{"data":{"view_data":[{"key":"a"}]}}}"#);
        settle().await;
        assert!(rx.try_recv().is_err());
    }
}
