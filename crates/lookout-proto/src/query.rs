use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::envelope::StartPayload;

/// A named live query: the operation name plus the selection document that
/// follows it, e.g. `getStates` + `{ view_processes { name running } }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveQuery {
    operation_name: String,
    document: String,
}

impl LiveQuery {
    pub fn new(operation_name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            document: document.into(),
        }
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Full subscription text as sent in the `start` payload.
    pub fn subscription_text(&self) -> String {
        format!("subscription {} {}", self.operation_name, self.document)
    }

    pub fn to_payload(&self) -> StartPayload {
        StartPayload {
            variables: Map::new(),
            extensions: Map::new(),
            operation_name: self.operation_name.clone(),
            query: self.subscription_text(),
        }
    }
}

/// JSON body of a one-shot request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBody {
    pub query: String,
}

impl QueryBody {
    /// Prefixes `document` with the `query` keyword.
    pub fn query(document: &str) -> Self {
        Self {
            query: format!("query {document}"),
        }
    }

    /// Sends `document` untouched (mutations, fully spelled-out operations).
    pub fn verbatim(document: impl Into<String>) -> Self {
        Self {
            query: document.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_text_prefixes_keyword_and_operation() {
        let query = LiveQuery::new("getConfig", "{ view_configs { comment } }");
        assert_eq!(
            query.subscription_text(),
            "subscription getConfig { view_configs { comment } }"
        );
        let payload = query.to_payload();
        assert_eq!(payload.operation_name, "getConfig");
        assert!(payload.variables.is_empty());
        assert!(payload.extensions.is_empty());
    }

    #[test]
    fn query_body_prefixes_keyword() {
        let body = QueryBody::query("getDBstats { view_db_details { version } }");
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"query":"query getDBstats { view_db_details { version } }"}"#
        );
        assert_eq!(QueryBody::verbatim("mutation m { x }").query, "mutation m { x }");
    }
}
