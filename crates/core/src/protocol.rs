use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::ToolCall;
use crate::database_kind::DatabaseKind;
use crate::response_decoder::Payload;
use crate::session::QueryOutcome;

pub const CONNECT_PATH: &str = "connect";
pub const QUERY_PATH: &str = "query";
pub const HEALTH_PATH: &str = "health";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectRequest {
    pub conn_str: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectResponse {
    pub session_id: String,
    #[serde(default)]
    pub database_type: Option<DatabaseKind>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub session_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub database_type: Option<DatabaseKind>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl QueryResponse {
    #[must_use]
    pub fn into_outcome(self) -> QueryOutcome {
        QueryOutcome {
            tool_calls: self.tool_calls.unwrap_or_default(),
            response: Payload::from(self.response),
            sql: self.sql.unwrap_or_default(),
            execution_time_ms: self.execution_time.unwrap_or(0.0),
            database_kind: self.database_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    #[must_use]
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConnectRequest, ConnectResponse, ErrorBody, QueryRequest, QueryResponse};
    use crate::database_kind::DatabaseKind;
    use crate::response_decoder::Payload;

    #[test]
    fn requests_use_the_service_field_names() {
        let connect = serde_json::to_value(ConnectRequest {
            conn_str: "sqlite:///tmp/a.db".to_string(),
        })
        .expect("connect request should serialize");
        assert_eq!(connect, json!({"conn_str": "sqlite:///tmp/a.db"}));

        let query = serde_json::to_value(QueryRequest {
            session_id: "42".to_string(),
            prompt: "count users".to_string(),
        })
        .expect("query request should serialize");
        assert_eq!(query, json!({"session_id": "42", "prompt": "count users"}));
    }

    #[test]
    fn connect_response_tolerates_missing_kind() {
        let response: ConnectResponse = serde_json::from_value(json!({
            "session_id": "-8812",
            "message": "Connected successfully"
        }))
        .expect("connect response should parse");
        assert_eq!(response.session_id, "-8812");
        assert_eq!(response.database_type, None);

        let response: ConnectResponse = serde_json::from_value(json!({
            "session_id": "1",
            "database_type": "mysql"
        }))
        .expect("connect response should parse");
        assert_eq!(response.database_type, Some(DatabaseKind::Mysql));
    }

    #[test]
    fn query_response_maps_to_outcome_with_defaults() {
        let response: QueryResponse = serde_json::from_value(json!({
            "prompt": "count users",
            "response": "There are 3 users.",
            "sql": null,
            "tool_calls": [{"name": "run_sql_query", "arguments": {"query": "SELECT 3"}}],
            "execution_time": 812.44,
            "database_type": "postgresql"
        }))
        .expect("query response should parse");

        let outcome = response.into_outcome();
        assert_eq!(outcome.sql, "");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.response, Payload::Text("There are 3 users.".to_string()));
        assert!((outcome.execution_time_ms - 812.44).abs() < f64::EPSILON);
        assert_eq!(outcome.database_kind, Some(DatabaseKind::Postgresql));

        let empty: QueryResponse =
            serde_json::from_value(json!({})).expect("empty body should parse");
        let outcome = empty.into_outcome();
        assert!(outcome.tool_calls.is_empty());
        assert_eq!(outcome.response, Payload::Absent);
        assert!(outcome.execution_time_ms.abs() < f64::EPSILON);
        assert_eq!(outcome.database_kind, None);
    }

    #[test]
    fn error_detail_renders_strings_and_structures() {
        let body: ErrorBody = serde_json::from_value(json!({"detail": "Session not found. Connect first."}))
            .expect("error body should parse");
        assert_eq!(
            body.detail_text().as_deref(),
            Some("Session not found. Connect first.")
        );

        let body: ErrorBody = serde_json::from_value(json!({"detail": [{"msg": "field required"}]}))
            .expect("validation body should parse");
        assert_eq!(
            body.detail_text().as_deref(),
            Some("[{\"msg\":\"field required\"}]")
        );

        let body: ErrorBody = serde_json::from_value(json!({})).expect("empty body should parse");
        assert_eq!(body.detail_text(), None);
    }
}
