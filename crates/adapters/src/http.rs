use std::time::Duration;

use async_trait::async_trait;
use dbchat_core::agent::{AgentBackend, AgentError, ConnectReply};
use dbchat_core::config::ClientConfig;
use dbchat_core::protocol::{
    ConnectRequest, ConnectResponse, ErrorBody, HealthResponse, QueryRequest, QueryResponse,
    CONNECT_PATH, HEALTH_PATH, QUERY_PATH,
};
use dbchat_core::session::QueryOutcome;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

const CONNECT_FALLBACK_DETAIL: &str = "Connection failed";
const QUERY_FALLBACK_DETAIL: &str = "Unknown error";
const HEALTHY_STATUS: &str = "ok";

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("invalid agent base URL `{0}`: expected http:// or https://")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HttpAgentBackend {
    client: Client,
    base_url: String,
}

impl HttpAgentBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpBackendError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HttpBackendError::InvalidBaseUrl(base_url));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpBackendError::Client)?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, HttpBackendError> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl AgentBackend for HttpAgentBackend {
    async fn connect(&self, raw_connection_string: &str) -> Result<ConnectReply, AgentError> {
        let url = self.endpoint(CONNECT_PATH);
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(&ConnectRequest {
                conn_str: raw_connection_string.to_string(),
            })
            .send()
            .await
            .map_err(to_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(to_transport_error)?;

        let reply: ConnectResponse = interpret_response(status, &body, CONNECT_FALLBACK_DETAIL)?;
        info!(session_id = %reply.session_id, "agent accepted connection");
        Ok(ConnectReply {
            session_id: reply.session_id,
            database_kind: reply.database_type.unwrap_or_default(),
        })
    }

    async fn query(&self, session_id: &str, prompt: &str) -> Result<QueryOutcome, AgentError> {
        let url = self.endpoint(QUERY_PATH);
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(&QueryRequest {
                session_id: session_id.to_string(),
                prompt: prompt.to_string(),
            })
            .send()
            .await
            .map_err(to_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(to_transport_error)?;

        let reply: QueryResponse = interpret_response(status, &body, QUERY_FALLBACK_DETAIL)?;
        debug!(
            tool_calls = reply.tool_calls.as_ref().map_or(0, Vec::len),
            has_sql = reply.sql.is_some(),
            "agent answered"
        );
        Ok(reply.into_outcome())
    }

    async fn health(&self) -> Result<(), AgentError> {
        let url = self.endpoint(HEALTH_PATH);
        debug!("GET {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(to_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(to_transport_error)?;

        let health: HealthResponse = interpret_response(status, &body, QUERY_FALLBACK_DETAIL)?;
        if health.status.eq_ignore_ascii_case(HEALTHY_STATUS) {
            Ok(())
        } else {
            Err(AgentError::InvalidResponse(format!(
                "health status `{}`",
                health.status
            )))
        }
    }
}

fn interpret_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
    fallback_detail: &str,
) -> Result<T, AgentError> {
    if status.is_success() {
        return serde_json::from_str(body)
            .map_err(|error| AgentError::InvalidResponse(error.to_string()));
    }

    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|error_body| error_body.detail_text())
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| fallback_detail.to_string());

    Err(AgentError::Rejected {
        status: status.as_u16(),
        detail,
    })
}

fn to_transport_error(error: reqwest::Error) -> AgentError {
    AgentError::Transport(error.to_string())
}
