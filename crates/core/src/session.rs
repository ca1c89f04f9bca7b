use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationLog, ConversationStep, ToolCall};
use crate::database_kind::DatabaseKind;
use crate::response_decoder::{decode, Payload};
use crate::result_table::QueryResult;

pub const AGENT_TOOL_NAME: &str = "AI Agent";
const CONNECTING_TEXT: &str = "Connecting to database...";
const CONNECTED_TEXT: &str = "Database connected successfully";
const PROCESSING_TEXT: &str = "Processing query with AI Agent...";
const EMPTY_RESPONSE_TEXT: &str = "Query executed successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Idle,
    Querying,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub session_id: Option<String>,
    pub connection_status: ConnectionStatus,
    pub query_status: QueryStatus,
    pub database_kind: DatabaseKind,
    pub conversation: ConversationLog,
    pub last_result: Option<QueryResult>,
}

impl Session {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.connection_status == ConnectionStatus::Connecting
            || self.query_status == QueryStatus::Querying
    }
}

/// Identifies one outstanding request. A completion is only applied while its ticket is
/// the pending one, so replies that outlive a disconnect are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub tool_calls: Vec<ToolCall>,
    pub response: Payload,
    pub sql: String,
    pub execution_time_ms: f64,
    pub database_kind: Option<DatabaseKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,
    #[error("already connected; disconnect first")]
    AlreadyConnected,
    #[error("not connected to a database")]
    NotConnected,
    #[error("a query is already running")]
    QueryInProgress,
    #[error("request {0} is no longer pending")]
    StaleCompletion(u64),
}

#[derive(Debug, Default)]
pub struct SessionMachine {
    session: Session,
    pending_connect: Option<RequestTicket>,
    pending_query: Option<RequestTicket>,
    next_ticket: u64,
}

impl SessionMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn begin_connect(
        &mut self,
        raw_connection_string: &str,
    ) -> Result<RequestTicket, SessionError> {
        match self.session.connection_status {
            ConnectionStatus::Connecting => {
                warn!("connect refused: attempt already in progress");
                return Err(SessionError::ConnectInProgress);
            }
            ConnectionStatus::Connected => {
                warn!("connect refused: session still open");
                return Err(SessionError::AlreadyConnected);
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
        }

        let ticket = self.issue_ticket();
        self.pending_connect = Some(ticket);
        self.session.connection_status = ConnectionStatus::Connecting;
        self.session
            .conversation
            .push(ConversationStep::agent(CONNECTING_TEXT));
        debug!(
            ticket = ticket.id(),
            kind_hint = %DatabaseKind::from_connection_string(raw_connection_string),
            "connecting"
        );
        Ok(ticket)
    }

    pub fn complete_connect(
        &mut self,
        ticket: RequestTicket,
        session_id: impl Into<String>,
        database_kind: DatabaseKind,
    ) -> Result<(), SessionError> {
        Self::take_pending(&mut self.pending_connect, ticket)?;

        let session_id = session_id.into();
        info!(%session_id, kind = %database_kind, "connected");
        self.session.session_id = Some(session_id);
        self.session.database_kind = database_kind;
        self.session.connection_status = ConnectionStatus::Connected;
        self.session
            .conversation
            .push(ConversationStep::result(CONNECTED_TEXT));
        Ok(())
    }

    pub fn fail_connect(
        &mut self,
        ticket: RequestTicket,
        error_message: &str,
    ) -> Result<(), SessionError> {
        Self::take_pending(&mut self.pending_connect, ticket)?;

        info!(error = error_message, "connection failed");
        self.session.connection_status = ConnectionStatus::Error;
        self.session.conversation.push(ConversationStep::result(format!(
            "Connection failed: {error_message}"
        )));
        Ok(())
    }

    pub fn begin_query(&mut self, prompt: &str) -> Result<RequestTicket, SessionError> {
        if !self.session.is_connected() || self.session.session_id.is_none() {
            warn!("query refused: not connected");
            return Err(SessionError::NotConnected);
        }
        if self.session.query_status == QueryStatus::Querying {
            warn!("query refused: another query is running");
            return Err(SessionError::QueryInProgress);
        }

        let ticket = self.issue_ticket();
        self.pending_query = Some(ticket);
        self.session.query_status = QueryStatus::Querying;
        self.session.conversation.replace([
            ConversationStep::user(prompt),
            ConversationStep::agent(PROCESSING_TEXT).with_tool_name(AGENT_TOOL_NAME),
        ]);
        debug!(ticket = ticket.id(), "query submitted");
        Ok(ticket)
    }

    pub fn complete_query(
        &mut self,
        ticket: RequestTicket,
        outcome: QueryOutcome,
    ) -> Result<(), SessionError> {
        Self::take_pending(&mut self.pending_query, ticket)?;

        let QueryOutcome {
            tool_calls,
            response,
            sql,
            execution_time_ms,
            database_kind,
        } = outcome;

        if !tool_calls.is_empty() {
            let names = tool_calls
                .iter()
                .map(|call| call.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.session.conversation.push(
                ConversationStep::agent(format!("Tool Calls by Agent - {names}"))
                    .with_tool_name(AGENT_TOOL_NAME)
                    .with_tool_calls(tool_calls),
            );
        }

        let response_text = response.display_text();
        let response_text = if response_text.is_empty() {
            EMPTY_RESPONSE_TEXT.to_string()
        } else {
            response_text
        };
        self.session
            .conversation
            .push(ConversationStep::result(response_text));

        let rows = decode(response);
        info!(rows = rows.len(), execution_time_ms, "query answered");
        self.session.last_result = Some(QueryResult {
            sql,
            rows,
            execution_time_ms,
            database_kind: database_kind.unwrap_or(self.session.database_kind),
        });
        self.session.query_status = QueryStatus::Success;
        Ok(())
    }

    pub fn fail_query(
        &mut self,
        ticket: RequestTicket,
        error_message: &str,
    ) -> Result<(), SessionError> {
        Self::take_pending(&mut self.pending_query, ticket)?;

        info!(error = error_message, "query failed");
        self.session
            .conversation
            .push(ConversationStep::result(format!("Query failed: {error_message}")));
        self.session.query_status = QueryStatus::Error;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.pending_connect.is_some() || self.pending_query.is_some() {
            debug!("disconnect dropped pending requests");
        }
        self.pending_connect = None;
        self.pending_query = None;
        self.session = Session::default();
        info!("disconnected");
    }

    fn issue_ticket(&mut self) -> RequestTicket {
        self.next_ticket += 1;
        RequestTicket(self.next_ticket)
    }

    fn take_pending(
        pending: &mut Option<RequestTicket>,
        ticket: RequestTicket,
    ) -> Result<(), SessionError> {
        if *pending != Some(ticket) {
            warn!(ticket = ticket.id(), "ignoring stale completion");
            return Err(SessionError::StaleCompletion(ticket.id()));
        }
        *pending = None;
        Ok(())
    }
}
