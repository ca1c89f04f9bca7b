use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use dbchat_adapters::http::{HttpAgentBackend, HttpBackendError};
use dbchat_core::agent::{settle_connect, settle_query, AgentBackend, AgentError, ConnectReply};
use dbchat_core::config::FileConfigStore;
use dbchat_core::connection_string::{parse_connection_string, ConnectionDescriptor};
use dbchat_core::conversation::StepRole;
use dbchat_core::database_kind::{placeholder_connection_string, DatabaseKind};
use dbchat_core::result_table::format_execution_time;
use dbchat_core::session::{
    ConnectionStatus, QueryOutcome, QueryStatus, RequestTicket, SessionMachine,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(120);
const EXAMPLE_PROMPTS: [&str; 5] = [
    "What is the monthly revenue trend over the last 12 months?",
    "Show me all users who signed up in the last 30 days",
    "Find the top 10 products by sales revenue",
    "List all orders with status 'pending' and amount over $100",
    "Get the average order value by month for this year",
];
const PLACEHOLDER_KINDS: [DatabaseKind; 3] = [
    DatabaseKind::Postgresql,
    DatabaseKind::Mysql,
    DatabaseKind::Sqlite,
];

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error(transparent)]
    Backend(#[from] HttpBackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Connection,
    Prompt,
    Conversation,
    Results,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Self::Connection => Self::Prompt,
            Self::Prompt => Self::Conversation,
            Self::Conversation => Self::Results,
            Self::Results => Self::Connection,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Connection => "Connection",
            Self::Prompt => "Prompt",
            Self::Conversation => "Conversation",
            Self::Results => "Results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    Submit,
    Backspace,
    Input(char),
    Disconnect,
    Scroll(ScrollDirection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AgentRequest {
    Connect {
        ticket: RequestTicket,
        raw_connection_string: String,
    },
    Query {
        ticket: RequestTicket,
        session_id: String,
        prompt: String,
    },
}

#[derive(Debug)]
enum AgentEvent {
    Connected {
        ticket: RequestTicket,
        result: Result<ConnectReply, AgentError>,
    },
    Answered {
        ticket: RequestTicket,
        result: Result<QueryOutcome, AgentError>,
    },
    Health(Result<(), AgentError>),
}

#[derive(Debug)]
struct TuiApp {
    machine: SessionMachine,
    store: FileConfigStore,
    pane: Pane,
    connection_input: String,
    prompt_input: String,
    connection_string: Option<String>,
    conversation_scroll: u16,
    results_scroll: usize,
    example_index: Option<usize>,
    service_status: Option<Result<(), String>>,
    show_help: bool,
    should_quit: bool,
    status_line: String,
}

impl TuiApp {
    fn new(store: FileConfigStore) -> Self {
        let connection_input = store
            .config()
            .default_connection_string
            .clone()
            .unwrap_or_default();

        Self {
            machine: SessionMachine::new(),
            store,
            pane: Pane::Connection,
            connection_input,
            prompt_input: String::new(),
            connection_string: None,
            conversation_scroll: 0,
            results_scroll: 0,
            example_index: None,
            service_status: None,
            show_help: false,
            should_quit: false,
            status_line: "Enter a connection string and press Enter to connect".to_string(),
        }
    }

    fn handle(&mut self, msg: Msg) -> Option<AgentRequest> {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::NextPane => {
                self.pane = self.pane.next();
                self.status_line = format!("Switched pane to {}", self.pane.title());
            }
            Msg::Submit => return self.submit(),
            Msg::Backspace => {
                if let Some(input) = self.active_input() {
                    input.pop();
                }
            }
            Msg::Input(ch) => {
                if let Some(input) = self.active_input() {
                    input.push(ch);
                }
            }
            Msg::Disconnect => self.disconnect(),
            Msg::Scroll(direction) => self.scroll(direction),
        }
        None
    }

    fn active_input(&mut self) -> Option<&mut String> {
        match self.pane {
            Pane::Connection if self.connection_editable() => Some(&mut self.connection_input),
            Pane::Prompt => Some(&mut self.prompt_input),
            Pane::Connection | Pane::Conversation | Pane::Results => None,
        }
    }

    fn connection_editable(&self) -> bool {
        matches!(
            self.machine.session().connection_status,
            ConnectionStatus::Disconnected | ConnectionStatus::Error
        )
    }

    fn submit(&mut self) -> Option<AgentRequest> {
        match self.pane {
            Pane::Connection => self.submit_connection(),
            Pane::Prompt => self.submit_prompt(),
            Pane::Conversation | Pane::Results => {
                self.status_line = "Nothing to submit in this view".to_string();
                None
            }
        }
    }

    fn submit_connection(&mut self) -> Option<AgentRequest> {
        if self.machine.session().is_connected() {
            self.status_line = "Already connected; press Ctrl+D to disconnect".to_string();
            return None;
        }

        let raw_connection_string = self.connection_input.trim().to_string();
        if raw_connection_string.is_empty() {
            self.status_line = "Enter a connection string first".to_string();
            return None;
        }

        match self.machine.begin_connect(&raw_connection_string) {
            Ok(ticket) => {
                self.connection_string = Some(raw_connection_string.clone());
                self.conversation_scroll = 0;
                self.status_line = "Connecting...".to_string();
                Some(AgentRequest::Connect {
                    ticket,
                    raw_connection_string,
                })
            }
            Err(error) => {
                self.status_line = error.to_string();
                None
            }
        }
    }

    fn submit_prompt(&mut self) -> Option<AgentRequest> {
        let prompt = self.prompt_input.trim().to_string();
        if prompt.is_empty() {
            self.status_line = "Type a question first".to_string();
            return None;
        }

        let ticket = match self.machine.begin_query(&prompt) {
            Ok(ticket) => ticket,
            Err(error) => {
                self.status_line = error.to_string();
                return None;
            }
        };
        let Some(session_id) = self.machine.session().session_id.clone() else {
            warn!("query began without a session id");
            return None;
        };

        self.prompt_input.clear();
        self.example_index = None;
        self.conversation_scroll = 0;
        self.status_line = "Asking the agent...".to_string();
        Some(AgentRequest::Query {
            ticket,
            session_id,
            prompt,
        })
    }

    fn apply_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Connected { ticket, result } => {
                let accepted = result.is_ok();
                if let Err(error) = settle_connect(&mut self.machine, ticket, result) {
                    debug!(%error, "dropping connect reply");
                    return;
                }
                if accepted {
                    self.on_connected();
                } else {
                    self.connection_string = None;
                    self.status_line = "Connection failed".to_string();
                }
            }
            AgentEvent::Answered { ticket, result } => {
                if let Err(error) = settle_query(&mut self.machine, ticket, result) {
                    debug!(%error, "dropping query reply");
                    return;
                }
                self.results_scroll = 0;
                self.status_line = match (
                    self.machine.session().query_status,
                    &self.machine.session().last_result,
                ) {
                    (QueryStatus::Success, Some(result)) => format!(
                        "{} rows in {}",
                        result.row_count(),
                        format_execution_time(result.execution_time_ms)
                    ),
                    _ => "Query failed".to_string(),
                };
            }
            AgentEvent::Health(result) => {
                self.service_status = Some(result.map_err(|error| error.detail()));
            }
        }
    }

    fn on_connected(&mut self) {
        let kind = self.machine.session().database_kind;
        info!(%kind, "connected");
        self.status_line = format!("Connected to {kind}");
        self.pane = Pane::Prompt;

        let Some(raw_connection_string) = self.connection_string.as_deref() else {
            return;
        };
        if self.store.remember_connection_string(raw_connection_string) {
            if let Err(error) = self.store.persist() {
                warn!(%error, "failed to remember connection string");
                self.status_line = format!("Connected to {kind} (config save failed: {error})");
            }
        }
    }

    fn disconnect(&mut self) {
        if self.machine.session().connection_status == ConnectionStatus::Disconnected {
            self.status_line = "Not connected".to_string();
            return;
        }

        self.machine.disconnect();
        self.connection_string = None;
        self.conversation_scroll = 0;
        self.results_scroll = 0;
        self.pane = Pane::Connection;
        self.status_line = "Disconnected".to_string();
    }

    fn scroll(&mut self, direction: ScrollDirection) {
        match self.pane {
            Pane::Conversation => {
                self.conversation_scroll = match direction {
                    ScrollDirection::Up => self.conversation_scroll.saturating_sub(1),
                    ScrollDirection::Down => self.conversation_scroll.saturating_add(1),
                };
            }
            Pane::Results => {
                let row_count = self
                    .machine
                    .session()
                    .last_result
                    .as_ref()
                    .map_or(0, |result| result.row_count());
                self.results_scroll = match direction {
                    ScrollDirection::Up => self.results_scroll.saturating_sub(1),
                    ScrollDirection::Down => {
                        (self.results_scroll + 1).min(row_count.saturating_sub(1))
                    }
                };
            }
            Pane::Prompt => self.pick_example(direction),
            Pane::Connection => {}
        }
    }

    fn pick_example(&mut self, direction: ScrollDirection) {
        let count = EXAMPLE_PROMPTS.len();
        let index = match (self.example_index, direction) {
            (None, ScrollDirection::Down) => 0,
            (None, ScrollDirection::Up) => count - 1,
            (Some(index), ScrollDirection::Down) => (index + 1) % count,
            (Some(index), ScrollDirection::Up) => (index + count - 1) % count,
        };
        self.example_index = Some(index);
        self.prompt_input = EXAMPLE_PROMPTS[index].to_string();
        self.status_line = format!("Example {} of {count}; Enter to ask", index + 1);
    }

    fn connection_info(&self) -> Option<ConnectionDescriptor> {
        if !self.machine.session().is_connected() {
            return None;
        }
        self.connection_string
            .as_deref()
            .and_then(parse_connection_string)
    }
}

pub fn run(store: FileConfigStore) -> Result<(), TuiError> {
    let backend = Arc::new(HttpAgentBackend::from_config(&store.effective_config())?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(TuiError::Runtime)?;
    info!(base_url = backend.base_url(), "starting dbchat tui");

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &runtime, &backend, TuiApp::new(store));
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &Runtime,
    backend: &Arc<HttpAgentBackend>,
    mut app: TuiApp,
) -> Result<(), TuiError> {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    check_health(runtime, backend, &sender);

    loop {
        terminal.draw(|frame| render(frame, &app))?;

        if event::poll(TICK_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(request) = map_key_event(key).and_then(|msg| app.handle(msg)) {
                        dispatch(runtime, backend, &sender, request);
                    }
                }
            }
        }

        drain_events(&mut receiver, &mut app);

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn drain_events(receiver: &mut UnboundedReceiver<AgentEvent>, app: &mut TuiApp) {
    while let Ok(event) = receiver.try_recv() {
        app.apply_event(event);
    }
}

fn check_health(
    runtime: &Runtime,
    backend: &Arc<HttpAgentBackend>,
    sender: &UnboundedSender<AgentEvent>,
) {
    let backend = Arc::clone(backend);
    let sender = sender.clone();
    runtime.spawn(async move {
        let result = backend.health().await;
        if let Err(error) = &result {
            warn!(%error, "agent health check failed");
        }
        if sender.send(AgentEvent::Health(result)).is_err() {
            debug!("ui closed before health check finished");
        }
    });
}

fn dispatch(
    runtime: &Runtime,
    backend: &Arc<HttpAgentBackend>,
    sender: &UnboundedSender<AgentEvent>,
    request: AgentRequest,
) {
    let backend = Arc::clone(backend);
    let sender = sender.clone();
    runtime.spawn(async move {
        let event = match request {
            AgentRequest::Connect {
                ticket,
                raw_connection_string,
            } => AgentEvent::Connected {
                ticket,
                result: backend.connect(&raw_connection_string).await,
            },
            AgentRequest::Query {
                ticket,
                session_id,
                prompt,
            } => AgentEvent::Answered {
                ticket,
                result: backend.query(&session_id, &prompt).await,
            },
        };
        if sender.send(event).is_err() {
            debug!("ui closed before agent reply arrived");
        }
    });
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(render_header(app), chunks[0]);
    frame.render_widget(render_inputs(app), chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[2]);
    frame.render_widget(render_conversation(app), body[0]);
    frame.render_widget(render_results(app, body[1]), body[1]);

    let footer = Paragraph::new(vec![Line::from(format!("Status: {}", app.status_line))]).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Tab: pane | Enter: submit | Ctrl+D: disconnect | F1: help | Esc: quit"),
    );
    frame.render_widget(footer, chunks[3]);

    if app.show_help {
        render_help_popup(frame);
    }
}

fn pane_block(app: &TuiApp, pane: Pane) -> Block<'static> {
    let style = if app.pane == pane {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(pane.title())
}

fn render_header(app: &TuiApp) -> Paragraph<'static> {
    let session = app.machine.session();
    let connection = match session.connection_status {
        ConnectionStatus::Disconnected => "disconnected".to_string(),
        ConnectionStatus::Connecting => "connecting...".to_string(),
        ConnectionStatus::Error => "connection error".to_string(),
        ConnectionStatus::Connected => app.connection_info().map_or_else(
            || format!("connected to {}", session.database_kind),
            |info| format!("{} {info}", session.database_kind),
        ),
    };
    let query = match session.query_status {
        QueryStatus::Idle => "idle",
        QueryStatus::Querying => "running",
        QueryStatus::Success => "done",
        QueryStatus::Error => "failed",
    };
    let service = match &app.service_status {
        None => "checking...".to_string(),
        Some(Ok(())) => "online".to_string(),
        Some(Err(detail)) => format!("offline ({detail})"),
    };

    Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" {connection} "),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Query: {query}")),
        Span::raw(" | "),
        Span::raw(format!("Agent: {service}")),
    ]))
    .block(Block::default().borders(Borders::ALL).title("DB Chat"))
}

fn render_inputs(app: &TuiApp) -> Paragraph<'_> {
    let connection_value = if app.connection_input.is_empty() {
        let examples = PLACEHOLDER_KINDS
            .iter()
            .map(|kind| placeholder_connection_string(*kind))
            .collect::<Vec<_>>()
            .join("  or  ");
        Span::styled(
            format!("e.g. {examples}"),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::raw(app.connection_input.as_str())
    };

    let prompt_value = if app.prompt_input.is_empty() {
        Span::styled(
            format!("e.g. {} (Up/Down for examples)", EXAMPLE_PROMPTS[0]),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::raw(app.prompt_input.as_str())
    };

    let marker = |pane: Pane| if app.pane == pane { ">" } else { " " };
    Paragraph::new(vec![
        Line::from(vec![
            Span::raw(format!("{} Connection: ", marker(Pane::Connection))),
            connection_value,
        ]),
        Line::from(""),
        Line::from(vec![
            Span::raw(format!("{} Prompt: ", marker(Pane::Prompt))),
            prompt_value,
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title(format!(
        "Input ({}){}",
        app.pane.title(),
        if app.machine.session().is_busy() {
            " waiting for agent..."
        } else {
            ""
        }
    )))
}

fn render_conversation(app: &TuiApp) -> Paragraph<'_> {
    let mut lines = Vec::new();
    for step in app.machine.session().conversation.steps() {
        let color = match step.role {
            StepRole::User => Color::Cyan,
            StepRole::Agent => Color::Green,
            StepRole::Result => Color::White,
        };
        lines.push(Line::from(Span::styled(
            format!("{}:", step.label()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        for content_line in step.content.lines() {
            lines.push(Line::from(format!("  {content_line}")));
        }
        for call in &step.tool_calls {
            let detail = call.sql.as_deref().unwrap_or_default();
            lines.push(Line::from(format!("  - {} {detail}", call.name)));
        }
    }
    if lines.is_empty() {
        lines.push(Line::from("No messages yet"));
    }

    Paragraph::new(lines)
        .block(pane_block(app, Pane::Conversation))
        .wrap(Wrap { trim: false })
        .scroll((app.conversation_scroll, 0))
        .alignment(Alignment::Left)
}

fn render_results(app: &TuiApp, area: Rect) -> Paragraph<'_> {
    let Some(result) = app.machine.session().last_result.as_ref() else {
        return Paragraph::new("No results yet").block(pane_block(app, Pane::Results));
    };

    let mut lines = vec![
        Line::from(result.summary()),
        Line::from(format!(
            "Time: {}",
            format_execution_time(result.execution_time_ms)
        )),
    ];
    if !result.sql.is_empty() {
        lines.push(Line::from(format!("SQL: {}", result.sql)));
    }

    let columns = result.columns();
    if columns.is_empty() {
        lines.push(Line::from("No rows returned"));
    } else {
        lines.push(Line::from(Span::styled(
            columns.join(" | "),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        let used = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        let visible_limit = usize::from(area.height.saturating_sub(used.saturating_add(2))).max(1);
        for row in result.visible_rows(app.results_scroll, visible_limit) {
            lines.push(Line::from(result.cell_values(row).join(" | ")));
        }
    }

    Paragraph::new(lines).block(pane_block(app, Pane::Results))
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(60, 50, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Keys"),
        Line::from("Esc / Ctrl+C: quit"),
        Line::from("F1: toggle help"),
        Line::from("Tab: cycle panes"),
        Line::from("Enter: connect or ask (by pane)"),
        Line::from("Ctrl+D: disconnect"),
        Line::from("Up / Down: scroll conversation or results"),
        Line::from("Up / Down in Prompt: cycle example questions"),
        Line::from("Other keys type into the connection or prompt field"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Esc) => Some(Msg::Quit),
        (KeyModifiers::CONTROL, KeyCode::Char('d')) => Some(Msg::Disconnect),
        (_, KeyCode::F(1)) => Some(Msg::ToggleHelp),
        (_, KeyCode::Tab) => Some(Msg::NextPane),
        (_, KeyCode::Enter) => Some(Msg::Submit),
        (_, KeyCode::Backspace) => Some(Msg::Backspace),
        (_, KeyCode::Up) => Some(Msg::Scroll(ScrollDirection::Up)),
        (_, KeyCode::Down) => Some(Msg::Scroll(ScrollDirection::Down)),
        (modifiers, KeyCode::Char(ch)) if !modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Msg::Input(ch))
        }
        _ => None,
    }
}
