use std::error::Error;
use std::io;

use dbchat_adapters::http::HttpAgentBackend;
use dbchat_core::agent::{AgentBackend, ChatDriver};
use dbchat_core::config::{ClientConfig, FileConfigStore};
use dbchat_core::result_table::{format_execution_time, QueryResult};
use dbchat_core::session::Session;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseOutcome {
    Config,
    HelpRequested,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AskConfig {
    connection_string: Option<String>,
    prompt: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
    check_only: bool,
    json_output: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    init_stderr_logging();
    let args = parse_args()?;
    let store = FileConfigStore::load_default()?;
    let client_config = resolve_client_config(store.effective_config(), &args);
    let backend = HttpAgentBackend::from_config(&client_config)?;

    if args.check_only {
        backend.health().await.map_err(io_other)?;
        println!("agent service at {} is healthy", backend.base_url());
        return Ok(());
    }

    let connection_string = args
        .connection_string
        .or(client_config.default_connection_string)
        .ok_or_else(|| io_other("missing `--conn` and no default_connection_string in config"))?;
    let prompt = args
        .prompt
        .ok_or_else(|| io_other("missing value for `--prompt`"))?;

    let mut driver = ChatDriver::new(backend);
    let connected = driver.connect(&connection_string).await;
    if connected.is_err() {
        print!("{}", render_transcript(driver.session()));
    }
    connected?;
    if let Some(info) = driver.connection_info() {
        eprintln!("connected to {} ({info})", driver.session().database_kind);
    }

    let answered = driver.ask(&prompt).await.map(|_| ());
    print!("{}", render_transcript(driver.session()));
    answered?;

    if let Some(result) = &driver.session().last_result {
        println!("{}", render_result(result, args.json_output)?);
    }

    driver.disconnect();
    Ok(())
}

fn init_stderr_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber installed by the embedding environment wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn resolve_client_config(mut config: ClientConfig, args: &AskConfig) -> ClientConfig {
    if let Some(api_base_url) = &args.api_base_url {
        config.api_base_url.clone_from(api_base_url);
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.request_timeout_secs = timeout_secs;
    }
    config
}

fn render_transcript(session: &Session) -> String {
    let mut rendered = String::new();
    for step in session.conversation.steps() {
        rendered.push_str(&format!("{}: {}\n", step.label(), step.content));
        for call in &step.tool_calls {
            match call.sql.as_deref() {
                Some(sql) => rendered.push_str(&format!("  - {} ({sql})\n", call.name)),
                None => rendered.push_str(&format!("  - {}\n", call.name)),
            }
        }
    }
    rendered
}

fn render_result(result: &QueryResult, json_output: bool) -> Result<String, serde_json::Error> {
    if json_output {
        return serde_json::to_string_pretty(&result.rows);
    }

    let mut lines = vec![
        result.summary(),
        format!(
            "Execution time: {}",
            format_execution_time(result.execution_time_ms)
        ),
    ];
    if !result.sql.is_empty() {
        lines.push(format!("SQL: {}", result.sql));
    }
    if !result.is_empty() {
        lines.push(String::new());
        lines.push(result.render_text_table());
    }
    Ok(lines.join("\n"))
}

fn parse_args() -> io::Result<AskConfig> {
    let mut config = AskConfig::default();
    let outcome = parse_args_from(std::env::args().skip(1), &mut config)?;
    if outcome == ParseOutcome::HelpRequested {
        print_help();
        std::process::exit(0);
    }
    Ok(config)
}

fn parse_args_from(
    args: impl IntoIterator<Item = String>,
    config: &mut AskConfig,
) -> io::Result<ParseOutcome> {
    let mut args = args.into_iter();

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-h" | "--help" => return Ok(ParseOutcome::HelpRequested),
            "--conn" => config.connection_string = Some(next_value(&mut args, "--conn")?),
            "--prompt" => config.prompt = Some(next_value(&mut args, "--prompt")?),
            "--api-url" => config.api_base_url = Some(next_value(&mut args, "--api-url")?),
            "--timeout-secs" => {
                config.timeout_secs = Some(
                    next_value(&mut args, "--timeout-secs")?
                        .parse::<u64>()
                        .map_err(|error| {
                            io_other(format!("invalid --timeout-secs value: {error}"))
                        })?,
                );
            }
            "--check" => config.check_only = true,
            "--json" => config.json_output = true,
            _ => {
                return Err(io_other(format!("unknown argument `{flag}`")));
            }
        }
    }

    Ok(ParseOutcome::Config)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> io::Result<String> {
    args.next()
        .ok_or_else(|| io_other(format!("missing value for `{flag}`")))
}

fn print_help() {
    println!(
        "dbchat one-shot client\n\n\
Usage:\n  cargo run -p dbchat-app --bin ask -- [OPTIONS]\n\n\
Options:\n  --conn <connection-string>  Database to connect to (default: default_connection_string from config)\n  --prompt <question>         Natural-language question for the agent\n  --api-url <url>             Agent service base URL (default: config, then http://localhost:8000/api)\n  --timeout-secs <secs>       Per-request timeout (default: 120)\n  --check                     Check the agent service health endpoint and exit\n  --json                      Print result rows as JSON instead of a table\n\n\
Environment:\n  DBCHAT_API_URL overrides the configured agent URL.\n  DBCHAT_CONFIG_DIR overrides the config directory.\n  RUST_LOG controls log verbosity on stderr.\n"
    );
}

fn io_other(error: impl std::fmt::Display) -> io::Error {
    io::Error::other(error.to_string())
}

#[cfg(test)]
mod tests {
    use dbchat_core::config::ClientConfig;
    use dbchat_core::conversation::{ConversationStep, ToolCall};
    use dbchat_core::database_kind::DatabaseKind;
    use dbchat_core::result_table::QueryResult;
    use dbchat_core::session::Session;
    use serde_json::json;

    use super::{
        io_other, next_value, parse_args_from, render_result, render_transcript,
        resolve_client_config, AskConfig, ParseOutcome,
    };

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    fn sample_result() -> QueryResult {
        let rows = json!([{"id": 1, "name": "ana"}, {"id": 2, "name": "bo"}]);
        QueryResult {
            sql: "SELECT id, name FROM users".to_string(),
            rows: rows
                .as_array()
                .expect("fixture is an array")
                .iter()
                .map(|row| row.as_object().expect("fixture rows are objects").clone())
                .collect(),
            execution_time_ms: 7.0,
            database_kind: DatabaseKind::Sqlite,
        }
    }

    #[test]
    fn parse_args_from_applies_overrides() {
        let mut config = AskConfig::default();
        let outcome = parse_args_from(
            args(&[
                "--conn",
                "sqlite:///tmp/shop.db",
                "--prompt",
                "how many users?",
                "--api-url",
                "http://agent:9000/api",
                "--timeout-secs",
                "30",
                "--json",
            ]),
            &mut config,
        )
        .expect("parse should succeed");

        assert_eq!(outcome, ParseOutcome::Config);
        assert_eq!(
            config.connection_string.as_deref(),
            Some("sqlite:///tmp/shop.db")
        );
        assert_eq!(config.prompt.as_deref(), Some("how many users?"));
        assert_eq!(config.api_base_url.as_deref(), Some("http://agent:9000/api"));
        assert_eq!(config.timeout_secs, Some(30));
        assert!(config.json_output);
        assert!(!config.check_only);
    }

    #[test]
    fn parse_args_from_detects_help_and_check() {
        let mut config = AskConfig::default();
        let outcome = parse_args_from(args(&["--help"]), &mut config).expect("help parse");
        assert_eq!(outcome, ParseOutcome::HelpRequested);

        let mut config = AskConfig::default();
        parse_args_from(args(&["--check"]), &mut config).expect("check parse");
        assert!(config.check_only);
    }

    #[test]
    fn parse_args_from_fails_for_unknown_flag_and_bad_timeout() {
        let mut config = AskConfig::default();
        let err = parse_args_from(args(&["--bogus"]), &mut config)
            .expect_err("unknown flags should fail");
        assert!(err.to_string().contains("unknown argument"));

        let err = parse_args_from(args(&["--timeout-secs", "soon"]), &mut config)
            .expect_err("non-numeric timeout should fail");
        assert!(err.to_string().contains("invalid --timeout-secs value"));
    }

    #[test]
    fn next_value_reports_missing_flag_values() {
        let mut args = std::iter::empty::<String>();
        let err = next_value(&mut args, "--prompt").expect_err("missing value should fail");
        assert!(err.to_string().contains("missing value for `--prompt`"));
    }

    #[test]
    fn flags_override_client_config() {
        let config = resolve_client_config(
            ClientConfig::default(),
            &AskConfig {
                api_base_url: Some("http://agent:9000/api".to_string()),
                timeout_secs: Some(5),
                ..AskConfig::default()
            },
        );
        assert_eq!(config.api_base_url, "http://agent:9000/api");
        assert_eq!(config.request_timeout_secs, 5);

        let untouched = resolve_client_config(ClientConfig::default(), &AskConfig::default());
        assert_eq!(untouched, ClientConfig::default());
    }

    #[test]
    fn transcript_lists_steps_and_tool_calls() {
        let mut session = Session::default();
        session.conversation.push(ConversationStep::user("count users"));
        session.conversation.push(
            ConversationStep::agent("Tool Calls by Agent - run_sql_query").with_tool_calls(vec![
                ToolCall {
                    sql: Some("SELECT COUNT(*) FROM users".to_string()),
                    ..ToolCall::named("run_sql_query")
                },
            ]),
        );

        assert_eq!(
            render_transcript(&session),
            "You: count users\n\
             Agent: Tool Calls by Agent - run_sql_query\n  \
             - run_sql_query (SELECT COUNT(*) FROM users)\n"
        );
    }

    #[test]
    fn result_renders_as_table_or_json() {
        let result = sample_result();

        let table = render_result(&result, false).expect("table render");
        assert!(table.starts_with("SQLite Query Results: 2 rows, 2 columns\nExecution time: 7ms"));
        assert!(table.ends_with("id | name\n---+-----\n1  | ana\n2  | bo"));

        let rendered = render_result(&result, true).expect("json render");
        let parsed: serde_json::Value =
            serde_json::from_str(&rendered).expect("output should be json");
        assert_eq!(parsed, json!([{"id": 1, "name": "ana"}, {"id": 2, "name": "bo"}]));
    }

    #[test]
    fn io_other_uses_display_text() {
        let err = io_other("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
