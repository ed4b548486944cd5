//! Interactive client REPL.
//!
//! Launch with `toolwire-mcp repl` to talk to a spawned server.
//! Type `/help` for available commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use serde_json::Value;

use toolwire::McpClient;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/tools", "List the server's tools"),
    ("/call", "Call a tool: /call <tool> {json arguments}"),
    ("/ping", "Check the server is responsive"),
    ("/info", "Show server identity and session state"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion of commands and tool names.
#[derive(Default)]
struct ClientHelper {
    tools: Vec<String>,
}

impl Completer for ClientHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        if cmd == "/call" && !args.contains(' ') {
            let prefix_start = input.len() - args.len();
            let matches: Vec<Pair> = self
                .tools
                .iter()
                .filter(|t| t.starts_with(args))
                .map(|t| Pair {
                    display: t.clone(),
                    replacement: format!("{t} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for ClientHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for ClientHelper {}
impl Validator for ClientHelper {}
impl Helper for ClientHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Split `/call` arguments into a tool name and a JSON arguments object.
pub fn parse_call(args: &str) -> Result<(String, Value), String> {
    let args = args.trim();
    let (tool, json) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    if tool.is_empty() {
        return Err("Usage: /call <tool> {json arguments}".to_string());
    }

    let json = json.trim();
    let arguments = if json.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(json).map_err(|e| format!("Arguments are not valid JSON: {e}"))?
    };
    if !arguments.is_object() {
        return Err("Arguments must be a JSON object".to_string());
    }
    Ok((tool.to_string(), arguments))
}

/// Run the interactive REPL against a connected client.
///
/// Line editing blocks, so each read is moved off the async workers.
pub async fn run(client: &McpClient) -> anyhow::Result<()> {
    let server = client.server().await;
    let server_name = server
        .as_ref()
        .and_then(|s| s.server_info.as_ref())
        .map(|i| format!("{} v{}", i.name, i.version))
        .unwrap_or_else(|| "unknown server".to_string());

    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mtoolwire-mcp v{}\x1b[0m \x1b[90mconnected to {server_name}\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let tools = match client.list_tools().await {
        Ok(tools) => tools.into_iter().map(|t| t.name).collect(),
        Err(e) => {
            eprintln!("  Could not list tools: {e}");
            Vec::new()
        }
    };

    let mut rl: Editor<ClientHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(ClientHelper { tools }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".toolwire_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mmcp>\x1b[0m ";

    loop {
        match tokio::task::block_in_place(|| rl.readline(prompt)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "info" => cmd_info(client).await,
                    "tools" => cmd_tools(client).await,
                    "ping" => cmd_ping(client).await,
                    "call" => cmd_call(client, args).await,
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands and, after /call, tool names.");
    eprintln!();
}

async fn cmd_info(client: &McpClient) {
    let session = client.session().await;
    eprintln!();
    match session.peer_info() {
        Some(info) => eprintln!("  Server:   {} v{}", info.name, info.version),
        None => eprintln!("  Server:   (did not identify itself)"),
    }
    eprintln!(
        "  Protocol: {}",
        session.protocol_version().unwrap_or("(not negotiated)")
    );
    eprintln!("  Session:  {}", session.phase());
    if let Some(pid) = client.process().and_then(|p| p.pid()) {
        eprintln!("  PID:      {pid}");
    }
    if let Some(instructions) = client.server().await.and_then(|s| s.instructions) {
        eprintln!("  Notes:    {instructions}");
    }
    eprintln!();
}

async fn cmd_tools(client: &McpClient) {
    match client.list_tools().await {
        Ok(tools) => {
            eprintln!();
            eprintln!("  {} MCP tools available:", tools.len());
            eprintln!();
            for tool in &tools {
                eprintln!(
                    "    {:<28} {}",
                    tool.name,
                    tool.description.as_deref().unwrap_or("")
                );
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Failed to list tools: {e}"),
    }
}

async fn cmd_ping(client: &McpClient) {
    let started = std::time::Instant::now();
    match client.ping().await {
        Ok(()) => eprintln!("  pong ({} ms)", started.elapsed().as_millis()),
        Err(e) => eprintln!("  Ping failed: {e}"),
    }
}

async fn cmd_call(client: &McpClient, args: &str) {
    let (tool, arguments) = match parse_call(args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("  {msg}");
            return;
        }
    };

    match client.call_tool(&tool, arguments, None).await {
        Ok(result) if result.is_error() => {
            eprintln!(
                "  \x1b[31m{tool} failed:\x1b[0m {}",
                result.error_message().unwrap_or_default()
            );
        }
        Ok(result) => {
            let pretty = serde_json::to_string_pretty(&result.payload())
                .unwrap_or_else(|_| result.payload().to_string());
            println!("{pretty}");
        }
        Err(e) => eprintln!("  Call failed: {e}"),
    }
}
