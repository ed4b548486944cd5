//! Toolwire MCP: entry point.

use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use toolwire::{ClientConfig, Implementation, McpClient, ServerCommand, CRATE_VERSION, MCP_VERSION};
use toolwire_mcp::{build_server, ToolConfig};

#[derive(Parser)]
#[command(
    name = "toolwire-mcp",
    about = "MCP tool server (weather, web search) and stdio client",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct ToolArgs {
    /// Base URL of the wttr.in-compatible weather service.
    #[arg(long)]
    weather_url: Option<String>,

    /// Serper search endpoint.
    #[arg(long)]
    search_url: Option<String>,

    /// Serper API key. Also reads SERPER_API_KEY.
    #[arg(long)]
    serper_api_key: Option<String>,
}

#[derive(Args)]
struct ServerArgs {
    /// Command line of the server to spawn. Defaults to `<this binary> serve`.
    #[arg(long)]
    server: Option<String>,

    /// Per-call timeout in milliseconds. Also reads TOOLWIRE_CALL_TIMEOUT_MS.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server over stdio (default).
    Serve {
        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Spawn a server, call one tool and print its payload.
    ///
    /// Example:
    ///   toolwire-mcp call get_weather '{"city":"Mumbai"}'
    Call {
        #[command(flatten)]
        server: ServerArgs,

        /// Tool name.
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(default_value = "{}")]
        arguments: String,
    },

    /// Spawn a server and list the tools it advertises.
    Tools {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Print this server's identity, protocol version and tools as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   toolwire-mcp completions bash > ~/.local/share/bash-completion/completions/toolwire-mcp
    ///   toolwire-mcp completions zsh > ~/.zfunc/_toolwire-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Interactive client session against a spawned server.
    Repl {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        tools: ToolArgs::default(),
    }) {
        Commands::Serve { tools } => {
            let config = tool_config(&tools);
            if config.serper_api_key.is_none() {
                tracing::warn!("SERPER_API_KEY not set, web_search will report an error");
            }
            let server = build_server(&config)?;
            server.serve_stdio().await?;
        }

        Commands::Call {
            server,
            tool,
            arguments,
        } => {
            let arguments: serde_json::Value = serde_json::from_str(&arguments)
                .map_err(|e| anyhow::anyhow!("arguments must be JSON: {e}"))?;
            let client = connect(&server).await?;
            let outcome = client.call_tool(&tool, arguments, None).await;
            client.disconnect().await;

            let result = outcome?;
            if result.is_error() {
                eprintln!(
                    "Tool '{tool}' failed: {}",
                    result.error_message().unwrap_or_default()
                );
                std::process::exit(1);
            }
            println!("{}", serde_json::to_string_pretty(&result.payload())?);
        }

        Commands::Tools { server } => {
            let client = connect(&server).await?;
            let tools = client.list_tools().await;
            client.disconnect().await;

            for tool in tools? {
                println!(
                    "{:<16} {}",
                    tool.name,
                    tool.description.as_deref().unwrap_or("")
                );
            }
        }

        Commands::Info => {
            let server = build_server(&ToolConfig::default())?;
            let tools = server.registry().list_tools();
            let info = serde_json::json!({
                "server": Implementation::new(toolwire_mcp::SERVER_NAME, CRATE_VERSION),
                "protocol_version": MCP_VERSION,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "toolwire-mcp", &mut std::io::stdout());
        }

        Commands::Repl { server } => {
            let client = connect(&server).await?;
            let result = toolwire_mcp::repl::run(&client).await;
            client.disconnect().await;
            result?;
        }
    }

    Ok(())
}

fn tool_config(args: &ToolArgs) -> ToolConfig {
    ToolConfig::resolve(
        args.weather_url.as_deref(),
        args.search_url.as_deref(),
        args.serper_api_key.as_deref(),
    )
}

fn server_command(args: &ServerArgs) -> anyhow::Result<ServerCommand> {
    match &args.server {
        Some(line) => ServerCommand::parse(line)
            .ok_or_else(|| anyhow::anyhow!("--server must name a command")),
        None => {
            let exe = std::env::current_exe()?;
            Ok(ServerCommand::new(exe.display().to_string()).arg("serve"))
        }
    }
}

async fn connect(args: &ServerArgs) -> anyhow::Result<McpClient> {
    let mut config = ClientConfig::from_env()
        .with_client_info(Implementation::new("toolwire-mcp-client", CRATE_VERSION));
    if let Some(ms) = args.timeout_ms {
        config = config.with_call_timeout(Duration::from_millis(ms));
    }

    let command = server_command(args)?;
    tracing::info!(server = %command.display(), "Connecting");
    Ok(McpClient::connect(&command, config).await?)
}
