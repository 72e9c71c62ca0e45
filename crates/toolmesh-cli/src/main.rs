//! `toolmesh` command-line interface.

mod config_watcher;

use clap::{Parser, Subcommand};
use config_watcher::{read_config, ConfigWatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolmesh_core::{ContentSegment, InvocationRequest, Params};
use toolmesh_mcp::{McpToolsPlugin, SharedConfig, DEFAULT_CONFIG};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolmesh", version, about = "Discover and call tools on MCP servers")]
struct Cli {
    /// Path to the MCP server config file (JSON5)
    #[arg(short, long, default_value = "mcp_servers.json5")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config template with every server disabled
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Connect to every enabled server and print the tool catalog
    Tools,
    /// Call one tool and print the resulting content segments
    Call {
        #[arg(long)]
        server: String,
        #[arg(long)]
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Run a batch of calls read from a JSON array of
    /// `{"server_name", "tool_name", "params"}` objects
    Batch {
        #[arg(long)]
        file: PathBuf,
    },
    /// Keep connections open and reconcile whenever the config file changes
    Watch {
        /// Minimum milliseconds between two reloads
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Init { force } => write_template(&cli.config, force),
        command => run(cli.config, command).await,
    }
}

fn write_template(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "'{}' already exists, pass --force to overwrite it",
            path.display()
        );
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    info!(path = %path.display(), "Config template written");
    Ok(())
}

async fn run(config_path: PathBuf, command: Commands) -> anyhow::Result<()> {
    let text = read_config(&config_path)
        .map_err(|e| anyhow::anyhow!("{e} (run `toolmesh init` to create one)"))?;
    let source = Arc::new(SharedConfig::new(text));
    let plugin = Arc::new(McpToolsPlugin::new(source.clone()));

    let result = execute(&plugin, &source, config_path, command).await;
    plugin.cleanup().await;
    result
}

async fn execute(
    plugin: &Arc<McpToolsPlugin>,
    source: &Arc<SharedConfig>,
    config_path: PathBuf,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Tools => {
            let catalog = plugin.prompt_inject().await;
            if catalog.is_empty() {
                println!("No MCP servers connected.");
            } else {
                println!("{catalog}");
            }
        }
        Commands::Call {
            server,
            tool,
            params,
        } => {
            let params: Params = serde_json::from_str(&params)
                .map_err(|e| anyhow::anyhow!("--params must be a JSON object: {e}"))?;
            let segments = plugin
                .call_tools(&[InvocationRequest::new(server, tool, params)])
                .await;
            print_segments(&segments)?;
        }
        Commands::Batch { file } => {
            let calls = read_batch(&file)?;
            let output = plugin.call_tools_json(&calls).await;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Watch { debounce_ms } => {
            plugin.init().await;

            let runtime = tokio::runtime::Handle::current();
            let reload_source = Arc::clone(source);
            let reload_plugin = Arc::clone(plugin);
            let _watcher = ConfigWatcher::start(config_path, debounce_ms, move |text| {
                reload_source.set(text);
                let plugin = Arc::clone(&reload_plugin);
                runtime.spawn(async move { plugin.init().await });
            })?;

            info!("Watching for config changes, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
        }
        Commands::Init { force: _ } => {
            anyhow::bail!("`init` does not need a running plugin");
        }
    }
    Ok(())
}

fn read_batch(path: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read batch '{}': {e}", path.display()))?;
    match serde_json::from_str(&text)? {
        serde_json::Value::Array(calls) => Ok(calls),
        _ => anyhow::bail!("'{}' must contain a JSON array of tool calls", path.display()),
    }
}

fn print_segments(segments: &[ContentSegment]) -> anyhow::Result<()> {
    let wire: Vec<serde_json::Value> = segments.iter().map(ContentSegment::to_wire).collect();
    println!("{}", serde_json::to_string_pretty(&wire)?);
    Ok(())
}
