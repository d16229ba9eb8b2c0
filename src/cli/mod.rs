//! Command-line interface parsing and handling
//!
//! Every subcommand builds the same registry, connection cache and hub facade
//! from the loaded configuration, then runs one operation against them.

use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::clock::SystemClock;
use crate::core::config::HubConfig;
use crate::core::envelope::ToolResult;
use crate::logging;
use crate::mcp::connection::{ConnectionManager, Connector, HttpConnector};
use crate::mcp::hub::{HubAction, HubFacade, HubRequest};
use crate::mcp::registry::ToolRegistry;
use crate::server::{self, ControlState};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit:  ",
    env!("VERGEN_GIT_SHA"),
    "\ndescribe: ",
    env!("VERGEN_GIT_DESCRIBE"),
    "\nbuilt:   ",
    env!("VERGEN_BUILD_DATE"),
    "\nrustc:   ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "hubtools", version, long_version = LONG_VERSION)]
#[command(about = "Discover, cache and call tools exposed by an MCP hub")]
#[command(
    long_about = "hubtools connects to a Model Context Protocol hub, discovers the tools it \
exposes, converts their parameter schemas into a provider-safe form, and serves them from a \
cache that is refreshed once per TTL.\n\n\
Environment Variables:\n\
  MCP_HUB_URL       Hub endpoint (overrides hub_url in the config file)\n\
  RUST_LOG          Log filter (overrides --log-level)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML config file
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Hub endpoint, overriding the config file and MCP_HUB_URL
    #[arg(long, global = true, value_name = "URL")]
    pub hub_url: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP control server
    Serve {
        /// Rediscover tools in the background once per TTL
        #[arg(long)]
        auto_refresh: bool,
    },
    /// List the discovered tools with their parameter schemas
    Tools {
        /// Bypass the cache and rediscover
        #[arg(long)]
        refresh: bool,
    },
    /// Call one discovered tool
    Call {
        /// Tool name, with or without the configured prefix
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, value_name = "JSON")]
        args: Option<String>,
    },
    /// Run a generic hub action
    Hub {
        /// One of list_tools, call_tool, list_resources, read_resource,
        /// list_prompts, get_prompt
        action: HubAction,
        /// Tool name for call_tool, prompt name for get_prompt
        #[arg(long)]
        name: Option<String>,
        /// Resource URI for read_resource
        #[arg(long)]
        uri: Option<String>,
        /// Tool parameters or prompt arguments as a JSON object
        #[arg(long, value_name = "JSON")]
        args: Option<String>,
    },
    /// Test the hub connection and report provider compatibility
    Report,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

struct Services {
    config: HubConfig,
    registry: Arc<ToolRegistry>,
    hub: Arc<HubFacade>,
}

impl Services {
    fn build(config: HubConfig) -> Result<Self, String> {
        let connector = Arc::new(HttpConnector::new(config.call_timeout())?);
        Ok(Self::with_connector(config, connector))
    }

    fn with_connector(config: HubConfig, connector: Arc<dyn Connector>) -> Self {
        let connections = Arc::new(ConnectionManager::new(connector, config.call_timeout()));
        let registry = Arc::new(ToolRegistry::new(
            &config,
            connections.clone(),
            Arc::new(SystemClock),
        ));
        let hub = Arc::new(HubFacade::new(
            config.hub_url().map(str::to_string),
            connections,
        ));
        Self {
            config,
            registry,
            hub,
        }
    }

    /// Stops background work and closes every hub session.
    async fn shutdown(&self) {
        self.registry.stop_auto_refresh();
        self.registry.connections().reset(None).await;
    }
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let mut config = HubConfig::load(args.config.as_deref())?;
    if let Some(url) = args.hub_url {
        config.hub_url = Some(url);
    }
    debug!(hub_url = ?config.hub_url(), ttl_ms = config.cache_ttl_ms, "Loaded configuration");
    let services = Services::build(config)?;

    let outcome = run(&services, args.command).await;
    services.shutdown().await;
    outcome
}

async fn run(services: &Services, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Serve { auto_refresh } => {
            if auto_refresh || services.config.auto_refresh {
                services.registry.start_auto_refresh();
            }
            let state = ControlState {
                registry: services.registry.clone(),
                hub: services.hub.clone(),
            };
            server::serve(&services.config.listen, state).await?;
            Ok(())
        }
        Commands::Tools { refresh } => {
            let snapshot = if refresh {
                services.registry.discover().await?
            } else {
                services.registry.get_tools().await
            };
            if snapshot.is_empty() {
                println!("No MCP tools available.");
            }
            for tool in snapshot.tools.values() {
                println!("{}  ({})", tool.name, tool.health.label());
                println!("    {}", tool.description);
                let schema = serde_json::to_string_pretty(&tool.input_schema())?;
                for line in schema.lines() {
                    println!("    {line}");
                }
            }
            Ok(())
        }
        Commands::Call { tool, args } => {
            let arguments = Value::Object(parse_json_object(args.as_deref())?);
            let snapshot = services.registry.get_tools().await;
            let prefixed = format!("{}{}", services.config.tool_prefix, tool);
            let Some(callable) = snapshot.get(&tool).or_else(|| snapshot.get(&prefixed)) else {
                return Err(format!("Unknown tool: {tool}").into());
            };
            let result = callable.execute(arguments).await;
            print_json(&result)?;
            envelope_status(&result)
        }
        Commands::Hub {
            action,
            name,
            uri,
            args,
        } => {
            let request = hub_request(action, name, uri, args.as_deref())?;
            let result = services.hub.execute(request).await;
            print_json(&result)?;
            envelope_status(&result)
        }
        Commands::Report => {
            let outcome = services.registry.test_connection().await;
            print_json(&outcome)?;
            if outcome.success {
                return Ok(());
            }
            Err(outcome
                .error
                .unwrap_or_else(|| "MCP connection test failed".to_string())
                .into())
        }
    }
}

/// Turns a failure envelope, already printed, into the command's error.
fn envelope_status(result: &ToolResult) -> Result<(), Box<dyn Error>> {
    if result.success {
        return Ok(());
    }
    Err(result
        .error
        .clone()
        .unwrap_or_else(|| result.message.clone())
        .into())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn parse_json_object(raw: Option<&str>) -> Result<Map<String, Value>, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("--args must be a JSON object".to_string()),
        Err(err) => Err(format!("--args is not valid JSON: {err}")),
    }
}

/// Maps the flat CLI flags onto the request fields each action reads.
pub(crate) fn hub_request(
    action: HubAction,
    name: Option<String>,
    uri: Option<String>,
    args: Option<&str>,
) -> Result<HubRequest, String> {
    let mut request = HubRequest::new(action);
    match action {
        HubAction::CallTool => {
            request.tool_name = name;
            request.tool_parameters = Some(parse_json_object(args)?);
        }
        HubAction::GetPrompt => {
            request.prompt_name = name;
            if args.is_some() {
                let arguments: HashMap<String, String> = parse_json_object(args)?
                    .into_iter()
                    .map(|(key, value)| match value {
                        Value::String(text) => (key, text),
                        other => (key, other.to_string()),
                    })
                    .collect();
                request.prompt_arguments = Some(arguments);
            }
        }
        HubAction::ReadResource => request.resource_uri = uri,
        HubAction::ListTools | HubAction::ListResources | HubAction::ListPrompts => {}
    }
    Ok(request)
}

#[cfg(test)]
mod tests;
