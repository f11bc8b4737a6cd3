//! Minimal stdio MCP server used by integration tests.
//!
//! Reads line-delimited JSON-RPC from stdin and answers on stdout. The
//! catalog is configured through the environment:
//!
//! - `MCP_FIXTURE_TOOLS`: comma-separated tool names (default `echo`)
//! - `MCP_FIXTURE_RESOURCES`: comma-separated resource URIs; enables the
//!   resources capability when set
//! - `MCP_FIXTURE_FAIL_INIT`: exit before answering anything
//! - `MCP_FIXTURE_IGNORE_SHUTDOWN`: ignore SIGTERM and keep running after
//!   stdin closes, so only a kill ends the process
//!
//! Calling the `crash` tool terminates the process without replying. The
//! `pid` tool answers with the process id.

use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const PROTOCOL_VERSION: &str = "2024-11-05";

struct Catalog {
    tools: Vec<String>,
    resources: Option<Vec<String>>,
}

impl Catalog {
    fn from_env() -> Self {
        let tools = std::env::var("MCP_FIXTURE_TOOLS")
            .map_or_else(|_| vec![String::from("echo")], |raw| split_list(&raw));
        let resources = std::env::var("MCP_FIXTURE_RESOURCES")
            .ok()
            .map(|raw| split_list(&raw));
        Self { tools, resources }
    }

    fn initialize(&self) -> Value {
        let mut capabilities = json!({ "tools": {} });
        if self.resources.is_some()
            && let Some(map) = capabilities.as_object_mut()
        {
            map.insert(String::from("resources"), json!({}));
        }
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "serverInfo": { "name": "mcp-fixture-server", "version": env!("CARGO_PKG_VERSION") },
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "description": format!("Fixture tool {name}"),
                    "inputSchema": { "type": "object" },
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    fn list_resources(&self) -> Value {
        let resources: Vec<Value> = self
            .resources
            .iter()
            .flatten()
            .map(|uri| json!({ "uri": uri, "name": uri }))
            .collect();
        json!({ "resources": resources })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

enum Reply {
    Result(Value),
    Error(i64, String),
    Exit(i32),
}

fn handle(catalog: &Catalog, method: &str, params: &Value) -> Reply {
    match method {
        "initialize" => Reply::Result(catalog.initialize()),
        "ping" => Reply::Result(json!({})),
        "tools/list" => Reply::Result(catalog.list_tools()),
        "resources/list" if catalog.resources.is_some() => {
            Reply::Result(catalog.list_resources())
        }
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            if name == "crash" {
                return Reply::Exit(3);
            }
            if name == "pid" {
                return Reply::Result(json!({
                    "content": [{ "type": "text", "text": std::process::id().to_string() }],
                    "isError": false,
                }));
            }
            if !catalog.tools.iter().any(|tool| tool == name) {
                return Reply::Error(-32602, format!("unknown tool '{name}'"));
            }
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .map_or_else(|| arguments.to_string(), ToOwned::to_owned);
            Reply::Result(json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false,
            }))
        }
        _ => Reply::Error(-32601, format!("method not found: {method}")),
    }
}

/// Replaces the default SIGTERM action for the rest of the process. The
/// runtime and signal stream are kept alive by the caller.
#[cfg(unix)]
fn ignore_sigterm() -> io::Result<(tokio::runtime::Runtime, tokio::signal::unix::Signal)> {
    use tokio::signal::unix::{SignalKind, signal};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let terminate = {
        let _context = runtime.enter();
        signal(SignalKind::terminate())?
    };
    Ok((runtime, terminate))
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if std::env::var_os("MCP_FIXTURE_FAIL_INIT").is_some() {
        info!("failing on startup");
        std::process::exit(1);
    }

    let ignore_shutdown = std::env::var_os("MCP_FIXTURE_IGNORE_SHUTDOWN").is_some();
    #[cfg(unix)]
    let _sigterm = if ignore_shutdown {
        Some(ignore_sigterm()?)
    } else {
        None
    };

    let catalog = Catalog::from_env();
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for entry in stdin.lock().lines() {
        let line = entry?;
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            debug!(line = %line, "ignoring unparseable line");
            continue;
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let Some(id) = message.get("id").cloned() else {
            debug!(method, "notification received");
            continue;
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let response = match handle(&catalog, method, &params) {
            Reply::Result(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Reply::Error(code, text) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": text },
            }),
            Reply::Exit(code) => {
                info!(code, "exiting on request");
                std::process::exit(code);
            }
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    if ignore_shutdown {
        info!("stdin closed; lingering until killed");
        loop {
            std::thread::sleep(Duration::from_secs(60));
        }
    }
    Ok(())
}
