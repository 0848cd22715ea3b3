//! mnemo - thin client for a running server
//!
//! Wraps the JSON-RPC tool surface over HTTP. One subcommand per tool;
//! exits 0 on success, 1 on any failure.

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "mnemo", version, about = "Client for a running mnemo server")]
struct Cli {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:4100")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a memory
    Remember {
        content: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        tag: Vec<String>,
        #[arg(long)]
        importance: Option<f64>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        privacy: Option<String>,
    },
    /// Search memories
    Recall {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Vector-only neighbors of a memory
    Similar {
        id: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Fetch one memory
    Get { id: String },
    /// Pin a memory (exempt from forgetting)
    Pin { id: String },
    /// Remove a pin
    Unpin { id: String },
    /// Forget a memory (soft by default)
    Forget {
        id: String,
        #[arg(long)]
        hard: bool,
    },
    /// Run the forgetting policy (dry run unless --execute)
    Cleanup {
        #[arg(long)]
        execute: bool,
    },
    /// Forget-score aggregates
    Stats,
    /// Performance counters, queue and alert state
    Perf,
    /// ANALYZE / index maintenance
    Optimize {
        #[arg(long)]
        create_indexes: bool,
    },
    /// List the server's tool catalogue
    Tools,
}

fn tool_call(command: &Command) -> (&'static str, Value) {
    match command {
        Command::Remember {
            content,
            kind,
            tag,
            importance,
            source,
            privacy,
        } => {
            let mut arguments = json!({ "content": content });
            if let Some(kind) = kind {
                arguments["kind"] = json!(kind);
            }
            if !tag.is_empty() {
                arguments["tags"] = json!(tag);
            }
            if let Some(importance) = importance {
                arguments["importance"] = json!(importance);
            }
            if let Some(source) = source {
                arguments["source"] = json!(source);
            }
            if let Some(privacy) = privacy {
                arguments["privacy"] = json!(privacy);
            }
            ("remember", arguments)
        }
        Command::Recall { query, limit } => {
            let mut arguments = json!({ "query": query });
            if let Some(limit) = limit {
                arguments["limit"] = json!(limit);
            }
            ("recall", arguments)
        }
        Command::Similar { id, limit } => {
            let mut arguments = json!({ "id": id });
            if let Some(limit) = limit {
                arguments["limit"] = json!(limit);
            }
            ("similar_memories", arguments)
        }
        Command::Get { id } => ("get_memory", json!({ "id": id })),
        Command::Pin { id } => ("pin", json!({ "id": id })),
        Command::Unpin { id } => ("unpin", json!({ "id": id })),
        Command::Forget { id, hard } => ("forget", json!({ "id": id, "hard": hard })),
        Command::Cleanup { execute } => ("cleanup_memory", json!({ "dry_run": !execute })),
        Command::Stats => ("forgetting_stats", json!({})),
        Command::Perf => ("performance_stats", json!({})),
        Command::Optimize { create_indexes } => (
            "database_optimize",
            json!({ "analyze": true, "create_indexes": create_indexes }),
        ),
        Command::Tools => ("", json!({})),
    }
}

fn rpc(
    client: &reqwest::blocking::Client,
    url: &str,
    id: u64,
    method: &str,
    params: Value,
) -> Result<Value, String> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });
    let response: Value = client
        .post(format!("{}/rpc", url.trim_end_matches('/')))
        .json(&request)
        .send()
        .map_err(|e| format!("request failed: {e}"))?
        .json()
        .map_err(|e| format!("bad response: {e}"))?;

    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        return Err(format!(
            "rpc error {}: {}",
            error["code"], error["message"]
        ));
    }
    Ok(response["result"].clone())
}

fn run(cli: Cli) -> Result<(), String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| e.to_string())?;

    rpc(
        &client,
        &cli.url,
        1,
        "initialize",
        json!({ "clientInfo": { "name": "mnemo-cli" } }),
    )?;

    if matches!(cli.command, Command::Tools) {
        let result = rpc(&client, &cli.url, 2, "tools/list", json!({}))?;
        for tool in result["tools"].as_array().cloned().unwrap_or_default() {
            println!(
                "{}  {}",
                tool["name"].as_str().unwrap_or("?").bold(),
                tool["description"].as_str().unwrap_or("")
            );
        }
        return Ok(());
    }

    let (name, arguments) = tool_call(&cli.command);
    let result = rpc(
        &client,
        &cli.url,
        2,
        "tools/call",
        json!({ "name": name, "arguments": arguments }),
    )?;

    if result["ok"] == json!(true) {
        println!("{}", "ok".green().bold());
        println!(
            "{}",
            serde_json::to_string_pretty(&result["payload"]).unwrap_or_default()
        );
        Ok(())
    } else {
        Err(format!(
            "{} ({})",
            result["error"]["message"].as_str().unwrap_or("unknown error"),
            result["error"]["kind"].as_str().unwrap_or("internal")
        ))
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        eprintln!("{} {message}", "error:".red().bold());
        std::process::exit(1);
    }
}
