//! Mock MCP backend speaking the stdio protocol for one service.
//!
//! Usage:
//!
//! ```text
//! mock-backend --service <slack|github|drive> [--results N] [failure flags]
//! ```
//!
//! The process prints `mock <service> server ready` on stdout, then answers
//! newline-delimited JSON-RPC requests on stdin and stdout. Search payloads
//! use the same shapes as the real servers: CSV rows for slack, a JSON item
//! list for github and a `name (type) - ID: id` listing for drive. Search
//! always returns `--results` hits, ignoring any requested limit.
//!
//! Failure injection flags make the process exit before readiness, crash
//! after a delay (optionally only once, tracked by a marker file), throttle
//! searches or fail every fetch.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};
use workspace_finder::rpc::codec::{Frame, JsonLineCodec};
use workspace_finder::rpc::{EnvelopeKind, ErrorObject, RequestId, RpcEnvelope};
use workspace_finder::service::domain::ServiceKind;
use workspace_finder::telemetry::init_tracing;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

const RATE_LIMIT_CODE: i64 = 429;
const RESOURCE_UNAVAILABLE_CODE: i64 = -32002;
const MOCK_REPOSITORY: &str = "mock-org/mock-repo";

#[derive(Debug, Error)]
enum MockError {
    #[error("failed to write to stdout: {0}")]
    Stdout(#[source] std::io::Error),
    #[error("crash marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("protocol stream failed: {0}")]
    Stream(String),
}

/// Command-line options.
#[derive(Debug, Clone, Parser)]
#[command(name = "mock-backend", version, about = "Mock stdio MCP backend")]
struct Args {
    /// Service to impersonate.
    #[arg(long)]
    service: ServiceKind,
    /// Hits returned by every search.
    #[arg(long, default_value_t = 5)]
    results: usize,
    /// Delay before every response, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    /// Exit before printing the readiness banner.
    #[arg(long)]
    exit_before_ready: bool,
    /// Exit this many milliseconds after becoming ready.
    #[arg(long)]
    crash_after_ms: Option<u64>,
    /// Crash only when this file does not exist yet; create it first.
    #[arg(long)]
    crash_once_marker: Option<PathBuf>,
    /// Line written to stderr before any early exit.
    #[arg(long)]
    stderr_message: Option<String>,
    /// Exit status used for early exits.
    #[arg(long, default_value_t = 1)]
    exit_code: i32,
    /// Answer every search with a rate-limit error.
    #[arg(long)]
    rate_limit_search: bool,
    /// Fail every tool fetch and resource read.
    #[arg(long)]
    fail_fetch: bool,
}

fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    init_tracing("warn")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(&args)).map_err(Into::into)
}

async fn run(args: &Args) -> Result<(), MockError> {
    if args.exit_before_ready {
        exit_early(args);
    }

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("mock {} server ready\n", args.service).as_bytes())
        .await
        .map_err(MockError::Stdout)?;
    stdout.flush().await.map_err(MockError::Stdout)?;
    info!(service = %args.service, "mock backend ready");

    arm_crash(args)?;
    serve(args, stdout).await
}

fn arm_crash(args: &Args) -> Result<(), MockError> {
    let Some(delay) = args.crash_after_ms else {
        return Ok(());
    };
    if !should_crash(args.crash_once_marker.as_deref())? {
        return Ok(());
    }
    let crashing = args.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        exit_early(&crashing);
    });
    Ok(())
}

fn exit_early(args: &Args) -> ! {
    if let Some(message) = &args.stderr_message {
        eprintln_line(message);
    }
    std::process::exit(args.exit_code);
}

fn eprintln_line(message: &str) {
    use std::io::Write as _;
    let mut stderr = std::io::stderr().lock();
    if writeln!(stderr, "{message}").and_then(|()| stderr.flush()).is_err() {
        warn!("failed to write stderr message");
    }
}

fn should_crash(marker: Option<&Path>) -> Result<bool, MockError> {
    let Some(path) = marker else {
        return Ok(true);
    };
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, b"crashed\n").map_err(|source| MockError::Marker {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

async fn serve(args: &Args, stdout: tokio::io::Stdout) -> Result<(), MockError> {
    let mut reader = FramedRead::new(tokio::io::stdin(), JsonLineCodec::new());
    let mut writer = FramedWrite::new(stdout, JsonLineCodec::new());

    while let Some(frame) = reader.next().await {
        let envelope = match frame.map_err(|err| MockError::Stream(err.to_string()))? {
            Frame::Envelope(envelope) => envelope,
            Frame::Garbage(line) => {
                debug!(line, "ignoring non-JSON input");
                continue;
            }
            Frame::Oversized => {
                warn!("ignoring oversized input line");
                continue;
            }
        };
        if envelope.kind() != EnvelopeKind::Request {
            continue;
        }
        let (Some(id), Some(method)) = (envelope.id.clone(), envelope.method.as_deref()) else {
            continue;
        };
        if args.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
        }
        let reply = respond(args, id, method, envelope.params.as_ref().unwrap_or(&Value::Null));
        writer
            .send(reply)
            .await
            .map_err(|err| MockError::Stream(err.to_string()))?;
    }
    Ok(())
}

fn respond(args: &Args, id: RequestId, method: &str, params: &Value) -> RpcEnvelope {
    let outcome = match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": { "name": format!("mock-{}", args.service), "version": env!("CARGO_PKG_VERSION") },
        })),
        "tools/call" => call_tool(args, params),
        "resources/read" => read_resource(args, params),
        other => Err(ErrorObject::new(-32601, format!("method not found: {other}"))),
    };
    match outcome {
        Ok(result) => RpcEnvelope::success(id, result),
        Err(error) => RpcEnvelope::failure(Some(id), error),
    }
}

fn call_tool(args: &Args, params: &Value) -> Result<Value, ErrorObject> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    if name == search_tool(args.service) || (args.service == ServiceKind::Github && name == "search_issues") {
        if args.rate_limit_search {
            return Err(ErrorObject::new(RATE_LIMIT_CODE, "rate limit exceeded"));
        }
        let query = query_of(&arguments);
        return Ok(text_output(&search_payload(args.service, &query, args.results), false));
    }

    let known = match args.service {
        ServiceKind::Slack => name == "conversations_replies",
        ServiceKind::Github => {
            matches!(name, "get_issue" | "get_pull_request" | "get_file_contents")
        }
        ServiceKind::Drive => false,
    };
    if !known {
        return Ok(text_output(&format!("unknown tool: {name}"), true));
    }
    if args.fail_fetch {
        return Ok(text_output(&format!("{name} failed: upstream error"), true));
    }
    Ok(text_output(&format!("{name} result for {arguments}"), false))
}

fn read_resource(args: &Args, params: &Value) -> Result<Value, ErrorObject> {
    let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
    if args.fail_fetch {
        return Err(ErrorObject::new(
            RESOURCE_UNAVAILABLE_CODE,
            format!("resource unavailable: {uri}"),
        ));
    }
    let text = format!("Contents of {uri}");
    // Odd-numbered files come back as base64 blobs, as binary exports do.
    let content = if resource_index(uri).is_some_and(|index| index % 2 == 1) {
        json!({ "uri": uri, "mimeType": "application/octet-stream", "blob": STANDARD.encode(text) })
    } else {
        json!({ "uri": uri, "mimeType": "text/plain", "text": text })
    };
    Ok(json!({ "contents": [content] }))
}

fn resource_index(uri: &str) -> Option<u64> {
    uri.rsplit_once('-').and_then(|(_, index)| index.parse().ok())
}

const fn search_tool(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::Slack => "conversations_search_messages",
        ServiceKind::Github => "search_code",
        ServiceKind::Drive => "search",
    }
}

fn query_of(arguments: &Value) -> String {
    ["search_query", "q", "query"]
        .iter()
        .find_map(|key| arguments.get(*key).and_then(Value::as_str))
        .unwrap_or("anything")
        .to_owned()
}

fn text_output(text: &str, is_error: bool) -> Value {
    json!({ "content": [{ "type": "text", "text": text }], "isError": is_error })
}

fn search_payload(service: ServiceKind, query: &str, results: usize) -> String {
    match service {
        ServiceKind::Slack => slack_csv(query, results),
        ServiceKind::Github => github_items(query, results),
        ServiceKind::Drive => drive_listing(query, results),
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn slack_csv(query: &str, results: usize) -> String {
    let mut csv = "MsgID,UserID,UserName,RealName,Channel,ThreadTs,Text,Time,Reactions,Cursor\n".to_owned();
    for index in 0..results {
        let fields = [
            format!("1700000000.{index:06}"),
            format!("U{index:03}"),
            format!("user{index}"),
            format!("Mock User {index}"),
            "#mock-channel".to_owned(),
            String::new(),
            format!("Message {index} about {query}, with details"),
            "2025-01-01T00:00:00Z".to_owned(),
            String::new(),
            String::new(),
        ];
        let row: Vec<String> = fields.iter().map(|field| csv_field(field)).collect();
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

fn github_items(query: &str, results: usize) -> String {
    let items: Vec<Value> = (0..results)
        .map(|index| {
            let path = format!("src/module_{index}.rs");
            json!({
                "name": format!("module_{index}.rs"),
                "path": path,
                "html_url": format!("https://github.com/{MOCK_REPOSITORY}/blob/main/{path}"),
                "repository": { "full_name": MOCK_REPOSITORY },
                "text_matches": [{ "fragment": format!("// {query} handling in module {index}") }],
            })
        })
        .collect();
    json!({ "total_count": results, "incomplete_results": false, "items": items }).to_string()
}

fn drive_listing(query: &str, results: usize) -> String {
    let mut listing = format!("Found {results} files:\n");
    for index in 0..results {
        listing.push_str(&format!(
            "{query} notes {index} (text/plain) - ID: mock-file-{index}\n"
        ));
    }
    listing
}
