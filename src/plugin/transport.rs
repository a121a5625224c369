//! JSON-RPC transports for plug-in servers (§4.6, §6 "JSON-RPC-style framing
//! over three transports" — stdio, HTTP, SSE; see the Open Question decision
//! in the design ledger for the exact method set this assumes).

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::plugin::config::{PluginServerConfig, TransportKind};
use crate::{Error, Result};

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i32,
    message: String,
}

fn unwrap_response(response: JsonRpcResponse) -> Result<Value> {
    match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(err)) => Err(Error::tool(format!("plug-in server error {}: {}", err.code, err.message))),
        (None, None) => Err(Error::unknown("plug-in server returned neither a result nor an error")),
    }
}

/// One JSON-RPC call to a plug-in server. Implementations own their own
/// connection state and serialize concurrent calls internally; callers never
/// need to lock externally.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value>;

    /// Best-effort teardown. Errors are swallowed by the manager — a server
    /// that won't shut down cleanly still transitions to `Stopped`.
    async fn close(&self);
}

/// Local child process, newline-delimited JSON-RPC over stdin/stdout (§4.6
/// "local-process-over-stdio"). Calls are strictly sequential: one
/// outstanding request at a time, matching response read off the next line.
pub struct StdioTransport {
    child: Mutex<Child>,
    io: Mutex<(ChildStdin, BufReader<ChildStdout>)>,
    next_id: AtomicU64,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String], env: &std::collections::HashMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::network(format!("failed to spawn plug-in server '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::network("plug-in server child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::network("plug-in server child has no stdout"))?;

        Ok(Self {
            child: Mutex::new(child),
            io: Mutex::new((stdin, BufReader::new(stdout))),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest { jsonrpc: "2.0", id, method, params };
        let mut line = serde_json::to_string(&request).map_err(Error::from)?;
        line.push('\n');

        let mut io = self.io.lock().await;
        let (stdin, stdout) = &mut *io;
        stdin.write_all(line.as_bytes()).await.map_err(Error::from)?;
        stdin.flush().await.map_err(Error::from)?;

        let mut response_line = String::new();
        let read = stdout.read_line(&mut response_line).await.map_err(Error::from)?;
        if read == 0 {
            return Err(Error::network("plug-in server closed stdout"));
        }

        let response: JsonRpcResponse = serde_json::from_str(response_line.trim_end()).map_err(Error::from)?;
        unwrap_response(response)
    }

    async fn close(&self) {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
    }
}

/// Stateless HTTP transport: one JSON-RPC request per POST (§4.6 "HTTP").
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    headers: reqwest::header::HeaderMap,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: String, headers: &std::collections::HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            headers: header_map(headers)?,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest { jsonrpc: "2.0", id, method, params };

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(Error::network(format!("plug-in server returned HTTP {status}")).with_status(status));
        }

        let parsed: JsonRpcResponse = response.json().await.map_err(Error::from)?;
        unwrap_response(parsed)
    }

    async fn close(&self) {}
}

/// Server-sent-events transport (§4.6 "SSE"): the request is a POST asking
/// for `text/event-stream`; the matching JSON-RPC response is the first
/// `data:` event in the body. A server that streams multiple progress events
/// before its final answer is out of scope here — this reads one response
/// per call, which covers the request/response contract §6 names.
pub struct SseTransport {
    http: reqwest::Client,
    url: String,
    headers: reqwest::header::HeaderMap,
    next_id: AtomicU64,
}

impl SseTransport {
    pub fn new(url: String, headers: &std::collections::HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            headers: header_map(headers)?,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest { jsonrpc: "2.0", id, method, params };

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(Error::network(format!("plug-in server returned HTTP {status}")).with_status(status));
        }

        let body = response.text().await.map_err(Error::from)?;
        for line in body.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                let parsed: JsonRpcResponse = serde_json::from_str(data).map_err(Error::from)?;
                return unwrap_response(parsed);
            }
        }

        Err(Error::unknown("plug-in server SSE response carried no data event"))
    }

    async fn close(&self) {}
}

fn header_map(headers: &std::collections::HashMap<String, String>) -> Result<reqwest::header::HeaderMap> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::invalid_request(format!("invalid header name '{name}': {e}")))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| Error::invalid_request(format!("invalid header value for '{name:?}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Connects a fresh transport for the given config's dialect (§4.6 Starting
/// state's "successful handshake" precondition).
pub async fn connect(config: &PluginServerConfig) -> Result<Box<dyn Transport>> {
    match &config.transport {
        TransportKind::Stdio { command, args, env } => {
            Ok(Box::new(StdioTransport::spawn(command, args, env).await?))
        }
        TransportKind::Http { url, headers } => Ok(Box::new(HttpTransport::new(url.clone(), headers)?)),
        TransportKind::Sse { url, headers } => Ok(Box::new(SseTransport::new(url.clone(), headers)?)),
    }
}
