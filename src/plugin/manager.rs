//! Plug-in server manager (C6, §4.6): the Starting→Running→{Error,Stopped}
//! state machine and the registry adaptor that keeps `tools::Manager` in
//! sync with which servers are actually reachable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::plugin::config::{self, PluginServerConfig};
use crate::plugin::transport::{self, Transport};
use crate::tools::{Manager as ToolManager, Tool, ToolContext};
use crate::{Error, Result};

/// §4.6 state machine. `Error`'s message lives alongside it on
/// [`ServerStatus`]/[`ServerEntry`] rather than as enum payload, so the
/// discriminant alone is enough for callers matching on current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Running,
    Error,
    Stopped,
}

/// Capability flags negotiated during `initialize` (§3 ServerStatus).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
}

/// A read-only snapshot returned by `GetServerStatus`/`GetAllStatuses`.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub name: String,
    pub state: ServerState,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub transport: &'static str,
    pub capabilities: Capabilities,
}

struct ServerEntry {
    config: PluginServerConfig,
    state: ServerState,
    last_error: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    capabilities: Capabilities,
    started_at: Option<DateTime<Utc>>,
    registered_tools: Vec<String>,
}

#[derive(Deserialize)]
struct RemoteToolDescriptor {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "inputSchema", default = "default_schema")]
    input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {}, "required": [] })
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<RemoteToolDescriptor>,
}

/// Lifecycle owner for every configured plug-in server, and the sole writer
/// of plug-in-originated entries in the shared [`ToolManager`] (§3 Ownership:
/// "a plug-in server reference is shared between C6 (owns lifecycle) and any
/// plug-in Tool objects, which hold a ... non-owning handle").
pub struct PluginManager {
    servers: RwLock<HashMap<String, ServerEntry>>,
    tools: Arc<ToolManager>,
    prefix: String,
}

impl PluginManager {
    pub fn new(tools: Arc<ToolManager>, prefix: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
            tools,
            prefix: prefix.into(),
        })
    }

    /// Starting → Running on handshake success, Starting → Error otherwise
    /// (§4.6). Registers the server's advertised tools into `ToolManager` as
    /// a side effect of reaching Running.
    pub async fn start_server(self: &Arc<Self>, config: PluginServerConfig) -> Result<()> {
        let config = config::expand(config);
        let name = config.name.clone();
        let label = config.transport.label();

        {
            let mut servers = self.servers.write().await;
            if let Some(existing) = servers.get(&name) {
                if matches!(existing.state, ServerState::Starting | ServerState::Running) {
                    return Err(Error::invalid_request(format!(
                        "plug-in server '{name}' is already starting or running"
                    )));
                }
            }
            servers.insert(
                name.clone(),
                ServerEntry {
                    config: config.clone(),
                    state: ServerState::Starting,
                    last_error: None,
                    transport: None,
                    capabilities: Capabilities::default(),
                    started_at: None,
                    registered_tools: Vec::new(),
                },
            );
        }

        let transport: Arc<dyn Transport> = match transport::connect(&config).await {
            Ok(t) => Arc::from(t),
            Err(e) => {
                self.mark_error(&name, e.to_string()).await;
                return Err(e);
            }
        };

        let handshake = transport
            .call(
                "initialize",
                serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "coda-core", "version": env!("CARGO_PKG_VERSION") },
                }),
            )
            .await;

        let capabilities = match handshake {
            Ok(value) => parse_capabilities(&value),
            Err(e) => {
                self.mark_error(&name, e.to_string()).await;
                return Err(e);
            }
        };

        {
            let mut servers = self.servers.write().await;
            if let Some(entry) = servers.get_mut(&name) {
                entry.transport = Some(transport.clone());
                entry.capabilities = capabilities;
                entry.state = ServerState::Running;
                entry.started_at = Some(Utc::now());
            }
        }

        if capabilities.tools {
            if let Err(e) = self.register_tools(&name, &transport).await {
                self.mark_error(&name, e.to_string()).await;
                return Err(e);
            }
        }

        log::info!("plug-in server '{name}' ({label}) is running");
        Ok(())
    }

    /// Running → Stopped, or Error → Stopped. Unregisters exactly the tools
    /// this server previously registered and no others (§4.6 "Refresh =
    /// unregister-then-register").
    pub async fn stop_server(&self, name: &str) -> Result<()> {
        let (transport, registered) = {
            let mut servers = self.servers.write().await;
            let entry = servers
                .get_mut(name)
                .ok_or_else(|| Error::invalid_request(format!("unknown plug-in server '{name}'")))?;
            let transport = entry.transport.take();
            let registered = std::mem::take(&mut entry.registered_tools);
            entry.state = ServerState::Stopped;
            (transport, registered)
        };

        for tool_name in &registered {
            self.tools.unregister(tool_name).await;
        }
        if let Some(t) = transport {
            t.close().await;
        }
        Ok(())
    }

    /// Any → Starting (§4.6 "Any → Starting on Restart").
    pub async fn restart_server(self: &Arc<Self>, name: &str) -> Result<()> {
        let config = {
            let servers = self.servers.read().await;
            servers
                .get(name)
                .ok_or_else(|| Error::invalid_request(format!("unknown plug-in server '{name}'")))?
                .config
                .clone()
        };
        let _ = self.stop_server(name).await;
        self.start_server(config).await
    }

    pub async fn get_server_status(&self, name: &str) -> Option<ServerStatus> {
        self.servers.read().await.get(name).map(|e| to_status(name, e))
    }

    pub async fn get_all_statuses(&self) -> Vec<ServerStatus> {
        self.servers.read().await.iter().map(|(name, e)| to_status(name, e)).collect()
    }

    /// Composite tool names (`<prefix>_<server>_<tool>`) registered across
    /// every currently Running server.
    pub async fn list_tools(&self) -> Vec<String> {
        self.servers
            .read()
            .await
            .values()
            .filter(|e| e.state == ServerState::Running)
            .flat_map(|e| e.registered_tools.clone())
            .collect()
    }

    pub async fn list_resources(&self) -> Result<Vec<Value>> {
        self.aggregate_list("resources/list", "resources", |c| c.resources).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Value>> {
        self.aggregate_list("prompts/list", "prompts", |c| c.prompts).await
    }

    async fn aggregate_list(
        &self,
        method: &str,
        field: &str,
        capable: impl Fn(Capabilities) -> bool,
    ) -> Result<Vec<Value>> {
        let candidates: Vec<Arc<dyn Transport>> = {
            self.servers
                .read()
                .await
                .values()
                .filter(|e| e.state == ServerState::Running && capable(e.capabilities))
                .filter_map(|e| e.transport.clone())
                .collect()
        };

        let mut out = Vec::new();
        for transport in candidates {
            let result = transport.call(method, serde_json::json!({})).await?;
            if let Some(items) = result.get(field).and_then(Value::as_array) {
                out.extend(items.iter().cloned());
            }
        }
        Ok(out)
    }

    /// Routes a tool call to its owning server (§4.6 "checks that the server
    /// is still Running ... fails with a clear error otherwise").
    pub async fn execute_tool(&self, server: &str, tool: &str, params: Value) -> Result<Value> {
        let (state, transport) = {
            let servers = self.servers.read().await;
            let entry = servers
                .get(server)
                .ok_or_else(|| Error::tool(format!("unknown plug-in server '{server}'")))?;
            (entry.state, entry.transport.clone())
        };

        if state != ServerState::Running {
            return Err(Error::tool(format!(
                "plug-in server '{server}' is not running (state: {state:?})"
            )));
        }
        let transport = transport.ok_or_else(|| Error::tool(format!("plug-in server '{server}' has no transport")))?;

        transport
            .call("tools/call", serde_json::json!({ "name": tool, "arguments": params }))
            .await
    }

    async fn register_tools(self: &Arc<Self>, server: &str, transport: &Arc<dyn Transport>) -> Result<()> {
        let result = transport.call("tools/list", serde_json::json!({})).await?;
        let parsed: ToolsListResult = serde_json::from_value(result).map_err(Error::from)?;

        let mut composite_names = Vec::with_capacity(parsed.tools.len());
        for descriptor in parsed.tools {
            let composite_name = format!("{}_{}_{}", self.prefix, server, descriptor.name);
            let tool = PluginTool {
                name: composite_name.clone(),
                description: descriptor.description,
                schema: descriptor.input_schema,
                manager: self.clone(),
                server: server.to_string(),
                remote_name: descriptor.name,
            };
            self.tools.register(Arc::new(tool)).await?;
            composite_names.push(composite_name);
        }

        if let Some(entry) = self.servers.write().await.get_mut(server) {
            entry.registered_tools = composite_names;
        }
        Ok(())
    }

    async fn mark_error(&self, name: &str, message: String) {
        log::warn!("plug-in server '{name}' failed: {message}");
        let registered = {
            let mut servers = self.servers.write().await;
            let Some(entry) = servers.get_mut(name) else { return };
            entry.state = ServerState::Error;
            entry.last_error = Some(message);
            entry.transport = None;
            std::mem::take(&mut entry.registered_tools)
        };
        for tool_name in &registered {
            self.tools.unregister(tool_name).await;
        }
    }
}

fn to_status(name: &str, entry: &ServerEntry) -> ServerStatus {
    ServerStatus {
        name: name.to_string(),
        state: entry.state,
        last_error: entry.last_error.clone(),
        started_at: entry.started_at,
        transport: entry.config.transport.label(),
        capabilities: entry.capabilities,
    }
}

fn parse_capabilities(handshake: &Value) -> Capabilities {
    let caps = handshake.get("capabilities");
    Capabilities {
        tools: caps.and_then(|c| c.get("tools")).is_some(),
        resources: caps.and_then(|c| c.get("resources")).is_some(),
        prompts: caps.and_then(|c| c.get("prompts")).is_some(),
    }
}

/// A tool whose execution is proxied to a plug-in server. §3 Ownership calls
/// this a "non-owning handle" into the server: rather than a true `Weak<T>`,
/// it re-checks the server's live state through `PluginManager` on every
/// call, which gives the same "invalidated once the server leaves Running"
/// behavior without a dangling-pointer risk if the server restarts under the
/// same name.
struct PluginTool {
    name: String,
    description: String,
    schema: Value,
    manager: Arc<PluginManager>,
    server: String,
    remote_name: String,
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn execute(&self, _ctx: &ToolContext, params: Value) -> Result<Value> {
        self.manager.execute_tool(&self.server, &self.remote_name, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capabilities_detects_tools_flag() {
        let handshake = serde_json::json!({ "capabilities": { "tools": {} } });
        let caps = parse_capabilities(&handshake);
        assert!(caps.tools);
        assert!(!caps.resources);
        assert!(!caps.prompts);
    }

    #[test]
    fn test_parse_capabilities_empty_handshake() {
        let handshake = serde_json::json!({});
        let caps = parse_capabilities(&handshake);
        assert!(!caps.tools && !caps.resources && !caps.prompts);
    }

    #[tokio::test]
    async fn test_execute_tool_fails_for_unknown_server() {
        let tools = Arc::new(ToolManager::new());
        let manager = PluginManager::new(tools, "plugin");
        let result = manager.execute_tool("ghost", "whatever", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_server_status_unknown_returns_none() {
        let tools = Arc::new(ToolManager::new());
        let manager = PluginManager::new(tools, "plugin");
        assert!(manager.get_server_status("ghost").await.is_none());
    }
}
