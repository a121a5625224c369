//! Tool contract and registry (C3, §4.3).
//!
//! Two layers, matching §4.3:
//!
//! - [`Tool`] is the capability interface both built-in (`builtin`) and
//!   plug-in-backed tools implement: `{name, description, schema, validate,
//!   execute}`. Built-in tools own no state beyond an injected
//!   [`SecurityValidator`](crate::security::SecurityValidator); plug-in tools
//!   (C6) hold a reference to their originating server instead.
//! - [`Manager`] is the live, per-session set of tools, guarded by a
//!   `RwLock` so concurrent reads (schema enumeration for prompt assembly)
//!   don't block on registration/unregistration churn from a plug-in server
//!   starting or crashing.
//!
//! The closure-based `tool()`/[`ToolBuilder`] constructors from the ad-hoc
//! tool-definition style are kept for simple cases (tests, demos, one-off
//! tools an embedder defines inline) via [`ClosureTool`], which just
//! implements [`Tool`] by calling a stored closure.

pub mod builtin;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::security::SecurityValidator;
use crate::Result;

/// Context threaded into every [`Tool::execute`] call: the workspace a
/// built-in tool's paths resolve relative to, the (optional) validator those
/// tools run their preamble against, and a cancellation signal suspension
/// points should observe (§5).
#[derive(Clone)]
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub security: Option<Arc<SecurityValidator>>,
    pub cancelled: tokio_util::sync::CancellationToken,
}

impl ToolContext {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            security: None,
            cancelled: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn with_security(mut self, security: Arc<SecurityValidator>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn with_cancelled(mut self, cancelled: tokio_util::sync::CancellationToken) -> Self {
        self.cancelled = cancelled;
        self
    }
}

/// The capability interface every tool (built-in or plug-in) implements
/// (§3 Tool, §9 "dynamic dispatch").
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> &Value;

    /// Checked before `execute` by [`Manager::execute`]. The default accepts
    /// everything; tools with required parameters should reject a missing or
    /// mistyped one here rather than failing mid-execute.
    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value>;

    /// OpenAI function-calling wire shape for this tool's schema (§6).
    fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.schema(),
            }
        })
    }
}

type ClosureHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// A [`Tool`] backed by a plain closure, ignoring [`ToolContext`]. This is
/// what `tool(...)` / [`ToolBuilder`] produce — good enough for tests and
/// self-contained tools that need no workspace or security context.
pub struct ClosureTool {
    name: String,
    description: String,
    schema: Value,
    handler: ClosureHandler,
}

impl ClosureTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, schema: Value, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: convert_schema_to_openai(schema),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

impl std::fmt::Debug for ClosureTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[async_trait]
impl Tool for ClosureTool {
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
        (self.handler)(params).await
    }
}

/// Fluent builder for [`ClosureTool`]s, kept from the teacher's ergonomic
/// `.param()`/`.build()` chain.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        let obj = self.schema.as_object_mut().expect("schema is an object");
        obj.insert(name.to_string(), Value::String(type_str.to_string()));
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Arc<dyn Tool>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Arc::new(ClosureTool::new(self.name, self.description, self.schema, handler))
    }
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Accepts simple type notation (`{"a": "string"}`), extended per-property
/// schema (`{"a": {"type": "string", "optional": true}}`), or a full JSON
/// Schema passed through unchanged.
fn convert_schema_to_openai(schema: Value) -> Value {
    if schema.is_object() {
        let obj = schema.as_object().expect("is_object");
        if obj.contains_key("type") && obj.contains_key("properties") {
            return schema;
        }

        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (param_name, param_type) in obj {
            if let Some(type_str) = param_type.as_str() {
                properties.insert(param_name.clone(), type_to_json_schema(type_str));
                required.push(param_name.clone());
            } else if param_type.is_object() {
                let mut prop = param_type.clone();
                let prop_obj = prop.as_object_mut().expect("is_object");
                let is_optional = prop_obj.remove("optional").and_then(|v| v.as_bool()).unwrap_or(false);
                let is_required = prop_obj.remove("required").and_then(|v| v.as_bool());
                let has_default = prop_obj.contains_key("default");
                properties.insert(param_name.clone(), prop);

                if let Some(true) = is_required {
                    required.push(param_name.clone());
                } else if is_optional || is_required == Some(false) {
                    // explicitly optional
                } else if !has_default {
                    required.push(param_name.clone());
                }
            }
        }

        return serde_json::json!({ "type": "object", "properties": properties, "required": required });
    }

    serde_json::json!({ "type": "object", "properties": {}, "required": [] })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };
    serde_json::json!({ "type": json_type })
}

/// The live, per-session set of tools (§4.3 Manager). `Execute` performs:
/// look up (fail if absent) → `validate` → `execute`. No retry, no approval —
/// those are the orchestrator's (C10) and the approval engine's (C9) job.
#[derive(Default)]
pub struct Manager {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails loudly (matching the process-wide factory registry's rule, §4.3)
    /// rather than silently overwriting an existing registration.
    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let mut tools = self.tools.write().await;
        if tools.contains_key(tool.name()) {
            return Err(crate::Error::invalid_request(format!(
                "a tool named '{}' is already registered",
                tool.name()
            )));
        }
        tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    pub async fn get_schema(&self, name: &str) -> Option<Value> {
        self.tools.read().await.get(name).map(|t| t.to_openai_format())
    }

    pub async fn get_all_schemas(&self) -> Vec<Value> {
        self.tools.read().await.values().map(|t| t.to_openai_format()).collect()
    }

    pub async fn execute(&self, ctx: &ToolContext, name: &str, params: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| crate::Error::tool(format!("tool not found: {name}")))?;
        tool.validate(&params)?;
        tool.execute(ctx, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_to_json_schema() {
        assert_eq!(type_to_json_schema("string"), serde_json::json!({"type": "string"}));
        assert_eq!(type_to_json_schema("bool"), serde_json::json!({"type": "boolean"}));
    }

    #[test]
    fn test_convert_simple_schema() {
        let schema = serde_json::json!({"location": "string"});
        let result = convert_schema_to_openai(schema);
        assert_eq!(result["required"], serde_json::json!(["location"]));
    }

    #[tokio::test]
    async fn test_closure_tool_execute() {
        let t = tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                Ok(serde_json::json!({"result": a + b}))
            });

        let ctx = ToolContext::new(std::env::temp_dir());
        let result = t.execute(&ctx, serde_json::json!({"a": 2.0, "b": 3.0})).await.unwrap();
        assert_eq!(result["result"], 5.0);
    }

    #[tokio::test]
    async fn test_manager_rejects_duplicate_registration() {
        let manager = Manager::new();
        let a = tool("echo", "Echo").build(|args| async move { Ok(args) });
        let b = tool("echo", "Echo").build(|args| async move { Ok(args) });
        manager.register(a).await.unwrap();
        assert!(manager.register(b).await.is_err());
    }

    #[tokio::test]
    async fn test_manager_execute_not_found() {
        let manager = Manager::new();
        let ctx = ToolContext::new(std::env::temp_dir());
        let result = manager.execute(&ctx, "nope", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_manager_unregister_removes_schema() {
        let manager = Manager::new();
        let t = tool("echo", "Echo").build(|args| async move { Ok(args) });
        manager.register(t).await.unwrap();
        assert!(manager.get_schema("echo").await.is_some());
        manager.unregister("echo").await;
        assert!(manager.get_schema("echo").await.is_none());
    }
}
