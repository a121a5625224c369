use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use crate::security::Operation;
use crate::tools::{Tool, ToolContext};
use crate::{Error, Result};

use super::validate_preamble;

const MAX_CONCURRENT_FILES: usize = 10;
const BINARY_PROBE_BYTES: usize = 512;

/// params {path?=., query, file_pattern?, case_sensitive?=true, use_regex?=false,
/// max_results?=100, context?=0, exclude_binary?=true}.
pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search files under a path for a literal or regex query, with optional surrounding context."
    }

    fn schema(&self) -> &Value {
        static SCHEMA: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "default": "."},
                    "query": {"type": "string"},
                    "file_pattern": {"type": "string", "description": "Glob matched against basenames"},
                    "case_sensitive": {"type": "boolean", "default": true},
                    "use_regex": {"type": "boolean", "default": false},
                    "max_results": {"type": "integer", "default": 100},
                    "context": {"type": "integer", "default": 0},
                    "exclude_binary": {"type": "boolean", "default": true},
                },
                "required": ["query"],
            })
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let path_str = params.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let query = params["query"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("search_files requires a 'query' string"))?;
        let file_pattern = params.get("file_pattern").and_then(|v| v.as_str()).map(|s| s.to_string());
        let case_sensitive = params.get("case_sensitive").and_then(|v| v.as_bool()).unwrap_or(true);
        let use_regex = params.get("use_regex").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_results = params.get("max_results").and_then(|v| v.as_u64()).unwrap_or(100) as usize;
        let context = params.get("context").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let exclude_binary = params.get("exclude_binary").and_then(|v| v.as_bool()).unwrap_or(true);

        let root = validate_preamble(ctx, Operation::Read, std::path::Path::new(path_str))?;

        let pattern_source = if use_regex { query.to_string() } else { regex::escape(query) };
        let query_re = RegexBuilder::new(&pattern_source)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| Error::invalid_request(format!("bad query pattern: {e}")))?;

        let file_matcher = file_pattern.as_deref().map(compile_glob);

        let candidates: Vec<_> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                file_matcher
                    .as_ref()
                    .map(|re| re.is_match(&e.file_name().to_string_lossy()))
                    .unwrap_or(true)
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_FILES));
        let mut tasks = Vec::new();
        for entry in candidates {
            let semaphore = semaphore.clone();
            let query_re = query_re.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                search_one_file(entry.path(), &query_re, context, exclude_binary).await
            }));
        }

        let mut matches = Vec::new();
        for task in tasks {
            if let Ok(Some(file_matches)) = task.await {
                matches.extend(file_matches);
                if matches.len() >= max_results {
                    break;
                }
            }
        }
        matches.truncate(max_results);

        Ok(serde_json::json!({ "matches": matches, "count": matches.len() }))
    }
}

async fn search_one_file(
    path: &std::path::Path,
    query: &Regex,
    context: usize,
    exclude_binary: bool,
) -> Option<Vec<Value>> {
    let bytes = tokio::fs::read(path).await.ok()?;
    if exclude_binary && looks_binary(&bytes) {
        return None;
    }
    let text = std::str::from_utf8(&bytes).ok()?;
    let lines: Vec<&str> = text.lines().collect();

    let mut results = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(m) = query.find(line) {
            let start = idx.saturating_sub(context);
            let end = (idx + context + 1).min(lines.len());
            let surrounding: Vec<&str> = lines[start..end].to_vec();
            results.push(serde_json::json!({
                "file": path.display().to_string(),
                "line": idx + 1,
                "column": m.start() + 1,
                "matched_line": line,
                "context": if context > 0 { Some(surrounding.join("\n")) } else { None },
            }));
        }
    }
    Some(results)
}

fn looks_binary(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(BINARY_PROBE_BYTES)];
    if probe.is_empty() {
        return false;
    }
    if probe.contains(&0) {
        return true;
    }
    match std::str::from_utf8(probe) {
        Err(_) => true,
        Ok(text) => {
            let non_printable = text
                .chars()
                .filter(|c| c.is_control() && *c != '\n' && *c != '\t' && *c != '\r')
                .count();
            non_printable * 100 / probe.len() > 30
        }
    }
}

fn compile_glob(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).unwrap_or_else(|_| Regex::new(".^").unwrap())
}
