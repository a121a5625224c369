use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use walkdir::WalkDir;

use crate::security::Operation;
use crate::tools::{Tool, ToolContext};
use crate::{Error, Result};

use super::validate_preamble;

#[derive(Clone)]
struct Entry {
    path: String,
    is_dir: bool,
    size: u64,
    modified_secs: i64,
}

/// params {path?=., recursive?=false, pattern?, max_depth?=-1, show_hidden?=false,
/// sort ∈ {name,size,time}, format ∈ {json,tree,list}}.
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories under a path, with optional recursion, pattern filtering, and sorting."
    }

    fn schema(&self) -> &Value {
        static SCHEMA: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "default": "."},
                    "recursive": {"type": "boolean", "default": false},
                    "pattern": {"type": "string", "description": "Regex or glob filter on entry name"},
                    "max_depth": {"type": "integer", "default": -1, "description": "-1 = unbounded"},
                    "show_hidden": {"type": "boolean", "default": false},
                    "sort": {"type": "string", "enum": ["name", "size", "time"], "default": "name"},
                    "format": {"type": "string", "enum": ["json", "tree", "list"], "default": "json"},
                },
                "required": [],
            })
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let path_str = params.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let recursive = params.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_depth = params.get("max_depth").and_then(|v| v.as_i64()).unwrap_or(-1);
        let show_hidden = params.get("show_hidden").and_then(|v| v.as_bool()).unwrap_or(false);
        let sort = params.get("sort").and_then(|v| v.as_str()).unwrap_or("name").to_string();
        let format = params.get("format").and_then(|v| v.as_str()).unwrap_or("json").to_string();
        let pattern = params.get("pattern").and_then(|v| v.as_str()).map(|s| s.to_string());

        let root = validate_preamble(ctx, Operation::List, std::path::Path::new(path_str))?;
        let matcher = pattern.as_deref().map(compile_matcher);

        let effective_depth = if !recursive {
            1
        } else if max_depth < 0 {
            usize::MAX
        } else {
            max_depth as usize + 1
        };

        let mut entries = Vec::new();
        for entry in WalkDir::new(&root)
            .min_depth(1)
            .max_depth(effective_depth)
            .into_iter()
            .filter_entry(|e| show_hidden || !is_hidden(e))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(re) = &matcher {
                if !re.is_match(&name) {
                    continue;
                }
            }
            let metadata = entry.metadata().map_err(|e| Error::tool(format!("stat failed: {e}")))?;
            let modified_secs = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            entries.push(Entry {
                path: entry.path().display().to_string(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified_secs,
            });
        }

        match sort.as_str() {
            "size" => entries.sort_by_key(|e| e.size),
            "time" => entries.sort_by_key(|e| e.modified_secs),
            _ => entries.sort_by(|a, b| a.path.cmp(&b.path)),
        }

        Ok(render(&format, &entries))
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn compile_matcher(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| {
        let escaped = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
        Regex::new(&format!("^{escaped}$")).unwrap_or_else(|_| Regex::new(".^").unwrap())
    })
}

fn render(format: &str, entries: &[Entry]) -> Value {
    match format {
        "list" => {
            let lines: Vec<String> = entries
                .iter()
                .map(|e| format!("{:>10}  {}", e.size, e.path))
                .collect();
            serde_json::json!({ "format": "list", "output": lines.join("\n") })
        }
        "tree" => {
            let lines: Vec<String> = entries
                .iter()
                .map(|e| format!("{} {}", if e.is_dir { "+--" } else { "|--" }, e.path))
                .collect();
            serde_json::json!({ "format": "tree", "output": lines.join("\n") })
        }
        _ => serde_json::json!({
            "format": "json",
            "entries": entries.iter().map(|e| serde_json::json!({
                "path": e.path,
                "is_dir": e.is_dir,
                "size": e.size,
                "modified": e.modified_secs,
            })).collect::<Vec<_>>(),
        }),
    }
}
