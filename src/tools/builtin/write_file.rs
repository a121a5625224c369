use async_trait::async_trait;
use serde_json::Value;

use crate::security::Operation;
use crate::tools::{Tool, ToolContext};
use crate::{Error, Result};

use super::{check_content, validate_preamble};

/// params {path, content, create_dirs?=true, backup?=false}.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating parent directories and an optional .bak backup."
    }

    fn schema(&self) -> &Value {
        static SCHEMA: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to the file"},
                    "content": {"type": "string", "description": "Content to write"},
                    "create_dirs": {"type": "boolean", "description": "Create parent directories if missing", "default": true},
                    "backup": {"type": "boolean", "description": "Copy the existing file to <path>.bak first", "default": false},
                },
                "required": ["path", "content"],
            })
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("write_file requires a 'path' string"))?;
        let content = params["content"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("write_file requires a 'content' string"))?;
        let create_dirs = params.get("create_dirs").and_then(|v| v.as_bool()).unwrap_or(true);
        let backup = params.get("backup").and_then(|v| v.as_bool()).unwrap_or(false);

        let path = validate_preamble(ctx, Operation::Write, std::path::Path::new(path_str))?;
        check_content(ctx, content.as_bytes())?;

        if create_dirs {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::tool(format!("failed to create {}: {e}", parent.display())))?;
            }
        }

        if backup && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let mut backup_name = path.file_name().unwrap_or_default().to_os_string();
            backup_name.push(".bak");
            let backup_path = path.with_file_name(backup_name);
            tokio::fs::copy(&path, &backup_path)
                .await
                .map_err(|e| Error::tool(format!("failed to back up {}: {e}", path.display())))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::tool(format!("failed to write {}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).await;
        }

        Ok(serde_json::json!({
            "path": path.display().to_string(),
            "size": content.len(),
            "success": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolContext;

    #[tokio::test]
    async fn test_write_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let result = WriteFileTool
            .execute(&ctx, serde_json::json!({"path": "nested/a.txt", "content": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert!(dir.path().join("nested/a.txt").exists());
    }

    #[tokio::test]
    async fn test_write_file_backs_up_existing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "old").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        WriteFileTool
            .execute(&ctx, serde_json::json!({"path": "a.txt", "content": "new", "backup": true}))
            .await
            .unwrap();

        let backup = tokio::fs::read_to_string(dir.path().join("a.txt.bak")).await.unwrap();
        assert_eq!(backup, "old");
        let current = tokio::fs::read_to_string(&file).await.unwrap();
        assert_eq!(current, "new");
    }
}
