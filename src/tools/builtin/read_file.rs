use async_trait::async_trait;
use serde_json::Value;

use crate::security::Operation;
use crate::tools::{Tool, ToolContext};
use crate::{Error, Result};

use super::validate_preamble;

/// params {path, offset?=0, limit?=-1}; -1 means unlimited.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file's contents, optionally from a byte offset and up to a byte limit."
    }

    fn schema(&self) -> &Value {
        static SCHEMA: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to the file"},
                    "offset": {"type": "integer", "description": "Byte offset to start reading at", "default": 0},
                    "limit": {"type": "integer", "description": "Maximum bytes to read, -1 for unlimited", "default": -1},
                },
                "required": ["path"],
            })
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("read_file requires a 'path' string"))?;
        let offset = params.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = params.get("limit").and_then(|v| v.as_i64()).unwrap_or(-1);

        let path = validate_preamble(ctx, Operation::Read, std::path::Path::new(path_str))?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::tool(format!("failed to read {}: {e}", path.display())))?;

        if offset > bytes.len() {
            return Err(Error::invalid_request(format!(
                "offset {offset} is past end of file ({} bytes)",
                bytes.len()
            )));
        }
        let slice = &bytes[offset..];
        let slice = if limit >= 0 {
            &slice[..slice.len().min(limit as usize)]
        } else {
            slice
        };

        let text = std::str::from_utf8(slice)
            .map_err(|_| Error::tool(format!("{} is not valid UTF-8 text", path.display())))?;

        Ok(serde_json::json!({ "path": path.display().to_string(), "content": text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolContext;

    #[tokio::test]
    async fn test_read_file_reads_full_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, b"hello world").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadFileTool
            .execute(&ctx, serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(result["content"], "hello world");
    }

    #[tokio::test]
    async fn test_read_file_respects_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, b"0123456789").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadFileTool
            .execute(&ctx, serde_json::json!({"path": "a.txt", "offset": 2, "limit": 3}))
            .await
            .unwrap();
        assert_eq!(result["content"], "234");
    }

    #[tokio::test]
    async fn test_read_file_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        tokio::fs::write(&file, [0xff, 0xfe, 0xfd]).await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadFileTool.execute(&ctx, serde_json::json!({"path": "a.bin"})).await;
        assert!(result.is_err());
    }
}
