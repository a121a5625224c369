use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::security::Operation;
use crate::tools::{Tool, ToolContext};
use crate::{Error, Result};

use super::{check_content, validate_preamble};

/// params {path, old_text, new_text, regex?=false, all?=true}.
///
/// Writes through a temp file in the same directory and renames atomically
/// onto the target (§4.4 invariant: on failure at any step the original file
/// is untouched).
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace literal or regex-matched text within a file, atomically."
    }

    fn schema(&self) -> &Value {
        static SCHEMA: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "old_text": {"type": "string", "description": "Text (or regex pattern) to find"},
                    "new_text": {"type": "string", "description": "Replacement text"},
                    "regex": {"type": "boolean", "description": "Treat old_text as a regex", "default": false},
                    "all": {"type": "boolean", "description": "Replace every occurrence, not just the first", "default": true},
                },
                "required": ["path", "old_text", "new_text"],
            })
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let path_str = params["path"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("edit_file requires a 'path' string"))?;
        let old_text = params["old_text"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("edit_file requires 'old_text'"))?;
        let new_text = params["new_text"]
            .as_str()
            .ok_or_else(|| Error::invalid_request("edit_file requires 'new_text'"))?;
        let use_regex = params.get("regex").and_then(|v| v.as_bool()).unwrap_or(false);
        let all = params.get("all").and_then(|v| v.as_bool()).unwrap_or(true);

        let path = validate_preamble(ctx, Operation::Write, std::path::Path::new(path_str))?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::tool(format!("failed to read {}: {e}", path.display())))?;
        let original = std::str::from_utf8(&bytes)
            .map_err(|_| Error::tool(format!("{} is not valid UTF-8 text", path.display())))?;

        let (new_content, replacements) = if use_regex {
            let re = Regex::new(old_text).map_err(|e| Error::invalid_request(format!("bad regex: {e}")))?;
            let count = re.find_iter(original).count();
            if count == 0 {
                (original.to_string(), 0)
            } else if all {
                (re.replace_all(original, new_text).into_owned(), count)
            } else {
                (re.replacen(original, 1, new_text).into_owned(), 1)
            }
        } else {
            let count = original.matches(old_text).count();
            if count == 0 {
                (original.to_string(), 0)
            } else if all {
                (original.replace(old_text, new_text), count)
            } else {
                (original.replacen(old_text, new_text, 1), 1)
            }
        };

        if replacements == 0 {
            return Ok(serde_json::json!({
                "path": path.display().to_string(),
                "replacements": 0,
            }));
        }

        check_content(ctx, new_content.as_bytes())?;

        let dir = path.parent().ok_or_else(|| Error::tool("file has no parent directory"))?;
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::tool(format!("failed to create temp file: {e}")))?;
        tokio::fs::write(tmp.path(), &new_content)
            .await
            .map_err(|e| Error::tool(format!("failed to write temp file: {e}")))?;

        #[cfg(unix)]
        if let Ok(metadata) = std::fs::metadata(&path) {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(tmp.path(), metadata.permissions());
        }

        tmp.persist(&path)
            .map_err(|e| Error::tool(format!("failed to rename temp file onto {}: {}", path.display(), e.error)))?;

        Ok(serde_json::json!({
            "path": path.display().to_string(),
            "replacements": replacements,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolContext;

    #[tokio::test]
    async fn test_edit_file_replaces_first_occurrence_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "foo foo foo").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = EditFileTool
            .execute(
                &ctx,
                serde_json::json!({"path": "a.txt", "old_text": "foo", "new_text": "bar", "all": false}),
            )
            .await
            .unwrap();
        assert_eq!(result["replacements"], 1);
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "bar foo foo");
    }

    #[tokio::test]
    async fn test_edit_file_replaces_all_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "foo foo foo").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = EditFileTool
            .execute(&ctx, serde_json::json!({"path": "a.txt", "old_text": "foo", "new_text": "bar"}))
            .await
            .unwrap();
        assert_eq!(result["replacements"], 3);
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "bar bar bar");
    }

    #[tokio::test]
    async fn test_edit_file_zero_matches_succeeds_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "nothing to see").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = EditFileTool
            .execute(&ctx, serde_json::json!({"path": "a.txt", "old_text": "missing", "new_text": "x"}))
            .await
            .unwrap();
        assert_eq!(result["replacements"], 0);
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "nothing to see");
    }

    #[tokio::test]
    async fn test_edit_file_regex_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, "v1.2.3 and v4.5.6").await.unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = EditFileTool
            .execute(
                &ctx,
                serde_json::json!({"path": "a.txt", "old_text": r"v\d+\.\d+\.\d+", "new_text": "vX", "regex": true}),
            )
            .await
            .unwrap();
        assert_eq!(result["replacements"], 2);
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "vX and vX");
    }
}
