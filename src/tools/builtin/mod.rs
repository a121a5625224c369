//! Built-in filesystem tools (C4, §4.4): read_file, write_file, edit_file,
//! list_files, search_files.
//!
//! Grounded on `austinjan-km/km-tools/src/tools/editor_edit.rs` (literal
//! search-and-replace semantics) and `bash.rs` (tool-struct-to-schema shape);
//! directory walking follows `hi-youichi-loom`'s `walkdir` usage.
//!
//! Every tool here runs the shared preamble from §4.4 before touching the
//! filesystem: canonicalize, `ValidatePath`, `ValidateOperation`, and (for
//! writes) `CheckContent`. A tool constructed with `security: None` skips all
//! of it — legal for unit tests, per §4.5's "absence of the validator means
//! no checks".

mod edit_file;
mod list_files;
mod read_file;
mod search_files;
mod write_file;

pub use edit_file::EditFileTool;
pub use list_files::ListFilesTool;
pub use read_file::ReadFileTool;
pub use search_files::SearchFilesTool;
pub use write_file::WriteFileTool;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::security::Operation;
use crate::tools::{Manager, ToolContext};
use crate::Result;

/// Runs the §4.4 preamble for a path-taking built-in tool, returning the
/// canonical path to operate on. A tool context with no validator configured
/// (`ctx.security.is_none()`) skips all checks.
fn validate_preamble(ctx: &ToolContext, op: Operation, path: &Path) -> Result<PathBuf> {
    let target = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.workspace_root.join(path)
    };

    match &ctx.security {
        Some(validator) => {
            let canonical = validator.validate_path(&target)?;
            validator.validate_operation(op, &canonical)?;
            Ok(canonical)
        }
        None => Ok(target),
    }
}

fn check_content(ctx: &ToolContext, content: &[u8]) -> Result<()> {
    if let Some(validator) = &ctx.security {
        validator.check_content(content)?;
    }
    Ok(())
}

/// Registers all five built-in tools into `manager`. Each checks the
/// validator carried on the [`ToolContext`] passed to it at call time, not
/// one baked in at registration — so a single `Manager` can be reused across
/// contexts (tests routinely pass a `ToolContext` with no validator at all).
pub async fn register_all(manager: &Manager) -> Result<()> {
    manager.register(Arc::new(ReadFileTool)).await?;
    manager.register(Arc::new(WriteFileTool)).await?;
    manager.register(Arc::new(EditFileTool)).await?;
    manager.register(Arc::new(ListFilesTool)).await?;
    manager.register(Arc::new(SearchFilesTool)).await?;
    Ok(())
}
