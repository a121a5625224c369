//! Plug-in (external tool server) manager (C6, §4.6).
//!
//! A plug-in server is an out-of-process tool provider reached over stdio,
//! HTTP, or SSE, speaking a small JSON-RPC method set (`initialize`,
//! `tools/list`, `tools/call`, `resources/list`, `prompts/list`). This module
//! owns each server's lifecycle (`Starting → Running → {Error, Stopped}`)
//! and is the sole writer of plug-in-originated tools into the shared
//! [`crate::tools::Manager`] — it registers them on reaching `Running` and
//! unregisters exactly what it registered on leaving it.

mod config;
mod manager;
mod transport;

pub use config::{PluginServerConfig, TransportKind};
pub use manager::{Capabilities, PluginManager, ServerState, ServerStatus};
pub use transport::Transport;
