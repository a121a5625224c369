//! Plug-in server declarative config (§4.6): transport selection and
//! `${VAR}`-style environment expansion, applied once at `start_server` time
//! rather than re-evaluated on every call.

use std::collections::HashMap;

use serde::Deserialize;

/// How a plug-in server is reached. Untagged-by-field selection: stdio
/// configs carry `command`, HTTP/SSE configs carry `url`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportKind {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl TransportKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::Stdio { .. } => "stdio",
            TransportKind::Http { .. } => "http",
            TransportKind::Sse { .. } => "sse",
        }
    }
}

/// One entry in the plug-in server list (§4.6).
#[derive(Debug, Clone, Deserialize)]
pub struct PluginServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportKind,
}

/// Expands `${VAR}` references against the process environment. An
/// unresolved reference expands to the empty string rather than being left
/// literal, so a missing credential fails loudly downstream (connection
/// refused / auth error) instead of being sent to the child process verbatim.
pub fn expand_var(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '$' && value[i..].starts_with("${") {
            if let Some(end) = value[i..].find('}') {
                let var_name = &value[i + 2..i + end];
                out.push_str(&std::env::var(var_name).unwrap_or_default());
                for _ in 0..end {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }

    out
}

/// Applies [`expand_var`] to every string-valued field of a config entry.
pub fn expand(config: PluginServerConfig) -> PluginServerConfig {
    let transport = match config.transport {
        TransportKind::Stdio { command, args, env } => TransportKind::Stdio {
            command: expand_var(&command),
            args: args.iter().map(|a| expand_var(a)).collect(),
            env: env
                .into_iter()
                .map(|(k, v)| (k, expand_var(&v)))
                .collect(),
        },
        TransportKind::Http { url, headers } => TransportKind::Http {
            url: expand_var(&url),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k, expand_var(&v)))
                .collect(),
        },
        TransportKind::Sse { url, headers } => TransportKind::Sse {
            url: expand_var(&url),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k, expand_var(&v)))
                .collect(),
        },
    };
    PluginServerConfig { name: config.name, transport }
}
