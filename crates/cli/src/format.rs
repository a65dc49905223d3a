//! Reply -> line formatting.

use serde_json::{json, Value};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One compact JSON object per line
    Line,
    /// `serde_json::to_string_pretty`
    Pretty,
}

/// Format a reply message.
pub fn format_reply(reply: &Value, mode: OutputMode) -> String {
    let rendered = match mode {
        OutputMode::Line => serde_json::to_string(reply),
        OutputMode::Pretty => serde_json::to_string_pretty(reply),
    };
    rendered.unwrap_or_else(|_| reply.to_string())
}

/// Error reply for input that never reached the bus.
pub fn local_error(message: impl std::fmt::Display) -> Value {
    json!({"status": "error", "message": message.to_string()})
}

/// Whether a reply reports success.
pub fn is_ok(reply: &Value) -> bool {
    reply["status"] == "ok"
}
