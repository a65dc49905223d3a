//! Pipe mode: one JSON request per stdin line, one reply per stdout line.
//!
//! Blank lines and lines starting with `#` are skipped.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use docbus_executor::EventBus;

use crate::format::{format_reply, is_ok, local_error, OutputMode};

/// Send one raw request line. Returns the reply to print.
pub async fn send_line(bus: &EventBus, address: &str, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return local_error(format!("invalid JSON: {}", e)),
    };
    match bus.send(address, request).await {
        Ok(reply) => reply,
        Err(e) => local_error(e),
    }
}

/// Serve every line of `input`. Returns the process exit code.
pub async fn run_pipe<R>(input: R, bus: &EventBus, address: &str, mode: OutputMode) -> i32
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut exit_code = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                exit_code = 1;
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let reply = send_line(bus, address, trimmed).await;
        if !is_ok(&reply) {
            exit_code = 1;
        }
        println!("{}", format_reply(&reply, mode));
    }
    exit_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbus_engine::PersistorConfig;
    use docbus_executor::Persistor;
    use docbus_storage::MemoryCluster;

    async fn started(bus: &EventBus) -> Persistor {
        let config = PersistorConfig {
            init: true,
            ..PersistorConfig::default()
        };
        Persistor::start(&config, &MemoryCluster::new(), bus)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_line_round_trip() {
        let bus = EventBus::new();
        let persistor = started(&bus).await;
        let reply = send_line(
            &bus,
            persistor.address(),
            r#"{"action":"save","document":{"id":"a","v":1}}"#,
        )
        .await;
        assert!(is_ok(&reply));
        let found = send_line(&bus, persistor.address(), r#"{"action":"find_by_id","id":"a"}"#).await;
        assert_eq!(found["document"]["v"], 1);
    }

    #[tokio::test]
    async fn test_invalid_json_is_local_error() {
        let bus = EventBus::new();
        let persistor = started(&bus).await;
        let reply = send_line(&bus, persistor.address(), "{not json").await;
        assert!(reply["message"].as_str().unwrap().starts_with("invalid JSON"));
    }

    #[tokio::test]
    async fn test_pipe_skips_comments_and_reports_failures() {
        let bus = EventBus::new();
        let persistor = started(&bus).await;
        let ok_input: &[u8] = b"# seed\n\n{\"action\":\"save\",\"document\":{\"id\":\"x\"}}\n";
        assert_eq!(
            run_pipe(ok_input, &bus, persistor.address(), OutputMode::Line).await,
            0
        );
        let bad_input: &[u8] = b"{\"action\":\"drop\"}\n";
        assert_eq!(
            run_pipe(bad_input, &bus, persistor.address(), OutputMode::Line).await,
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_address() {
        let bus = EventBus::new();
        let reply = send_line(&bus, "nowhere", r#"{"action":"find_by_id","id":"a"}"#).await;
        assert_eq!(reply["message"], "no handler registered on address: nowhere");
    }
}
