//! Reply envelope.
//!
//! ```text
//! {"status": "ok", ...payload}
//! {"status": "error", "message": "...", "exception": "..."}
//! ```

use serde_json::{Map, Value};

use crate::{Error, Output};

/// Exactly one reply is produced per request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Success with the action's output
    Ok(Output),
    /// Failure with a message and optional detail
    Error {
        /// `message` field of the reply
        message: String,
        /// `exception` field, omitted when `None`
        exception: Option<String>,
    },
}

impl Reply {
    /// Error reply for `err`.
    pub fn error(err: &Error) -> Self {
        Reply::Error {
            message: err.to_string(),
            exception: err.exception(),
        }
    }

    /// True for `status: ok`
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }

    /// Error message, if this is an error reply
    pub fn message(&self) -> Option<&str> {
        match self {
            Reply::Ok(_) => None,
            Reply::Error { message, .. } => Some(message),
        }
    }

    /// Wire form.
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        match self {
            Reply::Ok(output) => {
                body.insert("status".into(), Value::from("ok"));
                body.extend(output.payload());
            }
            Reply::Error { message, exception } => {
                body.insert("status".into(), Value::from("error"));
                body.insert("message".into(), Value::from(message.as_str()));
                if let Some(exception) = exception {
                    body.insert("exception".into(), Value::from(exception.as_str()));
                }
            }
        }
        Value::Object(body)
    }
}

impl From<crate::Result<Output>> for Reply {
    fn from(result: crate::Result<Output>) -> Self {
        match result {
            Ok(output) => Reply::Ok(output),
            Err(e) => Reply::error(&e),
        }
    }
}

impl From<Reply> for Value {
    fn from(reply: Reply) -> Self {
        reply.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbus_core::Cas;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_flattens_payload() {
        let reply = Reply::Ok(Output::Written {
            id: "a".into(),
            cas: Cas(7),
        });
        assert_eq!(reply.to_json(), json!({"status": "ok", "id": "a", "cas": 7}));

        let reply = Reply::Ok(Output::Counter {
            key: "c".into(),
            value: 15,
        });
        assert_eq!(
            reply.to_json(),
            json!({"status": "ok", "key": "c", "counter": 15})
        );
    }

    #[test]
    fn test_error_envelope() {
        let reply = Reply::error(&Error::NotFound);
        assert_eq!(
            reply.to_json(),
            json!({"status": "error", "message": "not found"})
        );

        let reply = Reply::error(&Error::Store {
            message: "document exists: a".into(),
            exception: "Exists { key: \"a\" }".into(),
        });
        let body = reply.to_json();
        assert_eq!(body["message"], "document exists: a");
        assert_eq!(body["exception"], "Exists { key: \"a\" }");
    }
}
