use serde_json::json;

use crate::records::RecordError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn record_err(id: &str, e: &RecordError) -> serde_json::Value {
    if matches!(e, RecordError::Db(_) | RecordError::Io(_)) {
        tracing::warn!(error = %e, "request failed");
    }
    err(id, e.code(), e.to_string(), e.details())
}

/// `Ok(v)` as a success reply, any [`RecordError`] as its error reply.
pub fn reply(id: &str, result: Result<serde_json::Value, RecordError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => record_err(id, &e),
    }
}
