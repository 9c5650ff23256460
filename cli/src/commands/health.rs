use serde_json::{Value, json};
use stagecheck_core::error::codes;

use crate::util::{client, connection_error, emit};

/// Healthy only if the backend answers 200 with `"status": "healthy"`.
pub fn is_healthy(status: u16, body: &Value) -> bool {
    status == 200 && body.get("status").and_then(Value::as_str) == Some("healthy")
}

pub async fn run(api_url: &str) -> i32 {
    let url = format!("{api_url}/health");
    let resp = match client().get(&url).send().await {
        Ok(r) => r,
        Err(e) => return connection_error(&url, e),
    };

    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let healthy = is_healthy(status, &body);
    tracing::info!(url = %url, status, healthy, "health check");

    let mut out = json!({
        "url": url,
        "status": status,
        "healthy": healthy,
        "body": body,
    });
    if !healthy {
        out["error"] = json!(codes::UNHEALTHY);
    }
    emit(&out, healthy);

    match status {
        _ if healthy => 0,
        500..=599 => 2,
        _ => 1,
    }
}
