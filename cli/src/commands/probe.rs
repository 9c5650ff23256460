use clap::Args;
use serde::Serialize;
use serde_json::json;
use stagecheck_core::error::codes;
use stagecheck_core::headers::build_http_headers;

use crate::util::{client, emit, with_headers};

pub const DEFAULT_PATHS: [&str; 4] = [
    "/api/threads",
    "/api/agents/status",
    "/api/chat/history",
    "/api/user/profile",
];

#[derive(Args)]
pub struct ProbeArgs {
    /// Endpoint path to probe (repeatable). Defaults to the core API set.
    #[arg(long = "path")]
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub path: String,
    pub status: Option<u16>,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 401 and 403 still prove the route is mounted.
pub fn endpoint_exists(status: u16) -> bool {
    matches!(status, 200 | 401 | 403)
}

pub async fn run(api_url: &str, args: ProbeArgs) -> i32 {
    let paths: Vec<String> = if args.paths.is_empty() {
        DEFAULT_PATHS.iter().map(|p| p.to_string()).collect()
    } else {
        args.paths
    };
    let headers = build_http_headers(None);
    let http = client();

    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let url = format!("{api_url}{path}");
        let result = match with_headers(http.get(&url), &headers).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                tracing::info!(path = %path, status, "probed endpoint");
                ProbeResult {
                    exists: endpoint_exists(status),
                    status: Some(status),
                    path,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "probe failed");
                ProbeResult {
                    path,
                    status: None,
                    exists: false,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let all_exist = results.iter().all(|r| r.exists);
    let unreachable = results.iter().all(|r| r.status.is_none());
    let server_error = results
        .iter()
        .any(|r| r.status.is_some_and(|s| s >= 500));

    let mut out = json!({ "api_url": api_url, "endpoints": results, "all_exist": all_exist });
    if unreachable {
        out["error"] = json!(codes::CONNECTION_ERROR);
    } else if !all_exist {
        out["error"] = json!(codes::VALIDATION_FAILED);
    }
    emit(&out, all_exist);

    if all_exist {
        0
    } else if unreachable {
        3
    } else if server_error {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_count_as_existing() {
        assert!(endpoint_exists(200));
        assert!(endpoint_exists(401));
        assert!(endpoint_exists(403));
    }

    #[test]
    fn missing_and_broken_routes_do_not() {
        assert!(!endpoint_exists(404));
        assert!(!endpoint_exists(500));
        assert!(!endpoint_exists(302));
    }
}
