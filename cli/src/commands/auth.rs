use std::time::Duration;

use clap::Args;
use serde_json::json;
use stagecheck_core::close::CloseKind;
use stagecheck_core::config::Config;
use stagecheck_core::error::codes;
use stagecheck_core::headers::build_websocket_headers;

use crate::session::{RejectionOutcome, probe_rejection};
use crate::util::emit;

#[derive(Args)]
pub struct AuthEnforcedArgs {
    /// How long an accepted socket may stay open before auth counts as unenforced
    #[arg(long, default_value_t = 5)]
    pub wait_secs: u64,
}

/// Exit code for the unauthenticated probe.
pub fn enforcement_exit_code(outcome: &RejectionOutcome) -> i32 {
    match outcome {
        RejectionOutcome::HttpRejected { status: 401 | 403 } => 0,
        RejectionOutcome::HttpRejected { status } if *status >= 500 => 2,
        RejectionOutcome::HttpRejected { .. } => 1,
        RejectionOutcome::Closed { close } if close.kind.is_auth_rejection() => 0,
        RejectionOutcome::Closed { close } if close.kind == CloseKind::InternalError => 2,
        RejectionOutcome::Closed { .. } => 1,
        RejectionOutcome::StayedOpen { .. } => 1,
        RejectionOutcome::ConnectFailed { .. } => 3,
    }
}

pub async fn run(config: &Config, args: AuthEnforcedArgs) -> i32 {
    let headers = build_websocket_headers(None);
    let outcome = probe_rejection(&config.ws_url, &headers, Duration::from_secs(args.wait_secs)).await;
    let code = enforcement_exit_code(&outcome);

    let mut out = json!({
        "ws_url": config.ws_url,
        "enforced": code == 0,
        "result": outcome,
    });
    match code {
        0 => tracing::info!(ws_url = %config.ws_url, "unauthenticated connection rejected"),
        1 => {
            out["error"] = json!(codes::AUTH_NOT_ENFORCED);
            tracing::warn!(ws_url = %config.ws_url, "unauthenticated connection was not rejected");
        }
        2 => out["error"] = json!(codes::SERVER_ERROR),
        _ => out["error"] = json!(codes::CONNECTION_ERROR),
    }
    emit(&out, code == 0);
    code
}
