use std::time::Duration;

use clap::Args;
use serde_json::{Value, json};
use stagecheck_core::close::CloseKind;
use stagecheck_core::config::Config;
use stagecheck_core::error::codes;
use stagecheck_core::headers::build_websocket_headers;
use uuid::Uuid;

use crate::session::{SessionError, SessionOptions, SessionOutcome, run_chat_session};
use crate::util::{connection_error, emit, exit_error, mint_token};

#[derive(Args)]
pub struct ChatArgs {
    /// Message content to send
    #[arg(long, short = 'm')]
    pub message: String,

    /// Thread to post into (a fresh one if omitted)
    #[arg(long)]
    pub thread_id: Option<String>,

    /// Per-receive timeout before polling again
    #[arg(long, default_value_t = 2)]
    pub recv_timeout_secs: u64,

    /// Upper bound on the whole session
    #[arg(long, default_value_t = 300)]
    pub max_duration_secs: u64,

    /// Treat this close code as the expected outcome (reproducing a known failure)
    #[arg(long)]
    pub expect_close: Option<u16>,

    /// Use this token instead of minting one
    #[arg(long, env = "E2E_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Print the outcome as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

/// The outgoing chat message envelope.
pub fn build_user_message(content: &str, thread_id: Option<&str>) -> Value {
    let thread_id = thread_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("e2e-thread-{}", Uuid::now_v7()));
    json!({
        "type": "user_message",
        "payload": {
            "content": content,
            "thread_id": thread_id,
            "message_id": Uuid::now_v7().to_string(),
            "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    })
}

/// Exit code for a finished session.
///
/// A matching `expect_close` wins over the verdict, so a reproduction of a
/// known server failure counts as success.
pub fn chat_exit_code(outcome: &SessionOutcome, expect_close: Option<u16>) -> i32 {
    let observed = outcome.close.as_ref().map(|c| c.code);
    if let Some(expected) = expect_close {
        return if observed == Some(expected) { 0 } else { 1 };
    }
    if outcome
        .close
        .as_ref()
        .is_some_and(|c| c.kind == CloseKind::InternalError)
    {
        return 2;
    }
    if outcome.verdict.passed { 0 } else { 1 }
}

fn validate_ws_url(ws_url: &str) -> Result<(), String> {
    let parsed = url::Url::parse(ws_url).map_err(|e| format!("Invalid WebSocket URL '{ws_url}': {e}"))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!("WebSocket URL must use ws:// or wss://, got '{other}://'")),
    }
}

pub async fn run(config: &Config, args: ChatArgs) -> i32 {
    if let Err(message) = validate_ws_url(&config.ws_url) {
        exit_error(&message, Some("Set STAGING_WS_URL or pass --ws-url."));
    }
    if args.recv_timeout_secs == 0 || args.max_duration_secs == 0 {
        exit_error("Timeouts must be at least one second.", None);
    }

    let token = match args.token {
        Some(token) => token,
        None => match mint_token(config, None, &[]) {
            Ok(minted) => minted.token,
            Err(e) => exit_error(&e.to_string(), Some("Check JWT_SECRET_* values in the env file.")),
        },
    };
    let headers = build_websocket_headers(Some(&token));
    let outgoing = build_user_message(&args.message, args.thread_id.as_deref());
    let options = SessionOptions {
        recv_timeout: Duration::from_secs(args.recv_timeout_secs),
        max_duration: Duration::from_secs(args.max_duration_secs),
    };

    let outcome = match run_chat_session(&config.ws_url, &headers, &outgoing, &options).await {
        Ok(outcome) => outcome,
        Err(SessionError::Rejected { status, body }) => {
            let out = json!({
                "error": if status >= 500 { codes::SERVER_ERROR } else { codes::VALIDATION_FAILED },
                "message": format!("WebSocket handshake rejected with HTTP {status}"),
                "status": status,
                "body": body,
            });
            emit(&out, false);
            return if status >= 500 { 2 } else { 1 };
        }
        Err(SessionError::InvalidHeader { name, reason }) => {
            exit_error(&format!("Header '{name}' cannot be sent: {reason}"), None)
        }
        Err(e) => return connection_error(&config.ws_url, e),
    };

    let code = chat_exit_code(&outcome, args.expect_close);
    if args.json {
        emit(&outcome, code == 0);
    } else if code == 0 {
        println!("{}", outcome.report);
    } else {
        eprintln!("{}", outcome.report);
        if let Some(close) = &outcome.close {
            eprintln!("Closed with {} ({}) after {:.2}s", close.code, close.diagnosis, close.elapsed_secs);
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use stagecheck_core::stall::StallAssessment;
    use stagecheck_core::validator::Verdict;

    use super::*;
    use crate::session::CloseObservation;

    fn outcome(passed: bool, close_code: Option<u16>) -> SessionOutcome {
        SessionOutcome {
            verdict: Verdict {
                passed,
                failures: if passed { vec![] } else { vec!["Missing required events: agent_completed".into()] },
                warnings: vec![],
            },
            report: String::new(),
            close: close_code.map(|code| CloseObservation {
                kind: CloseKind::from_code(code),
                code,
                reason: String::new(),
                diagnosis: CloseKind::from_code(code).diagnosis(),
                elapsed_secs: 1.0,
            }),
            stall: StallAssessment::Incomplete,
            frames_received: 1,
            elapsed_secs: 1.0,
        }
    }

    #[test]
    fn user_message_envelope() {
        let msg = build_user_message("hello", Some("thread-1"));
        assert_eq!(msg["type"], "user_message");
        assert_eq!(msg["payload"]["content"], "hello");
        assert_eq!(msg["payload"]["thread_id"], "thread-1");
        assert!(msg["payload"]["timestamp"].is_f64());

        let fresh = build_user_message("hi", None);
        assert!(fresh["payload"]["thread_id"].as_str().unwrap().starts_with("e2e-thread-"));
    }

    #[test]
    fn verdict_decides_without_expected_close() {
        assert_eq!(chat_exit_code(&outcome(true, None), None), 0);
        assert_eq!(chat_exit_code(&outcome(false, None), None), 1);
        assert_eq!(chat_exit_code(&outcome(false, Some(1011)), None), 2);
    }

    #[test]
    fn expected_close_turns_reproduction_into_success() {
        assert_eq!(chat_exit_code(&outcome(false, Some(1011)), Some(1011)), 0);
        assert_eq!(chat_exit_code(&outcome(true, None), Some(1011)), 1);
        assert_eq!(chat_exit_code(&outcome(false, Some(1000)), Some(1011)), 1);
    }

    #[test]
    fn ws_url_scheme_is_checked() {
        assert!(validate_ws_url("wss://staging.example.test/ws").is_ok());
        assert!(validate_ws_url("https://staging.example.test/ws").is_err());
        assert!(validate_ws_url("not a url").is_err());
    }
}
