use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use stagecheck_core::auth::token_fingerprint;
use stagecheck_core::close::CloseKind;
use stagecheck_core::events::InboundFrame;
use stagecheck_core::headers::{AUTHORIZATION, HeaderSet};
use stagecheck_core::stall::{StallAssessment, assess_stall};
use stagecheck_core::validator::{MissionCriticalValidator, Verdict};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("handshake rejected with HTTP {status}")]
    Rejected { status: u16, body: Option<String> },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to send message: {0}")]
    Send(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Per-receive wait before polling again
    pub recv_timeout: Duration,
    /// Outer bound on the whole poll loop
    pub max_duration: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(2),
            max_duration: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseObservation {
    pub kind: CloseKind,
    pub code: u16,
    pub reason: String,
    pub diagnosis: &'static str,
    pub elapsed_secs: f64,
}

impl CloseObservation {
    fn new(code: u16, reason: String, elapsed: Duration) -> Self {
        let kind = CloseKind::from_code(code);
        Self {
            kind,
            code,
            reason,
            diagnosis: kind.diagnosis(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    fn from_frame(frame: Option<CloseFrame<'_>>, elapsed: Duration) -> Self {
        match frame {
            Some(frame) => Self::new(u16::from(frame.code), frame.reason.to_string(), elapsed),
            None => Self::new(NO_STATUS_RECEIVED, String::new(), elapsed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionOutcome {
    pub verdict: Verdict,
    #[serde(skip)]
    pub report: String,
    pub close: Option<CloseObservation>,
    pub stall: StallAssessment,
    pub frames_received: usize,
    pub elapsed_secs: f64,
}

/// Outcome of connecting with credentials the server should refuse.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RejectionOutcome {
    HttpRejected { status: u16 },
    Closed { close: CloseObservation },
    StayedOpen { frames_received: usize },
    ConnectFailed { message: String },
}

/// Build the upgrade request carrying every header in `headers`.
pub fn build_request(url: &str, headers: &HeaderSet) -> Result<Request, SessionError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SessionError::Connect(e.to_string()))?;

    for (name, value) in headers.iter() {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| SessionError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| SessionError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        request.headers_mut().insert(header_name, header_value);
    }

    Ok(request)
}

async fn connect(url: &str, headers: &HeaderSet) -> Result<WsStream, SessionError> {
    let request = build_request(url, headers)?;
    match connect_async(request).await {
        Ok((stream, response)) => {
            tracing::info!(
                url,
                status = response.status().as_u16(),
                protocol = ?response.headers().get("sec-websocket-protocol"),
                "websocket connected"
            );
            Ok(stream)
        }
        Err(WsError::Http(response)) => {
            let status = response.status().as_u16();
            let body = response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned());
            let diagnosis = match status {
                401 | 403 => "auth failure",
                500..=599 => "server error during handshake",
                _ => "unexpected handshake response",
            };
            tracing::warn!(url, status, diagnosis, "websocket handshake rejected");
            Err(SessionError::Rejected { status, body })
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "websocket connect failed");
            Err(SessionError::Connect(e.to_string()))
        }
    }
}

async fn close_quietly(stream: &mut WsStream) {
    if let Err(e) = stream.close(None).await {
        tracing::debug!(error = %e, "close after session returned error");
    }
}

/// Connect, send `outgoing`, and validate the event stream that follows.
///
/// The socket is owned here and closed on every path out, including early
/// errors from the inner driver.
pub async fn run_chat_session(
    url: &str,
    headers: &HeaderSet,
    outgoing: &Value,
    options: &SessionOptions,
) -> Result<SessionOutcome, SessionError> {
    let mut stream = connect(url, headers).await?;
    let outcome = drive(&mut stream, headers, outgoing, options).await;
    close_quietly(&mut stream).await;
    outcome
}

async fn drive(
    stream: &mut WsStream,
    headers: &HeaderSet,
    outgoing: &Value,
    options: &SessionOptions,
) -> Result<SessionOutcome, SessionError> {
    let mut validator = MissionCriticalValidator::new();
    let started = Instant::now();

    stream
        .send(Message::text(outgoing.to_string()))
        .await
        .map_err(|e| SessionError::Send(e.to_string()))?;
    tracing::info!(message_type = ?outgoing.get("type"), "sent test message");

    let (close, frames_received) = poll_events(stream, &mut validator, options).await;
    let elapsed = started.elapsed();

    if let Some(close) = &close {
        if close.kind == CloseKind::InternalError {
            let fingerprint = headers
                .get(AUTHORIZATION)
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(token_fingerprint)
                .unwrap_or_default();
            tracing::error!(
                code = close.code,
                reason = %close.reason,
                elapsed_secs = close.elapsed_secs,
                headers_sent = ?headers.names(),
                token_fingerprint = %fingerprint,
                trigger = %outgoing,
                events_before_close = validator.timeline().len(),
                "server closed session with internal error (1011)"
            );
        } else if close.kind.is_failure() {
            tracing::warn!(code = close.code, diagnosis = close.diagnosis, reason = %close.reason, "session closed abnormally");
        }
    }

    let verdict = validator.validate();
    let stall = assess_stall(
        validator.timeline().len(),
        validator.is_complete(),
        elapsed,
        options.max_duration,
    );
    if stall == StallAssessment::SuspectedDeadlock {
        tracing::error!(elapsed_secs = elapsed.as_secs_f64(), "no events before deadline, suspected deadlock");
    }

    Ok(SessionOutcome {
        report: validator.generate_report(),
        verdict,
        close,
        stall,
        frames_received,
        elapsed_secs: elapsed.as_secs_f64(),
    })
}

fn record_text(validator: &mut MissionCriticalValidator, text: &str) {
    match InboundFrame::parse(text) {
        InboundFrame::Event(event) => validator.record_event(event),
        InboundFrame::Malformed(raw) => validator.record_malformed(raw),
    }
}

/// Poll until a completion-class event, a close, or the deadline.
///
/// A receive timeout only means "nothing yet"; the loop keeps going until
/// the outer deadline.
async fn poll_events(
    stream: &mut WsStream,
    validator: &mut MissionCriticalValidator,
    options: &SessionOptions,
) -> (Option<CloseObservation>, usize) {
    let started = Instant::now();
    let mut frames = 0usize;

    loop {
        if validator.is_complete() {
            return (None, frames);
        }
        let remaining = options.max_duration.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            tracing::warn!(frames, "session deadline reached before completion");
            return (None, frames);
        }

        match tokio::time::timeout(options.recv_timeout.min(remaining), stream.next()).await {
            Err(_) => {
                tracing::debug!(elapsed_secs = started.elapsed().as_secs_f64(), "no frame within receive timeout");
            }
            Ok(None) => {
                let close =
                    CloseObservation::new(ABNORMAL_CLOSURE, "stream ended".to_string(), started.elapsed());
                return (Some(close), frames);
            }
            Ok(Some(Err(e))) => {
                let close = CloseObservation::new(ABNORMAL_CLOSURE, e.to_string(), started.elapsed());
                return (Some(close), frames);
            }
            Ok(Some(Ok(message))) => match message {
                Message::Text(text) => {
                    frames += 1;
                    record_text(validator, &text);
                }
                Message::Binary(bytes) => {
                    frames += 1;
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => record_text(validator, text),
                        Err(_) => validator.record_malformed(format!("<{} binary bytes>", bytes.len())),
                    }
                }
                Message::Close(frame) => {
                    return (Some(CloseObservation::from_frame(frame, started.elapsed())), frames);
                }
                _ => {}
            },
        }
    }
}

/// Connect with credentials that should be refused and report how the
/// server refused them, if it did.
pub async fn probe_rejection(url: &str, headers: &HeaderSet, wait: Duration) -> RejectionOutcome {
    let mut stream = match connect(url, headers).await {
        Ok(stream) => stream,
        Err(SessionError::Rejected { status, .. }) => return RejectionOutcome::HttpRejected { status },
        Err(e) => {
            return RejectionOutcome::ConnectFailed {
                message: e.to_string(),
            };
        }
    };

    let outcome = wait_for_close(&mut stream, wait).await;
    close_quietly(&mut stream).await;
    outcome
}

async fn wait_for_close(stream: &mut WsStream, wait: Duration) -> RejectionOutcome {
    let started = Instant::now();
    let mut frames = 0usize;

    loop {
        let remaining = wait.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return RejectionOutcome::StayedOpen {
                frames_received: frames,
            };
        }
        match tokio::time::timeout(remaining, stream.next()).await {
            Err(_) => {
                return RejectionOutcome::StayedOpen {
                    frames_received: frames,
                };
            }
            Ok(None) => {
                return RejectionOutcome::Closed {
                    close: CloseObservation::new(ABNORMAL_CLOSURE, "stream ended".to_string(), started.elapsed()),
                };
            }
            Ok(Some(Err(e))) => {
                return RejectionOutcome::Closed {
                    close: CloseObservation::new(ABNORMAL_CLOSURE, e.to_string(), started.elapsed()),
                };
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                return RejectionOutcome::Closed {
                    close: CloseObservation::from_frame(frame, started.elapsed()),
                };
            }
            Ok(Some(Ok(_))) => frames += 1,
        }
    }
}
