use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;

use crate::auth::token_fingerprint;

pub const AUTHORIZATION: &str = "Authorization";
pub const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";

/// Subprotocol prefix the server strips before decoding the token.
pub const JWT_SUBPROTOCOL_PREFIX: &str = "jwt.";
/// Sent when the token cannot be encoded.
pub const DEBUG_SUBPROTOCOL: &str = "e2e-testing";
/// Bearer prefix used in place of a token that is not a valid header value.
pub const DEBUG_BEARER_PREFIX: &str = "e2e-debug-";
pub const UNAUTHENTICATED_AUTHORIZATION: &str = "Bearer unauthenticated-e2e-probe";
pub const UNAUTHENTICATED_SUBPROTOCOL: &str = "jwt.unauthenticated";

/// Headers the backend uses to recognise automated E2E traffic.
pub const E2E_DETECTION_HEADERS: [(&str, &str); 4] = [
    ("X-Test-Type", "E2E"),
    ("X-E2E-Test", "true"),
    ("X-Test-Environment", "staging"),
    ("X-Test-Client", "stagecheck"),
];

/// Ordered header name → value map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderSet(BTreeMap<String, String>);

impl HeaderSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// Copy with `Authorization` replaced by a fingerprint, safe to print.
    pub fn redacted(&self) -> HeaderSet {
        let mut out = self.clone();
        if let Some(auth) = self.get(AUTHORIZATION)
            && let Some(token) = auth.strip_prefix("Bearer ")
            && auth != UNAUTHENTICATED_AUTHORIZATION
            && !token.starts_with(DEBUG_BEARER_PREFIX)
        {
            out.insert(AUTHORIZATION, format!("Bearer <sha256:{}>", token_fingerprint(token)));
        }
        if let Some(protocol) = self.get(SEC_WEBSOCKET_PROTOCOL)
            && protocol != UNAUTHENTICATED_SUBPROTOCOL
            && protocol.starts_with(JWT_SUBPROTOCOL_PREFIX)
        {
            out.insert(SEC_WEBSOCKET_PROTOCOL, "jwt.<redacted>");
        }
        out
    }
}

/// A token can ride in `Authorization` only if it is non-empty visible ASCII.
fn header_safe(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_graphic())
}

/// `Bearer <token>`, or a fingerprint marker when the raw token would not
/// survive as a header value.
fn bearer_value(token: &str) -> String {
    if header_safe(token) {
        format!("Bearer {token}")
    } else {
        format!("Bearer {DEBUG_BEARER_PREFIX}{}", token_fingerprint(token))
    }
}

/// `jwt.<base64url(token)>` with padding stripped.
///
/// Any UTF-8 token encodes. `None` only for an empty token, which has
/// nothing to carry.
pub fn encode_subprotocol(token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    Some(format!("{JWT_SUBPROTOCOL_PREFIX}{}", URL_SAFE_NO_PAD.encode(token.as_bytes())))
}

/// Reverse of [`encode_subprotocol`].
pub fn decode_subprotocol(value: &str) -> Option<String> {
    let encoded = value.strip_prefix(JWT_SUBPROTOCOL_PREFIX)?;
    // Servers may re-add padding; strip it so the no-pad engine accepts both.
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

fn with_e2e_headers(mut headers: HeaderSet) -> HeaderSet {
    for (name, value) in E2E_DETECTION_HEADERS {
        headers.insert(name, value);
    }
    headers
}

/// Headers for a WebSocket upgrade.
///
/// Never fails, and every value it produces is a valid header value, so the
/// connection attempt always happens and the server's answer can be
/// observed. A token that cannot be encoded falls back to
/// [`DEBUG_SUBPROTOCOL`]. `None` builds the deliberately unauthenticated set
/// used by negative tests.
pub fn build_websocket_headers(token: Option<&str>) -> HeaderSet {
    let mut headers = HeaderSet::default();
    match token {
        Some(token) => {
            if !header_safe(token) {
                tracing::warn!(
                    token_len = token.len(),
                    "token not header-safe, sending fingerprint marker as bearer"
                );
            }
            headers.insert(AUTHORIZATION, bearer_value(token));
            match encode_subprotocol(token) {
                Some(protocol) => headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol),
                None => {
                    tracing::warn!("token could not be encoded, falling back to debug subprotocol");
                    headers.insert(SEC_WEBSOCKET_PROTOCOL, DEBUG_SUBPROTOCOL);
                }
            }
        }
        None => {
            headers.insert(AUTHORIZATION, UNAUTHENTICATED_AUTHORIZATION);
            headers.insert(SEC_WEBSOCKET_PROTOCOL, UNAUTHENTICATED_SUBPROTOCOL);
        }
    }
    with_e2e_headers(headers)
}

/// Headers for plain HTTP probes: auth (when present) plus E2E detection.
pub fn build_http_headers(token: Option<&str>) -> HeaderSet {
    let mut headers = HeaderSet::default();
    if let Some(token) = token {
        headers.insert(AUTHORIZATION, bearer_value(token));
    }
    with_e2e_headers(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ1In0.c2ln";

    #[test]
    fn token_headers_carry_bearer_and_subprotocol() {
        let headers = build_websocket_headers(Some(TOKEN));
        assert_eq!(headers.get("authorization"), Some(format!("Bearer {TOKEN}").as_str()));
        let protocol = headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap();
        assert!(protocol.starts_with("jwt."));
        assert!(!protocol.contains('='));
    }

    #[test]
    fn subprotocol_roundtrips_after_repadding() {
        let headers = build_websocket_headers(Some(TOKEN));
        let encoded = headers
            .get(SEC_WEBSOCKET_PROTOCOL)
            .unwrap()
            .strip_prefix("jwt.")
            .unwrap()
            .to_string();
        let padded = format!("{encoded}{}", "=".repeat((4 - encoded.len() % 4) % 4));
        let bytes = base64::engine::general_purpose::URL_SAFE.decode(padded).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), TOKEN);
        assert_eq!(decode_subprotocol(&format!("jwt.{encoded}")).as_deref(), Some(TOKEN));
    }

    #[test]
    fn missing_token_uses_unauthenticated_placeholders() {
        let headers = build_websocket_headers(None);
        assert_eq!(headers.get(AUTHORIZATION), Some(UNAUTHENTICATED_AUTHORIZATION));
        assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL), Some(UNAUTHENTICATED_SUBPROTOCOL));
    }

    #[test]
    fn non_ascii_token_still_gets_jwt_subprotocol() {
        let token = "tökén.payload.sig";
        let headers = build_websocket_headers(Some(token));
        let protocol = headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap();
        assert!(protocol.is_ascii());
        assert_eq!(decode_subprotocol(protocol).as_deref(), Some(token));
    }

    #[test]
    fn unsendable_token_gets_fingerprint_bearer() {
        let token = "bad token\n";
        let headers = build_websocket_headers(Some(token));
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(auth, format!("Bearer {DEBUG_BEARER_PREFIX}{}", token_fingerprint(token)));
        assert!(auth.bytes().all(|b| b == b' ' || b.is_ascii_graphic()));
        assert_eq!(
            decode_subprotocol(headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap()).as_deref(),
            Some(token)
        );
    }

    #[test]
    fn empty_token_falls_back_to_debug_subprotocol() {
        let headers = build_websocket_headers(Some(""));
        assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL), Some(DEBUG_SUBPROTOCOL));
        assert!(headers.get(AUTHORIZATION).unwrap().starts_with("Bearer e2e-debug-"));
    }

    #[test]
    fn e2e_headers_present_with_and_without_token() {
        for headers in [build_websocket_headers(Some(TOKEN)), build_websocket_headers(None)] {
            for (name, value) in E2E_DETECTION_HEADERS {
                assert_eq!(headers.get(name), Some(value));
            }
        }
    }

    #[test]
    fn http_headers_skip_subprotocol() {
        let headers = build_http_headers(Some(TOKEN));
        assert!(headers.get(SEC_WEBSOCKET_PROTOCOL).is_none());
        assert!(headers.get(AUTHORIZATION).is_some());
        assert!(build_http_headers(None).get(AUTHORIZATION).is_none());
    }

    #[test]
    fn redaction_hides_token() {
        let redacted = build_websocket_headers(Some(TOKEN)).redacted();
        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains(TOKEN));
        assert!(redacted.get(AUTHORIZATION).unwrap().starts_with("Bearer <sha256:"));
    }
}
