use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use stagecheck_core::auth::{self, DEFAULT_ISSUER, DEFAULT_PERMISSIONS, DEFAULT_TTL_MINUTES};
use stagecheck_core::config::Config;
use stagecheck_core::error::codes;
use stagecheck_core::headers::HeaderSet;
use stagecheck_core::secret::{SecretSource, resolve_secret_with_source};
use stagecheck_core::users::{StagingTestUser, TestUserPool, resolve_test_user};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": codes::CLI_ERROR,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty(&err));
    std::process::exit(4);
}

pub fn to_pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize output: {e}\"}}"))
}

/// Print to stdout on success, stderr otherwise.
pub fn emit<T: Serialize>(value: &T, success: bool) {
    if success {
        println!("{}", to_pretty(value));
    } else {
        eprintln!("{}", to_pretty(value));
    }
}

/// Connection failure output, shared by every command that talks to the backend.
pub fn connection_error(target: &str, err: impl std::fmt::Display) -> i32 {
    let out = json!({
        "error": codes::CONNECTION_ERROR,
        "message": format!("{target}: {err}"),
        "docs_hint": "Is the staging backend reachable? Check STAGING_API_URL / STAGING_WS_URL."
    });
    eprintln!("{}", to_pretty(&out));
    3
}

pub fn with_headers(mut req: reqwest::RequestBuilder, headers: &HeaderSet) -> reqwest::RequestBuilder {
    for (name, value) in headers.iter() {
        req = req.header(name, value);
    }
    req
}

/// A freshly minted E2E token and where its inputs came from.
#[derive(Debug)]
pub struct MintedToken {
    pub token: String,
    pub user: StagingTestUser,
    pub secret_source: SecretSource,
}

/// Resolve secret and test user from `config`, then sign a token.
///
/// Credentials are minted per connection attempt and never cached.
pub fn mint_token(
    config: &Config,
    ttl_minutes: Option<i64>,
    permissions: &[String],
) -> Result<MintedToken, stagecheck_core::Error> {
    let secret = resolve_secret_with_source(config, &config.environment);
    let pool = TestUserPool::staging_default();
    let user = resolve_test_user(config, &pool, std::process::id());
    let issuer = config.var("JWT_ISSUER").unwrap_or(DEFAULT_ISSUER);

    let permissions: Vec<&str> = if permissions.is_empty() {
        DEFAULT_PERMISSIONS.to_vec()
    } else {
        permissions.iter().map(String::as_str).collect()
    };

    let token = auth::build_jwt_for_issuer(
        &user,
        &secret.value,
        ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES),
        &permissions,
        issuer,
    )?;

    tracing::info!(
        environment = %config.environment,
        secret_source = ?secret.source,
        user_id = %user.user_id,
        fingerprint = %auth::token_fingerprint(&token),
        "minted e2e token"
    );

    Ok(MintedToken {
        token,
        user,
        secret_source: secret.source,
    })
}
