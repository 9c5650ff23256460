use clap::Args;
use serde_json::{Value, json};
use stagecheck_core::auth::{JwtClaims, decode_jwt, token_fingerprint};
use stagecheck_core::config::Config;
use stagecheck_core::headers::build_websocket_headers;
use stagecheck_core::secret::{resolve_secret, secret_chain};

use crate::util::{MintedToken, exit_error, mint_token, to_pretty};

#[derive(Args)]
pub struct TokenArgs {
    /// Token lifetime in minutes
    #[arg(long)]
    pub ttl_minutes: Option<i64>,

    /// Permission claim (repeatable). Defaults to read, write, chat.
    #[arg(long = "permission")]
    pub permissions: Vec<String>,

    /// Print the raw token and unredacted headers
    #[arg(long)]
    pub reveal: bool,
}

fn render(config: &Config, minted: &MintedToken, claims: &JwtClaims, reveal: bool) -> Value {
    let headers = build_websocket_headers(Some(&minted.token));
    let chain: Vec<Value> = secret_chain(config, &config.environment)
        .into_iter()
        .map(|entry| {
            json!({
                "source": entry.source,
                "variable": entry.variable,
                "is_set": entry.is_set,
                "selected": entry.source == minted.secret_source,
            })
        })
        .collect();

    let mut out = json!({
        "environment": config.environment,
        "secret_source": minted.secret_source,
        "secret_chain": chain,
        "user": minted.user,
        "claims": claims,
        "fingerprint": token_fingerprint(&minted.token),
    });
    if reveal {
        out["token"] = json!(minted.token);
        out["headers"] = json!(headers);
    } else {
        out["headers"] = json!(headers.redacted());
    }
    out
}

pub fn run(config: &Config, args: TokenArgs) -> i32 {
    let minted = match mint_token(config, args.ttl_minutes, &args.permissions) {
        Ok(m) => m,
        Err(e) => exit_error(&e.to_string(), Some("Check JWT_SECRET_* values in the env file.")),
    };

    let secret = resolve_secret(config, &config.environment);
    let claims = match decode_jwt(&minted.token, &secret) {
        Ok(c) => c,
        Err(e) => exit_error(&format!("Minted token failed self-check: {e}"), None),
    };

    println!("{}", to_pretty(&render(config, &minted, &claims, args.reveal)));
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minted(config: &Config) -> (MintedToken, JwtClaims) {
        let minted = mint_token(config, None, &[]).unwrap();
        let claims = decode_jwt(&minted.token, &resolve_secret(config, &config.environment)).unwrap();
        (minted, claims)
    }

    #[test]
    fn default_output_never_contains_the_token() {
        let config = Config::from_vars([("JWT_SECRET_KEY", "generic")]);
        let (minted, claims) = minted(&config);
        let out = render(&config, &minted, &claims, false);

        assert!(out.get("token").is_none());
        assert!(!out.to_string().contains(&minted.token));
        assert_eq!(out["secret_source"], "generic");
    }

    #[test]
    fn chain_marks_the_selected_source() {
        let config = Config::from_vars([("E2E_BYPASS_KEY", "bypass")]);
        let (minted, claims) = minted(&config);
        let out = render(&config, &minted, &claims, true);

        let selected: Vec<&Value> = out["secret_chain"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["selected"] == true)
            .collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["source"], "bypass_key");
        assert_eq!(out["token"], minted.token);
    }
}
