use std::collections::BTreeSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Error;
use crate::users::StagingTestUser;

pub const DEFAULT_ISSUER: &str = "staging-auth-service";
pub const DEFAULT_TTL_MINUTES: i64 = 30;
pub const DEFAULT_PERMISSIONS: [&str; 3] = ["read", "write", "chat"];

/// Claims carried by an E2E test token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub email: String,
    pub permissions: BTreeSet<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Fresh per token, never reused
    pub jti: String,
}

/// Mint an HS256 token for `user` with the default issuer.
pub fn build_jwt(
    user: &StagingTestUser,
    secret: &str,
    ttl_minutes: i64,
    permissions: &[&str],
) -> Result<String, Error> {
    build_jwt_for_issuer(user, secret, ttl_minutes, permissions, DEFAULT_ISSUER)
}

/// Mint an HS256 token for `user`. A ttl below one minute is clamped to one
/// minute so `exp > iat` always holds.
pub fn build_jwt_for_issuer(
    user: &StagingTestUser,
    secret: &str,
    ttl_minutes: i64,
    permissions: &[&str],
    issuer: &str,
) -> Result<String, Error> {
    let claims = claims_for(user, ttl_minutes, permissions, issuer);
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    tracing::debug!(
        sub = %claims.sub,
        jti = %claims.jti,
        exp = claims.exp,
        fingerprint = %token_fingerprint(&token),
        "minted e2e token"
    );
    Ok(token)
}

fn claims_for(
    user: &StagingTestUser,
    ttl_minutes: i64,
    permissions: &[&str],
    issuer: &str,
) -> JwtClaims {
    let iat = chrono::Utc::now().timestamp();
    let ttl_secs = ttl_minutes.max(1) * 60;
    JwtClaims {
        sub: user.user_id.clone(),
        email: user.email.clone(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        iat,
        exp: iat + ttl_secs,
        iss: issuer.to_string(),
        jti: Uuid::now_v7().to_string(),
    }
}

/// Verify and decode a token signed with `secret`.
pub fn decode_jwt(token: &str, secret: &str) -> Result<JwtClaims, Error> {
    let data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, log-safe identifier for a token.
pub fn token_fingerprint(token: &str) -> String {
    hash_token(token).chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> StagingTestUser {
        StagingTestUser::new("staging-e2e-user-001", "e2e-test-001@staging.example.test")
    }

    #[test]
    fn jwt_roundtrip() {
        let token = build_jwt(&user(), "secret", 30, &DEFAULT_PERMISSIONS).unwrap();
        let claims = decode_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "staging-e2e-user-001");
        assert_eq!(claims.email, "e2e-test-001@staging.example.test");
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
        assert!(claims.permissions.contains("chat"));
        assert_eq!(claims.permissions.len(), 3);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = build_jwt(&user(), "secret", 30, &["read"]).unwrap();
        assert!(decode_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn jti_is_fresh_per_token() {
        let a = decode_jwt(&build_jwt(&user(), "s", 5, &[]).unwrap(), "s").unwrap();
        let b = decode_jwt(&build_jwt(&user(), "s", 5, &[]).unwrap(), "s").unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn non_positive_ttl_still_expires_after_issue() {
        let token = build_jwt(&user(), "s", 0, &["read"]).unwrap();
        let claims = decode_jwt(&token, "s").unwrap();
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn duplicate_permissions_collapse() {
        let token = build_jwt(&user(), "s", 5, &["read", "read", "write"]).unwrap();
        let claims = decode_jwt(&token, "s").unwrap();
        assert_eq!(claims.permissions.len(), 2);
    }

    #[test]
    fn custom_issuer_is_kept() {
        let token = build_jwt_for_issuer(&user(), "s", 5, &["read"], "other-issuer").unwrap();
        assert_eq!(decode_jwt(&token, "s").unwrap().iss, "other-issuer");
    }

    #[test]
    fn fingerprint_is_stable_prefix_of_hash() {
        let fp = token_fingerprint("abc");
        assert_eq!(fp.len(), 12);
        assert!(hash_token("abc").starts_with(&fp));
        assert_eq!(fp, token_fingerprint("abc"));
    }
}
