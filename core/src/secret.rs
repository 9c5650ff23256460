use serde::Serialize;

use crate::config::Config;

/// Last-resort signing secret. Only useful against environments that accept
/// the shared development key.
pub const FALLBACK_SECRET: &str = "development-jwt-secret-for-e2e-testing-only";

pub const GENERIC_SECRET_VAR: &str = "JWT_SECRET_KEY";
pub const BYPASS_KEY_VAR: &str = "E2E_BYPASS_KEY";

/// Where a JWT signing secret may come from, in resolution order.
///
/// The order mirrors what the backend is assumed to do. That assumption is
/// unverified, so [`secret_chain`] exists to print it for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    /// `JWT_SECRET_<ENVIRONMENT>`
    EnvironmentSpecific,
    /// `JWT_SECRET_KEY`
    Generic,
    /// `E2E_BYPASS_KEY`
    BypassKey,
    /// `<ENVIRONMENT>_JWT_SECRET`
    LegacyEnvironment,
    /// [`FALLBACK_SECRET`]
    Fallback,
}

impl SecretSource {
    pub const ORDER: [SecretSource; 5] = [
        SecretSource::EnvironmentSpecific,
        SecretSource::Generic,
        SecretSource::BypassKey,
        SecretSource::LegacyEnvironment,
        SecretSource::Fallback,
    ];

    /// Variable consulted for this source, or `None` for the constant.
    pub fn variable_name(self, environment: &str) -> Option<String> {
        let env = environment.trim().to_uppercase();
        match self {
            SecretSource::EnvironmentSpecific => Some(format!("JWT_SECRET_{env}")),
            SecretSource::Generic => Some(GENERIC_SECRET_VAR.to_string()),
            SecretSource::BypassKey => Some(BYPASS_KEY_VAR.to_string()),
            SecretSource::LegacyEnvironment => Some(format!("{env}_JWT_SECRET")),
            SecretSource::Fallback => None,
        }
    }

    fn lookup<'a>(self, config: &'a Config, environment: &str) -> Option<&'a str> {
        match self.variable_name(environment) {
            Some(name) => config.var(&name),
            None => Some(FALLBACK_SECRET),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub source: SecretSource,
    pub value: String,
}

/// One link of the resolution chain, without the secret value.
#[derive(Debug, Clone, Serialize)]
pub struct ChainEntry {
    pub source: SecretSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub is_set: bool,
}

/// First candidate with a value wins.
fn first_match<'a, T: Copy>(candidates: impl IntoIterator<Item = (T, Option<&'a str>)>) -> Option<(T, &'a str)> {
    candidates
        .into_iter()
        .find_map(|(tag, value)| value.filter(|v| !v.is_empty()).map(|v| (tag, v)))
}

/// Resolve the signing secret for `environment`, reporting which source won.
pub fn resolve_secret_with_source(config: &Config, environment: &str) -> ResolvedSecret {
    let candidates = SecretSource::ORDER
        .iter()
        .map(|source| (*source, source.lookup(config, environment)));

    let (source, value) =
        first_match(candidates).unwrap_or((SecretSource::Fallback, FALLBACK_SECRET));

    if source == SecretSource::Fallback {
        tracing::warn!(environment, "no JWT secret configured, using hardcoded fallback");
    } else {
        tracing::debug!(environment, source = ?source, "resolved JWT secret");
    }

    ResolvedSecret {
        source,
        value: value.to_string(),
    }
}

/// Resolve the signing secret for `environment`. Never empty, never fails.
pub fn resolve_secret(config: &Config, environment: &str) -> String {
    resolve_secret_with_source(config, environment).value
}

/// Every source in order, with whether it is currently set.
pub fn secret_chain(config: &Config, environment: &str) -> Vec<ChainEntry> {
    SecretSource::ORDER
        .iter()
        .map(|source| ChainEntry {
            source: *source,
            variable: source.variable_name(environment),
            is_set: source.lookup(config, environment).is_some(),
        })
        .collect()
}
