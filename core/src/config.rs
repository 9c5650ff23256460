use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub const DEFAULT_ENVIRONMENT: &str = "staging";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Immutable snapshot of everything the checks read from the outside world.
///
/// Built once at process start from `config/<environment>.env` plus the
/// process environment (environment wins), then passed by reference into
/// secret resolution and the session driver. Tests build one directly with
/// [`Config::from_vars`] instead of mutating the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lower-cased target environment name (e.g. "staging")
    pub environment: String,
    /// Base URL for HTTP probes, without trailing slash
    pub api_url: String,
    /// Full WebSocket URL for chat sessions
    pub ws_url: String,
    vars: BTreeMap<String, String>,
}

impl Config {
    /// Build a config from explicit key/value pairs. Later pairs override
    /// earlier ones; blank values are treated as unset.
    pub fn from_vars<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars = BTreeMap::new();
        for (key, value) in pairs {
            let value: String = value.into();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            vars.insert(key.into(), value.to_string());
        }

        let environment = vars
            .get("ENVIRONMENT")
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let api_url = vars
            .get("STAGING_API_URL")
            .map(String::as_str)
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        let ws_url = vars
            .get("STAGING_WS_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        Self {
            environment,
            api_url,
            ws_url,
            vars,
        }
    }

    /// Load from an env file and the process environment.
    ///
    /// With `env_file = None` the default `config/<ENVIRONMENT>.env` is read
    /// if it exists. An explicit path that cannot be read is an error.
    pub fn load(env_file: Option<&Path>) -> Result<Self, Error> {
        Self::load_for(None, env_file)
    }

    /// Like [`Config::load`], but `environment` (when given) picks the
    /// default env file and wins over `ENVIRONMENT`.
    pub fn load_for(environment: Option<&str>, env_file: Option<&Path>) -> Result<Self, Error> {
        let (path, explicit) = match env_file {
            Some(p) => (p.to_path_buf(), true),
            None => (default_env_file(environment), false),
        };

        let mut pairs: Vec<(String, String)> = Vec::new();
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| Error::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    pairs.push((key, value));
                }
                tracing::debug!(path = %path.display(), keys = pairs.len(), "loaded env file");
            }
            Err(err) if !explicit && err.not_found() => {
                tracing::debug!(path = %path.display(), "no env file, using process environment only");
            }
            Err(source) => return Err(Error::EnvFile { path, source }),
        }

        pairs.extend(std::env::vars());
        if let Some(environment) = environment {
            pairs.push(("ENVIRONMENT".to_string(), environment.to_string()));
        }
        Ok(Self::from_vars(pairs))
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

fn default_env_file(environment: Option<&str>) -> PathBuf {
    let environment = environment
        .map(str::to_string)
        .or_else(|| std::env::var("ENVIRONMENT").ok())
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
    PathBuf::from("config").join(format!("{}.env", environment.trim().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_vars(Vec::<(String, String)>::new());
        assert_eq!(config.environment, "staging");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
    }

    #[test]
    fn blank_values_count_as_unset_and_later_pairs_win() {
        let config = Config::from_vars([
            ("JWT_SECRET_KEY", "from-file"),
            ("JWT_SECRET_KEY", "from-env"),
            ("E2E_BYPASS_KEY", "   "),
            ("ENVIRONMENT", "Staging"),
            ("STAGING_API_URL", "https://api.example.test/"),
        ]);
        assert_eq!(config.var("JWT_SECRET_KEY"), Some("from-env"));
        assert_eq!(config.var("E2E_BYPASS_KEY"), None);
        assert_eq!(config.environment, "staging");
        assert_eq!(config.api_url, "https://api.example.test");
    }

    #[test]
    fn explicit_missing_env_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("stagecheck-missing-{}.env", uuid::Uuid::now_v7()));
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::EnvFile { .. }));
    }

    #[test]
    fn env_file_skips_comments_and_strips_quotes() {
        let key = format!("STAGECHECK_TEST_{}", uuid::Uuid::now_v7().simple()).to_uppercase();
        let path = std::env::temp_dir().join(format!("stagecheck-{}.env", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            format!("# staging overrides\n{key}=\"quoted value\"\nSTAGECHECK_UNUSED=1\n"),
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.var(&key), Some("quoted value"));
    }

    #[test]
    fn explicit_environment_wins() {
        let path = std::env::temp_dir().join(format!("stagecheck-{}.env", uuid::Uuid::now_v7()));
        std::fs::write(&path, "ENVIRONMENT=production\n").unwrap();

        let config = Config::load_for(Some("Staging"), Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.environment, "staging");
    }
}
