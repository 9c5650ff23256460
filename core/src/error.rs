use std::path::PathBuf;

/// Errors surfaced by the core crate.
///
/// Validation, header building and secret resolution never fail; their
/// failure modes are returned as data. Only token signing and reading an
/// explicit env file can produce an `Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("JWT signing or verification failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("failed to read env file '{}': {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Machine-readable codes used in structured error output
pub mod codes {
    pub const CLI_ERROR: &str = "cli_error";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const AUTH_NOT_ENFORCED: &str = "auth_not_enforced";
    pub const UNHEALTHY: &str = "unhealthy";
}
