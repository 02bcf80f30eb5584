// Domain error types for the sink guard

use thiserror::Error;

/// Main error type for the guard.
///
/// `PolicyViolation` is the only error the guard itself originates at
/// runtime; everything an underlying operation raises passes through as a
/// transparent variant.
#[derive(Error, Debug)]
pub enum GuardError {
    /// A sink argument failed policy validation in block mode (HTTP 403)
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// The policy document could not be loaded or is structurally invalid (HTTP 500)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A substitution template referenced a variable that was not supplied (HTTP 400)
    #[error("missing substitution variable '{0}'")]
    MissingVariable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl GuardError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GuardError::PolicyViolation(_) => 403,
            GuardError::Configuration(_) => 500,
            GuardError::MissingVariable(_) => 400,
            GuardError::Io(_) => 500,
            GuardError::Sql(_) => 500,
            GuardError::Yaml(_) => 400,
            GuardError::Template(_) => 400,
            GuardError::Http(_) => 502,
        }
    }

    /// True when this error was raised by the enforcement pipeline itself.
    pub fn is_violation(&self) -> bool {
        matches!(self, GuardError::PolicyViolation(_))
    }
}
