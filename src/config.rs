// Configuration management

use crate::core::errors::GuardError;
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
///
/// All configuration is validated on load with clear error messages.
#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Policy document
    pub policy_path: PathBuf,

    // Demo application
    pub upload_dir: PathBuf,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Supports `.env` file loading in development (via the dotenv crate).
    pub fn from_env() -> Result<Self, GuardError> {
        // Load .env file if present (development). Skipped in tests to
        // avoid interfering with test environment variables.
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok();
        }

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0"),
            port: Self::parse_port()?,
            policy_path: Self::get_required_path("POLICY_PATH")?,
            upload_dir: PathBuf::from(Self::get_env_or_default("UPLOAD_DIR", "data/uploads")),
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "json"),
        };

        config.validate()?;
        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_required_path(key: &str) -> Result<PathBuf, GuardError> {
        let value = env::var(key)
            .map_err(|_| GuardError::Configuration(format!("{key} not set")))?;
        if value.is_empty() {
            return Err(GuardError::Configuration(format!("{key} is empty")));
        }
        Ok(PathBuf::from(value))
    }

    fn parse_port() -> Result<u16, GuardError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8000".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            GuardError::Configuration(format!("Invalid PORT value '{port_str}': {e}"))
        })?;
        if port == 0 {
            return Err(GuardError::Configuration(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }
        Ok(port)
    }

    fn validate(&self) -> Result<(), GuardError> {
        if !self.policy_path.is_file() {
            return Err(GuardError::Configuration(format!(
                "Policy file not found at {}",
                self.policy_path.display()
            )));
        }
        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;
        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), GuardError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(GuardError::Configuration(format!(
                "Invalid LOG_LEVEL '{level}': must be one of {}",
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), GuardError> {
        if format != "json" && format != "text" {
            return Err(GuardError::Configuration(format!(
                "Invalid LOG_FORMAT '{format}': must be 'json' or 'text'"
            )));
        }
        Ok(())
    }

    /// Test configuration that bypasses environment loading and file
    /// validation.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            policy_path: PathBuf::from("policies.yaml"),
            upload_dir: PathBuf::from("data/uploads"),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_log_level_accepts_known_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(Config::validate_log_level(level).is_ok());
        }
        assert!(Config::validate_log_level("verbose").is_err());
    }

    #[test]
    fn validate_log_format_accepts_json_and_text() {
        assert!(Config::validate_log_format("json").is_ok());
        assert!(Config::validate_log_format("text").is_ok());
        assert!(Config::validate_log_format("xml").is_err());
    }

    #[test]
    fn missing_policy_path_is_an_error() {
        env::remove_var("POLICY_PATH");
        assert!(Config::get_required_path("POLICY_PATH").is_err());
    }

    #[test]
    fn parse_port_rejects_garbage() {
        env::set_var("PORT", "not-a-port");
        assert!(Config::parse_port().is_err());
        env::remove_var("PORT");
    }
}
