//! Configuration module for the tradepost engine.
//!
//! This module provides structures and utilities for managing engine
//! configuration. It supports loading configuration from TOML files with
//! environment variable resolution, and provides validation to ensure
//! all required configuration values are properly set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the tradepost engine.
///
/// Contains all configuration sections required for operation: engine
/// identity and retry policy, the storage backend, and the optional
/// HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this engine instance.
	pub engine: EngineConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to this engine instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Unique identifier for this engine instance.
	pub id: String,
	/// Maximum retry attempts for transient storage faults.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Base delay in milliseconds for retry backoff.
	#[serde(default = "default_retry_base_ms")]
	pub retry_base_ms: u64,
	/// Age in seconds after which the reconciliation sweep clears an
	/// in-flight restore marker as stale.
	#[serde(default = "default_stale_restore_seconds")]
	pub stale_restore_seconds: u64,
}

fn default_max_retries() -> u32 {
	3
}

fn default_retry_base_ms() -> u64 {
	50
}

fn default_stale_restore_seconds() -> u64 {
	300 // 5 minutes
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to prevent ReDoS attacks
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable
	/// resolution and validation.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let contents = tokio::fs::read_to_string(path).await?;
		contents.parse()
	}

	/// Validates the configuration to ensure all required fields are
	/// properly set.
	///
	/// This method performs validation across all configuration sections:
	/// - Ensures the engine ID is not empty
	/// - Checks retry bounds
	/// - Validates the primary storage backend is configured
	/// - Checks API server settings when enabled
	fn validate(&self) -> Result<(), ConfigError> {
		// Validate engine config
		if self.engine.id.is_empty() {
			return Err(ConfigError::Validation("Engine ID cannot be empty".into()));
		}
		if self.engine.max_retries > 10 {
			return Err(ConfigError::Validation(
				"max_retries cannot exceed 10".into(),
			));
		}
		if self.engine.retry_base_ms == 0 {
			return Err(ConfigError::Validation(
				"retry_base_ms must be at least 1".into(),
			));
		}
		if self.engine.retry_base_ms > 60_000 {
			return Err(ConfigError::Validation(
				"retry_base_ms cannot exceed 60000 (1 minute)".into(),
			));
		}
		if self.engine.stale_restore_seconds == 0 {
			return Err(ConfigError::Validation(
				"stale_restore_seconds must be greater than 0".into(),
			));
		}
		if self.engine.stale_restore_seconds > 86_400 {
			return Err(ConfigError::Validation(
				"stale_restore_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		// Validate storage config
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Validate API config if enabled
		if let Some(ref api) = self.api {
			if api.enabled {
				if api.host.is_empty() {
					return Err(ConfigError::Validation("API host cannot be empty".into()));
				}
				if api.port == 0 {
					return Err(ConfigError::Validation("API port cannot be 0".into()));
				}
				if api.timeout_seconds == 0 || api.timeout_seconds > 300 {
					return Err(ConfigError::Validation(
						"API timeout_seconds must be between 1 and 300".into(),
					));
				}
				if api.max_request_size == 0 {
					return Err(ConfigError::Validation(
						"API max_request_size must be greater than 0".into(),
					));
				}
			}
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// This allows configuration to be parsed from TOML strings using the
/// standard string parsing interface. Environment variables are resolved
/// and the configuration is automatically validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const VALID_CONFIG: &str = r#"
[engine]
id = "tradepost-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[api]
enabled = true
host = "127.0.0.1"
port = 3000
"#;

	#[test]
	fn test_env_var_resolution() {
		// Set up test environment variables
		std::env::set_var("TEST_TP_HOST", "localhost");
		std::env::set_var("TEST_TP_PORT", "5432");

		let input = "host = \"${TEST_TP_HOST}:${TEST_TP_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		// Clean up
		std::env::remove_var("TEST_TP_HOST");
		std::env::remove_var("TEST_TP_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_valid_config_parses_with_defaults() {
		let config: Config = VALID_CONFIG.parse().unwrap();
		assert_eq!(config.engine.id, "tradepost-test");
		assert_eq!(config.engine.max_retries, 3);
		assert_eq!(config.engine.retry_base_ms, 50);
		let api = config.api.unwrap();
		assert!(api.enabled);
		assert_eq!(api.timeout_seconds, 30);
		assert_eq!(api.max_request_size, 1024 * 1024);
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_TP_ENGINE_ID", "tradepost-env");

		let config_str = r#"
[engine]
id = "${TEST_TP_ENGINE_ID}"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "${TEST_TP_DATA:-./data/tradepost}"
"#;

		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.engine.id, "tradepost-env");
		let file_config = &config.storage.implementations["file"];
		assert_eq!(
			file_config.get("storage_path").and_then(|v| v.as_str()),
			Some("./data/tradepost")
		);

		std::env::remove_var("TEST_TP_ENGINE_ID");
	}

	#[test]
	fn test_empty_engine_id_rejected() {
		let config_str = r#"
[engine]
id = ""

[storage]
primary = "memory"
[storage.implementations.memory]
"#;
		let result = Config::from_str(config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Engine ID cannot be empty"));
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let config_str = r#"
[engine]
id = "tradepost-test"

[storage]
primary = "redis"
[storage.implementations.memory]
"#;
		let result = Config::from_str(config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary storage 'redis' not found"));
	}

	#[test]
	fn test_retry_bounds_rejected() {
		let config_str = r#"
[engine]
id = "tradepost-test"
max_retries = 50

[storage]
primary = "memory"
[storage.implementations.memory]
"#;
		let result = Config::from_str(config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("max_retries cannot exceed 10"));
	}

	#[test]
	fn test_enabled_api_with_zero_port_rejected() {
		let config_str = r#"
[engine]
id = "tradepost-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[api]
enabled = true
port = 0
"#;
		let result = Config::from_str(config_str);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("port cannot be 0"));
	}

	#[tokio::test]
	async fn test_from_file_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tradepost.toml");
		std::fs::write(&path, VALID_CONFIG).unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.engine.id, "tradepost-test");
	}

	#[tokio::test]
	async fn test_from_file_missing_path_errors() {
		let result = Config::from_file("./does-not-exist/tradepost.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
