// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{AuthzConfigLayer, DatabaseConfigLayer, LoggingConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/checklist/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: CHECKLIST_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		layer_from_lookup(&|name: &str| std::env::var(name).ok())
	}
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn layer_from_lookup(lookup: Lookup<'_>) -> Result<ServerConfigLayer, ConfigError> {
	Ok(ServerConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: env_var(lookup, "CHECKLIST_SERVER_DATABASE_URL"),
		}),
		logging: Some(LoggingConfigLayer {
			level: env_var(lookup, "CHECKLIST_SERVER_LOG_LEVEL"),
		}),
		authz: Some(AuthzConfigLayer {
			enabled: env_bool(lookup, "CHECKLIST_SERVER_AUTHZ_ENABLED")?,
			default_scope_argument: env_var(lookup, "CHECKLIST_SERVER_AUTHZ_SCOPE_ARGUMENT"),
			default_scope_entity: env_var(lookup, "CHECKLIST_SERVER_AUTHZ_SCOPE_ENTITY"),
			bindings_path: env_var(lookup, "CHECKLIST_SERVER_AUTHZ_BINDINGS_PATH").map(PathBuf::from),
		}),
	})
}

fn env_var(lookup: Lookup<'_>, name: &str) -> Option<String> {
	lookup(name).filter(|s| !s.is_empty())
}

/// Accepts `true`/`false`/`1`/`0`; anything else is an error.
fn env_bool(lookup: Lookup<'_>, name: &str) -> Result<Option<bool>, ConfigError> {
	match env_var(lookup, name) {
		Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
		Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
		Some(v) => Err(ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid bool value '{v}'"),
		}),
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn layer_from(vars: &[(&str, &str)]) -> Result<ServerConfigLayer, ConfigError> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		layer_from_lookup(&move |name: &str| vars.get(name).cloned())
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.authz.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/config.toml").load().unwrap();
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(&path, "[authz\nenabled = ").unwrap();
		let err = TomlSource::new(&path).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_values_are_read() {
		let layer = layer_from(&[
			("CHECKLIST_SERVER_DATABASE_URL", "sqlite::memory:"),
			("CHECKLIST_SERVER_AUTHZ_ENABLED", "0"),
			("CHECKLIST_SERVER_AUTHZ_SCOPE_ARGUMENT", "teamId"),
			("CHECKLIST_SERVER_LOG_LEVEL", ""),
		])
		.unwrap();
		assert_eq!(layer.database.unwrap().url, Some("sqlite::memory:".to_string()));
		assert!(layer.logging.unwrap().level.is_none());
		let authz = layer.authz.unwrap();
		assert_eq!(authz.enabled, Some(false));
		assert_eq!(authz.default_scope_argument, Some("teamId".to_string()));
		assert!(authz.bindings_path.is_none());
	}

	#[test]
	fn test_env_bool_rejects_garbage() {
		let err = layer_from(&[("CHECKLIST_SERVER_AUTHZ_ENABLED", "ture")]).unwrap_err();
		assert!(err.to_string().contains("CHECKLIST_SERVER_AUTHZ_ENABLED"));
	}
}
