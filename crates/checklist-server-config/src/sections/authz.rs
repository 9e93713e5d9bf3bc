// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization configuration section.

use checklist_server_auth::{DEFAULT_SCOPE_ARGUMENT, DEFAULT_SCOPE_ENTITY};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Authorization configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct AuthzConfig {
	/// When false no field is guarded.
	pub enabled: bool,
	/// Scope argument used by bindings that do not name one.
	pub default_scope_argument: String,
	/// Entity type whose references are scope keys themselves.
	pub default_scope_entity: String,
	/// Schema metadata file declaring the bindings (TOML or JSON).
	pub bindings_path: Option<PathBuf>,
}

impl Default for AuthzConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			default_scope_argument: DEFAULT_SCOPE_ARGUMENT.to_string(),
			default_scope_entity: DEFAULT_SCOPE_ENTITY.to_string(),
			bindings_path: None,
		}
	}
}

impl AuthzConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.default_scope_argument.trim().is_empty() {
			return Err(ConfigError::Validation(
				"authz.default_scope_argument must not be empty".to_string(),
			));
		}
		if self.default_scope_entity.trim().is_empty() {
			return Err(ConfigError::Validation(
				"authz.default_scope_entity must not be empty".to_string(),
			));
		}
		Ok(())
	}
}

/// Authorization configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthzConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub default_scope_argument: Option<String>,
	#[serde(default)]
	pub default_scope_entity: Option<String>,
	#[serde(default)]
	pub bindings_path: Option<PathBuf>,
}

impl AuthzConfigLayer {
	pub fn merge(&mut self, other: AuthzConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.default_scope_argument.is_some() {
			self.default_scope_argument = other.default_scope_argument;
		}
		if other.default_scope_entity.is_some() {
			self.default_scope_entity = other.default_scope_entity;
		}
		if other.bindings_path.is_some() {
			self.bindings_path = other.bindings_path;
		}
	}

	pub fn finalize(self) -> AuthzConfig {
		let defaults = AuthzConfig::default();
		AuthzConfig {
			enabled: self.enabled.unwrap_or(defaults.enabled),
			default_scope_argument: self
				.default_scope_argument
				.unwrap_or(defaults.default_scope_argument),
			default_scope_entity: self
				.default_scope_entity
				.unwrap_or(defaults.default_scope_entity),
			bindings_path: self.bindings_path,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = AuthzConfigLayer::default().finalize();
		assert!(config.enabled);
		assert_eq!(config.default_scope_argument, "groupId");
		assert_eq!(config.default_scope_entity, "Group");
		assert!(config.bindings_path.is_none());
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_deserialize_partial() {
		let layer: AuthzConfigLayer = toml::from_str(
			r#"
			enabled = false
			bindings_path = "/etc/checklist/bindings.toml"
			"#,
		)
		.unwrap();
		let config = layer.finalize();
		assert!(!config.enabled);
		assert_eq!(
			config.bindings_path,
			Some(PathBuf::from("/etc/checklist/bindings.toml"))
		);
		assert_eq!(config.default_scope_argument, "groupId");
	}

	proptest::proptest! {
		#[test]
		fn test_non_blank_names_validate(argument in "[a-zA-Z][a-zA-Z0-9_]{0,20}", entity in "[A-Z][a-zA-Z]{0,12}") {
			let config = AuthzConfig {
				default_scope_argument: argument,
				default_scope_entity: entity,
				..Default::default()
			};
			proptest::prop_assert!(config.validate().is_ok());
		}
	}

	#[test]
	fn test_blank_scope_argument_is_rejected() {
		let config = AuthzConfig {
			default_scope_argument: "  ".to_string(),
			..Default::default()
		};
		let err = config.validate().unwrap_err();
		assert!(err.to_string().contains("default_scope_argument"));
	}
}
