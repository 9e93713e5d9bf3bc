// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy binding registry.
//!
//! Schema elements annotated with the group-membership directive are described
//! by [`SchemaMetadata`], loaded once at startup and compiled into an immutable
//! [`BindingRegistry`]:
//!
//! ```toml
//! [[binding]]
//! type = "Query"
//! field = "items"
//! scope_argument = "groupId"   # optional, defaults to "groupId"
//!
//! [[binding]]
//! type = "Item"                # type-level: guards every field of Item
//! ```
//!
//! Lookups after construction are plain map reads. When a type-level and a
//! field-level binding both apply to an access, both are returned and
//! evaluated independently.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::BindingError;

/// Argument name that carries the scope identifier when a binding does not say.
pub const DEFAULT_SCOPE_ARGUMENT: &str = "groupId";

/// Entity type whose key is itself a scope identifier.
pub const DEFAULT_SCOPE_ENTITY: &str = "Group";

/// What a binding is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingTarget {
	Type(String),
	Field { type_name: String, field_name: String },
}

impl fmt::Display for BindingTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BindingTarget::Type(type_name) => f.write_str(type_name),
			BindingTarget::Field {
				type_name,
				field_name,
			} => write!(f, "{type_name}.{field_name}"),
		}
	}
}

/// Static configuration for one annotated schema element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBinding {
	pub applies_to: BindingTarget,
	/// Argument, input attribute, or object field that carries the scope.
	pub scope_argument: String,
	/// Entity type whose references are scope identifiers themselves.
	pub scope_entity: String,
}

impl ScopeBinding {
	pub fn for_type(type_name: impl Into<String>) -> Self {
		Self {
			applies_to: BindingTarget::Type(type_name.into()),
			scope_argument: DEFAULT_SCOPE_ARGUMENT.to_string(),
			scope_entity: DEFAULT_SCOPE_ENTITY.to_string(),
		}
	}

	pub fn for_field(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
		Self {
			applies_to: BindingTarget::Field {
				type_name: type_name.into(),
				field_name: field_name.into(),
			},
			scope_argument: DEFAULT_SCOPE_ARGUMENT.to_string(),
			scope_entity: DEFAULT_SCOPE_ENTITY.to_string(),
		}
	}

	/// Builder: set the scope argument name.
	pub fn with_scope_argument(mut self, name: impl Into<String>) -> Self {
		self.scope_argument = name.into();
		self
	}

	/// Builder: set the scope entity type.
	pub fn with_scope_entity(mut self, name: impl Into<String>) -> Self {
		self.scope_entity = name.into();
		self
	}

	pub fn is_field_level(&self) -> bool {
		matches!(self.applies_to, BindingTarget::Field { .. })
	}
}

/// One directive annotation as declared in schema metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingSpec {
	#[serde(rename = "type")]
	pub type_name: String,
	#[serde(default)]
	pub field: Option<String>,
	#[serde(default)]
	pub scope_argument: Option<String>,
	#[serde(default)]
	pub scope_entity: Option<String>,
}

/// Directive annotations extracted from the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SchemaMetadata {
	#[serde(default, rename = "binding")]
	pub bindings: Vec<BindingSpec>,
}

impl SchemaMetadata {
	/// Parse metadata from TOML (`[[binding]]` tables).
	pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(content)
	}

	/// Parse metadata from JSON (`{"binding": [...]}`).
	pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(content)
	}

	/// Load metadata from a `.toml` or `.json` file.
	pub fn load(path: &Path) -> Result<Self, BindingError> {
		let content = std::fs::read_to_string(path).map_err(|e| BindingError::FileRead {
			path: path.to_path_buf(),
			source: e,
		})?;

		let is_json = path
			.extension()
			.map(|ext| ext.eq_ignore_ascii_case("json"))
			.unwrap_or(false);

		let parsed = if is_json {
			Self::from_json_str(&content).map_err(|e| e.to_string())
		} else {
			Self::from_toml_str(&content).map_err(|e| e.to_string())
		};

		parsed.map_err(|message| BindingError::Parse {
			path: path.to_path_buf(),
			message,
		})
	}
}

/// Bindings that apply to a single `(type, field)` access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedBindings<'a> {
	pub type_level: Option<&'a ScopeBinding>,
	pub field_level: Option<&'a ScopeBinding>,
}

impl AppliedBindings<'_> {
	pub fn is_empty(&self) -> bool {
		self.type_level.is_none() && self.field_level.is_none()
	}
}

type FieldBindings = HashMap<String, ScopeBinding>;

/// Immutable lookup table from schema elements to their scope bindings.
#[derive(Debug, Clone, Default)]
pub struct BindingRegistry {
	type_bindings: HashMap<String, ScopeBinding>,
	field_bindings: HashMap<String, FieldBindings>,
}

impl BindingRegistry {
	/// Compile metadata using the built-in defaults.
	pub fn from_metadata(metadata: &SchemaMetadata) -> Result<Self, BindingError> {
		Self::from_metadata_with_defaults(metadata, DEFAULT_SCOPE_ARGUMENT, DEFAULT_SCOPE_ENTITY)
	}

	/// Compile metadata, filling unspecified scope arguments and entities
	/// with the given defaults.
	///
	/// # Errors
	///
	/// Returns [`BindingError::Duplicate`] if the same element is annotated
	/// twice, or [`BindingError::Invalid`] for blank names.
	pub fn from_metadata_with_defaults(
		metadata: &SchemaMetadata,
		default_scope_argument: &str,
		default_scope_entity: &str,
	) -> Result<Self, BindingError> {
		let mut registry = Self::default();

		for spec in &metadata.bindings {
			let mut binding = match &spec.field {
				Some(field) => ScopeBinding::for_field(&spec.type_name, field),
				None => ScopeBinding::for_type(&spec.type_name),
			};
			binding.scope_argument = spec
				.scope_argument
				.clone()
				.unwrap_or_else(|| default_scope_argument.to_string());
			binding.scope_entity = spec
				.scope_entity
				.clone()
				.unwrap_or_else(|| default_scope_entity.to_string());

			registry.insert(binding)?;
		}

		tracing::debug!(
			type_bindings = registry.type_bindings.len(),
			field_bindings = registry.field_binding_count(),
			"binding registry built"
		);

		Ok(registry)
	}

	/// Add a binding. Only used while building; the registry is shared
	/// immutably afterwards.
	pub fn insert(&mut self, binding: ScopeBinding) -> Result<(), BindingError> {
		validate(&binding)?;

		let target = binding.applies_to.clone();
		let duplicate = match &target {
			BindingTarget::Type(type_name) => self
				.type_bindings
				.insert(type_name.clone(), binding)
				.is_some(),
			BindingTarget::Field {
				type_name,
				field_name,
			} => self
				.field_bindings
				.entry(type_name.clone())
				.or_default()
				.insert(field_name.clone(), binding)
				.is_some(),
		};

		if duplicate {
			return Err(BindingError::Duplicate(target.to_string()));
		}
		Ok(())
	}

	/// Returns the binding for a type (`field_name = None`) or for a single
	/// field of a type.
	pub fn resolve_binding(&self, type_name: &str, field_name: Option<&str>) -> Option<&ScopeBinding> {
		match field_name {
			None => self.type_bindings.get(type_name),
			Some(field) => self
				.field_bindings
				.get(type_name)
				.and_then(|fields| fields.get(field)),
		}
	}

	/// Returns every binding that applies when resolving `type_name.field_name`.
	pub fn bindings_for(&self, type_name: &str, field_name: &str) -> AppliedBindings<'_> {
		AppliedBindings {
			type_level: self.resolve_binding(type_name, None),
			field_level: self.resolve_binding(type_name, Some(field_name)),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.type_bindings.is_empty() && self.field_bindings.is_empty()
	}

	/// All bindings, type-level first, sorted by target for stable output.
	pub fn iter_sorted(&self) -> Vec<&ScopeBinding> {
		let mut bindings: Vec<&ScopeBinding> = self
			.type_bindings
			.values()
			.chain(self.field_bindings.values().flat_map(|fields| fields.values()))
			.collect();
		bindings.sort_by_key(|b| (b.is_field_level(), b.applies_to.to_string()));
		bindings
	}

	fn field_binding_count(&self) -> usize {
		self.field_bindings.values().map(HashMap::len).sum()
	}
}

fn validate(binding: &ScopeBinding) -> Result<(), BindingError> {
	let invalid = |message: &str| BindingError::Invalid {
		target: binding.applies_to.to_string(),
		message: message.to_string(),
	};

	match &binding.applies_to {
		BindingTarget::Type(type_name) if type_name.trim().is_empty() => {
			return Err(invalid("type name must not be empty"));
		}
		BindingTarget::Field {
			type_name,
			field_name,
		} if type_name.trim().is_empty() || field_name.trim().is_empty() => {
			return Err(invalid("type and field names must not be empty"));
		}
		_ => {}
	}

	if binding.scope_argument.trim().is_empty() {
		return Err(invalid("scope_argument must not be empty"));
	}
	if binding.scope_entity.trim().is_empty() {
		return Err(invalid("scope_entity must not be empty"));
	}
	Ok(())
}
