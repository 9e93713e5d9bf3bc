// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions shared by the authorization engine.
//!
//! - **ID newtypes**: [`SubjectId`] and [`ScopeId`] wrap opaque string keys so a
//!   subject can never be passed where a group is expected
//! - **References**: [`EntityRef`] is a decoded `(type, key)` pair
//! - **Arguments**: [`ArgumentValue`] is the tagged union of shapes a call
//!   argument can take; the executor hands the engine an [`Arguments`] map
//! - **Paths**: [`ResponsePath`] locates a field in the response for error reporting

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_key_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Create a new key from its string form.
			pub fn new(key: impl Into<String>) -> Self {
				Self(key.into())
			}

			/// Get the key as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Consume the wrapper and return the inner string.
			pub fn into_inner(self) -> String {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<String> for $name {
			fn from(key: String) -> Self {
				Self(key)
			}
		}

		impl From<&str> for $name {
			fn from(key: &str) -> Self {
				Self(key.to_string())
			}
		}
	};
}

define_key_type!(SubjectId, "Identifier of the authenticated caller (the `sub` claim).");
define_key_type!(ScopeId, "Internal key of the group a row belongs to.");

// =============================================================================
// References
// =============================================================================

/// A structured reference to an entity whose internal key is already decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
	#[serde(rename = "type")]
	pub type_name: String,
	pub key: String,
}

impl EntityRef {
	pub fn new(type_name: impl Into<String>, key: impl Into<String>) -> Self {
		Self {
			type_name: type_name.into(),
			key: key.into(),
		}
	}

	/// Returns true if this reference points at an entity of the given type.
	pub fn is_type(&self, type_name: &str) -> bool {
		self.type_name == type_name
	}
}

impl fmt::Display for EntityRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.type_name, self.key)
	}
}

// =============================================================================
// Arguments
// =============================================================================

/// Call arguments or input-object fields, keyed by name.
pub type Arguments = BTreeMap<String, ArgumentValue>;

/// Marker key used by the JSON form of a structured reference.
pub const REFERENCE_KEY: &str = "$ref";

/// The shapes a call argument can take once the executor has coerced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
	/// An ID scalar already decoded into a structured reference.
	Reference(EntityRef),
	/// A string, possibly an encoded `base64("<Type>:<key>")` token.
	String(String),
	/// A nested input object.
	Object(Arguments),
	List(Vec<ArgumentValue>),
	/// Any other scalar (numbers, booleans).
	Scalar(Value),
	Null,
}

impl ArgumentValue {
	pub fn is_null(&self) -> bool {
		matches!(self, ArgumentValue::Null)
	}

	pub fn as_object(&self) -> Option<&Arguments> {
		match self {
			ArgumentValue::Object(fields) => Some(fields),
			_ => None,
		}
	}

	/// Build an [`Arguments`] map from a JSON object.
	///
	/// Non-object values produce an empty map.
	pub fn arguments_from_json(value: Value) -> Arguments {
		match ArgumentValue::from(value) {
			ArgumentValue::Object(fields) => fields,
			_ => Arguments::new(),
		}
	}
}

impl From<Value> for ArgumentValue {
	/// Decodes JSON into the tagged union.
	///
	/// An object of the exact shape `{"$ref": {"type": .., "key": ..}}` becomes a
	/// [`ArgumentValue::Reference`]; every other object is an input object.
	fn from(value: Value) -> Self {
		match value {
			Value::Null => ArgumentValue::Null,
			Value::String(s) => ArgumentValue::String(s),
			Value::Array(items) => {
				ArgumentValue::List(items.into_iter().map(ArgumentValue::from).collect())
			}
			Value::Object(map) => {
				if map.len() == 1 {
					if let Some(reference) = map.get(REFERENCE_KEY) {
						if let Ok(entity) = serde_json::from_value::<EntityRef>(reference.clone()) {
							return ArgumentValue::Reference(entity);
						}
					}
				}
				let fields = map
					.into_iter()
					.map(|(k, v)| (k, ArgumentValue::from(v)))
					.collect();
				ArgumentValue::Object(fields)
			}
			other => ArgumentValue::Scalar(other),
		}
	}
}

// =============================================================================
// Response Paths
// =============================================================================

/// One step in a response path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
	Field(String),
	Index(usize),
}

/// Location of a field instance in the response, e.g. `checklist.items[3].title`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponsePath(Vec<PathSegment>);

impl ResponsePath {
	pub fn root() -> Self {
		Self(Vec::new())
	}

	/// Returns a new path extended with a field name.
	pub fn field(&self, name: impl Into<String>) -> Self {
		let mut segments = self.0.clone();
		segments.push(PathSegment::Field(name.into()));
		Self(segments)
	}

	/// Returns a new path extended with a list index.
	pub fn index(&self, index: usize) -> Self {
		let mut segments = self.0.clone();
		segments.push(PathSegment::Index(index));
		Self(segments)
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.0
	}
}

impl fmt::Display for ResponsePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.0.iter().enumerate() {
			match segment {
				PathSegment::Field(name) if i == 0 => f.write_str(name)?,
				PathSegment::Field(name) => write!(f, ".{name}")?,
				PathSegment::Index(index) => write!(f, "[{index}]")?,
			}
		}
		Ok(())
	}
}
