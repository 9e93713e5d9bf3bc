// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope resolution: finding the group a guarded value belongs to.
//!
//! Strategies run in a fixed order and stop at the first non-null result:
//!
//! 1. **Direct argument** `args[scope_argument]`, either a decoded reference or
//!    an encoded `base64("<Type>:<key>")` token. A token that does not decode
//!    is used verbatim as the key. An empty key is treated like null.
//! 2. **Nested input** `args.input`: first `input[scope_argument]`, then
//!    `input.id` when it references some other entity, which is looked up
//!    through the scoped accessor to find *its* group. A referenced entity that
//!    cannot be found is a terminal failure.
//! 3. **Object data** `object[scope_argument]` on the already-resolved parent.
//! 4. **Unscoped**: nothing found. The caller allows the access so rows created
//!    before groups existed stay reachable.

use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde_json::{Map, Value};
use std::fmt;
use tracing::instrument;

use crate::binding::ScopeBinding;
use crate::error::AuthzError;
use crate::membership::{EntityScope, ScopedAccessor};
use crate::types::{ArgumentValue, Arguments, EntityRef, ScopeId, REFERENCE_KEY};

/// Argument holding a mutation's input object.
pub const INPUT_ARGUMENT: &str = "input";

/// Input attribute identifying the row a mutation targets.
pub const INPUT_ID_FIELD: &str = "id";

/// Decodes tokens with or without trailing padding.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::STANDARD,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which strategy produced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	DirectArgument,
	InputAttribute,
	InputReference,
	ObjectData,
}

impl fmt::Display for Strategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Strategy::DirectArgument => write!(f, "direct_argument"),
			Strategy::InputAttribute => write!(f, "input_attribute"),
			Strategy::InputReference => write!(f, "input_reference"),
			Strategy::ObjectData => write!(f, "object_data"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeResolution {
	Found { scope: ScopeId, strategy: Strategy },
	/// No strategy produced a scope; treated as default-allow.
	Unscoped,
}

/// Encode a reference in the on-wire token format `base64("<Type>:<key>")`.
pub fn encode_scope_token(type_name: &str, key: &str) -> String {
	STANDARD.encode(format!("{type_name}:{key}"))
}

/// Decode a `base64("<Type>:<key>")` token.
///
/// The key is everything after the first colon, so a type name must not
/// contain a colon while a key may. Either side may be empty. Returns `None`
/// only if the token is not base64, not UTF-8, or has no colon.
pub fn decode_scope_token(token: &str) -> Option<EntityRef> {
	let bytes = TOKEN_ENGINE.decode(token).ok()?;
	let decoded = String::from_utf8(bytes).ok()?;
	let (type_name, key) = decoded.split_once(':')?;
	Some(EntityRef::new(type_name, key))
}

/// An empty key names no group and counts as absent.
fn non_empty(key: String) -> Option<ScopeId> {
	(!key.is_empty()).then(|| ScopeId::new(key))
}

/// Interpret an argument as a scope key (strategy 1 rules).
fn scope_from_argument(value: &ArgumentValue) -> Option<ScopeId> {
	match value {
		ArgumentValue::Reference(entity) => non_empty(entity.key.clone()),
		ArgumentValue::String(raw) => match decode_scope_token(raw) {
			Some(entity) => non_empty(entity.key),
			None => non_empty(raw.clone()),
		},
		ArgumentValue::Scalar(Value::Number(n)) => Some(ScopeId::new(n.to_string())),
		_ => None,
	}
}

/// Interpret an `input.id` value as a reference to another entity.
fn reference_from_argument(value: &ArgumentValue) -> Option<EntityRef> {
	match value {
		ArgumentValue::Reference(entity) => Some(entity.clone()),
		ArgumentValue::String(raw) => decode_scope_token(raw),
		_ => None,
	}
	.filter(|entity| !entity.key.is_empty())
}

/// Read a scope key straight off resolved object data (strategy 3).
fn scope_from_object(value: &Value) -> Option<ScopeId> {
	match value {
		Value::String(key) => non_empty(key.clone()),
		Value::Number(n) => Some(ScopeId::new(n.to_string())),
		Value::Object(map) => map
			.get(REFERENCE_KEY)
			.and_then(|r| serde_json::from_value::<EntityRef>(r.clone()).ok())
			.and_then(|entity| non_empty(entity.key)),
		_ => None,
	}
}

/// Resolve the scope for one binding.
///
/// # Errors
///
/// - [`AuthzError::ScopeResolution`] if `input.id` references an entity the
///   accessor cannot find
/// - [`AuthzError::MembershipCheck`] if that lookup itself fails
#[instrument(
	level = "debug",
	skip_all,
	fields(target = %binding.applies_to, scope_argument = %binding.scope_argument)
)]
pub async fn resolve_scope(
	binding: &ScopeBinding,
	arguments: &Arguments,
	object_data: Option<&Map<String, Value>>,
	accessor: &dyn ScopedAccessor,
) -> Result<ScopeResolution, AuthzError> {
	let found = |scope: ScopeId, strategy: Strategy| -> Result<ScopeResolution, AuthzError> {
		tracing::debug!(scope_id = %scope, %strategy, "scope resolved");
		Ok(ScopeResolution::Found { scope, strategy })
	};

	// 1. Direct argument
	if let Some(scope) = arguments
		.get(&binding.scope_argument)
		.and_then(scope_from_argument)
	{
		return found(scope, Strategy::DirectArgument);
	}

	// 2. Nested input object
	if let Some(input) = arguments.get(INPUT_ARGUMENT).and_then(ArgumentValue::as_object) {
		if let Some(scope) = input
			.get(&binding.scope_argument)
			.and_then(scope_from_argument)
		{
			return found(scope, Strategy::InputAttribute);
		}

		if let Some(entity) = input.get(INPUT_ID_FIELD).and_then(reference_from_argument) {
			if entity.is_type(&binding.scope_entity) {
				return found(ScopeId::new(entity.key), Strategy::InputReference);
			}

			match accessor.scope_of(&entity).await? {
				EntityScope::Scoped(scope) => return found(scope, Strategy::InputReference),
				EntityScope::NotFound => {
					tracing::debug!(entity = %entity, "referenced entity not found");
					return Err(AuthzError::ScopeResolution {
						entity: entity.type_name,
					});
				}
				EntityScope::Unscoped => {
					tracing::debug!(entity = %entity, "referenced entity has no group");
				}
			}
		}
	}

	// 3. Resolved object data
	if let Some(scope) = object_data
		.and_then(|data| data.get(&binding.scope_argument))
		.and_then(scope_from_object)
	{
		return found(scope, Strategy::ObjectData);
	}

	// 4. Nothing determinable
	tracing::debug!("no scope determinable");
	Ok(ScopeResolution::Unscoped)
}
