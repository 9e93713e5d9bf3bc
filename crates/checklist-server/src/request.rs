// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JSON wire format for `checklist-server check`.
//!
//! ```json
//! {
//!   "token": "<bearer jwt>",
//!   "fields": [
//!     { "type": "Query", "field": "items", "arguments": { "groupId": "R3JvdXA6ZzE=" } },
//!     { "type": "Item", "field": "title", "path": ["items", 0, "title"],
//!       "object": { "id": "i1", "groupId": "g1" }, "value": "Milk" }
//!   ]
//! }
//! ```

use checklist_server_auth::{
	ArgumentValue, FieldDecision, FieldRequest, GraphQlError, ResponseErrors, ResponsePath,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
	pub token: String,
	#[serde(default)]
	pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
pub struct FieldSpec {
	#[serde(rename = "type")]
	pub parent_type: String,
	pub field: String,
	#[serde(default)]
	pub path: Option<ResponsePath>,
	#[serde(default)]
	pub arguments: Map<String, Value>,
	#[serde(default)]
	pub object: Option<Map<String, Value>>,
	/// Resolved value to pass through or null out.
	#[serde(default)]
	pub value: Value,
}

impl FieldSpec {
	pub fn to_field_request(&self) -> FieldRequest {
		let mut request = FieldRequest::new(&self.parent_type, &self.field).with_arguments(
			ArgumentValue::arguments_from_json(Value::Object(self.arguments.clone())),
		);
		if let Some(path) = &self.path {
			request = request.at(path.clone());
		}
		if let Some(object) = &self.object {
			request = request.with_object_data(object.clone());
		}
		request
	}
}

#[derive(Debug, Serialize)]
pub struct FieldReport {
	pub path: ResponsePath,
	pub allowed: bool,
	pub guarded: bool,
	pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
	pub fields: Vec<FieldReport>,
	pub errors: Vec<GraphQlError>,
}

impl CheckReport {
	/// Apply each decision to its field's value and collect the errors.
	pub fn build(specs: &[FieldSpec], decisions: &[FieldDecision]) -> Self {
		let mut errors = ResponseErrors::new();
		let fields = specs
			.iter()
			.zip(decisions)
			.map(|(spec, decision)| {
				let (value, error) = decision.apply(spec.value.clone());
				if let Some(error) = error {
					errors.push(error);
				}
				FieldReport {
					path: decision.path.clone(),
					allowed: decision.is_allowed(),
					guarded: decision.guarded,
					value,
				}
			})
			.collect();

		Self {
			fields,
			errors: errors.into_vec(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use checklist_server_auth::{AuthzError, CheckOutcome, GuardState};
	use serde_json::json;

	fn parse(value: Value) -> CheckRequest {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn field_spec_builds_request() {
		let request = parse(json!({
			"token": "a.b.c",
			"fields": [{
				"type": "Item",
				"field": "title",
				"path": ["items", 2, "title"],
				"arguments": {"groupId": "g1"},
				"object": {"groupId": "g1"}
			}]
		}));

		let field = request.fields[0].to_field_request();
		assert_eq!(field.parent_type, "Item");
		assert_eq!(field.path.to_string(), "items[2].title");
		assert!(field.arguments.contains_key("groupId"));
		assert!(field.object_data.is_some());
	}

	#[test]
	fn default_path_is_field_name() {
		let request = parse(json!({"token": "t", "fields": [{"type": "Query", "field": "items"}]}));
		assert_eq!(request.fields[0].to_field_request().path.to_string(), "items");
	}

	#[test]
	fn report_nulls_denied_values() {
		let request = parse(json!({
			"token": "t",
			"fields": [
				{"type": "Item", "field": "title", "value": "Milk"},
				{"type": "Item", "field": "title", "value": "Secret"}
			]
		}));
		let path = ResponsePath::root().field("title");
		let decisions = vec![
			FieldDecision {
				path: path.clone(),
				state: GuardState::Allowed,
				outcome: CheckOutcome::Success,
				guarded: true,
			},
			FieldDecision {
				path,
				state: GuardState::Denied(AuthzError::AccessDenied),
				outcome: CheckOutcome::failure(AuthzError::AccessDenied),
				guarded: true,
			},
		];

		let report = CheckReport::build(&request.fields, &decisions);
		assert_eq!(report.fields[0].value, json!("Milk"));
		assert_eq!(report.fields[1].value, Value::Null);
		assert_eq!(report.errors.len(), 1);
		assert_eq!(report.errors[0].extensions.code, "ACCESS_DENIED");
	}
}
