// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Execution integration: the hook the query executor calls per field instance.
//!
//! For every field it is about to resolve, the executor builds a
//! [`FieldRequest`] and awaits [`AuthzEngine::authorize`]. Each instance moves
//! through its own [`GuardState`]:
//!
//! ```text
//! NotEvaluated ──start──▶ Evaluating ──settle──▶ Allowed
//!                                       └──────▶ Denied(cause)
//! ```
//!
//! Sibling fields and list items are evaluated independently and may run
//! concurrently ([`AuthzEngine::authorize_all`]). Nothing mutable is shared
//! between evaluations: the registry is read-only and the identity belongs to
//! the request. A denial nulls only its own value and adds one entry to the
//! response's error list; it never aborts the rest of the response.
//!
//! Dropping the future returned by `authorize` cancels any in-flight provider
//! call. The engine applies no timeout of its own.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use crate::binding::{BindingRegistry, ScopeBinding};
use crate::error::AuthzError;
use crate::identity::RequestIdentity;
use crate::membership::{is_member, AccessorFactory, ScopedAccessor};
use crate::outcome::{combine, CheckOutcome};
use crate::scope::{resolve_scope, ScopeResolution};
use crate::types::{Arguments, ResponsePath};

// =============================================================================
// Guard state
// =============================================================================

/// Authorization state of one field or type instance.
///
/// Transitions out of a terminal state are ignored, so a settled instance can
/// never flip from denied to allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GuardState {
	#[default]
	NotEvaluated,
	Evaluating,
	Allowed,
	Denied(AuthzError),
}

impl GuardState {
	pub fn start(self) -> Self {
		match self {
			GuardState::NotEvaluated => GuardState::Evaluating,
			other => other,
		}
	}

	pub fn settle(self, outcome: &CheckOutcome) -> Self {
		match (self, outcome) {
			(GuardState::Evaluating, CheckOutcome::Success) => GuardState::Allowed,
			(GuardState::Evaluating, CheckOutcome::Failure { cause, .. }) => {
				GuardState::Denied(cause.clone())
			}
			(other, _) => other,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, GuardState::Allowed | GuardState::Denied(_))
	}
}

impl fmt::Display for GuardState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			GuardState::NotEvaluated => write!(f, "not_evaluated"),
			GuardState::Evaluating => write!(f, "evaluating"),
			GuardState::Allowed => write!(f, "allowed"),
			GuardState::Denied(_) => write!(f, "denied"),
		}
	}
}

// =============================================================================
// Requests and decisions
// =============================================================================

/// One field instance the executor is about to resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRequest {
	/// Type that declares the field; its type-level binding applies.
	pub parent_type: String,
	pub field_name: String,
	pub path: ResponsePath,
	pub arguments: Arguments,
	/// The parent object's already-resolved data, when there is a parent.
	pub object_data: Option<Map<String, Value>>,
}

impl FieldRequest {
	pub fn new(parent_type: impl Into<String>, field_name: impl Into<String>) -> Self {
		let field_name = field_name.into();
		Self {
			parent_type: parent_type.into(),
			path: ResponsePath::root().field(field_name.clone()),
			field_name,
			arguments: Arguments::new(),
			object_data: None,
		}
	}

	/// Builder: set the response path.
	pub fn at(mut self, path: ResponsePath) -> Self {
		self.path = path;
		self
	}

	/// Builder: set the call arguments.
	pub fn with_arguments(mut self, arguments: Arguments) -> Self {
		self.arguments = arguments;
		self
	}

	/// Builder: set the parent object's resolved data.
	pub fn with_object_data(mut self, object_data: Map<String, Value>) -> Self {
		self.object_data = Some(object_data);
		self
	}
}

/// A GraphQL response error entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphQlError {
	pub message: String,
	pub path: ResponsePath,
	pub extensions: ErrorExtensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorExtensions {
	pub code: &'static str,
}

impl GraphQlError {
	pub fn from_cause(cause: &AuthzError, path: &ResponsePath) -> Self {
		Self {
			message: cause.to_string(),
			path: path.clone(),
			extensions: ErrorExtensions { code: cause.code() },
		}
	}
}

/// The settled result of authorizing one field instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecision {
	pub path: ResponsePath,
	pub state: GuardState,
	pub outcome: CheckOutcome,
	/// False when no binding applied and nothing was evaluated.
	pub guarded: bool,
}

impl FieldDecision {
	fn unguarded(path: ResponsePath) -> Self {
		Self {
			path,
			state: GuardState::Allowed,
			outcome: CheckOutcome::Success,
			guarded: false,
		}
	}

	pub fn is_allowed(&self) -> bool {
		self.state == GuardState::Allowed
	}

	/// The error to attach to the response, if the failure is reportable.
	pub fn error(&self) -> Option<GraphQlError> {
		match &self.outcome {
			CheckOutcome::Failure {
				cause,
				reportable: true,
			} => Some(GraphQlError::from_cause(cause, &self.path)),
			_ => None,
		}
	}

	/// Resolver view: a denied field returns its cause.
	pub fn into_result(self) -> Result<(), AuthzError> {
		match self.state {
			GuardState::Denied(cause) => Err(cause),
			_ => Ok(()),
		}
	}

	/// Response view: allowed values pass through, denied values become null
	/// with an error at this field's path.
	pub fn apply(&self, value: Value) -> (Value, Option<GraphQlError>) {
		if self.is_allowed() {
			(value, None)
		} else {
			(Value::Null, self.error())
		}
	}
}

/// Error list of one response, kept in response path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResponseErrors(Vec<GraphQlError>);

impl ResponseErrors {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a decision; only reportable failures add an entry.
	pub fn record(&mut self, decision: &FieldDecision) {
		if let Some(error) = decision.error() {
			self.push(error);
		}
	}

	/// Insert an error at its path position; equal paths keep arrival order.
	pub fn push(&mut self, error: GraphQlError) {
		let at = self.0.partition_point(|existing| existing.path <= error.path);
		self.0.insert(at, error);
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &GraphQlError> {
		self.0.iter()
	}

	pub fn into_vec(self) -> Vec<GraphQlError> {
		self.0
	}
}

// =============================================================================
// Engine
// =============================================================================

/// Per-field authorization hook shared by all requests.
#[derive(Clone)]
pub struct AuthzEngine {
	registry: Arc<BindingRegistry>,
	accessors: Arc<dyn AccessorFactory>,
	enabled: bool,
}

impl fmt::Debug for AuthzEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AuthzEngine")
			.field("registry", &self.registry)
			.field("enabled", &self.enabled)
			.finish_non_exhaustive()
	}
}

impl AuthzEngine {
	pub fn new(registry: Arc<BindingRegistry>, accessors: Arc<dyn AccessorFactory>) -> Self {
		Self {
			registry,
			accessors,
			enabled: true,
		}
	}

	/// Builder: disable enforcement entirely (every field is unguarded).
	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	pub fn registry(&self) -> &BindingRegistry {
		&self.registry
	}

	/// Returns true if resolving `parent_type.field_name` needs a check.
	pub fn requires_check(&self, parent_type: &str, field_name: &str) -> bool {
		self.enabled && !self.registry.bindings_for(parent_type, field_name).is_empty()
	}

	/// Authorize one field instance for the request's identity.
	#[instrument(
		level = "debug",
		skip_all,
		fields(
			subject_id = %identity.subject.id,
			parent_type = %request.parent_type,
			field = %request.field_name,
			path = %request.path,
		)
	)]
	pub async fn authorize(&self, identity: &RequestIdentity, request: &FieldRequest) -> FieldDecision {
		let applied = self
			.registry
			.bindings_for(&request.parent_type, &request.field_name);

		if !self.enabled || applied.is_empty() {
			return FieldDecision::unguarded(request.path.clone());
		}

		let state = GuardState::NotEvaluated.start();

		let outcome = if identity.subject.is_privileged {
			tracing::debug!("privileged subject bypasses membership check");
			CheckOutcome::Success
		} else {
			let accessor = self.accessors.for_identity(identity);
			let (type_level, field_level) = futures::join!(
				evaluate_optional(applied.type_level, identity, request, accessor.as_ref()),
				evaluate_optional(applied.field_level, identity, request, accessor.as_ref()),
			);
			combine(type_level, field_level)
		};

		let state = state.settle(&outcome);
		match &state {
			GuardState::Denied(cause) if cause.is_internal() => {
				tracing::warn!(error = %cause, code = cause.code(), "field authorization failed");
			}
			GuardState::Denied(cause) => {
				tracing::info!(reason = %cause, code = cause.code(), "field access denied");
			}
			_ => tracing::debug!("field access allowed"),
		}

		FieldDecision {
			path: request.path.clone(),
			state,
			outcome,
			guarded: true,
		}
	}

	/// Authorize many independent instances concurrently.
	///
	/// Decisions come back in input order; one denial does not affect the others.
	pub async fn authorize_all(
		&self,
		identity: &RequestIdentity,
		requests: &[FieldRequest],
	) -> Vec<FieldDecision> {
		futures::future::join_all(requests.iter().map(|request| self.authorize(identity, request)))
			.await
	}
}

async fn evaluate_optional(
	binding: Option<&ScopeBinding>,
	identity: &RequestIdentity,
	request: &FieldRequest,
	accessor: &dyn ScopedAccessor,
) -> CheckOutcome {
	match binding {
		Some(binding) => evaluate_binding(binding, identity, request, accessor).await,
		None => CheckOutcome::Success,
	}
}

async fn evaluate_binding(
	binding: &ScopeBinding,
	identity: &RequestIdentity,
	request: &FieldRequest,
	accessor: &dyn ScopedAccessor,
) -> CheckOutcome {
	let resolution = resolve_scope(
		binding,
		&request.arguments,
		request.object_data.as_ref(),
		accessor,
	)
	.await;

	match resolution {
		Ok(ScopeResolution::Found { scope, .. }) => {
			is_member(&identity.subject.id, &scope, accessor).await
		}
		// TODO: default-allow for unscoped rows is pending product review; add a
		// per-binding `require_scope` flag once legacy rows are backfilled.
		Ok(ScopeResolution::Unscoped) => CheckOutcome::Success,
		Err(cause) => CheckOutcome::failure(cause),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::binding::SchemaMetadata;
	use crate::credential::BearerCredential;
	use crate::identity::Subject;
	use crate::membership::InMemoryDirectory;
	use crate::scope::encode_scope_token;
	use crate::types::{ArgumentValue, EntityRef};
	use serde_json::json;

	const METADATA: &str = r#"
		[[binding]]
		type = "Query"
		field = "items"

		[[binding]]
		type = "Mutation"
		field = "updateItem"

		[[binding]]
		type = "Item"

		[[binding]]
		type = "Item"
		field = "notes"
		scope_argument = "notesGroupId"
	"#;

	async fn setup() -> (AuthzEngine, InMemoryDirectory) {
		let directory = InMemoryDirectory::new();
		directory.add_member("g1", "alice").await;
		directory.add_member("g2", "bob").await;
		directory
			.insert_entity(EntityRef::new("Item", "i1"), Some("g1".into()))
			.await;

		let metadata = SchemaMetadata::from_toml_str(METADATA).unwrap();
		let registry = Arc::new(BindingRegistry::from_metadata(&metadata).unwrap());
		let engine = AuthzEngine::new(registry, Arc::new(directory.clone()));
		(engine, directory)
	}

	fn identity(subject: Subject) -> RequestIdentity {
		RequestIdentity::new(subject, BearerCredential::new("test.token.sig"))
	}

	fn alice() -> RequestIdentity {
		identity(Subject::new("alice"))
	}

	fn args(value: Value) -> Arguments {
		ArgumentValue::arguments_from_json(value)
	}

	fn object(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => panic!("expected object"),
		}
	}

	fn items_query(group: &str) -> FieldRequest {
		FieldRequest::new("Query", "items")
			.with_arguments(args(json!({"groupId": encode_scope_token("Group", group)})))
	}

	mod guard_state {
		use super::*;

		#[test]
		fn success_settles_allowed() {
			let state = GuardState::NotEvaluated.start().settle(&CheckOutcome::Success);
			assert_eq!(state, GuardState::Allowed);
		}

		#[test]
		fn failure_settles_denied() {
			let state = GuardState::NotEvaluated
				.start()
				.settle(&CheckOutcome::failure(AuthzError::AccessDenied));
			assert_eq!(state, GuardState::Denied(AuthzError::AccessDenied));
		}

		#[test]
		fn terminal_states_are_absorbing() {
			let denied = GuardState::Denied(AuthzError::AccessDenied);
			assert_eq!(denied.clone().start(), denied);
			assert_eq!(denied.clone().settle(&CheckOutcome::Success), denied);
			assert!(denied.is_terminal());
		}

		#[test]
		fn cannot_settle_before_start() {
			let state = GuardState::NotEvaluated.settle(&CheckOutcome::Success);
			assert_eq!(state, GuardState::NotEvaluated);
			assert!(!state.is_terminal());
		}
	}

	mod authorize {
		use super::*;

		#[tokio::test]
		async fn member_scope_argument_is_allowed() {
			let (engine, _) = setup().await;
			let decision = engine.authorize(&alice(), &items_query("g1")).await;
			assert!(decision.is_allowed());
			assert!(decision.guarded);
			assert_eq!(decision.error(), None);
		}

		#[tokio::test]
		async fn non_member_scope_argument_is_denied() {
			let (engine, _) = setup().await;
			let decision = engine.authorize(&alice(), &items_query("g2")).await;
			assert!(!decision.is_allowed());
			let error = decision.error().unwrap();
			assert!(error.message.contains("not a member of this group"));
			assert_eq!(error.extensions.code, "ACCESS_DENIED");
		}

		#[tokio::test]
		async fn unannotated_field_is_unguarded() {
			let (engine, _) = setup().await;
			let decision = engine
				.authorize(&alice(), &FieldRequest::new("Query", "me"))
				.await;
			assert!(decision.is_allowed());
			assert!(!decision.guarded);
		}

		#[tokio::test]
		async fn disabled_engine_guards_nothing() {
			let (engine, _) = setup().await;
			let engine = engine.with_enabled(false);
			assert!(!engine.requires_check("Query", "items"));
			let decision = engine.authorize(&alice(), &items_query("g2")).await;
			assert!(decision.is_allowed());
		}

		#[tokio::test]
		async fn mutation_input_id_of_member_group_is_allowed() {
			let (engine, _) = setup().await;
			let request = FieldRequest::new("Mutation", "updateItem").with_arguments(args(
				json!({"input": {"id": {"$ref": {"type": "Item", "key": "i1"}}, "done": true}}),
			));
			assert!(engine.authorize(&alice(), &request).await.is_allowed());
		}

		#[tokio::test]
		async fn mutation_input_id_not_found_is_scope_error() {
			let (engine, _) = setup().await;
			let request = FieldRequest::new("Mutation", "updateItem").with_arguments(args(
				json!({"input": {"id": {"$ref": {"type": "Item", "key": "gone"}}}}),
			));
			let decision = engine.authorize(&alice(), &request).await;
			assert_eq!(
				decision.into_result(),
				Err(AuthzError::ScopeResolution {
					entity: "Item".into()
				})
			);
		}

		#[tokio::test]
		async fn legacy_object_without_scope_is_allowed() {
			let (engine, _) = setup().await;
			let request = FieldRequest::new("Item", "title")
				.with_object_data(object(json!({"id": "old", "groupId": null})));
			let decision = engine.authorize(&identity(Subject::new("mallory")), &request).await;
			assert!(decision.is_allowed());
			assert!(decision.guarded);
		}

		#[tokio::test]
		async fn no_scope_anywhere_is_allowed_for_any_subject() {
			let (engine, _) = setup().await;
			for subject in ["alice", "bob", "nobody"] {
				let request = FieldRequest::new("Query", "items");
				let decision = engine.authorize(&identity(Subject::new(subject)), &request).await;
				assert!(decision.is_allowed(), "{subject} should be allowed");
			}
		}

		#[tokio::test]
		async fn provider_failure_is_never_success() {
			let (engine, directory) = setup().await;
			directory.fail_with("network unreachable").await;
			let decision = engine.authorize(&alice(), &items_query("g1")).await;
			assert!(!decision.is_allowed());
			let error = decision.error().unwrap();
			assert!(error.message.contains("failed to check group membership"));
			assert_eq!(error.extensions.code, "MEMBERSHIP_CHECK_FAILED");
		}

		#[tokio::test]
		async fn privileged_subject_bypasses_membership() {
			let (engine, directory) = setup().await;
			directory.fail_with("should not be called").await;
			let admin = identity(Subject::new("root").privileged());
			assert!(engine.authorize(&admin, &items_query("g2")).await.is_allowed());
		}

		#[tokio::test]
		async fn type_level_failure_applies_to_every_field() {
			let (engine, _) = setup().await;
			let request = FieldRequest::new("Item", "title")
				.with_object_data(object(json!({"id": "i2", "groupId": "g2"})));
			let decision = engine.authorize(&alice(), &request).await;
			assert_eq!(decision.into_result(), Err(AuthzError::AccessDenied));
		}

		#[tokio::test]
		async fn field_level_failure_takes_precedence() {
			let (engine, _) = setup().await;
			// Type-level looks for `groupId`, finds only an unknown input.id and
			// fails resolution; field-level reads `notesGroupId` and is denied.
			let request = FieldRequest::new("Item", "notes").with_arguments(args(json!({
				"notesGroupId": encode_scope_token("Group", "g2"),
				"input": {"id": {"$ref": {"type": "Note", "key": "n1"}}}
			})));
			let decision = engine.authorize(&alice(), &request).await;
			assert_eq!(decision.into_result(), Err(AuthzError::AccessDenied));
		}

		#[tokio::test]
		async fn revoked_membership_is_seen_immediately() {
			let (engine, directory) = setup().await;
			assert!(engine.authorize(&alice(), &items_query("g1")).await.is_allowed());
			directory
				.remove_member(&"g1".into(), &"alice".into())
				.await;
			assert!(!engine.authorize(&alice(), &items_query("g1")).await.is_allowed());
		}
	}

	mod response {
		use super::*;

		#[tokio::test]
		async fn denied_items_are_nulled_independently() {
			let (engine, _) = setup().await;
			let list = ResponsePath::root().field("items");
			let requests: Vec<FieldRequest> = [("i1", "g1"), ("i2", "g2"), ("i3", "g1")]
				.iter()
				.enumerate()
				.map(|(i, (id, group))| {
					FieldRequest::new("Item", "title")
						.at(list.index(i).field("title"))
						.with_object_data(object(json!({"id": id, "groupId": group})))
				})
				.collect();

			let decisions = engine.authorize_all(&alice(), &requests).await;
			let mut errors = ResponseErrors::new();
			let values: Vec<Value> = decisions
				.iter()
				.map(|decision| {
					errors.record(decision);
					decision.apply(json!("title")).0
				})
				.collect();

			assert_eq!(values, vec![json!("title"), Value::Null, json!("title")]);
			assert_eq!(errors.len(), 1);
			let error = errors.iter().next().unwrap();
			assert_eq!(error.path.to_string(), "items[1].title");
		}

		#[test]
		fn error_serializes_in_graphql_shape() {
			let path = ResponsePath::root().field("items").index(0);
			let error = GraphQlError::from_cause(&AuthzError::AccessDenied, &path);
			assert_eq!(
				serde_json::to_value(&error).unwrap(),
				json!({
					"message": "not a member of this group",
					"path": ["items", 0],
					"extensions": {"code": "ACCESS_DENIED"}
				})
			);
		}

		#[test]
		fn errors_are_kept_in_path_order() {
			let list = ResponsePath::root().field("items");
			let mut errors = ResponseErrors::new();
			for i in [2, 0, 1] {
				errors.push(GraphQlError::from_cause(
					&AuthzError::AccessDenied,
					&list.index(i),
				));
			}
			let paths: Vec<String> = errors.iter().map(|e| e.path.to_string()).collect();
			assert_eq!(paths, vec!["items[0]", "items[1]", "items[2]"]);
		}

		#[test]
		fn unreportable_failure_adds_no_error() {
			let decision = FieldDecision {
				path: ResponsePath::root().field("x"),
				state: GuardState::Denied(AuthzError::AccessDenied),
				outcome: CheckOutcome::Failure {
					cause: AuthzError::AccessDenied,
					reportable: false,
				},
				guarded: true,
			};
			let (value, error) = decision.apply(json!(1));
			assert_eq!(value, Value::Null);
			assert!(error.is_none());
		}
	}
}
