// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Membership predicate and the subject-scoped data accessor it runs through.
//!
//! The predicate never talks to the store with elevated rights. An
//! [`AccessorFactory`] hands out a [`ScopedAccessor`] bound to the current
//! request's identity, so the store applies the same visibility rules to the
//! authorization check as it will to the data fetch that follows.
//!
//! Calls are not retried and not cached: a provider error fails the single
//! check it supports, and membership changes are visible on the next call.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::{AuthzError, ProviderError};
use crate::identity::{RequestIdentity, Subject};
use crate::outcome::CheckOutcome;
use crate::types::{EntityRef, ScopeId, SubjectId};

/// What an entity lookup found, as seen by the current subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityScope {
	/// The entity does not exist or is not visible to the subject.
	NotFound,
	/// The entity exists but predates scoping and carries no group.
	Unscoped,
	Scoped(ScopeId),
}

/// Data access bound to one request's identity.
#[async_trait]
pub trait ScopedAccessor: Send + Sync {
	/// Does `subject` belong to `scope`?
	async fn is_member(&self, subject: &SubjectId, scope: &ScopeId) -> Result<bool, ProviderError>;

	/// Members of `scope` visible to the current identity.
	async fn list_members(&self, scope: &ScopeId) -> Result<Vec<SubjectId>, ProviderError>;

	/// Look up the scope of an entity referenced by a mutation input.
	async fn scope_of(&self, entity: &EntityRef) -> Result<EntityScope, ProviderError>;
}

/// Creates accessors carrying a request's own credentials.
pub trait AccessorFactory: Send + Sync {
	fn for_identity(&self, identity: &RequestIdentity) -> Arc<dyn ScopedAccessor>;
}

/// Evaluate the membership predicate.
///
/// - member → [`CheckOutcome::Success`]
/// - not a member → [`AuthzError::AccessDenied`]
/// - provider error → [`AuthzError::MembershipCheck`], never success
#[instrument(level = "debug", skip(accessor), fields(subject_id = %subject, scope_id = %scope))]
pub async fn is_member(
	subject: &SubjectId,
	scope: &ScopeId,
	accessor: &dyn ScopedAccessor,
) -> CheckOutcome {
	match accessor.is_member(subject, scope).await {
		Ok(true) => CheckOutcome::Success,
		Ok(false) => CheckOutcome::failure(AuthzError::AccessDenied),
		Err(e) => {
			tracing::warn!(error = %e, "membership provider call failed");
			CheckOutcome::failure(e.into())
		}
	}
}

// =============================================================================
// In-memory directory
// =============================================================================

#[derive(Debug, Default)]
struct DirectoryState {
	members: HashMap<ScopeId, BTreeSet<SubjectId>>,
	entities: HashMap<EntityRef, Option<ScopeId>>,
	outage: Option<String>,
}

impl DirectoryState {
	fn contains(&self, subject: &SubjectId, scope: &ScopeId) -> bool {
		self.members
			.get(scope)
			.map(|members| members.contains(subject))
			.unwrap_or(false)
	}
}

/// Membership provider held in memory.
///
/// Applies the same visibility rules as the SQL-backed provider: a
/// non-privileged subject only sees membership rows and entities of groups it
/// belongs to, plus unscoped entities.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
	state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn add_member(&self, scope: impl Into<ScopeId>, subject: impl Into<SubjectId>) {
		let mut state = self.state.write().await;
		state
			.members
			.entry(scope.into())
			.or_default()
			.insert(subject.into());
	}

	/// Returns true if a membership was removed.
	pub async fn remove_member(&self, scope: &ScopeId, subject: &SubjectId) -> bool {
		let mut state = self.state.write().await;
		state
			.members
			.get_mut(scope)
			.map(|members| members.remove(subject))
			.unwrap_or(false)
	}

	/// Record an entity and the group it belongs to (`None` for legacy rows).
	pub async fn insert_entity(&self, entity: EntityRef, scope: Option<ScopeId>) {
		self.state.write().await.entities.insert(entity, scope);
	}

	/// Make every subsequent call fail with the given message.
	pub async fn fail_with(&self, message: impl Into<String>) {
		self.state.write().await.outage = Some(message.into());
	}

	pub async fn recover(&self) {
		self.state.write().await.outage = None;
	}

	/// An accessor bound to `subject`.
	pub fn accessor_for(&self, subject: &Subject) -> InMemoryAccessor {
		InMemoryAccessor {
			state: Arc::clone(&self.state),
			viewer: subject.clone(),
		}
	}
}

impl AccessorFactory for InMemoryDirectory {
	fn for_identity(&self, identity: &RequestIdentity) -> Arc<dyn ScopedAccessor> {
		Arc::new(self.accessor_for(&identity.subject))
	}
}

/// [`ScopedAccessor`] over an [`InMemoryDirectory`].
#[derive(Debug, Clone)]
pub struct InMemoryAccessor {
	state: Arc<RwLock<DirectoryState>>,
	viewer: Subject,
}

impl InMemoryAccessor {
	fn can_see(&self, state: &DirectoryState, scope: &ScopeId) -> bool {
		self.viewer.is_privileged || state.contains(&self.viewer.id, scope)
	}

	fn check_outage(state: &DirectoryState) -> Result<(), ProviderError> {
		match &state.outage {
			Some(message) => Err(ProviderError::Unavailable(message.clone())),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl ScopedAccessor for InMemoryAccessor {
	async fn is_member(&self, subject: &SubjectId, scope: &ScopeId) -> Result<bool, ProviderError> {
		let state = self.state.read().await;
		Self::check_outage(&state)?;
		Ok(self.can_see(&state, scope) && state.contains(subject, scope))
	}

	async fn list_members(&self, scope: &ScopeId) -> Result<Vec<SubjectId>, ProviderError> {
		let state = self.state.read().await;
		Self::check_outage(&state)?;
		if !self.can_see(&state, scope) {
			return Ok(Vec::new());
		}
		Ok(state
			.members
			.get(scope)
			.map(|members| members.iter().cloned().collect())
			.unwrap_or_default())
	}

	async fn scope_of(&self, entity: &EntityRef) -> Result<EntityScope, ProviderError> {
		let state = self.state.read().await;
		Self::check_outage(&state)?;
		Ok(match state.entities.get(entity) {
			None => EntityScope::NotFound,
			Some(None) => EntityScope::Unscoped,
			Some(Some(scope)) if self.can_see(&state, scope) => EntityScope::Scoped(scope.clone()),
			Some(Some(_)) => EntityScope::NotFound,
		})
	}
}
