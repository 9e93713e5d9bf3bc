// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Group-scoped field authorization for the Checklist API.
//!
//! This crate provides:
//! - Bearer credential decoding into a request [`Subject`]
//! - A [`BindingRegistry`] built once from schema metadata that says which
//!   types and fields require a group-membership check
//! - Scope resolution from arguments, nested input objects, or already
//!   resolved object data
//! - The membership predicate, evaluated through a subject-scoped accessor so
//!   the data store's own visibility rules apply to the check itself
//! - [`CheckOutcome`] and the field-over-type combinator
//! - [`AuthzEngine`], the per-field integration point for the query executor
//!
//! # Evaluation Flow
//!
//! ```text
//! FieldRequest → BindingRegistry::bindings_for(type, field)
//!                    │
//!                    ├── type-level binding ──┐
//!                    └── field-level binding ─┤
//!                                             ▼
//!                      resolve_scope: argument → input → object data → unscoped
//!                                             │
//!                                             ▼
//!                      is_member(subject, scope, accessor)
//!                                             │
//!                                             ▼
//!                      combine(type_level, field_level) → FieldDecision
//! ```
//!
//! # Security Considerations
//!
//! - Credentials are held in [`BearerCredential`], which redacts itself in
//!   logs and zeroizes on drop
//! - Provider errors fail closed; nothing is cached between evaluations
//! - A field with no resolvable scope is allowed; see [`scope::ScopeResolution::Unscoped`]

pub mod binding;
pub mod credential;
pub mod error;
pub mod executor;
pub mod identity;
pub mod membership;
pub mod outcome;
pub mod scope;
pub mod types;

pub use binding::{
	AppliedBindings, BindingRegistry, BindingSpec, BindingTarget, SchemaMetadata, ScopeBinding,
	DEFAULT_SCOPE_ARGUMENT, DEFAULT_SCOPE_ENTITY,
};
pub use credential::BearerCredential;
pub use error::{AuthzError, BindingError, CredentialError, ProviderError};
pub use executor::{
	AuthzEngine, ErrorExtensions, FieldDecision, FieldRequest, GraphQlError, GuardState,
	ResponseErrors,
};
pub use identity::{extract_bearer_token, RequestIdentity, Subject};
pub use membership::{
	is_member, AccessorFactory, EntityScope, InMemoryAccessor, InMemoryDirectory, ScopedAccessor,
};
pub use outcome::{combine, combine_all, CheckOutcome};
pub use scope::{decode_scope_token, encode_scope_token, resolve_scope, ScopeResolution, Strategy};
pub use types::{ArgumentValue, Arguments, EntityRef, PathSegment, ResponsePath, ScopeId, SubjectId};
