// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization error types.
//!
//! - [`CredentialError`]: the bearer credential could not be decoded. Fatal to
//!   the whole request, raised before any field is resolved.
//! - [`AuthzError`]: a single field or type check failed. Always field-scoped.
//! - [`ProviderError`]: the membership provider or entity lookup failed.
//! - [`BindingError`]: binding metadata could not be loaded at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Errors decoding a bearer credential into a subject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
	/// No credential was supplied.
	#[error("authentication required")]
	Missing,

	/// The token does not have exactly three dot-separated segments.
	#[error("malformed credential: expected 3 segments, found {0}")]
	WrongSegmentCount(usize),

	/// The payload segment is not valid base64url.
	#[error("malformed credential: payload is not valid base64")]
	PayloadEncoding,

	/// The payload decoded but is not a JSON claims object.
	#[error("malformed credential: payload is not valid JSON: {0}")]
	PayloadJson(String),

	/// The claims carry no usable `sub`.
	#[error("malformed credential: missing subject claim")]
	MissingSubject,
}

/// A field-scoped authorization failure.
///
/// Each variant is reported at the failing field's path in the response's
/// error list; none of them abort sibling evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
	/// An entity used to derive the scope could not be found.
	#[error("{entity} not found")]
	ScopeResolution { entity: String },

	/// The membership provider call failed. Fails closed.
	#[error("failed to check group membership: {0}")]
	MembershipCheck(String),

	/// The subject is not a member of the resolved group.
	#[error("not a member of this group")]
	AccessDenied,
}

impl AuthzError {
	/// Stable machine-readable code for GraphQL error extensions.
	pub fn code(&self) -> &'static str {
		match self {
			AuthzError::ScopeResolution { .. } => "SCOPE_NOT_FOUND",
			AuthzError::MembershipCheck(_) => "MEMBERSHIP_CHECK_FAILED",
			AuthzError::AccessDenied => "ACCESS_DENIED",
		}
	}

	/// Returns true if this error should be logged at warn level.
	pub fn is_internal(&self) -> bool {
		matches!(self, AuthzError::MembershipCheck(_))
	}
}

/// Errors returned by a membership provider or scoped data accessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
	#[error("provider unavailable: {0}")]
	Unavailable(String),

	#[error("provider query failed: {0}")]
	Query(String),
}

impl From<ProviderError> for AuthzError {
	fn from(e: ProviderError) -> Self {
		AuthzError::MembershipCheck(e.to_string())
	}
}

/// Errors building the binding registry from schema metadata.
#[derive(Debug, Error)]
pub enum BindingError {
	#[error("duplicate binding for {0}")]
	Duplicate(String),

	#[error("invalid binding for {target}: {message}")]
	Invalid { target: String, message: String },

	#[error("failed to read binding metadata {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse binding metadata {path}: {message}")]
	Parse { path: PathBuf, message: String },
}
