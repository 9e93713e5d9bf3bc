// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request identity: decoding a bearer credential into a [`Subject`].
//!
//! Decoding is local and pure. The credential's signature has already been
//! verified by the gateway in front of the API, so only the claims payload is
//! read here:
//!
//! ```text
//! Authorization: Bearer <header>.<payload>.<signature>
//!                                   │
//!                                   └── base64url JSON { sub, role?, app_metadata? }
//! ```
//!
//! The resulting [`RequestIdentity`] is built once per request and passed
//! explicitly through every evaluation; there is no ambient "current user".

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use serde::Deserialize;
use tracing::instrument;

use crate::credential::BearerCredential;
use crate::error::CredentialError;
use crate::types::SubjectId;

/// Role claim granted to trusted backend callers.
pub const SERVICE_ROLE: &str = "service_role";

/// The authenticated caller of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
	pub id: SubjectId,
	/// Privileged subjects bypass the membership predicate.
	pub is_privileged: bool,
}

impl Subject {
	pub fn new(id: impl Into<SubjectId>) -> Self {
		Self {
			id: id.into(),
			is_privileged: false,
		}
	}

	/// Builder: mark the subject as privileged.
	pub fn privileged(mut self) -> Self {
		self.is_privileged = true;
		self
	}

	/// Decode a subject from a bearer credential's claims.
	///
	/// # Errors
	///
	/// Returns [`CredentialError`] if the token does not have three segments,
	/// the payload is not base64url JSON, or the `sub` claim is missing or empty.
	pub fn from_bearer(token: &str) -> Result<Self, CredentialError> {
		let segments: Vec<&str> = token.split('.').collect();
		if segments.len() != 3 {
			return Err(CredentialError::WrongSegmentCount(segments.len()));
		}

		let payload = decode_segment(segments[1])?;
		let claims: Claims = serde_json::from_slice(&payload)
			.map_err(|e| CredentialError::PayloadJson(e.to_string()))?;

		let sub = claims
			.sub
			.filter(|s| !s.trim().is_empty())
			.ok_or(CredentialError::MissingSubject)?;

		let is_privileged = claims.role.as_deref() == Some(SERVICE_ROLE)
			|| claims
				.app_metadata
				.and_then(|m| m.is_admin)
				.unwrap_or(false);

		Ok(Self {
			id: SubjectId::new(sub),
			is_privileged,
		})
	}
}

#[derive(Debug, Deserialize)]
struct Claims {
	#[serde(default)]
	sub: Option<String>,
	#[serde(default)]
	role: Option<String>,
	#[serde(default)]
	app_metadata: Option<AppMetadata>,
}

#[derive(Debug, Deserialize)]
struct AppMetadata {
	#[serde(default)]
	is_admin: Option<bool>,
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, CredentialError> {
	URL_SAFE_NO_PAD
		.decode(segment)
		.or_else(|_| URL_SAFE.decode(segment))
		.map_err(|_| CredentialError::PayloadEncoding)
}

/// Everything the engine knows about the caller of one request.
///
/// Owned by the request; cloned cheaply into concurrent evaluations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
	pub subject: Subject,
	pub credential: BearerCredential,
}

impl RequestIdentity {
	pub fn new(subject: Subject, credential: BearerCredential) -> Self {
		Self {
			subject,
			credential,
		}
	}

	/// Decode the identity for a request from its bearer token.
	#[instrument(level = "debug", skip_all, fields(subject_id = tracing::field::Empty))]
	pub fn from_bearer(token: &str) -> Result<Self, CredentialError> {
		let subject = Subject::from_bearer(token)?;
		tracing::Span::current().record("subject_id", tracing::field::display(&subject.id));
		tracing::debug!(privileged = subject.is_privileged, "identity decoded");
		Ok(Self::new(subject, BearerCredential::new(token)))
	}

	/// Decode the identity from request headers.
	///
	/// # Errors
	///
	/// Returns [`CredentialError::Missing`] when there is no bearer token.
	pub fn from_headers(headers: &HeaderMap) -> Result<Self, CredentialError> {
		let token = extract_bearer_token(headers).ok_or(CredentialError::Missing)?;
		Self::from_bearer(&token)
	}
}

/// Extract bearer token from the Authorization header.
///
/// Expects the format: `Authorization: Bearer <token>`
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
	let auth_header = headers.get(AUTHORIZATION)?;
	let auth_str = auth_header.to_str().ok()?;
	auth_str
		.strip_prefix("Bearer ")
		.map(|token| token.to_string())
}
