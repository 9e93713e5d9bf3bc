// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use checklist_server_auth::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
	/// True for unique or primary key violations.
	pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
		matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
	}
}

impl From<DbError> for ProviderError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::Sqlx(
				sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
			) => ProviderError::Unavailable(err.to_string()),
			other => ProviderError::Query(other.to_string()),
		}
	}
}
