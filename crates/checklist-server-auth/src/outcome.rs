// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Check outcomes and the rule for merging type-level and field-level results.

use crate::error::AuthzError;

/// Result of evaluating one binding for one field or type instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
	Success,
	Failure {
		cause: AuthzError,
		/// The executor must surface reportable failures in the response's
		/// error list rather than silently nulling the value.
		reportable: bool,
	},
}

impl CheckOutcome {
	/// A reportable failure. Every failure the engine produces is built here.
	pub fn failure(cause: AuthzError) -> Self {
		CheckOutcome::Failure {
			cause,
			reportable: true,
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, CheckOutcome::Success)
	}

	pub fn cause(&self) -> Option<&AuthzError> {
		match self {
			CheckOutcome::Success => None,
			CheckOutcome::Failure { cause, .. } => Some(cause),
		}
	}
}

impl From<Result<(), AuthzError>> for CheckOutcome {
	fn from(result: Result<(), AuthzError>) -> Self {
		match result {
			Ok(()) => CheckOutcome::Success,
			Err(cause) => CheckOutcome::failure(cause),
		}
	}
}

/// Merge the type-level and field-level outcomes for the same value.
///
/// A field-level failure always wins. Otherwise whichever side failed wins,
/// and two successes are a success.
pub fn combine(type_level: CheckOutcome, field_level: CheckOutcome) -> CheckOutcome {
	match (type_level, field_level) {
		(_, field @ CheckOutcome::Failure { .. }) => field,
		(type_failure @ CheckOutcome::Failure { .. }, CheckOutcome::Success) => type_failure,
		(CheckOutcome::Success, CheckOutcome::Success) => CheckOutcome::Success,
	}
}

/// Fold outcomes in declaration order, outermost first; later outcomes take
/// precedence over earlier ones, matching [`combine`].
pub fn combine_all(outcomes: impl IntoIterator<Item = CheckOutcome>) -> CheckOutcome {
	outcomes
		.into_iter()
		.fold(CheckOutcome::Success, combine)
}
