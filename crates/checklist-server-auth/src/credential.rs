// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting holder for the raw bearer credential.
//!
//! The credential is forwarded to the scoped data accessor so downstream
//! visibility rules see the caller's own identity. It must never reach a log
//! line: `Debug` and `Display` print `[REDACTED]`, and the bytes are zeroized
//! on drop. Access requires an explicit [`BearerCredential::expose`].

use std::fmt;
use zeroize::Zeroize;

/// The redaction placeholder used in all output.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct BearerCredential {
	token: String,
}

impl BearerCredential {
	pub fn new(token: impl Into<String>) -> Self {
		Self {
			token: token.into(),
		}
	}

	/// Explicitly access the raw token.
	pub fn expose(&self) -> &str {
		&self.token
	}
}

impl fmt::Debug for BearerCredential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("BearerCredential").field(&REDACTED).finish()
	}
}

impl fmt::Display for BearerCredential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl PartialEq for BearerCredential {
	fn eq(&self, other: &Self) -> bool {
		self.token == other.token
	}
}

impl Eq for BearerCredential {}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn debug_and_display_are_redacted() {
		let credential = BearerCredential::new("eyJhbGciOi.secret.sig");
		assert_eq!(format!("{credential:?}"), "BearerCredential(\"[REDACTED]\")");
		assert_eq!(format!("{credential}"), "[REDACTED]");
		assert_eq!(credential.expose(), "eyJhbGciOi.secret.sig");
	}

	proptest! {
		#[test]
		fn token_never_appears_in_formatting(token in "[a-zA-Z0-9._-]{8,64}") {
			prop_assume!(!"BearerCredential(\"[REDACTED]\")".contains(token.as_str()));
			let credential = BearerCredential::new(token.clone());
			let debug = format!("{:?}", credential);
			let display = format!("{}", credential);
			prop_assert!(!debug.contains(&token));
			prop_assert!(!display.contains(&token));
		}
	}
}
