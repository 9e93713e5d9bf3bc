// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the checklist server.
//!
//! - [`SqliteAccessorFactory`] is the membership provider the authorization
//!   engine runs through, filtered by the requesting subject's groups.
//! - [`MembershipRepository`] and [`ChecklistRepository`] are unfiltered
//!   provisioning repositories.

pub mod accessor;
pub mod checklist;
pub mod error;
pub mod membership;
pub mod pool;
pub mod schema;

#[cfg(test)]
mod testing;

pub use accessor::{SqliteAccessorFactory, SqliteScopedAccessor};
pub use checklist::{Checklist, ChecklistRepository, Item};
pub use error::{DbError, Result};
pub use membership::{Group, MembershipRepository, MembershipStore};
pub use pool::create_pool;
pub use schema::run_migrations;
pub use sqlx::sqlite::SqlitePool;
