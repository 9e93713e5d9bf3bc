// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Group and membership repository.
//!
//! This runs with the server's own connection and no visibility filter. It is
//! for provisioning and tooling; authorization checks go through
//! [`crate::accessor::SqliteScopedAccessor`] instead.

use async_trait::async_trait;
use checklist_server_auth::{ScopeId, SubjectId};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::DbError;

/// A group row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
	pub id: ScopeId,
	pub name: String,
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
	async fn create_group(&self, id: &ScopeId, name: &str) -> Result<Group, DbError>;
	async fn get_group(&self, id: &ScopeId) -> Result<Option<Group>, DbError>;
	async fn add_member(&self, group_id: &ScopeId, user_id: &SubjectId) -> Result<(), DbError>;
	async fn remove_member(&self, group_id: &ScopeId, user_id: &SubjectId) -> Result<bool, DbError>;
	async fn list_members(&self, group_id: &ScopeId) -> Result<Vec<SubjectId>, DbError>;
	async fn list_groups_for_user(&self, user_id: &SubjectId) -> Result<Vec<Group>, DbError>;
}

/// Repository for group and membership rows.
#[derive(Clone)]
pub struct MembershipRepository {
	pool: SqlitePool,
}

impl MembershipRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create a group.
	///
	/// # Errors
	/// Returns `DbError::Conflict` if a group with this id already exists.
	#[tracing::instrument(skip(self), fields(group_id = %id))]
	pub async fn create_group(&self, id: &ScopeId, name: &str) -> Result<Group, DbError> {
		sqlx::query("INSERT INTO groups (id, name) VALUES (?, ?)")
			.bind(id.as_str())
			.bind(name)
			.execute(&self.pool)
			.await
			.map_err(|e| {
				if DbError::is_unique_violation(&e) {
					DbError::Conflict(format!("group {id} already exists"))
				} else {
					DbError::Sqlx(e)
				}
			})?;

		tracing::debug!(group_id = %id, "group created");
		Ok(Group {
			id: id.clone(),
			name: name.to_string(),
		})
	}

	#[tracing::instrument(skip(self), fields(group_id = %id))]
	pub async fn get_group(&self, id: &ScopeId) -> Result<Option<Group>, DbError> {
		let row = sqlx::query("SELECT id, name FROM groups WHERE id = ?")
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await?;

		row.map(|row| row_to_group(&row)).transpose()
	}

	/// Add a user to a group. Adding an existing member is a no-op.
	///
	/// # Errors
	/// Returns `DbError::NotFound` if the group does not exist.
	#[tracing::instrument(skip(self), fields(group_id = %group_id, user_id = %user_id))]
	pub async fn add_member(&self, group_id: &ScopeId, user_id: &SubjectId) -> Result<(), DbError> {
		if self.get_group(group_id).await?.is_none() {
			return Err(DbError::NotFound(format!("group {group_id}")));
		}

		sqlx::query(
			r#"
			INSERT INTO group_members (group_id, user_id)
			VALUES (?, ?)
			ON CONFLICT (group_id, user_id) DO NOTHING
			"#,
		)
		.bind(group_id.as_str())
		.bind(user_id.as_str())
		.execute(&self.pool)
		.await?;

		tracing::debug!(group_id = %group_id, user_id = %user_id, "member added to group");
		Ok(())
	}

	/// Remove a user from a group.
	///
	/// # Returns
	/// `true` if a member was removed, `false` if not found.
	#[tracing::instrument(skip(self), fields(group_id = %group_id, user_id = %user_id))]
	pub async fn remove_member(
		&self,
		group_id: &ScopeId,
		user_id: &SubjectId,
	) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
			.bind(group_id.as_str())
			.bind(user_id.as_str())
			.execute(&self.pool)
			.await?;

		let removed = result.rows_affected() > 0;
		if removed {
			tracing::debug!(group_id = %group_id, user_id = %user_id, "member removed from group");
		}
		Ok(removed)
	}

	/// Members of a group, ordered by user id.
	#[tracing::instrument(skip(self), fields(group_id = %group_id))]
	pub async fn list_members(&self, group_id: &ScopeId) -> Result<Vec<SubjectId>, DbError> {
		let rows = sqlx::query(
			"SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id",
		)
		.bind(group_id.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows
			.iter()
			.map(|row| Ok(SubjectId::new(row.try_get::<String, _>("user_id")?)))
			.collect()
	}

	/// Groups a user belongs to, ordered by id.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn list_groups_for_user(&self, user_id: &SubjectId) -> Result<Vec<Group>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT g.id, g.name
			FROM groups g
			JOIN group_members m ON m.group_id = g.id
			WHERE m.user_id = ?
			ORDER BY g.id
			"#,
		)
		.bind(user_id.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_group).collect()
	}
}

fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<Group, DbError> {
	Ok(Group {
		id: ScopeId::new(row.try_get::<String, _>("id")?),
		name: row.try_get("name")?,
	})
}

#[async_trait]
impl MembershipStore for MembershipRepository {
	async fn create_group(&self, id: &ScopeId, name: &str) -> Result<Group, DbError> {
		self.create_group(id, name).await
	}

	async fn get_group(&self, id: &ScopeId) -> Result<Option<Group>, DbError> {
		self.get_group(id).await
	}

	async fn add_member(&self, group_id: &ScopeId, user_id: &SubjectId) -> Result<(), DbError> {
		self.add_member(group_id, user_id).await
	}

	async fn remove_member(&self, group_id: &ScopeId, user_id: &SubjectId) -> Result<bool, DbError> {
		self.remove_member(group_id, user_id).await
	}

	async fn list_members(&self, group_id: &ScopeId) -> Result<Vec<SubjectId>, DbError> {
		self.list_members(group_id).await
	}

	async fn list_groups_for_user(&self, user_id: &SubjectId) -> Result<Vec<Group>, DbError> {
		self.list_groups_for_user(user_id).await
	}
}
