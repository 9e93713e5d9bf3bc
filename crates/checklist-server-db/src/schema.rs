// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Table definitions. `group_id` on checklists and items is nullable: rows
//! created before groups existed have none.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS groups (
		id TEXT PRIMARY KEY NOT NULL,
		name TEXT NOT NULL,
		created_at TEXT NOT NULL DEFAULT (datetime('now'))
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS group_members (
		group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL,
		created_at TEXT NOT NULL DEFAULT (datetime('now')),
		PRIMARY KEY (group_id, user_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_group_members_user_id ON group_members(user_id)",
	r#"
	CREATE TABLE IF NOT EXISTS checklists (
		id TEXT PRIMARY KEY NOT NULL,
		group_id TEXT REFERENCES groups(id) ON DELETE CASCADE,
		title TEXT NOT NULL,
		created_at TEXT NOT NULL DEFAULT (datetime('now'))
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS items (
		id TEXT PRIMARY KEY NOT NULL,
		checklist_id TEXT NOT NULL REFERENCES checklists(id) ON DELETE CASCADE,
		group_id TEXT REFERENCES groups(id) ON DELETE CASCADE,
		title TEXT NOT NULL,
		done INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL DEFAULT (datetime('now'))
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_items_checklist_id ON items(checklist_id)",
];

/// Create all tables. Safe to run repeatedly.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = STATEMENTS.len(), "schema up to date");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use sqlx::Row;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let rows = sqlx::query(
			"SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
		)
		.fetch_all(&pool)
		.await
		.unwrap();
		let tables: Vec<String> = rows.iter().map(|r| r.get("name")).collect();
		assert_eq!(tables, vec!["checklists", "group_members", "groups", "items"]);
	}
}
