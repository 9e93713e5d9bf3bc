// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Checklist and item rows. Provisioning only; no visibility filter.

use checklist_server_auth::ScopeId;
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checklist {
	pub id: String,
	pub group_id: Option<ScopeId>,
	pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
	pub id: String,
	pub checklist_id: String,
	pub group_id: Option<ScopeId>,
	pub title: String,
	pub done: bool,
}

#[derive(Clone)]
pub struct ChecklistRepository {
	pool: SqlitePool,
}

impl ChecklistRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, checklist), fields(checklist_id = %checklist.id))]
	pub async fn create_checklist(&self, checklist: &Checklist) -> Result<(), DbError> {
		sqlx::query("INSERT INTO checklists (id, group_id, title) VALUES (?, ?, ?)")
			.bind(&checklist.id)
			.bind(checklist.group_id.as_ref().map(ScopeId::as_str))
			.bind(&checklist.title)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	/// Insert an item. Items inherit nothing from their checklist: the
	/// `group_id` stored on the item is the one authorization sees.
	#[tracing::instrument(skip(self, item), fields(item_id = %item.id, checklist_id = %item.checklist_id))]
	pub async fn create_item(&self, item: &Item) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO items (id, checklist_id, group_id, title, done)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(&item.id)
		.bind(&item.checklist_id)
		.bind(item.group_id.as_ref().map(ScopeId::as_str))
		.bind(&item.title)
		.bind(item.done)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_item(&self, id: &str) -> Result<Option<Item>, DbError> {
		let row = sqlx::query(
			"SELECT id, checklist_id, group_id, title, done FROM items WHERE id = ?",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|row| -> Result<Item, DbError> {
			Ok(Item {
				id: row.try_get("id")?,
				checklist_id: row.try_get("checklist_id")?,
				group_id: row.try_get::<Option<String>, _>("group_id")?.map(ScopeId::new),
				title: row.try_get("title")?,
				done: row.try_get("done")?,
			})
		})
		.transpose()
	}
}
