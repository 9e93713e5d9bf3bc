// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Subject-scoped data access over SQLite.
//!
//! SQLite has no row-level security, so every query here carries the
//! visibility filter itself: a non-privileged subject sees membership rows
//! and entities only for groups it belongs to, plus entities that have no
//! group. Privileged subjects see everything. The filter is bound per query,
//! never cached.

use async_trait::async_trait;
use checklist_server_auth::{
	AccessorFactory, EntityRef, EntityScope, ProviderError, RequestIdentity, ScopeId,
	ScopedAccessor, Subject, SubjectId,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::sync::Arc;

use crate::error::DbError;

/// Rows the current subject can see, as a SQL predicate over `column`.
///
/// Binds: `is_privileged`, `viewer_id`.
fn visible_to_viewer(column: &str) -> String {
	format!("(? OR {column} IN (SELECT vm.group_id FROM group_members vm WHERE vm.user_id = ?))")
}

/// Entity type → (table, column holding the owning group).
fn entity_table(type_name: &str) -> Option<(&'static str, &'static str)> {
	match type_name {
		"Group" => Some(("groups", "id")),
		"Checklist" => Some(("checklists", "group_id")),
		"Item" => Some(("items", "group_id")),
		_ => None,
	}
}

/// Hands out accessors bound to each request's subject.
#[derive(Clone)]
pub struct SqliteAccessorFactory {
	pool: SqlitePool,
}

impl SqliteAccessorFactory {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn accessor_for(&self, subject: &Subject) -> SqliteScopedAccessor {
		SqliteScopedAccessor {
			pool: self.pool.clone(),
			viewer: subject.clone(),
		}
	}
}

impl AccessorFactory for SqliteAccessorFactory {
	fn for_identity(&self, identity: &RequestIdentity) -> Arc<dyn ScopedAccessor> {
		Arc::new(self.accessor_for(&identity.subject))
	}
}

/// [`ScopedAccessor`] that filters every query by the viewer's groups.
#[derive(Clone)]
pub struct SqliteScopedAccessor {
	pool: SqlitePool,
	viewer: Subject,
}

impl SqliteScopedAccessor {
	#[tracing::instrument(skip(self), fields(viewer = %self.viewer.id))]
	async fn member_exists(&self, subject: &SubjectId, scope: &ScopeId) -> Result<bool, DbError> {
		let sql = format!(
			"SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ? AND {}) AS found",
			visible_to_viewer("group_id")
		);
		let row = sqlx::query(&sql)
			.bind(scope.as_str())
			.bind(subject.as_str())
			.bind(self.viewer.is_privileged)
			.bind(self.viewer.id.as_str())
			.fetch_one(&self.pool)
			.await?;
		Ok(row.try_get::<bool, _>("found")?)
	}

	#[tracing::instrument(skip(self), fields(viewer = %self.viewer.id))]
	async fn visible_members(&self, scope: &ScopeId) -> Result<Vec<SubjectId>, DbError> {
		let sql = format!(
			"SELECT user_id FROM group_members WHERE group_id = ? AND {} ORDER BY user_id",
			visible_to_viewer("group_id")
		);
		let rows = sqlx::query(&sql)
			.bind(scope.as_str())
			.bind(self.viewer.is_privileged)
			.bind(self.viewer.id.as_str())
			.fetch_all(&self.pool)
			.await?;
		rows
			.iter()
			.map(|row| Ok(SubjectId::new(row.try_get::<String, _>("user_id")?)))
			.collect()
	}

	#[tracing::instrument(skip(self), fields(viewer = %self.viewer.id, entity = %entity))]
	async fn entity_scope(&self, entity: &EntityRef) -> Result<EntityScope, DbError> {
		let Some((table, column)) = entity_table(&entity.type_name) else {
			tracing::debug!("no table for entity type");
			return Ok(EntityScope::NotFound);
		};

		let sql = format!(
			"SELECT {column} AS group_id FROM {table} WHERE id = ? AND ({column} IS NULL OR {})",
			visible_to_viewer(column)
		);
		let row = sqlx::query(&sql)
			.bind(entity.key.as_str())
			.bind(self.viewer.is_privileged)
			.bind(self.viewer.id.as_str())
			.fetch_optional(&self.pool)
			.await?;

		Ok(match row {
			None => EntityScope::NotFound,
			Some(row) => match row.try_get::<Option<String>, _>("group_id")? {
				Some(group) => EntityScope::Scoped(ScopeId::new(group)),
				None => EntityScope::Unscoped,
			},
		})
	}
}

#[async_trait]
impl ScopedAccessor for SqliteScopedAccessor {
	async fn is_member(&self, subject: &SubjectId, scope: &ScopeId) -> Result<bool, ProviderError> {
		Ok(self.member_exists(subject, scope).await?)
	}

	async fn list_members(&self, scope: &ScopeId) -> Result<Vec<SubjectId>, ProviderError> {
		Ok(self.visible_members(scope).await?)
	}

	async fn scope_of(&self, entity: &EntityRef) -> Result<EntityScope, ProviderError> {
		Ok(self.entity_scope(entity).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::checklist::{Checklist, ChecklistRepository, Item};
	use crate::membership::MembershipRepository;
	use crate::testing::create_test_pool;
	use checklist_server_auth::{
		encode_scope_token, ArgumentValue, AuthzEngine, AuthzError, BearerCredential,
		BindingRegistry, FieldRequest, ScopeBinding,
	};
	use serde_json::json;

	async fn seeded_pool() -> SqlitePool {
		let pool = create_test_pool().await;
		let groups = MembershipRepository::new(pool.clone());
		groups.create_group(&"g1".into(), "Household").await.unwrap();
		groups.create_group(&"g2".into(), "Office").await.unwrap();
		groups.add_member(&"g1".into(), &"alice".into()).await.unwrap();
		groups.add_member(&"g1".into(), &"carol".into()).await.unwrap();
		groups.add_member(&"g2".into(), &"bob".into()).await.unwrap();

		let lists = ChecklistRepository::new(pool.clone());
		for (id, group) in [("c1", Some("g1")), ("c2", Some("g2")), ("c0", None)] {
			lists
				.create_checklist(&Checklist {
					id: id.into(),
					group_id: group.map(ScopeId::from),
					title: id.into(),
				})
				.await
				.unwrap();
		}
		for (id, checklist, group) in [("i1", "c1", Some("g1")), ("i2", "c2", Some("g2")), ("i0", "c0", None)] {
			lists
				.create_item(&Item {
					id: id.into(),
					checklist_id: checklist.into(),
					group_id: group.map(ScopeId::from),
					title: id.into(),
					done: false,
				})
				.await
				.unwrap();
		}
		pool
	}

	fn alice() -> Subject {
		Subject::new("alice")
	}

	#[tokio::test]
	async fn membership_is_answered_for_own_groups() {
		let accessor = SqliteAccessorFactory::new(seeded_pool().await).accessor_for(&alice());
		assert!(accessor.is_member(&"alice".into(), &"g1".into()).await.unwrap());
		assert!(!accessor.is_member(&"alice".into(), &"g2".into()).await.unwrap());
	}

	#[tokio::test]
	async fn foreign_membership_rows_are_invisible() {
		let factory = SqliteAccessorFactory::new(seeded_pool().await);
		let accessor = factory.accessor_for(&alice());
		assert!(!accessor.is_member(&"bob".into(), &"g2".into()).await.unwrap());
		assert!(accessor.list_members(&"g2".into()).await.unwrap().is_empty());
		assert_eq!(
			accessor.list_members(&"g1".into()).await.unwrap(),
			vec![SubjectId::from("alice"), SubjectId::from("carol")]
		);

		let admin = factory.accessor_for(&Subject::new("root").privileged());
		assert!(admin.is_member(&"bob".into(), &"g2".into()).await.unwrap());
	}

	#[tokio::test]
	async fn entity_lookup_respects_visibility() {
		let accessor = SqliteAccessorFactory::new(seeded_pool().await).accessor_for(&alice());
		let scope = |t: &str, k: &str| {
			let accessor = accessor.clone();
			let entity = EntityRef::new(t, k);
			async move { accessor.scope_of(&entity).await.unwrap() }
		};

		assert_eq!(scope("Item", "i1").await, EntityScope::Scoped("g1".into()));
		assert_eq!(scope("Item", "i2").await, EntityScope::NotFound);
		assert_eq!(scope("Item", "i0").await, EntityScope::Unscoped);
		assert_eq!(scope("Item", "missing").await, EntityScope::NotFound);
		assert_eq!(scope("Checklist", "c1").await, EntityScope::Scoped("g1".into()));
		assert_eq!(scope("Group", "g1").await, EntityScope::Scoped("g1".into()));
		assert_eq!(scope("Group", "g2").await, EntityScope::NotFound);
		assert_eq!(scope("Widget", "w1").await, EntityScope::NotFound);
	}

	#[tokio::test]
	async fn closed_pool_is_provider_failure() {
		let pool = seeded_pool().await;
		let accessor = SqliteAccessorFactory::new(pool.clone()).accessor_for(&alice());
		pool.close().await;

		let err = accessor
			.is_member(&"alice".into(), &"g1".into())
			.await
			.unwrap_err();
		assert!(matches!(err, ProviderError::Unavailable(_)));
	}

	#[tokio::test]
	async fn engine_over_sqlite() {
		let pool = seeded_pool().await;
		let mut registry = BindingRegistry::default();
		registry
			.insert(ScopeBinding::for_field("Mutation", "updateItem"))
			.unwrap();
		let engine = AuthzEngine::new(
			Arc::new(registry),
			Arc::new(SqliteAccessorFactory::new(pool)),
		);
		let identity = RequestIdentity::new(alice(), BearerCredential::new("a.b.c"));

		let update = |item: &str| {
			FieldRequest::new("Mutation", "updateItem").with_arguments(
				ArgumentValue::arguments_from_json(
					json!({"input": {"id": encode_scope_token("Item", item)}}),
				),
			)
		};

		assert!(engine.authorize(&identity, &update("i1")).await.is_allowed());
		assert!(engine.authorize(&identity, &update("i0")).await.is_allowed());
		assert_eq!(
			engine.authorize(&identity, &update("i2")).await.into_result(),
			Err(AuthzError::ScopeResolution {
				entity: "Item".into()
			})
		);
	}
}
