//! Permission checks shared by handlers. Grounded on
//! `examples/original_source/backend/permissions.go`: an owner can do
//! anything on their table; a contributor may read and write but may not
//! grant a permission stronger than their own.

use uuid::Uuid;

use crate::domain::Permission;
use crate::error::{AppError, AppResult};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
	Read,
	Write,
}

pub async fn check_table_permission(
	store: &dyn Store,
	user_id: Uuid,
	table_id: Uuid,
	access: Access,
) -> AppResult<bool> {
	let Some(permission) = store.get_permission(user_id, table_id).await? else {
		return Ok(false);
	};
	Ok(match permission {
		Permission::Owner => true,
		Permission::Contributor => matches!(access, Access::Read | Access::Write),
	})
}

pub async fn check_branch_permission(
	store: &dyn Store,
	user_id: Uuid,
	branch_id: Uuid,
	access: Access,
) -> AppResult<bool> {
	let Some(branch) = store.get_branch(branch_id).await? else {
		return Ok(false);
	};
	check_table_permission(store, user_id, branch.table_id, access).await
}

pub async fn check_sheet_permission(
	store: &dyn Store,
	user_id: Uuid,
	sheet_id: Uuid,
	access: Access,
) -> AppResult<bool> {
	let Some(sheet) = store.get_sheet(sheet_id).await? else {
		return Ok(false);
	};
	check_branch_permission(store, user_id, sheet.branch_id, access).await
}

/// True iff `granter` may assign `target` permission on `table_id`: the
/// granter must themselves hold a permission at least as strong (weight <=)
/// as what they're assigning.
pub async fn can_assign_permission(
	store: &dyn Store,
	granter: Uuid,
	table_id: Uuid,
	target: Permission,
) -> AppResult<bool> {
	let Some(granter_permission) = store.get_permission(granter, table_id).await? else {
		return Ok(false);
	};
	Ok(granter_permission.can_grant(target))
}

pub async fn require_branch_permission(
	store: &dyn Store,
	user_id: Uuid,
	branch_id: Uuid,
	access: Access,
	what: &str,
) -> AppResult<()> {
	if check_branch_permission(store, user_id, branch_id, access).await? {
		Ok(())
	} else {
		Err(AppError::Authorization(format!("no {:?} permission on {}", access, what)))
	}
}

pub async fn require_table_permission(
	store: &dyn Store,
	user_id: Uuid,
	table_id: Uuid,
	access: Access,
	what: &str,
) -> AppResult<()> {
	if check_table_permission(store, user_id, table_id, access).await? {
		Ok(())
	} else {
		Err(AppError::Authorization(format!("no {:?} permission on {}", access, what)))
	}
}

pub async fn require_sheet_permission(
	store: &dyn Store,
	user_id: Uuid,
	sheet_id: Uuid,
	access: Access,
	what: &str,
) -> AppResult<()> {
	if check_sheet_permission(store, user_id, sheet_id, access).await? {
		Ok(())
	} else {
		Err(AppError::Authorization(format!("no {:?} permission on {}", access, what)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::FakeStore;

	#[tokio::test]
	async fn owner_has_write_access() {
		let store = FakeStore::new();
		let owner = store.create_user("owner@example.com", "hash").await.unwrap();
		let project = store.create_project("demo", owner.id).await.unwrap();
		store
			.grant_permission(owner.id, project.id, Permission::Owner)
			.await
			.unwrap();

		assert!(check_table_permission(&store, owner.id, project.id, Access::Write).await.unwrap());
	}

	#[tokio::test]
	async fn contributor_cannot_grant_owner() {
		let store = FakeStore::new();
		let owner = store.create_user("owner@example.com", "hash").await.unwrap();
		let contributor = store.create_user("contrib@example.com", "hash").await.unwrap();
		let project = store.create_project("demo", owner.id).await.unwrap();
		store
			.grant_permission(owner.id, project.id, Permission::Owner)
			.await
			.unwrap();
		store
			.grant_permission(contributor.id, project.id, Permission::Contributor)
			.await
			.unwrap();

		assert!(
			!can_assign_permission(&store, contributor.id, project.id, Permission::Owner)
				.await
				.unwrap()
		);
		assert!(
			can_assign_permission(&store, contributor.id, project.id, Permission::Contributor)
				.await
				.unwrap()
		);
	}

	#[tokio::test]
	async fn unrelated_user_has_no_access() {
		let store = FakeStore::new();
		let owner = store.create_user("owner@example.com", "hash").await.unwrap();
		let stranger = store.create_user("stranger@example.com", "hash").await.unwrap();
		let project = store.create_project("demo", owner.id).await.unwrap();
		store
			.grant_permission(owner.id, project.id, Permission::Owner)
			.await
			.unwrap();

		assert!(!check_table_permission(&store, stranger.id, project.id, Access::Read).await.unwrap());
	}
}
