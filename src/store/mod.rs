//! Storage contract. `PgStore` (postgres.rs) is the production implementation;
//! `FakeStore` (fake.rs) is an in-memory double used by unit tests so the core
//! merge/copy logic can be exercised without a live database.

pub mod fake;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Branch, BranchMergeRow, Column, ColumnData, Permission, Project, RefreshToken, Sheet, User, UserTable};
use crate::error::AppResult;

pub use fake::FakeStore;
pub use postgres::PgStore;

/// Everything the rest of the service needs from persistence. Implementors
/// must be safe to share across request-handling tasks.
#[async_trait]
pub trait Store: Send + Sync + 'static {
	// --- users ---
	async fn create_user(&self, email: &str, password_hash: &str) -> AppResult<User>;
	async fn get_user_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
	async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
	async fn set_opened_sheet(&self, user_id: Uuid, sheet_id: Option<Uuid>) -> AppResult<()>;

	// --- refresh tokens ---
	async fn create_refresh_token(&self, token: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<RefreshToken>;
	async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshToken>>;
	async fn revoke_refresh_token(&self, token: &str) -> AppResult<()>;

	// --- projects (tables) ---
	async fn create_project(&self, name: &str, owner_id: Uuid) -> AppResult<Project>;
	async fn get_project(&self, id: Uuid) -> AppResult<Option<Project>>;
	async fn rename_project(&self, id: Uuid, name: &str) -> AppResult<()>;
	async fn change_game_url(&self, id: Uuid, game_url: Option<&str>) -> AppResult<()>;
	async fn delete_project(&self, id: Uuid) -> AppResult<()>;
	async fn list_projects_for_user(&self, user_id: Uuid) -> AppResult<Vec<Project>>;

	// --- permissions ---
	async fn grant_permission(&self, user_id: Uuid, table_id: Uuid, permission: Permission) -> AppResult<UserTable>;
	async fn get_permission(&self, user_id: Uuid, table_id: Uuid) -> AppResult<Option<Permission>>;
	async fn list_permissions_for_table(&self, table_id: Uuid) -> AppResult<Vec<UserTable>>;

	// --- branches ---
	async fn create_branch(&self, name: &str, table_id: Uuid, is_protected: bool) -> AppResult<Branch>;
	async fn get_branch(&self, id: Uuid) -> AppResult<Option<Branch>>;
	async fn list_branches_for_table(&self, table_id: Uuid) -> AppResult<Vec<Branch>>;
	async fn update_branch(&self, id: Uuid, name: &str, is_protected: bool) -> AppResult<()>;
	async fn delete_branch(&self, id: Uuid) -> AppResult<()>;
	/// The canonical merge-source branch: the oldest branch of the project.
	async fn get_oldest_branch_from_table(&self, table_id: Uuid) -> AppResult<Option<Branch>>;

	// --- sheets ---
	async fn create_sheet(&self, sheet: NewSheet) -> AppResult<Sheet>;
	async fn get_sheet(&self, id: Uuid) -> AppResult<Option<Sheet>>;
	async fn list_sheets_for_branch(&self, branch_id: Uuid) -> AppResult<Vec<Sheet>>;
	async fn rename_sheet(&self, id: Uuid, name: &str) -> AppResult<()>;
	async fn delete_sheet(&self, id: Uuid) -> AppResult<()>;

	// --- columns ---
	async fn create_column(&self, column: NewColumn) -> AppResult<Column>;
	async fn get_column(&self, id: Uuid) -> AppResult<Option<Column>>;
	async fn list_columns_for_sheet(&self, sheet_id: Uuid) -> AppResult<Vec<Column>>;
	async fn update_column(&self, id: Uuid, name: &str, column_type: &str, required: bool) -> AppResult<()>;
	async fn delete_column(&self, id: Uuid) -> AppResult<()>;
	async fn swap_columns(&self, a: Uuid, b: Uuid) -> AppResult<()>;
	/// As `swap_columns`, but checks `requester`'s write permission on the
	/// columns' sheet first, matching `swap_columns.go`'s combined contract.
	async fn swap_columns_with_permission_check(&self, requester: Uuid, a: Uuid, b: Uuid) -> AppResult<()>;
	/// Runs the permission check and the write in one call, as
	/// `update_column.go` does — avoids a check-then-act round trip.
	async fn update_column_with_permission_check(
		&self,
		requester: Uuid,
		id: Uuid,
		name: &str,
		column_type: &str,
		required: bool,
	) -> AppResult<()>;

	// --- cell data ---
	async fn add_column_data(&self, column_id: Uuid, idx: i64, value: Option<&str>, cell_type: Option<&str>) -> AppResult<ColumnData>;
	async fn update_column_data(&self, id: Uuid, value: Option<&str>, cell_type: Option<&str>) -> AppResult<()>;
	async fn update_column_data_with_permission_check(
		&self,
		requester: Uuid,
		id: Uuid,
		value: Option<&str>,
		cell_type: Option<&str>,
	) -> AppResult<()>;
	async fn delete_row(&self, sheet_id: Uuid, idx: i64) -> AppResult<()>;
	async fn get_columns_with_data_by_sheet(&self, sheet_id: Uuid) -> AppResult<Vec<(Column, Vec<ColumnData>)>>;

	// --- merge read path ---
	/// Denormalised LEFT-JOIN flat scan: sheet -> column -> cell. A branch
	/// with no sheets yields no rows; a sheet with no columns still yields one
	/// row (column/cell fields `None`); a column with no cells still yields one
	/// row (cell fields `None`).
	async fn get_branch_data_for_merge(&self, branch_id: Uuid) -> AppResult<Vec<BranchMergeRow>>;

	/// Bulk-clone sheets -> columns -> cells from `source_branch` into
	/// `target_branch`, stamping `source_sheet_id`/`source_column_id`
	/// provenance pointers. Implementors must use a single transaction and a
	/// multi-row insert for cells (performance contract, spec.md §4.3).
	async fn copy_branch_contents(&self, source_branch: Uuid, target_branch: Uuid) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct NewSheet {
	pub name: String,
	pub sheet_type: crate::domain::SheetType,
	pub branch_id: Uuid,
	pub source_sheet_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewColumn {
	pub name: String,
	pub column_type: String,
	pub required: bool,
	pub sheet_id: Uuid,
	pub source_column_id: Option<Uuid>,
	pub order_index: i32,
}

pub fn now() -> DateTime<Utc> {
	Utc::now()
}
