//! In-memory `Store` double. Lets the core merge/copy logic run under
//! `#[tokio::test]` without a live Postgres instance, mirroring the role
//! `MockAgeRepo` plays in the teacher's `health.rs` test module.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Branch, BranchMergeRow, Column, ColumnData, Permission, Project, RefreshToken, Sheet, SheetType, User, UserTable};
use crate::error::{AppError, AppResult};

use super::{NewColumn, NewSheet, Store};

#[derive(Default)]
struct Tables {
	users: HashMap<Uuid, User>,
	refresh_tokens: HashMap<String, RefreshToken>,
	projects: HashMap<Uuid, Project>,
	permissions: HashMap<(Uuid, Uuid), Permission>,
	branches: HashMap<Uuid, Branch>,
	sheets: HashMap<Uuid, Sheet>,
	columns: HashMap<Uuid, Column>,
	cells: HashMap<Uuid, ColumnData>,
}

/// A `Mutex`-guarded set of `HashMap`s implementing the `Store` trait.
pub struct FakeStore {
	tables: Mutex<Tables>,
}

impl FakeStore {
	pub fn new() -> Self {
		Self {
			tables: Mutex::new(Tables::default()),
		}
	}
}

impl Default for FakeStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Store for FakeStore {
	async fn create_user(&self, email: &str, password_hash: &str) -> AppResult<User> {
		let mut t = self.tables.lock().unwrap();
		if t.users.values().any(|u| u.email == email) {
			return Err(AppError::Conflict(format!("user with email '{}' already exists", email)));
		}
		let user = User {
			id: Uuid::new_v4(),
			email: email.to_string(),
			password_hash: password_hash.to_string(),
			opened_sheet: None,
		};
		t.users.insert(user.id, user.clone());
		Ok(user)
	}

	async fn get_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
		Ok(self.tables.lock().unwrap().users.get(&id).cloned())
	}

	async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
		Ok(self.tables.lock().unwrap().users.values().find(|u| u.email == email).cloned())
	}

	async fn set_opened_sheet(&self, user_id: Uuid, sheet_id: Option<Uuid>) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let user = t.users.get_mut(&user_id).ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
		user.opened_sheet = sheet_id;
		Ok(())
	}

	async fn create_refresh_token(&self, token: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<RefreshToken> {
		let mut t = self.tables.lock().unwrap();
		let rt = RefreshToken {
			token: token.to_string(),
			user_id,
			expires_at,
			revoked_at: None,
		};
		t.refresh_tokens.insert(rt.token.clone(), rt.clone());
		Ok(rt)
	}

	async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshToken>> {
		Ok(self.tables.lock().unwrap().refresh_tokens.get(token).cloned())
	}

	async fn revoke_refresh_token(&self, token: &str) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let rt = t
			.refresh_tokens
			.get_mut(token)
			.ok_or_else(|| AppError::NotFound("refresh token not found".to_string()))?;
		rt.revoked_at = Some(Utc::now());
		Ok(())
	}

	async fn create_project(&self, name: &str, owner_id: Uuid) -> AppResult<Project> {
		let mut t = self.tables.lock().unwrap();
		let project = Project {
			id: Uuid::new_v4(),
			name: name.to_string(),
			game_url: None,
		};
		t.projects.insert(project.id, project.clone());
		t.permissions.insert((owner_id, project.id), Permission::Owner);
		Ok(project)
	}

	async fn get_project(&self, id: Uuid) -> AppResult<Option<Project>> {
		Ok(self.tables.lock().unwrap().projects.get(&id).cloned())
	}

	async fn rename_project(&self, id: Uuid, name: &str) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let project = t.projects.get_mut(&id).ok_or_else(|| AppError::NotFound("project not found".to_string()))?;
		project.name = name.to_string();
		Ok(())
	}

	async fn change_game_url(&self, id: Uuid, game_url: Option<&str>) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let project = t.projects.get_mut(&id).ok_or_else(|| AppError::NotFound("project not found".to_string()))?;
		project.game_url = game_url.map(|s| s.to_string());
		Ok(())
	}

	async fn delete_project(&self, id: Uuid) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		t.projects.remove(&id);
		let branch_ids: Vec<Uuid> = t.branches.values().filter(|b| b.table_id == id).map(|b| b.id).collect();
		for branch_id in branch_ids {
			t.branches.remove(&branch_id);
		}
		t.permissions.retain(|(_, table_id), _| *table_id != id);
		Ok(())
	}

	async fn list_projects_for_user(&self, user_id: Uuid) -> AppResult<Vec<Project>> {
		let t = self.tables.lock().unwrap();
		Ok(t.permissions
			.keys()
			.filter(|(uid, _)| *uid == user_id)
			.filter_map(|(_, table_id)| t.projects.get(table_id).cloned())
			.collect())
	}

	async fn grant_permission(&self, user_id: Uuid, table_id: Uuid, permission: Permission) -> AppResult<UserTable> {
		let mut t = self.tables.lock().unwrap();
		t.permissions.insert((user_id, table_id), permission);
		Ok(UserTable { user_id, table_id, permission })
	}

	async fn get_permission(&self, user_id: Uuid, table_id: Uuid) -> AppResult<Option<Permission>> {
		Ok(self.tables.lock().unwrap().permissions.get(&(user_id, table_id)).copied())
	}

	async fn list_permissions_for_table(&self, table_id: Uuid) -> AppResult<Vec<UserTable>> {
		let t = self.tables.lock().unwrap();
		Ok(t.permissions
			.iter()
			.filter(|((_, tid), _)| *tid == table_id)
			.map(|((user_id, table_id), permission)| UserTable {
				user_id: *user_id,
				table_id: *table_id,
				permission: *permission,
			})
			.collect())
	}

	async fn create_branch(&self, name: &str, table_id: Uuid, is_protected: bool) -> AppResult<Branch> {
		let mut t = self.tables.lock().unwrap();
		let branch = Branch {
			id: Uuid::new_v4(),
			name: name.to_string(),
			is_protected,
			table_id,
			created_at: Utc::now(),
		};
		t.branches.insert(branch.id, branch.clone());
		Ok(branch)
	}

	async fn get_branch(&self, id: Uuid) -> AppResult<Option<Branch>> {
		Ok(self.tables.lock().unwrap().branches.get(&id).cloned())
	}

	async fn list_branches_for_table(&self, table_id: Uuid) -> AppResult<Vec<Branch>> {
		let t = self.tables.lock().unwrap();
		Ok(t.branches.values().filter(|b| b.table_id == table_id).cloned().collect())
	}

	async fn update_branch(&self, id: Uuid, name: &str, is_protected: bool) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let branch = t.branches.get_mut(&id).ok_or_else(|| AppError::NotFound("branch not found".to_string()))?;
		branch.name = name.to_string();
		branch.is_protected = is_protected;
		Ok(())
	}

	async fn delete_branch(&self, id: Uuid) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		t.branches.remove(&id).ok_or_else(|| AppError::NotFound("branch not found".to_string()))?;
		let sheet_ids: Vec<Uuid> = t.sheets.values().filter(|s| s.branch_id == id).map(|s| s.id).collect();
		for sheet_id in sheet_ids {
			delete_sheet_cascade(&mut t, sheet_id);
		}
		Ok(())
	}

	async fn get_oldest_branch_from_table(&self, table_id: Uuid) -> AppResult<Option<Branch>> {
		let t = self.tables.lock().unwrap();
		Ok(t.branches
			.values()
			.filter(|b| b.table_id == table_id)
			.min_by_key(|b| b.created_at)
			.cloned())
	}

	async fn create_sheet(&self, sheet: NewSheet) -> AppResult<Sheet> {
		let mut t = self.tables.lock().unwrap();
		let new_sheet = Sheet {
			id: Uuid::new_v4(),
			name: sheet.name,
			sheet_type: sheet.sheet_type,
			branch_id: sheet.branch_id,
			source_sheet_id: sheet.source_sheet_id,
			updated_at: Utc::now(),
		};
		t.sheets.insert(new_sheet.id, new_sheet.clone());
		Ok(new_sheet)
	}

	async fn get_sheet(&self, id: Uuid) -> AppResult<Option<Sheet>> {
		Ok(self.tables.lock().unwrap().sheets.get(&id).cloned())
	}

	async fn list_sheets_for_branch(&self, branch_id: Uuid) -> AppResult<Vec<Sheet>> {
		let t = self.tables.lock().unwrap();
		Ok(t.sheets.values().filter(|s| s.branch_id == branch_id).cloned().collect())
	}

	async fn rename_sheet(&self, id: Uuid, name: &str) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let sheet = t.sheets.get_mut(&id).ok_or_else(|| AppError::NotFound("sheet not found".to_string()))?;
		sheet.name = name.to_string();
		sheet.updated_at = Utc::now();
		Ok(())
	}

	async fn delete_sheet(&self, id: Uuid) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		if !t.sheets.contains_key(&id) {
			return Err(AppError::NotFound("sheet not found".to_string()));
		}
		delete_sheet_cascade(&mut t, id);
		Ok(())
	}

	async fn create_column(&self, column: NewColumn) -> AppResult<Column> {
		let mut t = self.tables.lock().unwrap();
		let new_column = Column {
			id: Uuid::new_v4(),
			name: column.name,
			column_type: column.column_type,
			required: column.required,
			sheet_id: column.sheet_id,
			source_column_id: column.source_column_id,
			order_index: column.order_index,
			updated_at: Utc::now(),
		};
		t.columns.insert(new_column.id, new_column.clone());
		Ok(new_column)
	}

	async fn get_column(&self, id: Uuid) -> AppResult<Option<Column>> {
		Ok(self.tables.lock().unwrap().columns.get(&id).cloned())
	}

	async fn list_columns_for_sheet(&self, sheet_id: Uuid) -> AppResult<Vec<Column>> {
		let t = self.tables.lock().unwrap();
		let mut columns: Vec<Column> = t.columns.values().filter(|c| c.sheet_id == sheet_id).cloned().collect();
		columns.sort_by_key(|c| c.order_index);
		Ok(columns)
	}

	async fn update_column(&self, id: Uuid, name: &str, column_type: &str, required: bool) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let column = t.columns.get_mut(&id).ok_or_else(|| AppError::NotFound("column not found".to_string()))?;
		column.name = name.to_string();
		column.column_type = column_type.to_string();
		column.required = required;
		column.updated_at = Utc::now();
		Ok(())
	}

	async fn delete_column(&self, id: Uuid) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		t.columns.remove(&id).ok_or_else(|| AppError::NotFound("column not found".to_string()))?;
		let cell_ids: Vec<Uuid> = t.cells.values().filter(|c| c.column_id == id).map(|c| c.id).collect();
		for cell_id in cell_ids {
			t.cells.remove(&cell_id);
		}
		Ok(())
	}

	async fn swap_columns(&self, a: Uuid, b: Uuid) -> AppResult<()> {
		if a == b {
			return Err(AppError::Validation("cannot swap a column with itself".to_string()));
		}
		let mut t = self.tables.lock().unwrap();
		let order_a = t.columns.get(&a).ok_or_else(|| AppError::NotFound("column not found".to_string()))?.order_index;
		let order_b = t.columns.get(&b).ok_or_else(|| AppError::NotFound("column not found".to_string()))?.order_index;
		t.columns.get_mut(&a).unwrap().order_index = order_b;
		t.columns.get_mut(&b).unwrap().order_index = order_a;
		Ok(())
	}

	async fn swap_columns_with_permission_check(&self, requester: Uuid, a: Uuid, b: Uuid) -> AppResult<()> {
		let sheet_id = {
			let t = self.tables.lock().unwrap();
			t.columns.get(&a).ok_or_else(|| AppError::NotFound("column not found".to_string()))?.sheet_id
		};
		let allowed = crate::permissions::check_sheet_permission(self, requester, sheet_id, crate::permissions::Access::Write).await?;
		if !allowed {
			return Err(AppError::Authorization("no write permission on sheet".to_string()));
		}
		self.swap_columns(a, b).await
	}

	async fn update_column_with_permission_check(
		&self,
		requester: Uuid,
		id: Uuid,
		name: &str,
		column_type: &str,
		required: bool,
	) -> AppResult<()> {
		let sheet_id = {
			let t = self.tables.lock().unwrap();
			t.columns.get(&id).ok_or_else(|| AppError::NotFound("column not found".to_string()))?.sheet_id
		};
		let allowed = crate::permissions::check_sheet_permission(self, requester, sheet_id, crate::permissions::Access::Write).await?;
		if !allowed {
			return Err(AppError::Authorization("no write permission on sheet".to_string()));
		}
		self.update_column(id, name, column_type, required).await
	}

	async fn add_column_data(&self, column_id: Uuid, idx: i64, value: Option<&str>, cell_type: Option<&str>) -> AppResult<ColumnData> {
		let mut t = self.tables.lock().unwrap();
		let now = Utc::now();
		let cell = ColumnData {
			id: Uuid::new_v4(),
			idx,
			value: value.map(|s| s.to_string()),
			cell_type: cell_type.map(|s| s.to_string()),
			column_id,
			created_at: now,
			updated_at: now,
		};
		t.cells.insert(cell.id, cell.clone());
		Ok(cell)
	}

	async fn update_column_data(&self, id: Uuid, value: Option<&str>, cell_type: Option<&str>) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let cell = t.cells.get_mut(&id).ok_or_else(|| AppError::NotFound("cell not found".to_string()))?;
		cell.value = value.map(|s| s.to_string());
		if cell_type.is_some() {
			cell.cell_type = cell_type.map(|s| s.to_string());
		}
		cell.updated_at = Utc::now();
		Ok(())
	}

	async fn update_column_data_with_permission_check(
		&self,
		requester: Uuid,
		id: Uuid,
		value: Option<&str>,
		cell_type: Option<&str>,
	) -> AppResult<()> {
		let column_id = {
			let t = self.tables.lock().unwrap();
			t.cells.get(&id).ok_or_else(|| AppError::NotFound("cell not found".to_string()))?.column_id
		};
		let sheet_id = {
			let t = self.tables.lock().unwrap();
			t.columns.get(&column_id).ok_or_else(|| AppError::NotFound("column not found".to_string()))?.sheet_id
		};
		let allowed = crate::permissions::check_sheet_permission(self, requester, sheet_id, crate::permissions::Access::Write).await?;
		if !allowed {
			return Err(AppError::Authorization("no write permission on sheet".to_string()));
		}
		self.update_column_data(id, value, cell_type).await
	}

	async fn delete_row(&self, sheet_id: Uuid, idx: i64) -> AppResult<()> {
		let mut t = self.tables.lock().unwrap();
		let column_ids: Vec<Uuid> = t.columns.values().filter(|c| c.sheet_id == sheet_id).map(|c| c.id).collect();
		let cell_ids: Vec<Uuid> = t
			.cells
			.values()
			.filter(|c| column_ids.contains(&c.column_id) && c.idx == idx)
			.map(|c| c.id)
			.collect();
		for cell_id in cell_ids {
			t.cells.remove(&cell_id);
		}
		Ok(())
	}

	async fn get_columns_with_data_by_sheet(&self, sheet_id: Uuid) -> AppResult<Vec<(Column, Vec<ColumnData>)>> {
		let t = self.tables.lock().unwrap();
		let mut columns: Vec<Column> = t.columns.values().filter(|c| c.sheet_id == sheet_id).cloned().collect();
		columns.sort_by_key(|c| c.order_index);
		Ok(columns
			.into_iter()
			.map(|c| {
				let cells = t.cells.values().filter(|cell| cell.column_id == c.id).cloned().collect();
				(c, cells)
			})
			.collect())
	}

	async fn get_branch_data_for_merge(&self, branch_id: Uuid) -> AppResult<Vec<BranchMergeRow>> {
		let t = self.tables.lock().unwrap();
		let mut rows = Vec::new();
		let mut sheets: Vec<&Sheet> = t.sheets.values().filter(|s| s.branch_id == branch_id).collect();
		sheets.sort_by_key(|s| s.id);

		for sheet in sheets {
			let mut columns: Vec<&Column> = t.columns.values().filter(|c| c.sheet_id == sheet.id).collect();
			columns.sort_by_key(|c| c.order_index);

			if columns.is_empty() {
				rows.push(BranchMergeRow {
					sheet_id: sheet.id,
					sheet_name: sheet.name.clone(),
					sheet_type: sheet.sheet_type,
					sheet_updated_at: sheet.updated_at,
					source_sheet_id: sheet.source_sheet_id,
					column_id: None,
					column_name: None,
					column_type: None,
					column_required: None,
					column_updated_at: None,
					source_column_id: None,
					cell_id: None,
					cell_idx: None,
					cell_value: None,
					cell_created_at: None,
					cell_updated_at: None,
				});
				continue;
			}

			for column in columns {
				let mut cells: Vec<&ColumnData> = t.cells.values().filter(|c| c.column_id == column.id).collect();
				cells.sort_by_key(|c| c.idx);

				if cells.is_empty() {
					rows.push(BranchMergeRow {
						sheet_id: sheet.id,
						sheet_name: sheet.name.clone(),
						sheet_type: sheet.sheet_type,
						sheet_updated_at: sheet.updated_at,
						source_sheet_id: sheet.source_sheet_id,
						column_id: Some(column.id),
						column_name: Some(column.name.clone()),
						column_type: Some(column.column_type.clone()),
						column_required: Some(column.required),
						column_updated_at: Some(column.updated_at),
						source_column_id: column.source_column_id,
						cell_id: None,
						cell_idx: None,
						cell_value: None,
						cell_created_at: None,
						cell_updated_at: None,
					});
					continue;
				}

				for cell in cells {
					rows.push(BranchMergeRow {
						sheet_id: sheet.id,
						sheet_name: sheet.name.clone(),
						sheet_type: sheet.sheet_type,
						sheet_updated_at: sheet.updated_at,
						source_sheet_id: sheet.source_sheet_id,
						column_id: Some(column.id),
						column_name: Some(column.name.clone()),
						column_type: Some(column.column_type.clone()),
						column_required: Some(column.required),
						column_updated_at: Some(column.updated_at),
						source_column_id: column.source_column_id,
						cell_id: Some(cell.id),
						cell_idx: Some(cell.idx),
						cell_value: cell.value.clone(),
						cell_created_at: Some(cell.created_at),
						cell_updated_at: Some(cell.updated_at),
					});
				}
			}
		}

		Ok(rows)
	}

	async fn copy_branch_contents(&self, source_branch: Uuid, target_branch: Uuid) -> AppResult<()> {
		crate::copier::copy_branch_contents_generic(self, source_branch, target_branch).await
	}
}

fn delete_sheet_cascade(t: &mut Tables, sheet_id: Uuid) {
	t.sheets.remove(&sheet_id);
	let column_ids: Vec<Uuid> = t.columns.values().filter(|c| c.sheet_id == sheet_id).map(|c| c.id).collect();
	for column_id in column_ids {
		t.columns.remove(&column_id);
		let cell_ids: Vec<Uuid> = t.cells.values().filter(|c| c.column_id == column_id).map(|c| c.id).collect();
		for cell_id in cell_ids {
			t.cells.remove(&cell_id);
		}
	}
}
