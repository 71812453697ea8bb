//! Postgres-backed `Store` implementation. Grounded on
//! `age_client::AgeClient`'s pool-holding shape, adapted from a graph client
//! to a relational one: every method is a single parameterised query (or a
//! transaction for the copier), using runtime `sqlx::query`/`query_as`
//! rather than the compile-time-checked macros, since this schema is owned
//! by this crate's own migrations rather than a pre-existing database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{Branch, BranchMergeRow, Column, ColumnData, Permission, Project, RefreshToken, Sheet, SheetType, User, UserTable};
use crate::error::{AppError, AppResult};

use super::{NewColumn, NewSheet, Store};

pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
		let pool = PgPool::connect(database_url).await?;
		Ok(Self::new(pool))
	}

	pub async fn run_migrations(&self) -> anyhow::Result<()> {
		sqlx::migrate!("./migrations").run(&self.pool).await?;
		Ok(())
	}

	pub async fn ping(&self) -> anyhow::Result<()> {
		sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
		Ok(())
	}
}

fn parse_sheet_type(raw: &str) -> AppResult<SheetType> {
	SheetType::parse(raw).ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown sheet type '{}' in storage", raw)))
}

fn parse_permission(raw: &str) -> AppResult<Permission> {
	Permission::parse(raw).ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown permission '{}' in storage", raw)))
}

#[async_trait]
impl Store for PgStore {
	async fn create_user(&self, email: &str, password_hash: &str) -> AppResult<User> {
		let row = sqlx::query(
			"INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)
			 RETURNING id, email, password_hash, opened_sheet",
		)
		.bind(Uuid::new_v4())
		.bind(email)
		.bind(password_hash)
		.fetch_one(&self.pool)
		.await?;

		Ok(User {
			id: row.try_get("id")?,
			email: row.try_get("email")?,
			password_hash: row.try_get("password_hash")?,
			opened_sheet: row.try_get("opened_sheet")?,
		})
	}

	async fn get_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
		let row = sqlx::query("SELECT id, email, password_hash, opened_sheet FROM users WHERE id = $1")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;
		Ok(match row {
			Some(row) => Some(User {
				id: row.try_get("id")?,
				email: row.try_get("email")?,
				password_hash: row.try_get("password_hash")?,
				opened_sheet: row.try_get("opened_sheet")?,
			}),
			None => None,
		})
	}

	async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
		let row = sqlx::query("SELECT id, email, password_hash, opened_sheet FROM users WHERE email = $1")
			.bind(email)
			.fetch_optional(&self.pool)
			.await?;
		Ok(match row {
			Some(row) => Some(User {
				id: row.try_get("id")?,
				email: row.try_get("email")?,
				password_hash: row.try_get("password_hash")?,
				opened_sheet: row.try_get("opened_sheet")?,
			}),
			None => None,
		})
	}

	async fn set_opened_sheet(&self, user_id: Uuid, sheet_id: Option<Uuid>) -> AppResult<()> {
		sqlx::query("UPDATE users SET opened_sheet = $2 WHERE id = $1")
			.bind(user_id)
			.bind(sheet_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn create_refresh_token(&self, token: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<RefreshToken> {
		sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at, revoked_at) VALUES ($1, $2, $3, NULL)")
			.bind(token)
			.bind(user_id)
			.bind(expires_at)
			.execute(&self.pool)
			.await?;
		Ok(RefreshToken {
			token: token.to_string(),
			user_id,
			expires_at,
			revoked_at: None,
		})
	}

	async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshToken>> {
		let row = sqlx::query("SELECT token, user_id, expires_at, revoked_at FROM refresh_tokens WHERE token = $1")
			.bind(token)
			.fetch_optional(&self.pool)
			.await?;
		Ok(match row {
			Some(row) => Some(RefreshToken {
				token: row.try_get("token")?,
				user_id: row.try_get("user_id")?,
				expires_at: row.try_get("expires_at")?,
				revoked_at: row.try_get("revoked_at")?,
			}),
			None => None,
		})
	}

	async fn revoke_refresh_token(&self, token: &str) -> AppResult<()> {
		let result = sqlx::query("UPDATE refresh_tokens SET revoked_at = now() WHERE token = $1 AND revoked_at IS NULL")
			.bind(token)
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(AppError::NotFound("refresh token not found".to_string()));
		}
		Ok(())
	}

	async fn create_project(&self, name: &str, owner_id: Uuid) -> AppResult<Project> {
		let mut tx = self.pool.begin().await?;
		let id = Uuid::new_v4();
		sqlx::query("INSERT INTO projects (id, name, game_url) VALUES ($1, $2, NULL)")
			.bind(id)
			.bind(name)
			.execute(&mut *tx)
			.await?;
		sqlx::query("INSERT INTO user_tables (user_id, table_id, permission) VALUES ($1, $2, 'owner')")
			.bind(owner_id)
			.bind(id)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(Project {
			id,
			name: name.to_string(),
			game_url: None,
		})
	}

	async fn get_project(&self, id: Uuid) -> AppResult<Option<Project>> {
		let row = sqlx::query("SELECT id, name, game_url FROM projects WHERE id = $1")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;
		Ok(match row {
			Some(row) => Some(Project {
				id: row.try_get("id")?,
				name: row.try_get("name")?,
				game_url: row.try_get("game_url")?,
			}),
			None => None,
		})
	}

	async fn rename_project(&self, id: Uuid, name: &str) -> AppResult<()> {
		sqlx::query("UPDATE projects SET name = $2 WHERE id = $1")
			.bind(id)
			.bind(name)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn change_game_url(&self, id: Uuid, game_url: Option<&str>) -> AppResult<()> {
		sqlx::query("UPDATE projects SET game_url = $2 WHERE id = $1")
			.bind(id)
			.bind(game_url)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn delete_project(&self, id: Uuid) -> AppResult<()> {
		sqlx::query("DELETE FROM projects WHERE id = $1").bind(id).execute(&self.pool).await?;
		Ok(())
	}

	async fn list_projects_for_user(&self, user_id: Uuid) -> AppResult<Vec<Project>> {
		let rows = sqlx::query(
			"SELECT p.id, p.name, p.game_url FROM projects p
			 JOIN user_tables ut ON ut.table_id = p.id
			 WHERE ut.user_id = $1",
		)
		.bind(user_id)
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter()
			.map(|row| {
				Ok(Project {
					id: row.try_get("id")?,
					name: row.try_get("name")?,
					game_url: row.try_get("game_url")?,
				})
			})
			.collect()
	}

	async fn grant_permission(&self, user_id: Uuid, table_id: Uuid, permission: Permission) -> AppResult<UserTable> {
		sqlx::query(
			"INSERT INTO user_tables (user_id, table_id, permission) VALUES ($1, $2, $3)
			 ON CONFLICT (user_id, table_id) DO UPDATE SET permission = EXCLUDED.permission",
		)
		.bind(user_id)
		.bind(table_id)
		.bind(permission.as_str())
		.execute(&self.pool)
		.await?;
		Ok(UserTable { user_id, table_id, permission })
	}

	async fn get_permission(&self, user_id: Uuid, table_id: Uuid) -> AppResult<Option<Permission>> {
		let row = sqlx::query("SELECT permission FROM user_tables WHERE user_id = $1 AND table_id = $2")
			.bind(user_id)
			.bind(table_id)
			.fetch_optional(&self.pool)
			.await?;
		match row {
			Some(row) => {
				let raw: String = row.try_get("permission")?;
				Ok(Some(parse_permission(&raw)?))
			}
			None => Ok(None),
		}
	}

	async fn list_permissions_for_table(&self, table_id: Uuid) -> AppResult<Vec<UserTable>> {
		let rows = sqlx::query("SELECT user_id, table_id, permission FROM user_tables WHERE table_id = $1")
			.bind(table_id)
			.fetch_all(&self.pool)
			.await?;
		rows.into_iter()
			.map(|row| {
				let raw: String = row.try_get("permission")?;
				Ok(UserTable {
					user_id: row.try_get("user_id")?,
					table_id: row.try_get("table_id")?,
					permission: parse_permission(&raw)?,
				})
			})
			.collect()
	}

	async fn create_branch(&self, name: &str, table_id: Uuid, is_protected: bool) -> AppResult<Branch> {
		let row = sqlx::query(
			"INSERT INTO branches (id, name, is_protected, table_id, created_at) VALUES ($1, $2, $3, $4, now())
			 RETURNING id, name, is_protected, table_id, created_at",
		)
		.bind(Uuid::new_v4())
		.bind(name)
		.bind(is_protected)
		.bind(table_id)
		.fetch_one(&self.pool)
		.await?;
		Ok(Branch {
			id: row.try_get("id")?,
			name: row.try_get("name")?,
			is_protected: row.try_get("is_protected")?,
			table_id: row.try_get("table_id")?,
			created_at: row.try_get("created_at")?,
		})
	}

	async fn get_branch(&self, id: Uuid) -> AppResult<Option<Branch>> {
		let row = sqlx::query("SELECT id, name, is_protected, table_id, created_at FROM branches WHERE id = $1")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;
		Ok(match row {
			Some(row) => Some(Branch {
				id: row.try_get("id")?,
				name: row.try_get("name")?,
				is_protected: row.try_get("is_protected")?,
				table_id: row.try_get("table_id")?,
				created_at: row.try_get("created_at")?,
			}),
			None => None,
		})
	}

	async fn list_branches_for_table(&self, table_id: Uuid) -> AppResult<Vec<Branch>> {
		let rows = sqlx::query("SELECT id, name, is_protected, table_id, created_at FROM branches WHERE table_id = $1")
			.bind(table_id)
			.fetch_all(&self.pool)
			.await?;
		rows.into_iter()
			.map(|row| {
				Ok(Branch {
					id: row.try_get("id")?,
					name: row.try_get("name")?,
					is_protected: row.try_get("is_protected")?,
					table_id: row.try_get("table_id")?,
					created_at: row.try_get("created_at")?,
				})
			})
			.collect()
	}

	async fn update_branch(&self, id: Uuid, name: &str, is_protected: bool) -> AppResult<()> {
		sqlx::query("UPDATE branches SET name = $2, is_protected = $3 WHERE id = $1")
			.bind(id)
			.bind(name)
			.bind(is_protected)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn delete_branch(&self, id: Uuid) -> AppResult<()> {
		sqlx::query("DELETE FROM branches WHERE id = $1").bind(id).execute(&self.pool).await?;
		Ok(())
	}

	async fn get_oldest_branch_from_table(&self, table_id: Uuid) -> AppResult<Option<Branch>> {
		let row = sqlx::query(
			"SELECT id, name, is_protected, table_id, created_at FROM branches
			 WHERE table_id = $1 ORDER BY created_at ASC LIMIT 1",
		)
		.bind(table_id)
		.fetch_optional(&self.pool)
		.await?;
		Ok(match row {
			Some(row) => Some(Branch {
				id: row.try_get("id")?,
				name: row.try_get("name")?,
				is_protected: row.try_get("is_protected")?,
				table_id: row.try_get("table_id")?,
				created_at: row.try_get("created_at")?,
			}),
			None => None,
		})
	}

	async fn create_sheet(&self, sheet: NewSheet) -> AppResult<Sheet> {
		let row = sqlx::query(
			"INSERT INTO sheets (id, name, type, branch_id, source_sheet_id, updated_at)
			 VALUES ($1, $2, $3, $4, $5, now())
			 RETURNING id, name, type, branch_id, source_sheet_id, updated_at",
		)
		.bind(Uuid::new_v4())
		.bind(&sheet.name)
		.bind(sheet.sheet_type.as_str())
		.bind(sheet.branch_id)
		.bind(sheet.source_sheet_id)
		.fetch_one(&self.pool)
		.await?;
		let raw_type: String = row.try_get("type")?;
		Ok(Sheet {
			id: row.try_get("id")?,
			name: row.try_get("name")?,
			sheet_type: parse_sheet_type(&raw_type)?,
			branch_id: row.try_get("branch_id")?,
			source_sheet_id: row.try_get("source_sheet_id")?,
			updated_at: row.try_get("updated_at")?,
		})
	}

	async fn get_sheet(&self, id: Uuid) -> AppResult<Option<Sheet>> {
		let row = sqlx::query("SELECT id, name, type, branch_id, source_sheet_id, updated_at FROM sheets WHERE id = $1")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;
		match row {
			Some(row) => {
				let raw_type: String = row.try_get("type")?;
				Ok(Some(Sheet {
					id: row.try_get("id")?,
					name: row.try_get("name")?,
					sheet_type: parse_sheet_type(&raw_type)?,
					branch_id: row.try_get("branch_id")?,
					source_sheet_id: row.try_get("source_sheet_id")?,
					updated_at: row.try_get("updated_at")?,
				}))
			}
			None => Ok(None),
		}
	}

	async fn list_sheets_for_branch(&self, branch_id: Uuid) -> AppResult<Vec<Sheet>> {
		let rows = sqlx::query("SELECT id, name, type, branch_id, source_sheet_id, updated_at FROM sheets WHERE branch_id = $1")
			.bind(branch_id)
			.fetch_all(&self.pool)
			.await?;
		rows.into_iter()
			.map(|row| {
				let raw_type: String = row.try_get("type")?;
				Ok(Sheet {
					id: row.try_get("id")?,
					name: row.try_get("name")?,
					sheet_type: parse_sheet_type(&raw_type)?,
					branch_id: row.try_get("branch_id")?,
					source_sheet_id: row.try_get("source_sheet_id")?,
					updated_at: row.try_get("updated_at")?,
				})
			})
			.collect()
	}

	async fn rename_sheet(&self, id: Uuid, name: &str) -> AppResult<()> {
		sqlx::query("UPDATE sheets SET name = $2, updated_at = now() WHERE id = $1")
			.bind(id)
			.bind(name)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn delete_sheet(&self, id: Uuid) -> AppResult<()> {
		sqlx::query("DELETE FROM sheets WHERE id = $1").bind(id).execute(&self.pool).await?;
		Ok(())
	}

	async fn create_column(&self, column: NewColumn) -> AppResult<Column> {
		let row = sqlx::query(
			"INSERT INTO columns (id, name, type, required, sheet_id, source_column_id, order_index, updated_at)
			 VALUES ($1, $2, $3, $4, $5, $6, $7, now())
			 RETURNING id, name, type, required, sheet_id, source_column_id, order_index, updated_at",
		)
		.bind(Uuid::new_v4())
		.bind(&column.name)
		.bind(&column.column_type)
		.bind(column.required)
		.bind(column.sheet_id)
		.bind(column.source_column_id)
		.bind(column.order_index)
		.fetch_one(&self.pool)
		.await?;
		Ok(Column {
			id: row.try_get("id")?,
			name: row.try_get("name")?,
			column_type: row.try_get("type")?,
			required: row.try_get("required")?,
			sheet_id: row.try_get("sheet_id")?,
			source_column_id: row.try_get("source_column_id")?,
			order_index: row.try_get("order_index")?,
			updated_at: row.try_get("updated_at")?,
		})
	}

	async fn get_column(&self, id: Uuid) -> AppResult<Option<Column>> {
		let row = sqlx::query(
			"SELECT id, name, type, required, sheet_id, source_column_id, order_index, updated_at FROM columns WHERE id = $1",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;
		Ok(match row {
			Some(row) => Some(Column {
				id: row.try_get("id")?,
				name: row.try_get("name")?,
				column_type: row.try_get("type")?,
				required: row.try_get("required")?,
				sheet_id: row.try_get("sheet_id")?,
				source_column_id: row.try_get("source_column_id")?,
				order_index: row.try_get("order_index")?,
				updated_at: row.try_get("updated_at")?,
			}),
			None => None,
		})
	}

	async fn list_columns_for_sheet(&self, sheet_id: Uuid) -> AppResult<Vec<Column>> {
		let rows = sqlx::query(
			"SELECT id, name, type, required, sheet_id, source_column_id, order_index, updated_at FROM columns
			 WHERE sheet_id = $1 ORDER BY order_index ASC",
		)
		.bind(sheet_id)
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter()
			.map(|row| {
				Ok(Column {
					id: row.try_get("id")?,
					name: row.try_get("name")?,
					column_type: row.try_get("type")?,
					required: row.try_get("required")?,
					sheet_id: row.try_get("sheet_id")?,
					source_column_id: row.try_get("source_column_id")?,
					order_index: row.try_get("order_index")?,
					updated_at: row.try_get("updated_at")?,
				})
			})
			.collect()
	}

	async fn update_column(&self, id: Uuid, name: &str, column_type: &str, required: bool) -> AppResult<()> {
		sqlx::query("UPDATE columns SET name = $2, type = $3, required = $4, updated_at = now() WHERE id = $1")
			.bind(id)
			.bind(name)
			.bind(column_type)
			.bind(required)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn delete_column(&self, id: Uuid) -> AppResult<()> {
		sqlx::query("DELETE FROM columns WHERE id = $1").bind(id).execute(&self.pool).await?;
		Ok(())
	}

	async fn swap_columns(&self, a: Uuid, b: Uuid) -> AppResult<()> {
		if a == b {
			return Err(AppError::Validation("cannot swap a column with itself".to_string()));
		}
		let mut tx = self.pool.begin().await?;
		let order_a: i32 = sqlx::query("SELECT order_index FROM columns WHERE id = $1")
			.bind(a)
			.fetch_one(&mut *tx)
			.await?
			.try_get("order_index")?;
		let order_b: i32 = sqlx::query("SELECT order_index FROM columns WHERE id = $1")
			.bind(b)
			.fetch_one(&mut *tx)
			.await?
			.try_get("order_index")?;
		sqlx::query("UPDATE columns SET order_index = $2 WHERE id = $1")
			.bind(a)
			.bind(order_b)
			.execute(&mut *tx)
			.await?;
		sqlx::query("UPDATE columns SET order_index = $2 WHERE id = $1")
			.bind(b)
			.bind(order_a)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	async fn swap_columns_with_permission_check(&self, requester: Uuid, a: Uuid, b: Uuid) -> AppResult<()> {
		if a == b {
			return Err(AppError::Validation("cannot swap a column with itself".to_string()));
		}
		let mut tx = self.pool.begin().await?;
		let permitted: bool = sqlx::query(
			"SELECT 1 FROM columns c, sheets s, branches b, user_tables ut
			 WHERE c.id = $1 AND s.id = c.sheet_id AND b.id = s.branch_id AND ut.table_id = b.table_id AND ut.user_id = $2",
		)
		.bind(a)
		.bind(requester)
		.fetch_optional(&mut *tx)
		.await?
		.is_some();
		if !permitted {
			return Err(AppError::Authorization("no write permission on column's sheet".to_string()));
		}

		let order_a: i32 = sqlx::query("SELECT order_index FROM columns WHERE id = $1")
			.bind(a)
			.fetch_one(&mut *tx)
			.await?
			.try_get("order_index")?;
		let order_b: i32 = sqlx::query("SELECT order_index FROM columns WHERE id = $1")
			.bind(b)
			.fetch_one(&mut *tx)
			.await?
			.try_get("order_index")?;
		sqlx::query("UPDATE columns SET order_index = $2 WHERE id = $1")
			.bind(a)
			.bind(order_b)
			.execute(&mut *tx)
			.await?;
		sqlx::query("UPDATE columns SET order_index = $2 WHERE id = $1")
			.bind(b)
			.bind(order_a)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	async fn update_column_with_permission_check(
		&self,
		requester: Uuid,
		id: Uuid,
		name: &str,
		column_type: &str,
		required: bool,
	) -> AppResult<()> {
		// Single round trip: the permission check and the write share one
		// query, matching `update_column.go`'s contract (spec §4.1).
		let result = sqlx::query(
			"UPDATE columns c SET name = $3, type = $4, required = $5, updated_at = now()
			 FROM sheets s, branches b, user_tables ut
			 WHERE c.id = $1 AND s.id = c.sheet_id AND b.id = s.branch_id AND ut.table_id = b.table_id
			   AND ut.user_id = $2",
		)
		.bind(id)
		.bind(requester)
		.bind(name)
		.bind(column_type)
		.bind(required)
		.execute(&self.pool)
		.await?;
		if result.rows_affected() == 0 {
			return Err(AppError::Authorization("no write permission on column's sheet".to_string()));
		}
		Ok(())
	}

	async fn add_column_data(&self, column_id: Uuid, idx: i64, value: Option<&str>, cell_type: Option<&str>) -> AppResult<ColumnData> {
		let row = sqlx::query(
			"INSERT INTO column_data (id, idx, value, type, column_id, created_at, updated_at)
			 VALUES ($1, $2, $3, $4, $5, now(), now())
			 RETURNING id, idx, value, type, column_id, created_at, updated_at",
		)
		.bind(Uuid::new_v4())
		.bind(idx)
		.bind(value)
		.bind(cell_type)
		.bind(column_id)
		.fetch_one(&self.pool)
		.await?;
		Ok(ColumnData {
			id: row.try_get("id")?,
			idx: row.try_get("idx")?,
			value: row.try_get("value")?,
			cell_type: row.try_get("type")?,
			column_id: row.try_get("column_id")?,
			created_at: row.try_get("created_at")?,
			updated_at: row.try_get("updated_at")?,
		})
	}

	async fn update_column_data(&self, id: Uuid, value: Option<&str>, cell_type: Option<&str>) -> AppResult<()> {
		sqlx::query("UPDATE column_data SET value = $2, type = COALESCE($3, type), updated_at = now() WHERE id = $1")
			.bind(id)
			.bind(value)
			.bind(cell_type)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn update_column_data_with_permission_check(
		&self,
		requester: Uuid,
		id: Uuid,
		value: Option<&str>,
		cell_type: Option<&str>,
	) -> AppResult<()> {
		let result = sqlx::query(
			"UPDATE column_data cd SET value = $3, type = COALESCE($4, cd.type), updated_at = now()
			 FROM columns c, sheets s, branches b, user_tables ut
			 WHERE cd.id = $1 AND c.id = cd.column_id AND s.id = c.sheet_id AND b.id = s.branch_id
			   AND ut.table_id = b.table_id AND ut.user_id = $2",
		)
		.bind(id)
		.bind(requester)
		.bind(value)
		.bind(cell_type)
		.execute(&self.pool)
		.await?;
		if result.rows_affected() == 0 {
			return Err(AppError::Authorization("no write permission on cell's sheet".to_string()));
		}
		Ok(())
	}

	async fn delete_row(&self, sheet_id: Uuid, idx: i64) -> AppResult<()> {
		sqlx::query(
			"DELETE FROM column_data cd USING columns c
			 WHERE cd.column_id = c.id AND c.sheet_id = $1 AND cd.idx = $2",
		)
		.bind(sheet_id)
		.bind(idx)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn get_columns_with_data_by_sheet(&self, sheet_id: Uuid) -> AppResult<Vec<(Column, Vec<ColumnData>)>> {
		let columns = self.list_columns_for_sheet(sheet_id).await?;
		let mut out = Vec::with_capacity(columns.len());
		for column in columns {
			let rows = sqlx::query("SELECT id, idx, value, type, column_id, created_at, updated_at FROM column_data WHERE column_id = $1 ORDER BY idx ASC")
				.bind(column.id)
				.fetch_all(&self.pool)
				.await?;
			let cells = rows
				.into_iter()
				.map(|row| {
					Ok(ColumnData {
						id: row.try_get("id")?,
						idx: row.try_get("idx")?,
						value: row.try_get("value")?,
						cell_type: row.try_get("type")?,
						column_id: row.try_get("column_id")?,
						created_at: row.try_get("created_at")?,
						updated_at: row.try_get("updated_at")?,
					})
				})
				.collect::<AppResult<Vec<_>>>()?;
			out.push((column, cells));
		}
		Ok(out)
	}

	/// The merge engine's sole read path: a denormalised LEFT JOIN so a
	/// branch with empty sheets/columns still yields rows (spec §4.1, §6).
	async fn get_branch_data_for_merge(&self, branch_id: Uuid) -> AppResult<Vec<BranchMergeRow>> {
		let rows = sqlx::query(
			"SELECT
			   s.id AS sheet_id, s.name AS sheet_name, s.type AS sheet_type,
			   s.updated_at AS sheet_updated_at, s.source_sheet_id,
			   c.id AS column_id, c.name AS column_name, c.type AS column_type,
			   c.required AS column_required, c.updated_at AS column_updated_at, c.source_column_id,
			   cd.id AS cell_id, cd.idx AS cell_idx, cd.value AS cell_value,
			   cd.created_at AS cell_created_at, cd.updated_at AS cell_updated_at
			 FROM sheets s
			 LEFT JOIN columns c ON c.sheet_id = s.id
			 LEFT JOIN column_data cd ON cd.column_id = c.id
			 WHERE s.branch_id = $1
			 ORDER BY s.id, c.order_index, cd.idx",
		)
		.bind(branch_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter()
			.map(|row| {
				let sheet_type_raw: String = row.try_get("sheet_type")?;
				let column_type_raw: Option<String> = row.try_get("column_type")?;
				Ok(BranchMergeRow {
					sheet_id: row.try_get("sheet_id")?,
					sheet_name: row.try_get("sheet_name")?,
					sheet_type: parse_sheet_type(&sheet_type_raw)?,
					sheet_updated_at: row.try_get("sheet_updated_at")?,
					source_sheet_id: row.try_get("source_sheet_id")?,
					column_id: row.try_get("column_id")?,
					column_name: row.try_get("column_name")?,
					column_type: column_type_raw,
					column_required: row.try_get("column_required")?,
					column_updated_at: row.try_get("column_updated_at")?,
					source_column_id: row.try_get("source_column_id")?,
					cell_id: row.try_get("cell_id")?,
					cell_idx: row.try_get("cell_idx")?,
					cell_value: row.try_get("cell_value")?,
					cell_created_at: row.try_get("cell_created_at")?,
					cell_updated_at: row.try_get("cell_updated_at")?,
				})
			})
			.collect()
	}

	/// Performance contract (spec §4.3): bulk-insert all cells of a column in
	/// one multi-row `INSERT`, never one round trip per cell.
	async fn copy_branch_contents(&self, source_branch: Uuid, target_branch: Uuid) -> AppResult<()> {
		let mut tx = self.pool.begin().await?;

		let source_sheets = sqlx::query("SELECT id, name, type FROM sheets WHERE branch_id = $1")
			.bind(source_branch)
			.fetch_all(&mut *tx)
			.await?;

		for sheet_row in source_sheets {
			let source_sheet_id: Uuid = sheet_row.try_get("id")?;
			let sheet_name: String = sheet_row.try_get("name")?;
			let sheet_type: String = sheet_row.try_get("type")?;

			let new_sheet_id = Uuid::new_v4();
			sqlx::query(
				"INSERT INTO sheets (id, name, type, branch_id, source_sheet_id, updated_at)
				 VALUES ($1, $2, $3, $4, $5, now())",
			)
			.bind(new_sheet_id)
			.bind(&sheet_name)
			.bind(&sheet_type)
			.bind(target_branch)
			.bind(source_sheet_id)
			.execute(&mut *tx)
			.await?;

			let source_columns = sqlx::query(
				"SELECT id, name, type, required, order_index FROM columns WHERE sheet_id = $1 ORDER BY order_index ASC",
			)
			.bind(source_sheet_id)
			.fetch_all(&mut *tx)
			.await?;

			for column_row in source_columns {
				let source_column_id: Uuid = column_row.try_get("id")?;
				let name: String = column_row.try_get("name")?;
				let column_type: String = column_row.try_get("type")?;
				let required: bool = column_row.try_get("required")?;
				let order_index: i32 = column_row.try_get("order_index")?;

				let new_column_id = Uuid::new_v4();
				sqlx::query(
					"INSERT INTO columns (id, name, type, required, sheet_id, source_column_id, order_index, updated_at)
					 VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
				)
				.bind(new_column_id)
				.bind(&name)
				.bind(&column_type)
				.bind(required)
				.bind(new_sheet_id)
				.bind(source_column_id)
				.bind(order_index)
				.execute(&mut *tx)
				.await?;

				let cells = sqlx::query("SELECT idx, value, type FROM column_data WHERE column_id = $1 ORDER BY idx ASC")
					.bind(source_column_id)
					.fetch_all(&mut *tx)
					.await?;

				if cells.is_empty() {
					continue;
				}

				// Single multi-row INSERT for the whole column's cells.
				let mut sql = String::from("INSERT INTO column_data (id, idx, value, type, column_id, created_at, updated_at) VALUES ");
				let mut params: Vec<(Uuid, i64, Option<String>, Option<String>)> = Vec::with_capacity(cells.len());
				for cell_row in &cells {
					let idx: i64 = cell_row.try_get("idx")?;
					let value: Option<String> = cell_row.try_get("value")?;
					let cell_type: Option<String> = cell_row.try_get("type")?;
					params.push((Uuid::new_v4(), idx, value, cell_type));
				}
				for (i, _) in params.iter().enumerate() {
					if i > 0 {
						sql.push(',');
					}
					let base = i * 5;
					sql.push_str(&format!(
						" (${}, ${}, ${}, ${}, ${}, now(), now())",
						base + 1,
						base + 2,
						base + 3,
						base + 4,
						base + 5
					));
				}
				let mut query = sqlx::query(&sql);
				for (id, idx, value, cell_type) in &params {
					query = query.bind(*id).bind(*idx).bind(value.clone()).bind(cell_type.clone()).bind(new_column_id);
				}
				query.execute(&mut *tx).await?;
			}
		}

		tx.commit().await?;
		Ok(())
	}
}
