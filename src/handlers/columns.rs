//! Column and cell data CRUD. Grounded on
//! `examples/original_source/backend/{add_column,update_column,delete_column,
//! swap_columns,add_column_data (add_column.data.go variant),
//! update_column_data,delete_row}.go`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::permissions::{require_sheet_permission, Access};
use crate::state::AppState;
use crate::store::NewColumn;

#[derive(Debug, Deserialize)]
pub struct NewColumnParams {
	pub sheet_id: Uuid,
	pub name: String,
	#[serde(rename = "type")]
	pub column_type: String,
	pub required: bool,
}

pub async fn add_column(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<NewColumnParams>,
) -> AppResult<StatusCode> {
	require_sheet_permission(state.store.as_ref(), user_id, params.sheet_id, Access::Write, "sheet").await?;
	let existing = state.store.list_columns_for_sheet(params.sheet_id).await?;
	let order_index = existing.len() as i32;
	state
		.store
		.create_column(NewColumn {
			name: params.name,
			column_type: params.column_type,
			required: params.required,
			sheet_id: params.sheet_id,
			source_column_id: None,
			order_index,
		})
		.await?;
	Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct UpdateColumnParams {
	pub column_id: Uuid,
	pub name: String,
	#[serde(rename = "type")]
	pub column_type: String,
	pub required: bool,
}

/// Checks permission and writes in one `Store` call, matching
/// `UpdateColumnWithPermissionCheck`'s combined contract in the original.
pub async fn update_column(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<UpdateColumnParams>,
) -> AppResult<StatusCode> {
	state
		.store
		.update_column_with_permission_check(user_id, params.column_id, &params.name, &params.column_type, params.required)
		.await?;
	Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct DeleteColumnParams {
	pub column_id: Uuid,
}

pub async fn delete_column(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<DeleteColumnParams>,
) -> AppResult<StatusCode> {
	let column = state
		.store
		.get_column(params.column_id)
		.await?
		.ok_or_else(|| AppError::NotFound("column not found".to_string()))?;
	require_sheet_permission(state.store.as_ref(), user_id, column.sheet_id, Access::Write, "sheet").await?;
	state.store.delete_column(params.column_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SwapColumnsParams {
	pub column_id_1: Uuid,
	pub column_id_2: Uuid,
}

pub async fn swap_columns(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<SwapColumnsParams>,
) -> AppResult<StatusCode> {
	if params.column_id_1 == params.column_id_2 {
		return Err(AppError::Validation("cannot swap a column with itself".to_string()));
	}
	state
		.store
		.swap_columns_with_permission_check(user_id, params.column_id_1, params.column_id_2)
		.await?;
	Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct NewColumnDataParams {
	pub column_id: Uuid,
	pub data: Option<String>,
}

pub async fn add_column_data(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<NewColumnDataParams>,
) -> AppResult<StatusCode> {
	let column = state
		.store
		.get_column(params.column_id)
		.await?
		.ok_or_else(|| AppError::NotFound("column not found".to_string()))?;
	require_sheet_permission(state.store.as_ref(), user_id, column.sheet_id, Access::Write, "sheet").await?;

	let siblings = state.store.get_columns_with_data_by_sheet(column.sheet_id).await?;
	let next_idx = siblings
		.iter()
		.filter(|(c, _)| c.id == column.id)
		.flat_map(|(_, cells)| cells.iter().map(|c| c.idx))
		.max()
		.map(|m| m + 1)
		.unwrap_or(0);

	state
		.store
		.add_column_data(params.column_id, next_idx, params.data.as_deref(), Some(&column.column_type))
		.await?;
	Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct UpdateColumnDataParams {
	pub data_id: Uuid,
	pub data: Option<String>,
}

pub async fn update_column_data(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<UpdateColumnDataParams>,
) -> AppResult<StatusCode> {
	state
		.store
		.update_column_data_with_permission_check(user_id, params.data_id, params.data.as_deref(), None)
		.await?;
	Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct RowParams {
	pub sheet_id: Uuid,
	pub row_idx: i64,
}

pub async fn delete_row(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<RowParams>,
) -> AppResult<StatusCode> {
	require_sheet_permission(state.store.as_ref(), user_id, params.sheet_id, Access::Write, "sheet").await?;
	state.store.delete_row(params.sheet_id, params.row_idx).await?;
	Ok(StatusCode::NO_CONTENT)
}
