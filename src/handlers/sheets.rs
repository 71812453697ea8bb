//! Sheet CRUD and JSON export. Grounded on
//! `examples/original_source/backend/{create_sheet,rename_sheet,delete_sheet,
//! get_json}.go`. Unlike the original's unfinished `getJsonHandler` stub, the
//! export here is fully implemented via `assembler::to_json_export`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::assembler::to_json_export;
use crate::auth::CurrentUser;
use crate::domain::SheetType;
use crate::error::{AppError, AppResult};
use crate::permissions::{require_branch_permission, require_sheet_permission, Access};
use serde_json::Map as JsonMap;
use crate::state::AppState;
use crate::store::NewSheet;

use super::dto::{sheet_detail_dto, SheetDetailDto};

#[derive(Debug, Deserialize)]
pub struct CreateSheetParams {
	pub name: String,
	#[serde(rename = "type")]
	pub sheet_type: String,
	pub branch_id: Uuid,
}

pub async fn create_sheet(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<CreateSheetParams>,
) -> AppResult<(StatusCode, Json<SheetDetailDto>)> {
	require_branch_permission(state.store.as_ref(), user_id, params.branch_id, Access::Write, "branch").await?;
	let sheet_type = SheetType::parse(&params.sheet_type).ok_or_else(|| AppError::Validation(format!("unknown sheet type '{}'", params.sheet_type)))?;

	let sheet = state
		.store
		.create_sheet(NewSheet {
			name: params.name,
			sheet_type,
			branch_id: params.branch_id,
			source_sheet_id: None,
		})
		.await?;
	state.store.set_opened_sheet(user_id, Some(sheet.id)).await?;

	let view = sheet_detail_dto(state.store.as_ref(), sheet.id)
		.await?
		.ok_or_else(|| AppError::Internal(anyhow::anyhow!("sheet vanished immediately after creation")))?;
	Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct RenameSheetParams {
	pub sheet_id: Uuid,
	pub name: String,
}

pub async fn rename_sheet(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<RenameSheetParams>,
) -> AppResult<StatusCode> {
	require_sheet_permission(state.store.as_ref(), user_id, params.sheet_id, Access::Write, "sheet").await?;
	state.store.rename_sheet(params.sheet_id, &params.name).await?;
	Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct DeleteSheetParams {
	pub sheet_id: Uuid,
}

pub async fn delete_sheet(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<DeleteSheetParams>,
) -> AppResult<StatusCode> {
	require_sheet_permission(state.store.as_ref(), user_id, params.sheet_id, Access::Write, "sheet").await?;
	state.store.delete_sheet(params.sheet_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

/// Export every sheet in a branch as `{sheet_name: exported_value}`, skipping
/// `enums` sheets (UI-only, never exported). The original's `getJsonHandler`
/// fetches the branch's sheets and stops there (`//todo`); this completes it.
pub async fn get_json(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Path(branch_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
	require_branch_permission(state.store.as_ref(), user_id, branch_id, Access::Read, "branch").await?;
	let sheets = state.store.list_sheets_for_branch(branch_id).await?;

	let mut out = JsonMap::new();
	for sheet in sheets {
		let columns = state.store.get_columns_with_data_by_sheet(sheet.id).await?;
		if let Some(value) = to_json_export(&sheet, &columns)? {
			out.insert(sheet.name.clone(), value);
		}
	}
	Ok(Json(Value::Object(out)))
}
