//! Project (table) CRUD: create/get/rename/delete, game URL, and sharing.
//! Grounded on `examples/original_source/backend/{create_project,get_project,
//! rename_project,delete_project,change_game_url,add_share}.go`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::domain::{Permission, SheetType};
use crate::error::{AppError, AppResult};
use crate::permissions::{can_assign_permission, check_table_permission, require_table_permission, Access};
use crate::state::AppState;
use crate::store::NewSheet;

use super::dto::{project_dto, sheet_detail_dto, ProjectDto, SheetDetailDto};

#[derive(Debug, Serialize)]
pub struct ProjectView {
	pub table: ProjectDto,
	pub sheet: SheetDetailDto,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectParams {
	pub name: String,
}

pub async fn create_project(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<CreateProjectParams>,
) -> AppResult<(StatusCode, Json<ProjectView>)> {
	let project = state.store.create_project(&params.name, user_id).await?;
	state.store.grant_permission(user_id, project.id, Permission::Owner).await?;
	let view = switch_project(&state, project.id, user_id).await?;
	Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct TableIdParam {
	pub table_id: Uuid,
}

pub async fn get_project(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Path(table_id): Path<Uuid>,
) -> AppResult<Json<ProjectView>> {
	require_table_permission(state.store.as_ref(), user_id, table_id, Access::Read, "project").await?;
	let view = switch_project(&state, table_id, user_id).await?;
	Ok(Json(view))
}

/// Open `table_id` for `user_id`: ensure it has a branch and a landing sheet,
/// point the user's `opened_sheet` at it, and return the combined view.
/// Grounded on `switchProject` in `create_project.go`.
async fn switch_project(state: &AppState, table_id: Uuid, user_id: Uuid) -> AppResult<ProjectView> {
	let mut branches = state.store.list_branches_for_table(table_id).await?;
	if branches.is_empty() {
		let branch = state.store.create_branch("main", table_id, false).await?;
		branches.push(branch);
	}
	let branch_id = branches[0].id;

	let mut sheets = state.store.list_sheets_for_branch(branch_id).await?;
	let sheet_id = if sheets.is_empty() {
		let sheet = state
			.store
			.create_sheet(NewSheet {
				name: "config".to_string(),
				sheet_type: SheetType::Map,
				branch_id,
				source_sheet_id: None,
			})
			.await?;
		sheets.push(sheet.clone());
		sheet.id
	} else {
		sheets[0].id
	};

	state.store.set_opened_sheet(user_id, Some(sheet_id)).await?;

	let table = project_dto(state.store.as_ref(), table_id)
		.await?
		.ok_or_else(|| AppError::NotFound("project not found".to_string()))?;
	let sheet = sheet_detail_dto(state.store.as_ref(), sheet_id)
		.await?
		.ok_or_else(|| AppError::Internal(anyhow::anyhow!("opened sheet vanished immediately after creation")))?;

	Ok(ProjectView { table, sheet })
}

#[derive(Debug, Deserialize)]
pub struct RenameProjectParams {
	pub project_id: Uuid,
	pub name: String,
}

pub async fn rename_project(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<RenameProjectParams>,
) -> AppResult<StatusCode> {
	require_table_permission(state.store.as_ref(), user_id, params.project_id, Access::Write, "project").await?;
	state.store.rename_project(params.project_id, &params.name).await?;
	Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct DeleteProjectParams {
	pub project_id: Uuid,
}

pub async fn delete_project(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<DeleteProjectParams>,
) -> AppResult<StatusCode> {
	require_table_permission(state.store.as_ref(), user_id, params.project_id, Access::Write, "project").await?;
	state.store.delete_project(params.project_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ChangeGameUrlParams {
	pub table_id: Uuid,
	pub game_url: Option<String>,
}

pub async fn change_game_url(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<ChangeGameUrlParams>,
) -> AppResult<StatusCode> {
	require_table_permission(state.store.as_ref(), user_id, params.table_id, Access::Write, "project").await?;
	if let Some(url) = &params.game_url {
		if !is_valid_url(url) {
			return Err(AppError::Validation("given url is not valid".to_string()));
		}
	}
	state.store.change_game_url(params.table_id, params.game_url.as_deref()).await?;
	Ok(StatusCode::OK)
}

fn is_valid_url(s: &str) -> bool {
	s.starts_with("http://") || s.starts_with("https://")
}

#[derive(Debug, Deserialize)]
pub struct ShareParams {
	pub email: String,
	pub perm: Permission,
	pub table_id: Uuid,
}

pub async fn add_share(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<ShareParams>,
) -> AppResult<StatusCode> {
	if !params.email.contains('@') {
		return Err(AppError::Validation("invalid email address".to_string()));
	}
	if !check_table_permission(state.store.as_ref(), user_id, params.table_id, Access::Write).await? {
		return Err(AppError::Authorization("insufficient write permissions".to_string()));
	}
	let target = state
		.store
		.get_user_by_email(&params.email)
		.await?
		.ok_or_else(|| AppError::NotFound(format!("user with email {} not found", params.email)))?;
	if !can_assign_permission(state.store.as_ref(), user_id, params.table_id, params.perm).await? {
		return Err(AppError::Authorization("cannot grant a permission stronger than your own".to_string()));
	}
	state.store.grant_permission(target.id, params.table_id, params.perm).await?;
	Ok(StatusCode::CREATED)
}
