//! Branch lifecycle and the merge engine's HTTP surface. Grounded on
//! `examples/original_source/backend/{create_branch,get_branch,update_branch,
//! delete_branch,get_merge_targets,merge_preview,merge_execute}.go`.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::copier::copy_branch_tree;
use crate::domain::Branch;
use crate::error::{AppError, AppResult};
use crate::merge::{detect_conflicts, execute_merge, validate_resolutions, MergeConflict, MergeExecuteResponse, MergePreviewResponse, MergeResolution};
use crate::permissions::{check_branch_permission, require_branch_permission, require_table_permission, Access};
use crate::state::AppState;

use super::dto::{branch_dto, sheet_detail_dto, BranchDto, IdName, SheetDetailDto};

#[derive(Debug, Serialize)]
pub struct BranchView {
	pub branch: BranchDto,
	pub sheet: SheetDetailDto,
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchParams {
	pub name: String,
	pub is_protected: bool,
	pub table_id: Uuid,
	pub curr_branch_id: Uuid,
}

pub async fn create_branch(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<CreateBranchParams>,
) -> AppResult<(StatusCode, Json<BranchView>)> {
	require_table_permission(state.store.as_ref(), user_id, params.table_id, Access::Write, "project").await?;

	let start = Instant::now();
	let branch = state.store.create_branch(&params.name, params.table_id, params.is_protected).await?;
	copy_branch_tree(state.store.as_ref(), params.curr_branch_id, branch.id).await?;
	state.metrics.branch_copies_total.inc();
	state.metrics.branch_copy_duration_seconds.observe(start.elapsed().as_secs_f64());

	let view = switch_branch(&state, branch.id, user_id).await?;
	Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct BranchIdParams {
	pub branch_id: Uuid,
}

pub async fn get_branch(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Path(branch_id): Path<Uuid>,
) -> AppResult<Json<BranchView>> {
	require_branch_permission(state.store.as_ref(), user_id, branch_id, Access::Read, "branch").await?;
	let view = switch_branch(&state, branch_id, user_id).await?;
	Ok(Json(view))
}

/// Point the user's `opened_sheet` at `branch_id`'s first sheet and return the
/// combined branch/sheet view. Grounded on `switchBranch` in `create_branch.go`,
/// which creates a default `config` map sheet when the branch has none (the
/// same fallback `switch_project` uses for a brand-new project).
async fn switch_branch(state: &AppState, branch_id: Uuid, user_id: Uuid) -> AppResult<BranchView> {
	let sheets = state.store.list_sheets_for_branch(branch_id).await?;
	let sheet_id = if let Some(sheet) = sheets.first() {
		sheet.id
	} else {
		let sheet = state
			.store
			.create_sheet(crate::store::NewSheet {
				name: "config".to_string(),
				sheet_type: crate::domain::SheetType::Map,
				branch_id,
				source_sheet_id: None,
			})
			.await?;
		sheet.id
	};

	state.store.set_opened_sheet(user_id, Some(sheet_id)).await?;

	let branch = branch_dto(state.store.as_ref(), branch_id)
		.await?
		.ok_or_else(|| AppError::NotFound("branch not found".to_string()))?;
	let sheet = sheet_detail_dto(state.store.as_ref(), sheet_id)
		.await?
		.ok_or_else(|| AppError::Internal(anyhow::anyhow!("opened sheet vanished immediately after switch")))?;

	Ok(BranchView { branch, sheet })
}

#[derive(Debug, Deserialize)]
pub struct UpdateBranchParams {
	pub branch_id: Uuid,
	pub name: String,
	pub is_protected: bool,
}

pub async fn update_branch(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<UpdateBranchParams>,
) -> AppResult<StatusCode> {
	require_branch_permission(state.store.as_ref(), user_id, params.branch_id, Access::Write, "branch").await?;
	state.store.update_branch(params.branch_id, &params.name, params.is_protected).await?;
	Ok(StatusCode::OK)
}

pub async fn delete_branch(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<BranchIdParams>,
) -> AppResult<StatusCode> {
	require_branch_permission(state.store.as_ref(), user_id, params.branch_id, Access::Write, "branch").await?;
	let branch = state
		.store
		.get_branch(params.branch_id)
		.await?
		.ok_or_else(|| AppError::NotFound("branch not found".to_string()))?;
	if branch.is_protected {
		return Err(AppError::Validation("protected branches cannot be deleted".to_string()));
	}
	state.store.delete_branch(params.branch_id).await?;
	state.metrics.branch_deletes_total.inc();
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MergeTargetsQuery {
	pub table_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MergeTargetsResponse {
	pub valid_targets: Vec<IdName>,
	pub target_branch: IdName,
}

pub async fn merge_targets(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Query(query): Query<MergeTargetsQuery>,
) -> AppResult<Json<MergeTargetsResponse>> {
	require_table_permission(state.store.as_ref(), user_id, query.table_id, Access::Write, "project").await?;

	let target_branch = state
		.store
		.get_oldest_branch_from_table(query.table_id)
		.await?
		.ok_or_else(|| AppError::NotFound("project has no branches".to_string()))?;

	let all = state.store.list_branches_for_table(query.table_id).await?;
	let mut valid_targets = Vec::new();
	for branch in all {
		if branch.id == target_branch.id {
			continue;
		}
		if check_branch_permission(state.store.as_ref(), user_id, branch.id, Access::Read).await? {
			valid_targets.push(IdName { id: branch.id, name: branch.name });
		}
	}

	Ok(Json(MergeTargetsResponse {
		valid_targets,
		target_branch: IdName { id: target_branch.id, name: target_branch.name },
	}))
}

#[derive(Debug, Deserialize)]
pub struct MergePreviewParams {
	pub source_branch_id: Uuid,
}

/// Look up the source branch and its project's implicit merge target (the
/// oldest branch of the project), matching the original's `GetMergeTargetsResponse.target_branch`
/// rather than taking a `target_branch_id` over the wire.
async fn resolve_target_branch(state: &AppState, source_branch: &Branch) -> AppResult<Branch> {
	let target = state
		.store
		.get_oldest_branch_from_table(source_branch.table_id)
		.await?
		.ok_or_else(|| AppError::NotFound("project has no branches".to_string()))?;
	if target.id == source_branch.id {
		return Err(AppError::Validation("source branch is already the merge target".to_string()));
	}
	Ok(target)
}

pub async fn merge_preview(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<MergePreviewParams>,
) -> AppResult<Json<MergePreviewResponse>> {
	require_branch_permission(state.store.as_ref(), user_id, params.source_branch_id, Access::Read, "source branch").await?;

	let source_branch = state
		.store
		.get_branch(params.source_branch_id)
		.await?
		.ok_or_else(|| AppError::NotFound("branch not found".to_string()))?;
	let target_branch = resolve_target_branch(&state, &source_branch).await?;
	require_branch_permission(state.store.as_ref(), user_id, target_branch.id, Access::Write, "target branch").await?;

	let source_rows = state.store.get_branch_data_for_merge(source_branch.id).await?;
	let target_rows = state.store.get_branch_data_for_merge(target_branch.id).await?;
	let conflicts = detect_conflicts(&source_rows, &target_rows, source_branch.created_at);

	state.metrics.merge_previews_total.inc();
	state.metrics.merge_conflicts_detected_total.inc_by(conflicts.len() as u64);

	Ok(Json(MergePreviewResponse { conflicts }))
}

#[derive(Debug, Deserialize)]
pub struct MergeExecuteParams {
	pub source_branch_id: Uuid,
	pub resolutions: Vec<MergeResolution>,
}

pub async fn merge_execute(
	State(state): State<AppState>,
	Extension(CurrentUser(user_id)): Extension<CurrentUser>,
	Json(params): Json<MergeExecuteParams>,
) -> AppResult<Json<MergeExecuteResponse>> {
	require_branch_permission(state.store.as_ref(), user_id, params.source_branch_id, Access::Read, "source branch").await?;

	let source_branch = state
		.store
		.get_branch(params.source_branch_id)
		.await?
		.ok_or_else(|| AppError::NotFound("branch not found".to_string()))?;
	let target_branch = resolve_target_branch(&state, &source_branch).await?;
	require_branch_permission(state.store.as_ref(), user_id, target_branch.id, Access::Write, "target branch").await?;

	let source_rows = state.store.get_branch_data_for_merge(source_branch.id).await?;
	let target_rows = state.store.get_branch_data_for_merge(target_branch.id).await?;
	let conflicts: Vec<MergeConflict> = detect_conflicts(&source_rows, &target_rows, source_branch.created_at);
	let resolved = validate_resolutions(&conflicts, &params.resolutions)?;

	let start = Instant::now();
	let result = execute_merge(
		state.store.as_ref(),
		source_branch.id,
		source_branch.created_at,
		target_branch.id,
		&conflicts,
		&resolved,
	)
	.await;
	state.metrics.merge_execute_duration_seconds.observe(start.elapsed().as_secs_f64());

	match result {
		Ok(()) => {
			state.metrics.merge_executes_total.with_label_values(&["success"]).inc();
			Ok(Json(MergeExecuteResponse {
				success: true,
				message: "merge completed".to_string(),
				target_branch_id: target_branch.id,
			}))
		}
		Err(e) => {
			state.metrics.merge_executes_total.with_label_values(&["failure"]).inc();
			Err(e)
		}
	}
}
