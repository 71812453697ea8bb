//! Merge execute pipeline. Grounded on
//! `examples/original_source/backend/merge_execute.go`: `executeMerge`,
//! `processConflictResolutions`, `updateNonConflictingData`,
//! `createNewCellData`, `createNewSheets`, `createNewColumns`,
//! `copyDataToNewColumns`, `handleDeletions`.
//!
//! Phases run in strict order; each relies on the previous having committed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::BranchMergeRow;
use crate::error::{AppError, AppResult};
use crate::store::{NewColumn, NewSheet, Store};

use super::preview::{build_merge_data, cell_key, detect_conflicts};
use super::types::{ChosenSource, ConflictType, MergeConflict, MergeResolution};

/// Validate that exactly one resolution was submitted per detected conflict
/// and that every `conflict_id` is recognized (spec §4.4.2).
pub fn validate_resolutions(conflicts: &[MergeConflict], resolutions: &[MergeResolution]) -> AppResult<HashMap<String, ChosenSource>> {
	if conflicts.len() != resolutions.len() {
		return Err(AppError::Conflict("All conflicts must be resolved".to_string()));
	}
	let known: HashSet<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
	let mut map = HashMap::new();
	for resolution in resolutions {
		if !known.contains(resolution.conflict_id.as_str()) {
			return Err(AppError::Validation(format!("unknown conflict id '{}'", resolution.conflict_id)));
		}
		map.insert(resolution.conflict_id.clone(), resolution.chosen_source);
	}
	Ok(map)
}

/// Run the full merge-execute pipeline against `store`, consuming
/// `source_branch` on success. Returns the (unchanged) target branch id.
pub async fn execute_merge(
	store: &dyn Store,
	source_branch_id: Uuid,
	divergence: DateTime<Utc>,
	target_branch_id: Uuid,
	conflicts: &[MergeConflict],
	resolutions: &HashMap<String, ChosenSource>,
) -> AppResult<()> {
	let source_rows = store.get_branch_data_for_merge(source_branch_id).await?;
	let target_rows = store.get_branch_data_for_merge(target_branch_id).await?;

	apply_resolutions(store, &source_rows, &target_rows, conflicts, resolutions).await?;
	propagate_non_conflicting_cell_edits(store, &source_rows, &target_rows, conflicts, divergence).await?;

	let new_sheet_ids = propagate_new_sheets(store, &source_rows, &target_rows, target_branch_id).await?;
	let target_rows = store.get_branch_data_for_merge(target_branch_id).await?;

	let new_column_ids = propagate_new_columns(store, &source_rows, &target_rows).await?;
	let target_rows = store.get_branch_data_for_merge(target_branch_id).await?;

	copy_data_into_new_columns(store, &source_rows, &target_rows).await?;
	let target_rows = store.get_branch_data_for_merge(target_branch_id).await?;

	propagate_new_cells_in_existing_columns(store, &source_rows, &target_rows, divergence).await?;
	let target_rows = store.get_branch_data_for_merge(target_branch_id).await?;

	propagate_deletions(store, &source_rows, &target_rows, &new_sheet_ids, &new_column_ids).await?;

	// Best-effort cleanup (spec §7): a failure here does not undo the merge.
	if let Err(e) = store.delete_branch(source_branch_id).await {
		tracing::warn!(error = %e, branch_id = %source_branch_id, "failed to delete retired source branch after merge");
	}

	Ok(())
}

// --- phase 1: apply resolutions that chose "source" ---

async fn apply_resolutions(
	store: &dyn Store,
	source_rows: &[BranchMergeRow],
	target_rows: &[BranchMergeRow],
	conflicts: &[MergeConflict],
	resolutions: &HashMap<String, ChosenSource>,
) -> AppResult<()> {
	for conflict in conflicts {
		let Some(chosen) = resolutions.get(&conflict.id) else {
			return Err(AppError::Validation(format!("no resolution provided for conflict {}", conflict.id)));
		};
		if *chosen != ChosenSource::Source {
			continue;
		}
		match conflict.conflict_type {
			ConflictType::CellData => resolve_cell_conflict(store, source_rows, target_rows, conflict).await?,
			ConflictType::ColumnProperty => resolve_column_property_conflict(store, conflict).await?,
			ConflictType::SheetProperty => resolve_sheet_property_conflict(store, conflict).await?,
		}
	}
	Ok(())
}

async fn resolve_cell_conflict(store: &dyn Store, source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow], conflict: &MergeConflict) -> AppResult<()> {
	let conflict_key = conflict.id.strip_prefix("cell-").unwrap_or(&conflict.id);

	let source = build_merge_data(source_rows);
	let source_value = source
		.cell_data
		.get(conflict_key)
		.and_then(|row| row.cell_value.clone())
		.unwrap_or_else(|| conflict.source_value.clone());

	let target = build_merge_data(target_rows);
	if let Some(target_row) = target.cell_data.get(conflict_key) {
		if let Some(cell_id) = target_row.cell_id {
			store.update_column_data(cell_id, Some(source_value.as_str()), None).await?;
		}
	}
	Ok(())
}

/// Only `name` is wired for column-property conflicts — `type` may be
/// detected but is preview-only (spec §9 open question, resolved in
/// DESIGN.md), matching `resolveColumnPropertyConflict` in the original.
async fn resolve_column_property_conflict(store: &dyn Store, conflict: &MergeConflict) -> AppResult<()> {
	if conflict.property.as_deref() == Some("name") {
		if let Some(column_id) = conflict.column_id {
			if let Some(column) = store.get_column(column_id).await? {
				store
					.update_column(column_id, &conflict.source_value, &column.column_type, column.required)
					.await?;
			}
		}
	}
	Ok(())
}

async fn resolve_sheet_property_conflict(store: &dyn Store, conflict: &MergeConflict) -> AppResult<()> {
	if conflict.property.as_deref() == Some("name") {
		store.rename_sheet(conflict.sheet_id, &conflict.source_value).await?;
	}
	Ok(())
}

// --- phase 2: propagate non-conflicting cell edits ---

async fn propagate_non_conflicting_cell_edits(
	store: &dyn Store,
	source_rows: &[BranchMergeRow],
	target_rows: &[BranchMergeRow],
	conflicts: &[MergeConflict],
	divergence: DateTime<Utc>,
) -> AppResult<()> {
	let conflicted_cell_ids: HashSet<&str> = conflicts
		.iter()
		.filter(|c| c.conflict_type == ConflictType::CellData)
		.map(|c| c.id.as_str())
		.collect();

	for source_row in source_rows {
		let (Some(_), Some(cell_updated)) = (source_row.cell_id, source_row.cell_updated_at) else {
			continue;
		};
		if cell_updated <= divergence {
			continue;
		}
		let Some(column_id) = source_row.column_id else { continue };
		let idx = source_row.cell_idx.unwrap_or_default();

		let sheet_key = source_row.source_sheet_id.unwrap_or(source_row.sheet_id);
		let column_key = source_row.source_column_id.unwrap_or(column_id);
		let expected_conflict_id = format!("cell-{}", cell_key(&sheet_key.to_string(), &column_key.to_string(), idx));
		if conflicted_cell_ids.contains(expected_conflict_id.as_str()) {
			continue;
		}

		// Match the target's own sheet/column id against the source's
		// provenance pointers (spec §4.4.3 phase 2) — the copier always
		// allocates fresh ids for the cloned branch, so the source row's own
		// sheet_id/column_id never equal the target's.
		for target_row in target_rows {
			let Some(target_column_id) = target_row.column_id else { continue };
			let Some(target_cell_id) = target_row.cell_id else { continue };
			if target_row.sheet_id == sheet_key
				&& target_column_id == column_key
				&& target_row.cell_idx.unwrap_or_default() == idx
			{
				store.update_column_data(target_cell_id, source_row.cell_value.as_deref(), None).await?;
				break;
			}
		}
	}
	Ok(())
}

// --- phase 3: propagate new sheets ---

async fn propagate_new_sheets(store: &dyn Store, source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow], target_branch_id: Uuid) -> AppResult<HashSet<Uuid>> {
	let mut source_sheets: HashMap<Uuid, &BranchMergeRow> = HashMap::new();
	for row in source_rows {
		if row.source_sheet_id.is_none() {
			source_sheets.insert(row.sheet_id, row);
		}
	}

	let target_sheet_ids: HashSet<Uuid> = target_rows.iter().map(|r| r.sheet_id).collect();
	let mut created = HashSet::new();

	for (sheet_id, sheet_row) in source_sheets {
		if target_sheet_ids.contains(&sheet_id) {
			continue;
		}
		let sheet = store
			.create_sheet(NewSheet {
				name: sheet_row.sheet_name.clone(),
				sheet_type: sheet_row.sheet_type,
				branch_id: target_branch_id,
				source_sheet_id: Some(sheet_id),
			})
			.await?;
		created.insert(sheet.id);
	}
	Ok(created)
}

// --- phase 4: propagate new columns ---

async fn propagate_new_columns(store: &dyn Store, source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow]) -> AppResult<HashSet<Uuid>> {
	let mut source_columns: HashMap<Uuid, &BranchMergeRow> = HashMap::new();
	for row in source_rows {
		if let Some(column_id) = row.column_id {
			if row.source_column_id.is_none() {
				source_columns.insert(column_id, row);
			}
		}
	}

	let target_column_ids: HashSet<Uuid> = target_rows.iter().filter_map(|r| r.column_id).collect();

	// source sheet id -> target sheet id, keyed by the target's own
	// source_sheet_id provenance (newly created sheets carry it).
	let mut target_sheet_by_source: HashMap<Uuid, Uuid> = HashMap::new();
	for row in target_rows {
		if let Some(source_sheet_id) = row.source_sheet_id {
			target_sheet_by_source.insert(source_sheet_id, row.sheet_id);
		}
	}

	let mut created = HashSet::new();
	for (column_id, column_row) in source_columns {
		if target_column_ids.contains(&column_id) {
			continue;
		}

		let target_sheet_id = match column_row.source_sheet_id {
			Some(source_sheet_id) => target_sheet_by_source.get(&source_sheet_id).copied(),
			None => target_rows
				.iter()
				.find(|r| r.sheet_id == column_row.sheet_id)
				.map(|r| r.sheet_id),
		};

		let Some(target_sheet_id) = target_sheet_id else {
			tracing::warn!(column_id = %column_id, "no locatable target sheet for new column during merge, skipping");
			continue;
		};

		let column = store
			.create_column(NewColumn {
				name: column_row.column_name.clone().unwrap_or_default(),
				column_type: column_row.column_type.clone().unwrap_or_default(),
				required: column_row.column_required.unwrap_or(false),
				sheet_id: target_sheet_id,
				source_column_id: Some(column_id),
				order_index: 0,
			})
			.await?;
		created.insert(column.id);
	}
	Ok(created)
}

// --- phase 5: copy data into newly-created columns ---

async fn copy_data_into_new_columns(store: &dyn Store, source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow]) -> AppResult<()> {
	let mut new_target_columns: HashMap<Uuid, Uuid> = HashMap::new();
	for row in target_rows {
		if let (Some(column_id), Some(source_column_id)) = (row.column_id, row.source_column_id) {
			new_target_columns.insert(source_column_id, column_id);
		}
	}

	for source_row in source_rows {
		let (Some(cell_id), Some(source_column_id)) = (source_row.cell_id, source_row.column_id) else {
			continue;
		};
		let Some(&target_column_id) = new_target_columns.get(&source_column_id) else {
			continue;
		};
		let idx = source_row.cell_idx.unwrap_or_default();
		let has_data = target_rows
			.iter()
			.any(|r| r.column_id == Some(target_column_id) && r.cell_id.is_some() && r.cell_idx.unwrap_or_default() == idx);
		if has_data {
			continue;
		}
		let _ = cell_id;
		store.add_column_data(target_column_id, idx, source_row.cell_value.as_deref(), None).await?;
	}
	Ok(())
}

// --- phase 6: propagate new cells in pre-existing columns, rebasing idx ---

async fn propagate_new_cells_in_existing_columns(
	store: &dyn Store,
	source_rows: &[BranchMergeRow],
	target_rows: &[BranchMergeRow],
	divergence: DateTime<Utc>,
) -> AppResult<()> {
	for source_row in source_rows {
		let (Some(_cell_id), Some(cell_created)) = (source_row.cell_id, source_row.cell_created_at) else {
			continue;
		};

		let Some(source_column_id) = source_row.column_id else { continue };
		let sheet_key = source_row.source_sheet_id.unwrap_or(source_row.sheet_id);
		let column_key = source_row.source_column_id.unwrap_or(source_column_id);

		let mut target_column_id = None;
		let mut already_present = false;
		for target_row in target_rows {
			let Some(tcol) = target_row.column_id else { continue };
			if target_row.sheet_id == sheet_key && tcol == column_key {
				target_column_id = Some(tcol);
				if target_row.cell_id.is_some() && target_row.cell_idx.unwrap_or_default() == source_row.cell_idx.unwrap_or_default() {
					already_present = true;
				}
			}
		}

		let Some(target_column_id) = target_column_id else { continue };
		if already_present {
			continue;
		}

		let should_merge = cell_created > divergence || source_row.cell_updated_at.is_some_and(|u| u > divergence);
		if !should_merge {
			continue;
		}

		let max_idx = target_rows
			.iter()
			.filter(|r| r.column_id == Some(target_column_id) && r.cell_id.is_some())
			.filter_map(|r| r.cell_idx)
			.max();
		let next_idx = max_idx.map(|m| m + 1).unwrap_or(0);

		store.add_column_data(target_column_id, next_idx, source_row.cell_value.as_deref(), None).await?;
	}
	Ok(())
}

// --- phase 7: propagate deletions ---

async fn propagate_deletions(
	store: &dyn Store,
	source_rows: &[BranchMergeRow],
	target_rows: &[BranchMergeRow],
	new_sheet_ids: &HashSet<Uuid>,
	new_column_ids: &HashSet<Uuid>,
) -> AppResult<()> {
	handle_column_deletions(store, source_rows, target_rows, new_column_ids).await?;
	handle_sheet_deletions(store, source_rows, target_rows, new_sheet_ids).await?;
	Ok(())
}

/// A column present in the target but unreferenced by any source row is a
/// deletion signal (spec §4.4.3 phase 7) — unless it was itself created by
/// an earlier phase of *this* merge (`new_column_ids`), in which case it has
/// no provenance trail yet and must not be treated as orphaned.
async fn handle_column_deletions(store: &dyn Store, source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow], new_column_ids: &HashSet<Uuid>) -> AppResult<()> {
	let referenced: HashSet<Uuid> = source_rows
		.iter()
		.filter(|r| r.column_id.is_some())
		.filter_map(|r| r.source_column_id)
		.collect();

	let mut processed = HashSet::new();
	for target_row in target_rows {
		let Some(column_id) = target_row.column_id else { continue };
		if !processed.insert(column_id) {
			continue;
		}
		if new_column_ids.contains(&column_id) {
			continue;
		}
		if !referenced.contains(&column_id) {
			store.delete_column(column_id).await?;
		}
	}
	Ok(())
}

async fn handle_sheet_deletions(store: &dyn Store, source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow], new_sheet_ids: &HashSet<Uuid>) -> AppResult<()> {
	let referenced: HashSet<Uuid> = source_rows.iter().filter_map(|r| r.source_sheet_id).collect();

	let mut processed = HashSet::new();
	for target_row in target_rows {
		if !processed.insert(target_row.sheet_id) {
			continue;
		}
		if new_sheet_ids.contains(&target_row.sheet_id) {
			continue;
		}
		if !referenced.contains(&target_row.sheet_id) {
			store.delete_sheet(target_row.sheet_id).await?;
		}
	}
	Ok(())
}

/// Convenience entry point used by the merge_execute handler: detects
/// conflicts against the current state, validates the caller's resolutions,
/// then runs the pipeline.
pub async fn preview_and_execute(
	store: &dyn Store,
	source_branch_id: Uuid,
	target_branch_id: Uuid,
	divergence: DateTime<Utc>,
	resolutions: Vec<MergeResolution>,
) -> AppResult<()> {
	let source_rows = store.get_branch_data_for_merge(source_branch_id).await?;
	let target_rows = store.get_branch_data_for_merge(target_branch_id).await?;
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);

	let resolved = validate_resolutions(&conflicts, &resolutions)?;

	execute_merge(store, source_branch_id, divergence, target_branch_id, &conflicts, &resolved).await
}
