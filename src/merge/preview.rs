//! Conflict detection (merge-preview). Grounded on
//! `examples/original_source/backend/merge_preview.go`: `buildMergeData`,
//! `detectSheetConflicts`, `detectColumnConflicts`, `detectCellDataConflicts`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::BranchMergeRow;

use super::types::{ConflictType, MergeConflict};

/// Indexed view of one branch's flat merge scan, built once and reused by
/// every conflict-detection pass.
pub struct MergeData<'a> {
	/// Keyed by the row's own `sheet_id` — literal, not provenance-resolved.
	/// This reproduces the Go original's `detectSheetConflicts`/
	/// `detectColumnConflicts`, which only match sheets/columns sharing an
	/// identical id across both flat scans.
	pub sheets: HashMap<Uuid, &'a BranchMergeRow>,
	/// Keyed by the row's own `column_id`, same literal-id caveat as above.
	pub columns: HashMap<Uuid, &'a BranchMergeRow>,
	/// Keyed by `cell_key(sheet_key, column_key, idx)` where each key falls
	/// back to the provenance pointer when present, else the row's own id —
	/// this is what lets a copied cell in the source match the original in
	/// the target (spec §4.4.1).
	pub cell_data: HashMap<String, &'a BranchMergeRow>,
}

/// Format the `(sheet_key, column_key, idx)` tuple into the string embedded
/// in a cell conflict's id (`cell-<key>`) and used as the `cell_data` map key.
pub fn cell_key(sheet_key: &str, column_key: &str, idx: i64) -> String {
	format!("{}-{}-{}", sheet_key, column_key, idx)
}

pub fn build_merge_data(rows: &[BranchMergeRow]) -> MergeData<'_> {
	let mut sheets = HashMap::new();
	let mut columns = HashMap::new();
	let mut cell_data = HashMap::new();

	for row in rows {
		sheets.insert(row.sheet_id, row);
		if let Some(column_id) = row.column_id {
			columns.insert(column_id, row);
			if row.cell_id.is_some() {
				let sheet_key = row.source_sheet_id.unwrap_or(row.sheet_id).to_string();
				let column_key = row.source_column_id.unwrap_or(column_id).to_string();
				let idx = row.cell_idx.unwrap_or_default();
				cell_data.insert(cell_key(&sheet_key, &column_key, idx), row);
			}
		}
	}

	MergeData { sheets, columns, cell_data }
}

fn after(t: DateTime<Utc>, since: DateTime<Utc>) -> bool {
	t > since
}

fn detect_sheet_conflicts(source: &MergeData<'_>, target: &MergeData<'_>, divergence: DateTime<Utc>) -> Vec<MergeConflict> {
	let mut conflicts = Vec::new();
	for (sheet_id, source_sheet) in &source.sheets {
		let Some(target_sheet) = target.sheets.get(sheet_id) else {
			continue;
		};
		if after(source_sheet.sheet_updated_at, divergence) && after(target_sheet.sheet_updated_at, divergence) && source_sheet.sheet_name != target_sheet.sheet_name {
			conflicts.push(MergeConflict {
				id: format!("sheet-{}", sheet_id),
				conflict_type: ConflictType::SheetProperty,
				sheet_id: *sheet_id,
				sheet_name: source_sheet.sheet_name.clone(),
				column_id: None,
				column_name: None,
				row_index: None,
				property: Some("name".to_string()),
				source_value: source_sheet.sheet_name.clone(),
				target_value: target_sheet.sheet_name.clone(),
				source_updated_at: source_sheet.sheet_updated_at,
				target_updated_at: target_sheet.sheet_updated_at,
			});
		}
	}
	conflicts
}

fn detect_column_conflicts(source: &MergeData<'_>, target: &MergeData<'_>, divergence: DateTime<Utc>) -> Vec<MergeConflict> {
	let mut conflicts = Vec::new();
	for (column_id, source_column) in &source.columns {
		let Some(target_column) = target.columns.get(column_id) else {
			continue;
		};
		let (Some(source_updated), Some(target_updated)) = (source_column.column_updated_at, target_column.column_updated_at) else {
			continue;
		};
		if !(after(source_updated, divergence) && after(target_updated, divergence)) {
			continue;
		}

		let source_name = source_column.column_name.clone().unwrap_or_default();
		let target_name = target_column.column_name.clone().unwrap_or_default();
		if source_name != target_name {
			conflicts.push(MergeConflict {
				id: format!("column-{}-name", column_id),
				conflict_type: ConflictType::ColumnProperty,
				sheet_id: source_column.sheet_id,
				sheet_name: source_column.sheet_name.clone(),
				column_id: Some(*column_id),
				column_name: Some(source_name.clone()),
				row_index: None,
				property: Some("name".to_string()),
				source_value: source_name,
				target_value: target_name,
				source_updated_at: source_updated,
				target_updated_at: target_updated,
			});
		}

		let source_type = source_column.column_type.clone().unwrap_or_default();
		let target_type = target_column.column_type.clone().unwrap_or_default();
		if source_type != target_type {
			conflicts.push(MergeConflict {
				id: format!("column-{}-type", column_id),
				conflict_type: ConflictType::ColumnProperty,
				sheet_id: source_column.sheet_id,
				sheet_name: source_column.sheet_name.clone(),
				column_id: Some(*column_id),
				column_name: Some(source_column.column_name.clone().unwrap_or_default()),
				row_index: None,
				property: Some("type".to_string()),
				source_value: source_type,
				target_value: target_type,
				source_updated_at: source_updated,
				target_updated_at: target_updated,
			});
		}
	}
	conflicts
}

fn detect_cell_conflicts(source: &MergeData<'_>, target: &MergeData<'_>, divergence: DateTime<Utc>) -> Vec<MergeConflict> {
	let mut conflicts = Vec::new();
	for (key, source_cell) in &source.cell_data {
		let Some(target_cell) = target.cell_data.get(key) else {
			continue;
		};
		let (Some(source_updated), Some(target_updated)) = (source_cell.cell_updated_at, target_cell.cell_updated_at) else {
			continue;
		};
		if !(after(source_updated, divergence) && after(target_updated, divergence)) {
			continue;
		}

		let source_value = source_cell.cell_value.clone().unwrap_or_default();
		let target_value = target_cell.cell_value.clone().unwrap_or_default();
		if source_value != target_value {
			conflicts.push(MergeConflict {
				id: format!("cell-{}", key),
				conflict_type: ConflictType::CellData,
				sheet_id: source_cell.sheet_id,
				sheet_name: source_cell.sheet_name.clone(),
				column_id: source_cell.column_id,
				column_name: source_cell.column_name.clone(),
				row_index: source_cell.cell_idx,
				property: None,
				source_value,
				target_value,
				source_updated_at: source_updated,
				target_updated_at: target_updated,
			});
		}
	}
	conflicts
}

/// Detect every conflict between a source and target branch's flat merge
/// views, given the divergence point T (the source branch's `created_at`).
pub fn detect_conflicts(source_rows: &[BranchMergeRow], target_rows: &[BranchMergeRow], divergence: DateTime<Utc>) -> Vec<MergeConflict> {
	let source = build_merge_data(source_rows);
	let target = build_merge_data(target_rows);

	let mut conflicts = Vec::new();
	conflicts.extend(detect_sheet_conflicts(&source, &target, divergence));
	conflicts.extend(detect_column_conflicts(&source, &target, divergence));
	conflicts.extend(detect_cell_conflicts(&source, &target, divergence));
	conflicts
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::SheetType;
	use chrono::Duration;

	fn row(sheet_id: Uuid, sheet_name: &str, sheet_updated_at: DateTime<Utc>) -> BranchMergeRow {
		BranchMergeRow {
			sheet_id,
			sheet_name: sheet_name.to_string(),
			sheet_type: SheetType::Map,
			sheet_updated_at,
			source_sheet_id: None,
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
		}
	}

	#[test]
	fn empty_when_nothing_changed_since_divergence() {
		let t = Utc::now();
		let sheet_id = Uuid::new_v4();
		let source = vec![row(sheet_id, "config", t - Duration::hours(1))];
		let target = vec![row(sheet_id, "config", t - Duration::hours(1))];
		assert!(detect_conflicts(&source, &target, t).is_empty());
	}

	#[test]
	fn detects_sheet_name_conflict_when_both_renamed_after_divergence() {
		let t = Utc::now();
		let sheet_id = Uuid::new_v4();
		let source = vec![row(sheet_id, "config-source", t + Duration::hours(1))];
		let target = vec![row(sheet_id, "config-target", t + Duration::hours(1))];
		let conflicts = detect_conflicts(&source, &target, t);
		assert_eq!(conflicts.len(), 1);
		assert_eq!(conflicts[0].conflict_type, ConflictType::SheetProperty);
	}

	#[test]
	fn cell_conflict_uses_provenance_fallback_key() {
		let t = Utc::now();
		let target_sheet_id = Uuid::new_v4();
		let target_column_id = Uuid::new_v4();
		let source_sheet_id = Uuid::new_v4();
		let source_column_id = Uuid::new_v4();

		let mut source_row = row(source_sheet_id, "config", t - Duration::hours(1));
		source_row.source_sheet_id = Some(target_sheet_id);
		source_row.column_id = Some(source_column_id);
		source_row.source_column_id = Some(target_column_id);
		source_row.column_updated_at = Some(t - Duration::hours(1));
		source_row.cell_id = Some(Uuid::new_v4());
		source_row.cell_idx = Some(0);
		source_row.cell_value = Some("A-double-prime".to_string());
		source_row.cell_updated_at = Some(t + Duration::hours(1));

		let mut target_row = row(target_sheet_id, "config", t - Duration::hours(1));
		target_row.column_id = Some(target_column_id);
		target_row.column_updated_at = Some(t - Duration::hours(1));
		target_row.cell_id = Some(Uuid::new_v4());
		target_row.cell_idx = Some(0);
		target_row.cell_value = Some("A-prime".to_string());
		target_row.cell_updated_at = Some(t + Duration::hours(1));

		let conflicts = detect_conflicts(&[source_row], &[target_row], t);
		assert_eq!(conflicts.len(), 1);
		assert_eq!(conflicts[0].conflict_type, ConflictType::CellData);
		assert_eq!(conflicts[0].source_value, "A-double-prime");
		assert_eq!(conflicts[0].target_value, "A-prime");
	}
}
